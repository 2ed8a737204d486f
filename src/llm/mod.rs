//! LLM integration: turns a prompt into reply text.
//!
//! The pipeline only sees the [`ReplyGenerator`] trait. The production
//! backend is [`OpenAiClient`], a chat-completions client over reqwest.

pub mod openai;

pub use openai::OpenAiClient;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::LlmError;

/// Default chat-completions base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default completion model.
pub const DEFAULT_MODEL: &str = "gpt-4-1106-preview";

/// Default completion length cap, in tokens.
pub const DEFAULT_MAX_TOKENS: u32 = 150;

/// Generates a reply for a prompt.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    /// Model identifier used for requests.
    fn model_name(&self) -> &str;

    /// Text of the first returned choice, verbatim.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Configuration for the completion client.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub api_key: SecretString,
    /// Request timeout. `None` leaves requests unbounded.
    pub timeout: Option<Duration>,
}

impl LlmConfig {
    /// Build from environment overrides plus the credential from the run configuration.
    pub fn from_env(api_key: SecretString) -> Self {
        let base_url = std::env::var("REPLY_DRAFTER_LLM_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("REPLY_DRAFTER_MODEL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let timeout = parse_timeout(
            std::env::var("REPLY_DRAFTER_LLM_TIMEOUT_SECS")
                .ok()
                .as_deref(),
        );

        Self {
            base_url,
            model,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key,
            timeout,
        }
    }

    /// Config pointing at an explicit endpoint, with defaults elsewhere.
    pub fn with_base_url(api_key: SecretString, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            api_key,
            timeout: None,
        }
    }
}

/// Whole seconds, positive. Anything else means no timeout.
fn parse_timeout(value: Option<&str>) -> Option<Duration> {
    value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_timeout_unless_configured() {
        let config = LlmConfig::with_base_url(SecretString::from("sk".to_string()), "http://x/v1");
        assert_eq!(config.timeout, None);
        assert_eq!(config.max_tokens, 150);
        assert_eq!(config.model, "gpt-4-1106-preview");
    }

    #[test]
    fn timeout_override_parses_seconds() {
        assert_eq!(parse_timeout(Some("90")), Some(Duration::from_secs(90)));
        assert_eq!(parse_timeout(Some(" 5 ")), Some(Duration::from_secs(5)));
        assert_eq!(parse_timeout(Some("0")), None);
        assert_eq!(parse_timeout(Some("soon")), None);
        assert_eq!(parse_timeout(None), None);
    }
}
