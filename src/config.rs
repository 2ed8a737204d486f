//! Configuration: run settings resolved from an external key/value store.
//!
//! The seven run keys live in a [`ConfigSource`] (the `CONFIG` sheet by
//! default, environment variables optionally). Infrastructure settings
//! (workbook path, endpoint URL, model) come from the environment.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::sheet::{CONFIG_SHEET, CellReader, CellRef};

/// Default conversation batch size.
pub const DEFAULT_MAX_BATCH: usize = 20;

const DEFAULT_DB_PATH: &str = "./data/reply-drafter.db";

/// The fixed set of run configuration keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    Address,
    SearchQuery,
    ExcludeQuery,
    PromptTemplate,
    ApiKey,
    RepliedLabel,
    NoReplyLabel,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 7] = [
        ConfigKey::Address,
        ConfigKey::SearchQuery,
        ConfigKey::ExcludeQuery,
        ConfigKey::PromptTemplate,
        ConfigKey::ApiKey,
        ConfigKey::RepliedLabel,
        ConfigKey::NoReplyLabel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Address => "address",
            Self::SearchQuery => "searchQuery",
            Self::ExcludeQuery => "excludeQuery",
            Self::PromptTemplate => "promptTemplate",
            Self::ApiKey => "apiKey",
            Self::RepliedLabel => "repliedLabel",
            Self::NoReplyLabel => "noReplyLabel",
        }
    }

    /// Cell of the `CONFIG` sheet holding this key.
    pub fn cell(&self) -> CellRef {
        let row = match self {
            Self::Address => 2,
            Self::SearchQuery => 3,
            Self::ExcludeQuery => 4,
            Self::PromptTemplate => 5,
            Self::ApiKey => 6,
            Self::RepliedLabel => 7,
            Self::NoReplyLabel => 8,
        };
        CellRef::new(row, 2)
    }

    /// Environment variable read by [`EnvConfigSource`].
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Address => "REPLY_DRAFTER_ADDRESS",
            Self::SearchQuery => "REPLY_DRAFTER_SEARCH_QUERY",
            Self::ExcludeQuery => "REPLY_DRAFTER_EXCLUDE_QUERY",
            Self::PromptTemplate => "REPLY_DRAFTER_PROMPT_TEMPLATE",
            Self::ApiKey => "REPLY_DRAFTER_API_KEY",
            Self::RepliedLabel => "REPLY_DRAFTER_REPLIED_LABEL",
            Self::NoReplyLabel => "REPLY_DRAFTER_NO_REPLY_LABEL",
        }
    }

    fn hint(&self) -> String {
        format!(
            "Set {CONFIG_SHEET}!{} (or {} with --env-config)",
            self.cell(),
            self.env_var()
        )
    }

    pub fn is_secret(&self) -> bool {
        matches!(self, Self::ApiKey)
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

// ── Sources ─────────────────────────────────────────────────────────

/// Resolves run configuration keys from an external store.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Raw value for a key; `None` when the backing entry is absent.
    async fn get(&self, key: ConfigKey) -> Result<Option<String>, ConfigError>;
}

/// Reads keys from fixed cells of the `CONFIG` sheet.
pub struct SheetConfigSource {
    reader: Arc<dyn CellReader>,
}

impl SheetConfigSource {
    pub fn new(reader: Arc<dyn CellReader>) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl ConfigSource for SheetConfigSource {
    async fn get(&self, key: ConfigKey) -> Result<Option<String>, ConfigError> {
        self.reader
            .read_cell(CONFIG_SHEET, key.cell())
            .await
            .map_err(|e| ConfigError::Source(format!("{key}: {e}")))
    }
}

/// Reads keys from `REPLY_DRAFTER_*` environment variables.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvConfigSource;

#[async_trait]
impl ConfigSource for EnvConfigSource {
    async fn get(&self, key: ConfigKey) -> Result<Option<String>, ConfigError> {
        Ok(std::env::var(key.env_var()).ok())
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Every key read exactly once, so a run observes one consistent view.
#[derive(Clone)]
pub struct ConfigSnapshot {
    values: HashMap<ConfigKey, String>,
}

impl ConfigSnapshot {
    pub async fn load(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let mut values = HashMap::new();
        for key in ConfigKey::ALL {
            if let Some(value) = source.get(key).await? {
                values.insert(key, value);
            }
        }
        tracing::debug!(keys = values.len(), "Configuration snapshot loaded");
        Ok(Self { values })
    }

    /// Value as stored, empty string when absent.
    pub fn get(&self, key: ConfigKey) -> &str {
        self.values.get(&key).map(String::as_str).unwrap_or("")
    }

    /// Value that must be present and non-blank.
    pub fn require(&self, key: ConfigKey) -> Result<&str, ConfigError> {
        let value = self.get(key);
        if value.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: key.to_string(),
                hint: key.hint(),
            });
        }
        Ok(value)
    }

    /// The completion credential, wrapped so it never lands in logs.
    pub fn api_key(&self) -> Result<SecretString, ConfigError> {
        self.require(ConfigKey::ApiKey)
            .map(|key| SecretString::from(key.to_string()))
    }

    /// Display form with secrets masked.
    pub fn masked(&self, key: ConfigKey) -> String {
        let value = self.get(key);
        if key.is_secret() && !value.is_empty() {
            let chars: Vec<char> = value.chars().collect();
            let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
            format!("****{tail}")
        } else {
            value.to_string()
        }
    }
}

impl fmt::Debug for ConfigSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for key in ConfigKey::ALL {
            map.entry(&key.as_str(), &self.masked(key));
        }
        map.finish()
    }
}

// ── Infrastructure ──────────────────────────────────────────────────

/// Process-level settings, built from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Workbook database file.
    pub db_path: PathBuf,
    /// Directory for rolling log files (console only when unset).
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let db_path = std::env::var("REPLY_DRAFTER_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH));
        let log_dir = std::env::var("REPLY_DRAFTER_LOG_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Self { db_path, log_dir }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet::MemoryWorkbook;

    struct FixedSource(Vec<(ConfigKey, &'static str)>);

    #[async_trait]
    impl ConfigSource for FixedSource {
        async fn get(&self, key: ConfigKey) -> Result<Option<String>, ConfigError> {
            Ok(self
                .0
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string()))
        }
    }

    #[test]
    fn keys_map_to_config_cells() {
        assert_eq!(ConfigKey::Address.cell().to_string(), "B2");
        assert_eq!(ConfigKey::SearchQuery.cell().to_string(), "B3");
        assert_eq!(ConfigKey::ExcludeQuery.cell().to_string(), "B4");
        assert_eq!(ConfigKey::PromptTemplate.cell().to_string(), "B5");
        assert_eq!(ConfigKey::ApiKey.cell().to_string(), "B6");
        assert_eq!(ConfigKey::RepliedLabel.cell().to_string(), "B7");
        assert_eq!(ConfigKey::NoReplyLabel.cell().to_string(), "B8");
    }

    #[test]
    fn key_parsing_is_case_insensitive() {
        assert_eq!("searchquery".parse::<ConfigKey>().unwrap(), ConfigKey::SearchQuery);
        assert_eq!("apiKey".parse::<ConfigKey>().unwrap(), ConfigKey::ApiKey);
        assert!(matches!(
            "model".parse::<ConfigKey>(),
            Err(ConfigError::UnknownKey(_))
        ));
    }

    #[tokio::test]
    async fn require_rejects_absent_and_blank() {
        let snapshot = ConfigSnapshot::load(&FixedSource(vec![
            (ConfigKey::PromptTemplate, "   "),
            (ConfigKey::SearchQuery, "is:unread"),
        ]))
        .await
        .unwrap();

        assert_eq!(snapshot.require(ConfigKey::SearchQuery).unwrap(), "is:unread");
        assert!(matches!(
            snapshot.require(ConfigKey::PromptTemplate),
            Err(ConfigError::Missing { .. })
        ));
        assert!(snapshot.api_key().is_err());
        assert_eq!(snapshot.get(ConfigKey::ExcludeQuery), "");
    }

    #[tokio::test]
    async fn sheet_source_reads_config_cells() {
        let wb = Arc::new(MemoryWorkbook::with_sheets(&[CONFIG_SHEET]));
        wb.seed(CONFIG_SHEET, CellRef::new(3, 2), "label:inbox").await;
        wb.seed(CONFIG_SHEET, CellRef::new(7, 2), "AI/replied").await;

        let source = SheetConfigSource::new(wb);
        let snapshot = ConfigSnapshot::load(&source).await.unwrap();

        assert_eq!(snapshot.get(ConfigKey::SearchQuery), "label:inbox");
        assert_eq!(snapshot.get(ConfigKey::RepliedLabel), "AI/replied");
        assert_eq!(snapshot.get(ConfigKey::Address), "");
    }

    #[tokio::test]
    async fn masked_hides_api_key() {
        let snapshot = ConfigSnapshot::load(&FixedSource(vec![(
            ConfigKey::ApiKey,
            "sk-test-abcd1234",
        )]))
        .await
        .unwrap();

        assert_eq!(snapshot.masked(ConfigKey::ApiKey), "****1234");
        assert!(!format!("{snapshot:?}").contains("sk-test"));
    }
}
