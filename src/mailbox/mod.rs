//! Mailbox abstraction: conversations, drafts and labels.
//!
//! The pipeline talks to the mailbox only through three narrow traits:
//! [`ConversationStore`] (search), [`DraftCreator`] (reply-all drafts) and
//! [`Labeler`] (status labels). Backends:
//! - [`ImapMailbox`]: Gmail over IMAP with Gmail extensions
//! - [`MemoryMailbox`]: in-memory fake for tests

pub mod imap;
pub mod memory;

pub use imap::{ImapConfig, ImapMailbox};
pub use memory::MemoryMailbox;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MailboxError;

// ── Types ───────────────────────────────────────────────────────────

/// Provider-assigned conversation identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A single message as exposed by the provider.
///
/// Address fields are provider-formatted, comma-separated lists
/// (`Alice <alice@example.com>, bob@example.com`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: String,
    pub thread_id: ThreadId,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub cc: String,
    pub subject: String,
    pub plain_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_body: Option<String>,
    /// RFC 5322 Message-ID without angle brackets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
}

/// An ordered sequence of messages sharing a thread id.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: ThreadId,
    pub messages: Vec<MailMessage>,
    pub labels: Vec<String>,
}

impl Conversation {
    /// The message at the last position, the only one processed downstream.
    pub fn into_last_message(mut self) -> Option<MailMessage> {
        self.messages.pop()
    }

    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l == name)
    }
}

/// Current content of a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftMessage {
    pub from: String,
    pub to: String,
    pub cc: String,
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
}

/// An unsent reply attached to a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub id: String,
    pub thread_id: ThreadId,
    /// Message-ID the draft replies to, kept across updates.
    pub in_reply_to: Option<String>,
    pub message: DraftMessage,
}

/// Full replacement of a draft's recipients, subject and bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftUpdate {
    pub to: String,
    pub subject: String,
    pub plain_body: String,
    pub html_body: String,
    pub cc: String,
}

/// Handle to an existing mailbox label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
}

// ── Traits ──────────────────────────────────────────────────────────

/// Conversation search.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// At most `max` conversations matching `query`, newest first.
    async fn search(&self, query: &str, max: usize) -> Result<Vec<Conversation>, MailboxError>;
}

/// Reply-all draft creation.
#[async_trait]
pub trait DraftCreator: Send + Sync {
    /// Configured signature (HTML) of a send-as address.
    async fn signature(&self, address: &str) -> Result<Option<String>, MailboxError>;

    /// Create a reply-all draft to `original`.
    async fn create_reply_all(
        &self,
        original: &MailMessage,
        plain_body: &str,
        html_body: &str,
    ) -> Result<Draft, MailboxError>;

    /// Atomically replace recipients, subject and bodies of a draft.
    async fn update_draft(&self, draft: &Draft, update: DraftUpdate) -> Result<Draft, MailboxError>;
}

/// Label lookup and application.
#[async_trait]
pub trait Labeler: Send + Sync {
    /// Label with exactly this name, if it exists.
    async fn find_label(&self, name: &str) -> Result<Option<Label>, MailboxError>;

    /// Add a label to every message of a conversation. Other labels are untouched.
    async fn add_to_thread(&self, label: &Label, thread: &ThreadId) -> Result<(), MailboxError>;
}

// ── Address helpers ─────────────────────────────────────────────────

/// Split a comma-separated address list into trimmed, non-empty entries.
pub fn split_addresses(list: &str) -> Vec<&str> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// The bare address of an entry (`Alice <a@x.com>` → `a@x.com`).
pub fn bare_address(entry: &str) -> &str {
    match (entry.rfind('<'), entry.rfind('>')) {
        (Some(start), Some(end)) if end > start => entry[start + 1..end].trim(),
        _ => entry.trim(),
    }
}

/// Reply-all recipients for a message: `(to, cc)`.
///
/// `to` is the original sender plus the original `to` list, without the
/// replying address and without duplicates. `cc` is copied verbatim.
pub fn reply_all_recipients(original: &MailMessage, own_address: &str) -> (String, String) {
    let own = own_address.to_lowercase();
    let mut seen: Vec<String> = Vec::new();
    let mut to: Vec<&str> = Vec::new();

    for entry in split_addresses(&original.from)
        .into_iter()
        .chain(split_addresses(&original.to))
    {
        let addr = bare_address(entry).to_lowercase();
        if (!own.is_empty() && addr == own) || seen.contains(&addr) {
            continue;
        }
        seen.push(addr);
        to.push(entry);
    }

    // Replying to our own message: address the original recipients.
    let to = if to.is_empty() {
        original.to.clone()
    } else {
        to.join(", ")
    };
    (to, original.cc.clone())
}

/// `Re:`-prefixed subject, without stacking prefixes.
pub fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim_start();
    if trimmed
        .get(..3)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:"))
    {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    }
}
