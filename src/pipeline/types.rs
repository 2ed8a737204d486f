//! Shared types for the reply pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::mailbox::{MailMessage, ThreadId};

// ── Email record ────────────────────────────────────────────────────

/// Stage marker: text extracted, nothing else yet.
#[derive(Debug, Clone)]
pub struct Extracted;

/// Stage marker: prompt built.
#[derive(Debug, Clone)]
pub struct Prompted {
    prompt: String,
}

/// Stage marker: reply generated.
#[derive(Debug, Clone)]
pub struct Replied {
    prompt: String,
    reply: String,
}

/// A message moving through the pipeline.
///
/// The stage parameter makes the enrichment order part of the type: a
/// reply can only be attached to a record that already has a prompt, and
/// the extracted text never changes after construction.
#[derive(Debug, Clone)]
pub struct EmailRecord<S> {
    source: MailMessage,
    text: String,
    stage: S,
}

pub type ExtractedEmail = EmailRecord<Extracted>;
pub type PromptedEmail = EmailRecord<Prompted>;
pub type RepliedEmail = EmailRecord<Replied>;

impl<S> EmailRecord<S> {
    /// The message this record was derived from.
    pub fn source(&self) -> &MailMessage {
        &self.source
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn thread_id(&self) -> &ThreadId {
        &self.source.thread_id
    }
}

impl EmailRecord<Extracted> {
    pub fn new(source: MailMessage, text: String) -> Self {
        Self {
            source,
            text,
            stage: Extracted,
        }
    }

    pub fn with_prompt(self, prompt: String) -> PromptedEmail {
        EmailRecord {
            source: self.source,
            text: self.text,
            stage: Prompted { prompt },
        }
    }
}

impl EmailRecord<Prompted> {
    pub fn prompt(&self) -> &str {
        &self.stage.prompt
    }

    pub fn with_reply(self, reply: String) -> RepliedEmail {
        EmailRecord {
            source: self.source,
            text: self.text,
            stage: Replied {
                prompt: self.stage.prompt,
                reply,
            },
        }
    }
}

impl EmailRecord<Replied> {
    pub fn prompt(&self) -> &str {
        &self.stage.prompt
    }

    pub fn reply(&self) -> &str {
        &self.stage.reply
    }
}

// ── Outcome ─────────────────────────────────────────────────────────

/// Terminal outcome for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplyOutcome {
    /// A reply-all draft was created and the replied label applied.
    Drafted { draft_id: String },
    /// The model returned the sentinel; only the no-reply label was applied.
    NoReplyNeeded,
}

impl ReplyOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Drafted { .. } => "drafted",
            Self::NoReplyNeeded => "no_reply_needed",
        }
    }
}

/// Outcome recorded against its conversation.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadOutcome {
    pub thread_id: ThreadId,
    pub subject: String,
    #[serde(flatten)]
    pub outcome: ReplyOutcome,
}

// ── Batch report ────────────────────────────────────────────────────

/// Summary of one "process batch" run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Outcomes in fetch order.
    pub outcomes: Vec<ThreadOutcome>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn drafted(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, ReplyOutcome::Drafted { .. }))
            .count()
    }

    pub fn no_reply(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == ReplyOutcome::NoReplyNeeded)
            .count()
    }
}
