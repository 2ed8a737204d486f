//! In-memory mailbox for tests and dry runs.
//!
//! Drafts created here reproduce the provider quirk the pipeline works
//! around: the replying address is added to the draft's CC list.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{
    Conversation, ConversationStore, Draft, DraftCreator, DraftMessage, DraftUpdate, Label,
    Labeler, MailMessage, ThreadId, reply_all_recipients, reply_subject,
};
use crate::error::MailboxError;

#[derive(Default)]
struct MailboxState {
    conversations: Vec<Conversation>,
    labels: BTreeSet<String>,
    signatures: HashMap<String, String>,
    drafts: Vec<Draft>,
    applied: Vec<(ThreadId, String)>,
    queries: Vec<(String, usize)>,
    next_draft: u64,
}

/// Mailbox holding conversations, labels and drafts in memory.
pub struct MemoryMailbox {
    own_address: String,
    state: Mutex<MailboxState>,
}

impl MemoryMailbox {
    pub fn new(own_address: impl Into<String>) -> Self {
        Self {
            own_address: own_address.into(),
            state: Mutex::new(MailboxState::default()),
        }
    }

    /// Add a conversation. Search returns conversations in insertion order.
    pub fn with_conversation(mut self, conversation: Conversation) -> Self {
        self.state.get_mut().conversations.push(conversation);
        self
    }

    /// Create a label so it can be found and applied.
    pub fn with_label(mut self, name: impl Into<String>) -> Self {
        self.state.get_mut().labels.insert(name.into());
        self
    }

    pub fn with_signature(mut self, address: impl Into<String>, html: impl Into<String>) -> Self {
        self.state
            .get_mut()
            .signatures
            .insert(address.into().to_lowercase(), html.into());
        self
    }

    /// Drafts in creation order, with their latest content.
    pub async fn drafts(&self) -> Vec<Draft> {
        self.state.lock().await.drafts.clone()
    }

    /// Every `(thread, label)` application, in order.
    pub async fn applied_labels(&self) -> Vec<(ThreadId, String)> {
        self.state.lock().await.applied.clone()
    }

    /// Every `(query, max)` passed to search.
    pub async fn queries(&self) -> Vec<(String, usize)> {
        self.state.lock().await.queries.clone()
    }

    pub async fn conversation(&self, id: &ThreadId) -> Option<Conversation> {
        self.state
            .lock()
            .await
            .conversations
            .iter()
            .find(|c| &c.id == id)
            .cloned()
    }
}

#[async_trait]
impl ConversationStore for MemoryMailbox {
    async fn search(&self, query: &str, max: usize) -> Result<Vec<Conversation>, MailboxError> {
        let mut state = self.state.lock().await;
        state.queries.push((query.to_string(), max));
        Ok(state.conversations.iter().take(max).cloned().collect())
    }
}

#[async_trait]
impl DraftCreator for MemoryMailbox {
    async fn signature(&self, address: &str) -> Result<Option<String>, MailboxError> {
        Ok(self
            .state
            .lock()
            .await
            .signatures
            .get(&address.to_lowercase())
            .cloned())
    }

    async fn create_reply_all(
        &self,
        original: &MailMessage,
        plain_body: &str,
        html_body: &str,
    ) -> Result<Draft, MailboxError> {
        let (to, cc) = reply_all_recipients(original, &self.own_address);
        let cc = if cc.is_empty() {
            self.own_address.clone()
        } else {
            format!("{cc},{}", self.own_address)
        };

        let mut state = self.state.lock().await;
        state.next_draft += 1;
        let draft = Draft {
            id: format!("draft-{}", state.next_draft),
            thread_id: original.thread_id.clone(),
            in_reply_to: original.message_id.clone(),
            message: DraftMessage {
                from: self.own_address.clone(),
                to,
                cc,
                subject: reply_subject(&original.subject),
                plain_body: plain_body.to_string(),
                html_body: html_body.to_string(),
            },
        };
        state.drafts.push(draft.clone());
        Ok(draft)
    }

    async fn update_draft(&self, draft: &Draft, update: DraftUpdate) -> Result<Draft, MailboxError> {
        let mut state = self.state.lock().await;
        let stored = state
            .drafts
            .iter_mut()
            .find(|d| d.id == draft.id)
            .ok_or_else(|| MailboxError::DraftFailed(format!("Unknown draft {}", draft.id)))?;

        stored.message = DraftMessage {
            from: stored.message.from.clone(),
            to: update.to,
            cc: update.cc,
            subject: update.subject,
            plain_body: update.plain_body,
            html_body: update.html_body,
        };
        Ok(stored.clone())
    }
}

#[async_trait]
impl Labeler for MemoryMailbox {
    async fn find_label(&self, name: &str) -> Result<Option<Label>, MailboxError> {
        Ok(self
            .state
            .lock()
            .await
            .labels
            .get(name)
            .map(|n| Label { name: n.clone() }))
    }

    async fn add_to_thread(&self, label: &Label, thread: &ThreadId) -> Result<(), MailboxError> {
        let mut state = self.state.lock().await;
        let conversation = state
            .conversations
            .iter_mut()
            .find(|c| &c.id == thread)
            .ok_or_else(|| MailboxError::LabelFailed(format!("Unknown thread {thread}")))?;

        if !conversation.has_label(&label.name) {
            conversation.labels.push(label.name.clone());
        }
        state.applied.push((thread.clone(), label.name.clone()));
        Ok(())
    }
}
