//! Conversation fetcher: the last message of each matching conversation.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::MailboxError;
use crate::mailbox::{ConversationStore, MailMessage};

/// Search query plus exclusion terms, separated by one space.
pub fn combine_query(search_query: &str, exclude_query: &str) -> String {
    format!("{search_query} {exclude_query}")
}

pub struct ConversationFetcher {
    store: Arc<dyn ConversationStore>,
    query: String,
    skip_labels: Vec<String>,
}

impl ConversationFetcher {
    pub fn new(store: Arc<dyn ConversationStore>, search_query: &str, exclude_query: &str) -> Self {
        Self {
            store,
            query: combine_query(search_query, exclude_query),
            skip_labels: Vec::new(),
        }
    }

    /// Drop conversations already carrying any of these labels.
    pub fn skip_labeled(mut self, labels: Vec<String>) -> Self {
        self.skip_labels = labels;
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Representative messages of at most `max_batch` conversations, in search order.
    pub async fn fetch(&self, max_batch: usize) -> Result<Vec<MailMessage>, MailboxError> {
        let conversations = self.store.search(&self.query, max_batch).await?;
        let found = conversations.len();

        let mut messages = Vec::with_capacity(found);
        for conversation in conversations.into_iter().take(max_batch) {
            if let Some(label) = self
                .skip_labels
                .iter()
                .find(|label| conversation.has_label(label))
            {
                debug!(thread_id = %conversation.id, label = %label, "Already labeled, skipping");
                continue;
            }

            let thread_id = conversation.id.clone();
            match conversation.into_last_message() {
                Some(message) => messages.push(message),
                None => warn!(thread_id = %thread_id, "Conversation has no messages, skipping"),
            }
        }

        info!(query = %self.query, found, selected = messages.len(), "Fetched conversations");
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{Conversation, MemoryMailbox};

    fn message(thread: &str, id: &str) -> MailMessage {
        MailMessage {
            id: id.into(),
            thread_id: thread.into(),
            from: "a@example.com".into(),
            to: "me@example.com".into(),
            cc: String::new(),
            subject: "Subject".into(),
            plain_body: format!("body {id}"),
            html_body: None,
            message_id: None,
            date: None,
        }
    }

    fn conversation(thread: &str, ids: &[&str], labels: &[&str]) -> Conversation {
        Conversation {
            id: thread.into(),
            messages: ids.iter().map(|id| message(thread, id)).collect(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    #[test]
    fn query_joins_with_single_space() {
        assert_eq!(combine_query("is:unread", "-from:me"), "is:unread -from:me");
        assert_eq!(combine_query("is:unread", ""), "is:unread ");
    }

    #[tokio::test]
    async fn selects_last_message_of_each_conversation() {
        let mailbox = Arc::new(
            MemoryMailbox::new("me@example.com")
                .with_conversation(conversation("t1", &["1a", "1b", "1c"], &[]))
                .with_conversation(conversation("t2", &["2a"], &[])),
        );
        let fetcher = ConversationFetcher::new(mailbox.clone(), "in:inbox", "-label:done");

        let messages = fetcher.fetch(20).await.unwrap();

        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["1c", "2a"]);
        assert_eq!(
            mailbox.queries().await,
            vec![("in:inbox -label:done".to_string(), 20)]
        );
    }

    #[tokio::test]
    async fn respects_max_batch_and_skips_empty() {
        let mailbox = Arc::new(
            MemoryMailbox::new("me@example.com")
                .with_conversation(conversation("t1", &[], &[]))
                .with_conversation(conversation("t2", &["2a"], &[]))
                .with_conversation(conversation("t3", &["3a"], &[])),
        );
        let fetcher = ConversationFetcher::new(mailbox, "q", "");

        let messages = fetcher.fetch(2).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "2a");
    }

    #[tokio::test]
    async fn skip_labeled_filters_processed_threads() {
        let mailbox = Arc::new(
            MemoryMailbox::new("me@example.com")
                .with_conversation(conversation("t1", &["1a"], &["AI/replied"]))
                .with_conversation(conversation("t2", &["2a"], &["INBOX"]))
                .with_conversation(conversation("t3", &["3a"], &["AI/no-reply"])),
        );
        let fetcher = ConversationFetcher::new(mailbox, "q", "")
            .skip_labeled(vec!["AI/replied".into(), "AI/no-reply".into()]);

        let messages = fetcher.fetch(20).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, "2a");
    }
}
