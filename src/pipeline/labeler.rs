//! Outcome labeling: applies one status label to a conversation by name.

use std::sync::Arc;

use tracing::debug;

use crate::error::MailboxError;
use crate::mailbox::{Labeler, ThreadId};

pub struct OutcomeLabeler {
    labeler: Arc<dyn Labeler>,
}

impl OutcomeLabeler {
    pub fn new(labeler: Arc<dyn Labeler>) -> Self {
        Self { labeler }
    }

    /// Add the label named exactly `label_name`. Labels are never created here.
    pub async fn apply(&self, label_name: &str, thread: &ThreadId) -> Result<(), MailboxError> {
        let label = self
            .labeler
            .find_label(label_name)
            .await?
            .ok_or_else(|| MailboxError::LabelNotFound {
                name: label_name.to_string(),
            })?;

        self.labeler.add_to_thread(&label, thread).await?;
        debug!(thread_id = %thread, label = label_name, "Label applied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{Conversation, MemoryMailbox};

    fn mailbox() -> Arc<MemoryMailbox> {
        Arc::new(
            MemoryMailbox::new("me@example.com")
                .with_conversation(Conversation {
                    id: "t1".into(),
                    messages: Vec::new(),
                    labels: vec!["INBOX".into()],
                })
                .with_label("AI/replied"),
        )
    }

    #[tokio::test]
    async fn applies_existing_label_and_keeps_others() {
        let mailbox = mailbox();
        let labeler = OutcomeLabeler::new(mailbox.clone());

        labeler.apply("AI/replied", &"t1".into()).await.unwrap();

        let conversation = mailbox.conversation(&"t1".into()).await.unwrap();
        assert_eq!(conversation.labels, vec!["INBOX", "AI/replied"]);
    }

    #[tokio::test]
    async fn missing_label_is_an_error() {
        let mailbox = mailbox();
        let labeler = OutcomeLabeler::new(mailbox.clone());

        let err = labeler.apply("ai/replied", &"t1".into()).await.unwrap_err();
        assert!(matches!(err, MailboxError::LabelNotFound { ref name } if name == "ai/replied"));
        assert!(mailbox.applied_labels().await.is_empty());
    }
}
