//! Outcome classifier and drafter.
//!
//! Decides between the two terminal outcomes for a generated reply:
//! - the exact sentinel `NO REPLY NEEDED` → no-reply label only
//! - anything else → reply-all draft with HTML body and signature, CC
//!   cleanup, replied label

use std::sync::Arc;

use tracing::info;

use super::html::{clean_cc_list, html_reply_body};
use super::labeler::OutcomeLabeler;
use super::types::{ReplyOutcome, RepliedEmail};
use crate::error::{MailboxError, PipelineError};
use crate::mailbox::{Draft, DraftCreator, DraftUpdate, bare_address};

/// Reply text meaning "decline to reply". Case-sensitive, never trimmed.
pub const NO_REPLY_SENTINEL: &str = "NO REPLY NEEDED";

pub fn is_no_reply(reply: &str) -> bool {
    reply == NO_REPLY_SENTINEL
}

/// Label names for the two outcomes.
#[derive(Debug, Clone)]
pub struct OutcomeLabels {
    pub replied: String,
    pub no_reply: String,
}

pub struct OutcomeDrafter {
    drafts: Arc<dyn DraftCreator>,
    labeler: OutcomeLabeler,
    address: String,
    labels: OutcomeLabels,
}

impl OutcomeDrafter {
    /// `address` is the configured sender whose signature is appended.
    pub fn new(
        drafts: Arc<dyn DraftCreator>,
        labeler: OutcomeLabeler,
        address: impl Into<String>,
        labels: OutcomeLabels,
    ) -> Self {
        Self {
            drafts,
            labeler,
            address: address.into(),
            labels,
        }
    }

    pub async fn classify_and_draft(
        &self,
        record: &RepliedEmail,
    ) -> Result<ReplyOutcome, PipelineError> {
        let thread = record.thread_id();

        if is_no_reply(record.reply()) {
            self.labeler.apply(&self.labels.no_reply, thread).await?;
            info!(thread_id = %thread, outcome = "no_reply_needed", "Conversation classified");
            return Ok(ReplyOutcome::NoReplyNeeded);
        }

        let signature = self.drafts.signature(&self.address).await?;
        let html = html_reply_body(record.reply(), signature.as_deref());
        let draft = self
            .drafts
            .create_reply_all(record.source(), record.reply(), &html)
            .await?;
        let draft = self.remove_sender_from_cc(draft).await?;

        self.labeler.apply(&self.labels.replied, thread).await?;
        info!(thread_id = %thread, outcome = "drafted", draft_id = %draft.id, "Conversation classified");
        Ok(ReplyOutcome::Drafted { draft_id: draft.id })
    }

    /// Rewrite the draft with its own sender filtered out of CC.
    async fn remove_sender_from_cc(&self, draft: Draft) -> Result<Draft, MailboxError> {
        let cc = clean_cc_list(&draft.message.cc, bare_address(&draft.message.from));
        let update = DraftUpdate {
            to: draft.message.to.clone(),
            subject: draft.message.subject.clone(),
            plain_body: draft.message.plain_body.clone(),
            html_body: draft.message.html_body.clone(),
            cc,
        };
        self.drafts.update_draft(&draft, update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::{Conversation, MailMessage, MemoryMailbox, ThreadId};
    use crate::pipeline::types::EmailRecord;

    const ME: &str = "me@example.com";

    fn original() -> MailMessage {
        MailMessage {
            id: "m1".into(),
            thread_id: "t1".into(),
            from: "Alice <alice@example.com>".into(),
            to: ME.into(),
            cc: "bob@example.com".into(),
            subject: "Dinner?".into(),
            plain_body: "Are you free Friday?".into(),
            html_body: None,
            message_id: Some("dinner@example.com".into()),
            date: None,
        }
    }

    fn record(reply: &str) -> RepliedEmail {
        EmailRecord::new(original(), "text".into())
            .with_prompt("prompt".into())
            .with_reply(reply.into())
    }

    fn setup() -> (Arc<MemoryMailbox>, OutcomeDrafter) {
        let mailbox = Arc::new(
            MemoryMailbox::new(ME)
                .with_conversation(Conversation {
                    id: "t1".into(),
                    messages: vec![original()],
                    labels: Vec::new(),
                })
                .with_label("AI/replied")
                .with_label("AI/no-reply")
                .with_signature(ME, "<i>Me</i>"),
        );
        let drafter = OutcomeDrafter::new(
            mailbox.clone(),
            OutcomeLabeler::new(mailbox.clone()),
            ME,
            OutcomeLabels {
                replied: "AI/replied".into(),
                no_reply: "AI/no-reply".into(),
            },
        );
        (mailbox, drafter)
    }

    #[tokio::test]
    async fn sentinel_labels_without_draft() {
        let (mailbox, drafter) = setup();

        let outcome = drafter.classify_and_draft(&record("NO REPLY NEEDED")).await.unwrap();

        assert_eq!(outcome, ReplyOutcome::NoReplyNeeded);
        assert!(mailbox.drafts().await.is_empty());
        assert_eq!(
            mailbox.applied_labels().await,
            vec![(ThreadId::from("t1"), "AI/no-reply".to_string())]
        );
    }

    #[tokio::test]
    async fn near_sentinels_are_replies() {
        for reply in ["no reply needed", "NO REPLY NEEDED ", " NO REPLY NEEDED", "NO REPLY NEEDED."] {
            let (mailbox, drafter) = setup();
            let outcome = drafter.classify_and_draft(&record(reply)).await.unwrap();

            assert!(matches!(outcome, ReplyOutcome::Drafted { .. }), "{reply:?}");
            assert_eq!(mailbox.drafts().await.len(), 1);
            assert_eq!(mailbox.applied_labels().await[0].1, "AI/replied");
        }
    }

    #[tokio::test]
    async fn reply_creates_cleaned_draft_with_signature() {
        let (mailbox, drafter) = setup();

        let outcome = drafter
            .classify_and_draft(&record("Yes <3\nSee you"))
            .await
            .unwrap();

        let drafts = mailbox.drafts().await;
        assert_eq!(drafts.len(), 1);
        let draft = &drafts[0];
        assert_eq!(outcome, ReplyOutcome::Drafted { draft_id: draft.id.clone() });
        assert_eq!(draft.message.to, "Alice <alice@example.com>");
        assert_eq!(draft.message.cc, "bob@example.com");
        assert_eq!(draft.message.subject, "Re: Dinner?");
        assert_eq!(draft.message.plain_body, "Yes <3\nSee you");
        assert_eq!(draft.message.html_body, "Yes &lt;3<br>See you<br><i>Me</i>");
        assert_eq!(
            mailbox.applied_labels().await,
            vec![(ThreadId::from("t1"), "AI/replied".to_string())]
        );
    }

    #[tokio::test]
    async fn emoji_subject_drafts_normally() {
        let (mailbox, drafter) = setup();
        let mut source = original();
        source.subject = "🎉 Party".into();
        let record = EmailRecord::new(source, "text".into())
            .with_prompt("prompt".into())
            .with_reply("Count me in".into());

        let outcome = drafter.classify_and_draft(&record).await.unwrap();

        assert!(matches!(outcome, ReplyOutcome::Drafted { .. }));
        assert_eq!(mailbox.drafts().await[0].message.subject, "Re: 🎉 Party");
    }

    #[tokio::test]
    async fn missing_label_aborts_after_draft() {
        let mailbox = Arc::new(MemoryMailbox::new(ME).with_conversation(Conversation {
            id: "t1".into(),
            messages: vec![original()],
            labels: Vec::new(),
        }));
        let drafter = OutcomeDrafter::new(
            mailbox.clone(),
            OutcomeLabeler::new(mailbox.clone()),
            ME,
            OutcomeLabels {
                replied: "AI/replied".into(),
                no_reply: "AI/no-reply".into(),
            },
        );

        let err = drafter.classify_and_draft(&record("Sure")).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Provider(MailboxError::LabelNotFound { .. })
        ));
        assert_eq!(mailbox.drafts().await.len(), 1);
    }
}
