//! Gmail mailbox over IMAP.
//!
//! Uses Gmail's IMAP extensions: `X-GM-RAW` for search-box queries,
//! `X-GM-THRID` for conversation grouping and `X-GM-LABELS` for labels.
//! Each trait call opens its own session inside `spawn_blocking`.

mod mime;
mod session;

use std::collections::{BTreeSet, HashMap};
use std::io::{Read, Write};

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{debug, info};

use self::mime::DraftEnvelope;
use self::session::{
    ImapSession, TlsStream, parse_append_uid, parse_labels, parse_list, parse_search,
    parse_thread_id, parse_uid, quote, uid_set,
};
use super::{
    Conversation, ConversationStore, Draft, DraftCreator, DraftMessage, DraftUpdate, Label,
    Labeler, MailMessage, ThreadId, reply_all_recipients, reply_subject,
};
use crate::error::MailboxError;

/// IMAP connection settings.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// Address drafts are written from.
    pub from_address: String,
    pub all_mail_folder: String,
    pub drafts_folder: String,
    /// HTML signature of `from_address`.
    pub signature: Option<String>,
}

impl ImapConfig {
    /// Build from `EMAIL_*` environment variables.
    ///
    /// Returns `None` when `EMAIL_IMAP_HOST` is not set.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("EMAIL_IMAP_HOST").ok()?;
        let username = std::env::var("EMAIL_USERNAME").ok()?;
        let password = std::env::var("EMAIL_PASSWORD").ok()?;

        let port: u16 = std::env::var("EMAIL_IMAP_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(993);
        let from_address = std::env::var("EMAIL_FROM_ADDRESS").unwrap_or_else(|_| username.clone());
        let all_mail_folder = std::env::var("EMAIL_ALL_MAIL_FOLDER")
            .unwrap_or_else(|_| "[Gmail]/All Mail".to_string());
        let drafts_folder =
            std::env::var("EMAIL_DRAFTS_FOLDER").unwrap_or_else(|_| "[Gmail]/Drafts".to_string());
        let signature = std::env::var("EMAIL_SIGNATURE")
            .ok()
            .filter(|s| !s.is_empty());

        Some(Self {
            host,
            port,
            username,
            password: SecretString::from(password),
            from_address,
            all_mail_folder,
            drafts_folder,
            signature,
        })
    }
}

/// Gmail mailbox reached over IMAP.
pub struct ImapMailbox {
    config: ImapConfig,
}

impl ImapMailbox {
    pub fn new(config: ImapConfig) -> Self {
        info!(host = %config.host, user = %config.username, "IMAP mailbox configured");
        Self { config }
    }

    /// Run `op` against a fresh session on the blocking pool.
    async fn with_session<T, F>(&self, name: &'static str, op: F) -> Result<T, MailboxError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession<TlsStream>, &ImapConfig) -> Result<T, MailboxError>
            + Send
            + 'static,
    {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let mut session = session::connect(&config)?;
            let result = op(&mut session, &config);
            session.logout();
            result
        })
        .await
        .map_err(|e| MailboxError::Protocol(format!("IMAP {name} task failed: {e}")))?
    }
}

#[async_trait]
impl ConversationStore for ImapMailbox {
    async fn search(&self, query: &str, max: usize) -> Result<Vec<Conversation>, MailboxError> {
        let query = query.to_string();
        let conversations = self
            .with_session("search", move |session, config| {
                search_conversations(session, &config.all_mail_folder, &query, max)
            })
            .await
            .map_err(|e| MailboxError::SearchFailed(e.to_string()))?;
        info!(count = conversations.len(), "IMAP search complete");
        Ok(conversations)
    }
}

#[async_trait]
impl DraftCreator for ImapMailbox {
    async fn signature(&self, address: &str) -> Result<Option<String>, MailboxError> {
        if address.eq_ignore_ascii_case(&self.config.from_address) {
            Ok(self.config.signature.clone())
        } else {
            debug!(address, "No signature configured for address");
            Ok(None)
        }
    }

    async fn create_reply_all(
        &self,
        original: &MailMessage,
        plain_body: &str,
        html_body: &str,
    ) -> Result<Draft, MailboxError> {
        let (to, cc) = reply_all_recipients(original, &self.config.from_address);
        let message = DraftMessage {
            from: self.config.from_address.clone(),
            to,
            cc,
            subject: reply_subject(&original.subject),
            plain_body: plain_body.to_string(),
            html_body: html_body.to_string(),
        };
        let thread_id = original.thread_id.clone();
        let in_reply_to = original.message_id.clone();

        self.with_session("create_draft", move |session, config| {
            let raw = mime::build_draft(&envelope(&message, in_reply_to.as_deref()))?;
            let uid = append_draft(session, &config.drafts_folder, &raw)?;
            debug!(uid, thread = %thread_id, "Draft created");
            Ok(Draft {
                id: uid.to_string(),
                thread_id,
                in_reply_to,
                message,
            })
        })
        .await
    }

    async fn update_draft(&self, draft: &Draft, update: DraftUpdate) -> Result<Draft, MailboxError> {
        let old_uid: u32 = draft
            .id
            .parse()
            .map_err(|_| MailboxError::DraftFailed(format!("Invalid draft id {}", draft.id)))?;
        let message = DraftMessage {
            from: draft.message.from.clone(),
            to: update.to,
            cc: update.cc,
            subject: update.subject,
            plain_body: update.plain_body,
            html_body: update.html_body,
        };
        let thread_id = draft.thread_id.clone();
        let in_reply_to = draft.in_reply_to.clone();

        self.with_session("update_draft", move |session, config| {
            let raw = mime::build_draft(&envelope(&message, in_reply_to.as_deref()))?;
            let uid = append_draft(session, &config.drafts_folder, &raw)?;
            delete_draft(session, &config.drafts_folder, old_uid)?;
            debug!(old_uid, uid, "Draft replaced");
            Ok(Draft {
                id: uid.to_string(),
                thread_id,
                in_reply_to,
                message,
            })
        })
        .await
    }
}

#[async_trait]
impl Labeler for ImapMailbox {
    async fn find_label(&self, name: &str) -> Result<Option<Label>, MailboxError> {
        let name = name.to_string();
        self.with_session("find_label", move |session, _| {
            let names = parse_list(&session.command("LIST \"\" \"*\"")?);
            Ok(names
                .into_iter()
                .find(|n| *n == name)
                .map(|name| Label { name }))
        })
        .await
    }

    async fn add_to_thread(&self, label: &Label, thread: &ThreadId) -> Result<(), MailboxError> {
        let label = label.name.clone();
        let thread = thread.clone();
        self.with_session("add_label", move |session, config| {
            label_thread(session, &config.all_mail_folder, &label, &thread)
        })
        .await
    }
}

fn envelope<'a>(message: &'a DraftMessage, in_reply_to: Option<&'a str>) -> DraftEnvelope<'a> {
    DraftEnvelope {
        from: &message.from,
        to: &message.to,
        cc: &message.cc,
        subject: &message.subject,
        plain_body: &message.plain_body,
        html_body: &message.html_body,
        in_reply_to,
    }
}

// ── Session operations ──────────────────────────────────────────────

/// Conversations matching a Gmail query, newest activity first.
fn search_conversations<S: Read + Write>(
    session: &mut ImapSession<S>,
    folder: &str,
    query: &str,
    max: usize,
) -> Result<Vec<Conversation>, MailboxError> {
    session.command(&format!("EXAMINE {}", quote(folder)))?;

    let hits = search_raw(session, query)?;
    if hits.is_empty() {
        return Ok(Vec::new());
    }

    let response = session.command(&format!("UID FETCH {} (UID X-GM-THRID)", uid_set(&hits)))?;
    let mut newest: HashMap<u64, u32> = HashMap::new();
    for line in &response.untagged {
        if let (Some(uid), Some(thread)) = (parse_uid(&line.text), parse_thread_id(&line.text)) {
            let entry = newest.entry(thread).or_insert(uid);
            *entry = (*entry).max(uid);
        }
    }

    let mut threads: Vec<(u64, u32)> = newest.into_iter().collect();
    threads.sort_by(|a, b| b.1.cmp(&a.1));
    threads.truncate(max);

    threads
        .into_iter()
        .map(|(thread, _)| fetch_thread(session, thread))
        .collect()
}

/// `UID SEARCH X-GM-RAW`. Non-ASCII queries go out as a UTF-8 literal.
fn search_raw<S: Read + Write>(
    session: &mut ImapSession<S>,
    query: &str,
) -> Result<Vec<u32>, MailboxError> {
    if query.contains(['\r', '\n']) {
        return Err(MailboxError::SearchFailed(
            "search query must be a single line".to_string(),
        ));
    }
    let response = if query.is_ascii() {
        session.command(&format!("UID SEARCH X-GM-RAW {}", quote(query)))?
    } else {
        session.command_with_literal("UID SEARCH CHARSET UTF-8 X-GM-RAW", query.as_bytes())?
    };
    Ok(parse_search(&response))
}

/// Every message of a thread, oldest first, with the union of their labels.
fn fetch_thread<S: Read + Write>(
    session: &mut ImapSession<S>,
    thread: u64,
) -> Result<Conversation, MailboxError> {
    let id = ThreadId(thread.to_string());
    let uids = parse_search(&session.command(&format!("UID SEARCH X-GM-THRID {thread}"))?);
    if uids.is_empty() {
        return Ok(Conversation {
            id,
            messages: Vec::new(),
            labels: Vec::new(),
        });
    }

    let response = session.command(&format!(
        "UID FETCH {} (UID X-GM-LABELS BODY.PEEK[])",
        uid_set(&uids)
    ))?;

    let mut messages = Vec::new();
    let mut labels = BTreeSet::new();
    for line in &response.untagged {
        let Some(uid) = parse_uid(&line.text) else {
            continue;
        };
        labels.extend(parse_labels(&line.text));
        if let Some(raw) = line.literals.first() {
            messages.push((uid, mime::parse_message(uid, &id, raw)?));
        }
    }
    messages.sort_by_key(|(uid, _)| *uid);

    Ok(Conversation {
        id,
        messages: messages.into_iter().map(|(_, m)| m).collect(),
        labels: labels.into_iter().collect(),
    })
}

fn append_draft<S: Read + Write>(
    session: &mut ImapSession<S>,
    folder: &str,
    raw: &[u8],
) -> Result<u32, MailboxError> {
    let response = session.append(folder, "\\Draft", raw)?;
    parse_append_uid(&response.status).ok_or_else(|| {
        MailboxError::DraftFailed(format!(
            "Server did not report APPENDUID: {}",
            response.status
        ))
    })
}

fn delete_draft<S: Read + Write>(
    session: &mut ImapSession<S>,
    folder: &str,
    uid: u32,
) -> Result<(), MailboxError> {
    session.command(&format!("SELECT {}", quote(folder)))?;
    session.command(&format!("UID STORE {uid} +FLAGS.SILENT (\\Deleted)"))?;
    session.command(&format!("UID EXPUNGE {uid}"))?;
    Ok(())
}

fn label_thread<S: Read + Write>(
    session: &mut ImapSession<S>,
    folder: &str,
    label: &str,
    thread: &ThreadId,
) -> Result<(), MailboxError> {
    let thread_num: u64 = thread
        .0
        .parse()
        .map_err(|_| MailboxError::LabelFailed(format!("Invalid thread id {thread}")))?;

    session.command(&format!("SELECT {}", quote(folder)))?;
    let uids = parse_search(&session.command(&format!("UID SEARCH X-GM-THRID {thread_num}"))?);
    if uids.is_empty() {
        return Err(MailboxError::LabelFailed(format!(
            "Thread {thread} has no messages"
        )));
    }

    session.command(&format!(
        "UID STORE {} +X-GM-LABELS ({})",
        uid_set(&uids),
        quote(label)
    ))?;
    debug!(thread = %thread, label, messages = uids.len(), "Label applied");
    Ok(())
}
