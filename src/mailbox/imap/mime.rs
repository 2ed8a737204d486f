//! MIME conversion: raw RFC 5322 bytes to [`MailMessage`] and draft bodies
//! to raw bytes ready for APPEND.

use chrono::DateTime;
use lettre::Message;
use lettre::message::{Mailbox, Mailboxes, MultiPart};
use mail_parser::{Address, MessageParser};

use crate::error::MailboxError;
use crate::mailbox::{MailMessage, ThreadId};

/// Parse a fetched message.
pub(crate) fn parse_message(
    uid: u32,
    thread_id: &ThreadId,
    raw: &[u8],
) -> Result<MailMessage, MailboxError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailboxError::InvalidMessage {
            id: uid.to_string(),
            reason: "unparseable MIME structure".to_string(),
        })?;

    Ok(MailMessage {
        id: uid.to_string(),
        thread_id: thread_id.clone(),
        from: format_addresses(parsed.from()),
        to: format_addresses(parsed.to()),
        cc: format_addresses(parsed.cc()),
        subject: parsed.subject().unwrap_or_default().to_string(),
        plain_body: parsed
            .body_text(0)
            .map(|b| b.into_owned())
            .unwrap_or_default(),
        html_body: parsed.body_html(0).map(|b| b.into_owned()),
        message_id: parsed.message_id().map(str::to_string),
        date: parsed
            .date()
            .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0)),
    })
}

fn format_addresses(address: Option<&Address>) -> String {
    let entries: Vec<String> = match address {
        Some(Address::List(list)) => list
            .iter()
            .filter_map(|a| format_entry(a.name(), a.address()))
            .collect(),
        Some(Address::Group(groups)) => groups
            .iter()
            .flat_map(|g| g.addresses.iter())
            .filter_map(|a| format_entry(a.name(), a.address()))
            .collect(),
        None => Vec::new(),
    };
    entries.join(", ")
}

fn format_entry(name: Option<&str>, address: Option<&str>) -> Option<String> {
    match (name.filter(|n| !n.is_empty()), address) {
        (Some(name), Some(addr)) if name.contains([',', '"', '<', ';']) => Some(format!(
            "\"{}\" <{addr}>",
            name.replace('\\', "\\\\").replace('"', "\\\"")
        )),
        (Some(name), Some(addr)) => Some(format!("{name} <{addr}>")),
        (None, Some(addr)) => Some(addr.to_string()),
        (Some(name), None) => Some(name.to_string()),
        (None, None) => None,
    }
}

/// Headers and bodies of a draft to serialize.
pub(crate) struct DraftEnvelope<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub cc: &'a str,
    pub subject: &'a str,
    pub plain_body: &'a str,
    pub html_body: &'a str,
    /// Message-ID (no angle brackets) of the message being answered.
    pub in_reply_to: Option<&'a str>,
}

/// Build a `multipart/alternative` draft.
pub(crate) fn build_draft(envelope: &DraftEnvelope<'_>) -> Result<Vec<u8>, MailboxError> {
    let from: Mailbox = envelope
        .from
        .parse()
        .map_err(|e| MailboxError::DraftFailed(format!("Invalid from address: {e}")))?;

    let mut builder = Message::builder().from(from).subject(envelope.subject);
    for mailbox in parse_mailboxes("to", envelope.to)? {
        builder = builder.to(mailbox);
    }
    for mailbox in parse_mailboxes("cc", envelope.cc)? {
        builder = builder.cc(mailbox);
    }
    if let Some(id) = envelope.in_reply_to {
        let id = format!("<{id}>");
        builder = builder.in_reply_to(id.clone()).references(id);
    }

    let message = builder
        .multipart(MultiPart::alternative_plain_html(
            envelope.plain_body.to_string(),
            envelope.html_body.to_string(),
        ))
        .map_err(|e| MailboxError::DraftFailed(format!("Failed to build draft: {e}")))?;

    Ok(message.formatted())
}

fn parse_mailboxes(field: &str, list: &str) -> Result<Vec<Mailbox>, MailboxError> {
    if list.trim().is_empty() {
        return Ok(Vec::new());
    }
    list.parse::<Mailboxes>()
        .map(|m| m.into_iter().collect())
        .map_err(|e| MailboxError::DraftFailed(format!("Invalid {field} list '{list}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "From: Alice Example <alice@example.com>\r\n\
        To: me@example.com, Bob <bob@example.com>\r\n\
        Cc: carol@example.com\r\n\
        Subject: Project update\r\n\
        Message-ID: <abc123@example.com>\r\n\
        Date: Tue, 1 Oct 2024 10:00:00 +0000\r\n\
        Content-Type: text/plain; charset=utf-8\r\n\
        \r\n\
        Can you send the report?\r\n";

    #[test]
    fn parses_headers_and_body() {
        let msg = parse_message(42, &"900".into(), RAW.as_bytes()).unwrap();

        assert_eq!(msg.id, "42");
        assert_eq!(msg.thread_id, ThreadId::from("900"));
        assert_eq!(msg.from, "Alice Example <alice@example.com>");
        assert_eq!(msg.to, "me@example.com, Bob <bob@example.com>");
        assert_eq!(msg.cc, "carol@example.com");
        assert_eq!(msg.subject, "Project update");
        assert!(msg.plain_body.contains("Can you send the report?"));
        assert_eq!(msg.message_id.as_deref(), Some("abc123@example.com"));
        assert_eq!(msg.date.unwrap().to_rfc3339(), "2024-10-01T10:00:00+00:00");
    }

    #[test]
    fn display_names_with_commas_are_quoted() {
        assert_eq!(
            format_entry(Some("Doe, Jane"), Some("jane@example.com")).unwrap(),
            "\"Doe, Jane\" <jane@example.com>"
        );
        assert_eq!(format_entry(Some(""), Some("a@example.com")).unwrap(), "a@example.com");
        assert!(format_entry(None, None).is_none());
    }

    #[test]
    fn builds_threaded_alternative_draft() {
        let raw = build_draft(&DraftEnvelope {
            from: "me@example.com",
            to: "Alice Example <alice@example.com>",
            cc: "carol@example.com, dave@example.com",
            subject: "Re: Project update",
            plain_body: "Attached.",
            html_body: "Attached.<br><b>Me</b>",
            in_reply_to: Some("abc123@example.com"),
        })
        .unwrap();
        let text = String::from_utf8(raw).unwrap();

        assert!(text.contains("In-Reply-To: <abc123@example.com>"));
        assert!(text.contains("References: <abc123@example.com>"));
        assert!(text.contains("Subject: Re: Project update"));
        assert!(text.contains("multipart/alternative"));
        assert!(text.contains("carol@example.com"));
        assert!(text.contains("dave@example.com"));
    }

    #[test]
    fn draft_without_cc_or_thread() {
        let raw = build_draft(&DraftEnvelope {
            from: "me@example.com",
            to: "alice@example.com",
            cc: "",
            subject: "Re: Hi",
            plain_body: "Hello",
            html_body: "Hello",
            in_reply_to: None,
        })
        .unwrap();
        let text = String::from_utf8(raw).unwrap();
        assert!(!text.contains("Cc:"));
        assert!(!text.contains("In-Reply-To"));
    }

    #[test]
    fn rejects_invalid_from() {
        let err = build_draft(&DraftEnvelope {
            from: "not an address",
            to: "alice@example.com",
            cc: "",
            subject: "Re: Hi",
            plain_body: "",
            html_body: "",
            in_reply_to: None,
        })
        .unwrap_err();
        assert!(matches!(err, MailboxError::DraftFailed(_)));
    }
}
