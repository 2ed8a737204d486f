//! Text extraction: flattens a message into the text record the prompt is built from.

use super::types::{EmailRecord, ExtractedEmail};
use crate::mailbox::MailMessage;

/// Body length cap, in characters. Leaves room for the header lines under
/// the 50,000-character cell ceiling of the results sheet.
pub const MAX_BODY_CHARS: usize = 48_000;

/// `FROM:`, `TO:`, `SUBJECT:` lines followed by the (truncated) plain body.
pub fn extract(message: MailMessage) -> ExtractedEmail {
    let text = format!(
        "FROM: {}\nTO: {}\nSUBJECT: {}\n{}",
        message.from,
        message.to,
        message.subject,
        truncate_chars(&message.plain_body, MAX_BODY_CHARS)
    );
    EmailRecord::new(message, text)
}

/// The first `max` characters of `s`.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
