//! HTML rendering of replies and CC cleanup for reply-all drafts.

/// Escape `& < > " '` (in that order) then turn newlines into `<br>`.
pub fn text_to_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
        .replace('\n', "<br>")
}

/// HTML reply body: escaped reply, a line break, then the signature.
pub fn html_reply_body(reply: &str, signature: Option<&str>) -> String {
    format!("{}<br>{}", text_to_html(reply), signature.unwrap_or_default())
}

/// Drop every CC entry that contains `sender`.
///
/// Reply-all drafts come back with the sending address added to CC; this
/// removes it while keeping the other entries as they were. Matching is
/// case-insensitive.
pub fn clean_cc_list(cc: &str, sender: &str) -> String {
    let sender = sender.trim().to_lowercase();
    if sender.is_empty() {
        return cc.to_string();
    }
    cc.split(',')
        .filter(|entry| !entry.to_lowercase().contains(&sender))
        .collect::<Vec<_>>()
        .join(",")
}
