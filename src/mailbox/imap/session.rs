//! Minimal IMAP4rev1 client session with Gmail extensions.
//!
//! Blocking I/O over any `Read + Write` stream. Responses are read line by
//! line; `{N}` literals are read as raw bytes and attached to the line
//! that announced them.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;

use super::ImapConfig;
use crate::error::MailboxError;

pub(crate) type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

static UID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bUID (\d+)").expect("valid regex"));
static THRID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"X-GM-THRID (\d+)").expect("valid regex"));
static APPENDUID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"APPENDUID \d+ (\d+)").expect("valid regex"));

/// One logical response line, literals included.
#[derive(Debug, Default, Clone)]
pub(crate) struct ResponseLine {
    pub text: String,
    pub literals: Vec<Vec<u8>>,
}

/// Untagged lines plus the tagged completion text (after the tag).
#[derive(Debug)]
pub(crate) struct Response {
    pub untagged: Vec<ResponseLine>,
    pub status: String,
}

pub(crate) struct ImapSession<S: Read + Write> {
    stream: BufReader<S>,
    tag_counter: u32,
}

impl<S: Read + Write> ImapSession<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            tag_counter: 0,
        }
    }

    fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("A{}", self.tag_counter)
    }

    pub fn read_greeting(&mut self) -> Result<(), MailboxError> {
        let greeting = self.read_line()?;
        if greeting.text.starts_with("* OK") || greeting.text.starts_with("* PREAUTH") {
            Ok(())
        } else {
            Err(MailboxError::Protocol(format!(
                "Unexpected greeting: {}",
                greeting.text
            )))
        }
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<(), MailboxError> {
        self.command(&format!("LOGIN {} {}", quote(username), quote(password)))
            .map(|_| ())
    }

    /// Send a tagged command and collect its response.
    pub fn command(&mut self, command: &str) -> Result<Response, MailboxError> {
        let tag = self.next_tag();
        self.send(format!("{tag} {command}\r\n").as_bytes())?;
        self.read_response(&tag, command)
    }

    /// APPEND a message to `mailbox` with the given flags.
    pub fn append(
        &mut self,
        mailbox: &str,
        flags: &str,
        message: &[u8],
    ) -> Result<Response, MailboxError> {
        self.command_with_literal(&format!("APPEND {} ({flags})", quote(mailbox)), message)
    }

    /// Send `prefix` followed by a synchronizing `{N}` literal.
    ///
    /// Waits for the `+` continuation before sending the literal bytes.
    pub fn command_with_literal(
        &mut self,
        prefix: &str,
        literal: &[u8],
    ) -> Result<Response, MailboxError> {
        let tag = self.next_tag();
        let command = format!("{prefix} {{{}}}", literal.len());
        self.send(format!("{tag} {command}\r\n").as_bytes())?;

        loop {
            let line = self.read_line()?;
            if line.text.starts_with('+') {
                break;
            }
            if let Some(rest) = strip_tag(&line.text, &tag) {
                return Err(MailboxError::Command {
                    command: command_name(&command),
                    response: rest.to_string(),
                });
            }
        }

        self.send(literal)?;
        self.send(b"\r\n")?;
        self.read_response(&tag, &command)
    }

    pub fn logout(&mut self) {
        if let Err(e) = self.command("LOGOUT") {
            tracing::debug!("IMAP logout failed: {e}");
        }
    }

    #[cfg(test)]
    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), MailboxError> {
        let stream = self.stream.get_mut();
        stream.write_all(bytes)?;
        stream.flush()?;
        Ok(())
    }

    fn read_response(&mut self, tag: &str, command: &str) -> Result<Response, MailboxError> {
        let mut untagged = Vec::new();
        loop {
            let line = self.read_line()?;
            if let Some(rest) = strip_tag(&line.text, tag) {
                if rest.starts_with("OK") {
                    return Ok(Response {
                        untagged,
                        status: rest.to_string(),
                    });
                }
                return Err(MailboxError::Command {
                    command: command_name(command),
                    response: rest.to_string(),
                });
            }
            untagged.push(line);
        }
    }

    fn read_line(&mut self) -> Result<ResponseLine, MailboxError> {
        let mut line = ResponseLine::default();
        loop {
            let mut buf = Vec::new();
            if self.stream.read_until(b'\n', &mut buf)? == 0 {
                return Err(MailboxError::Protocol("IMAP connection closed".into()));
            }
            let segment = String::from_utf8_lossy(&buf);
            let segment = segment.trim_end_matches(['\r', '\n']);
            line.text.push_str(segment);

            match literal_length(segment) {
                Some(len) => {
                    let mut literal = vec![0u8; len];
                    self.stream.read_exact(&mut literal)?;
                    line.literals.push(literal);
                }
                None => return Ok(line),
            }
        }
    }
}

/// Open a TLS connection, read the greeting and log in.
pub(crate) fn connect(config: &ImapConfig) -> Result<ImapSession<TlsStream>, MailboxError> {
    let tcp = TcpStream::connect((config.host.as_str(), config.port))?;
    tcp.set_read_timeout(Some(READ_TIMEOUT))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| MailboxError::Tls(format!("Invalid server name {}: {e}", config.host)))?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| MailboxError::Tls(e.to_string()))?;

    let mut session = ImapSession::new(rustls::StreamOwned::new(conn, tcp));
    session.read_greeting()?;
    session.login(&config.username, config.password.expose_secret())?;
    tracing::debug!(host = %config.host, "IMAP session established");
    Ok(session)
}

fn strip_tag<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    text.strip_prefix(tag)?.strip_prefix(' ')
}

fn literal_length(segment: &str) -> Option<usize> {
    let rest = segment.strip_suffix('}')?;
    let open = rest.rfind('{')?;
    rest[open + 1..].trim_end_matches('+').parse().ok()
}

/// Command name for error messages, never including arguments.
fn command_name(command: &str) -> String {
    let mut words = command.split_whitespace();
    match words.next() {
        Some("UID") => format!("UID {}", words.next().unwrap_or_default()),
        Some(word) => word.to_string(),
        None => String::new(),
    }
}

/// IMAP quoted string.
pub(crate) fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Comma-joined UID set.
pub(crate) fn uid_set(uids: &[u32]) -> String {
    uids.iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

// ── Response parsers ────────────────────────────────────────────────

/// Numbers from `* SEARCH` lines.
pub(crate) fn parse_search(response: &Response) -> Vec<u32> {
    response
        .untagged
        .iter()
        .filter_map(|line| line.text.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().filter_map(|n| n.parse().ok()))
        .collect()
}

pub(crate) fn parse_uid(text: &str) -> Option<u32> {
    UID_RE.captures(text)?.get(1)?.as_str().parse().ok()
}

pub(crate) fn parse_thread_id(text: &str) -> Option<u64> {
    THRID_RE.captures(text)?.get(1)?.as_str().parse().ok()
}

pub(crate) fn parse_append_uid(status: &str) -> Option<u32> {
    APPENDUID_RE.captures(status)?.get(1)?.as_str().parse().ok()
}

/// Label names from an `X-GM-LABELS (...)` item.
pub(crate) fn parse_labels(text: &str) -> Vec<String> {
    const ITEM: &str = "X-GM-LABELS (";
    let Some(start) = text.find(ITEM).map(|i| i + ITEM.len()) else {
        return Vec::new();
    };
    let inner = &text[start..];
    let end = closing_paren(inner).unwrap_or(inner.len());
    atoms(&inner[..end])
}

/// Mailbox names from `* LIST` lines.
pub(crate) fn parse_list(response: &Response) -> Vec<String> {
    response
        .untagged
        .iter()
        .filter(|line| line.text.starts_with("* LIST"))
        .filter_map(|line| match line.literals.last() {
            Some(literal) => Some(String::from_utf8_lossy(literal).into_owned()),
            None => atoms(&line.text).pop(),
        })
        .collect()
}

fn closing_paren(s: &str) -> Option<usize> {
    let mut depth = 0_u32;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Whitespace-separated atoms; quoted strings are unescaped, parenthesized
/// groups are kept whole.
fn atoms(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = s.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '"' => {
                chars.next();
                let mut value = String::new();
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some(next) = chars.next() {
                                value.push(next);
                            }
                        }
                        '"' => break,
                        _ => value.push(c),
                    }
                }
                out.push(value);
            }
            '(' => {
                let mut depth = 0_u32;
                let mut group = String::new();
                for c in chars.by_ref() {
                    group.push(c);
                    match c {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                out.push(group);
            }
            _ => {
                let mut value = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == '"' {
                        break;
                    }
                    value.push(c);
                    chars.next();
                }
                out.push(value);
            }
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    /// Stream replaying canned server output and capturing client writes.
    pub(crate) struct ScriptedStream {
        input: Cursor<Vec<u8>>,
        pub output: Vec<u8>,
    }

    impl ScriptedStream {
        pub fn new(script: &[u8]) -> Self {
            Self {
                input: Cursor::new(script.to_vec()),
                output: Vec::new(),
            }
        }

        pub fn written(&self) -> String {
            String::from_utf8_lossy(&self.output).into_owned()
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn session(script: &str) -> ImapSession<ScriptedStream> {
        ImapSession::new(ScriptedStream::new(script.as_bytes()))
    }

    #[test]
    fn command_collects_untagged_lines() {
        let mut s = session("* SEARCH 4 8 15\r\nA1 OK SEARCH completed\r\n");
        let resp = s.command("UID SEARCH ALL").unwrap();
        assert_eq!(parse_search(&resp), vec![4, 8, 15]);
        assert_eq!(resp.status, "OK SEARCH completed");
        assert_eq!(s.get_ref().written(), "A1 UID SEARCH ALL\r\n");
    }

    #[test]
    fn failed_command_hides_arguments() {
        let mut s = session("A1 NO [AUTHENTICATIONFAILED] Invalid credentials\r\n");
        let err = s.login("me@example.com", "hunter2").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("LOGIN"));
        assert!(!msg.contains("hunter2"));
    }

    #[test]
    fn literals_are_read_verbatim() {
        let body = "Subject: Hi\r\n\r\nBody {3}\r\n";
        let script = format!(
            "* 1 FETCH (UID 7 BODY[] {{{}}}\r\n{body})\r\nA1 OK done\r\n",
            body.len()
        );
        let mut s = session(&script);
        let resp = s.command("UID FETCH 7 (UID BODY.PEEK[])").unwrap();

        assert_eq!(resp.untagged.len(), 1);
        let line = &resp.untagged[0];
        assert_eq!(parse_uid(&line.text), Some(7));
        assert_eq!(line.literals, vec![body.as_bytes().to_vec()]);
        assert!(line.text.ends_with(')'));
    }

    #[test]
    fn append_waits_for_continuation() {
        let mut s = session("+ go ahead\r\nA1 OK [APPENDUID 3 42] APPEND completed\r\n");
        let resp = s.append("[Gmail]/Drafts", "\\Draft", b"Subject: x\r\n\r\nhi").unwrap();

        assert_eq!(parse_append_uid(&resp.status), Some(42));
        let written = s.get_ref().written();
        assert!(written.starts_with("A1 APPEND \"[Gmail]/Drafts\" (\\Draft) {16}\r\n"));
        assert!(written.ends_with("Subject: x\r\n\r\nhi\r\n"));
    }

    #[test]
    fn literal_rejected_before_continuation() {
        let mut s = session("A1 BAD [CLIENTBUG] Invalid arguments\r\n");
        let err = s
            .command_with_literal("UID SEARCH CHARSET UTF-8 X-GM-RAW", "réunion".as_bytes())
            .unwrap_err();

        assert!(matches!(err, MailboxError::Command { ref command, .. } if command == "UID SEARCH"));
        assert!(!s.get_ref().written().contains("réunion"));
    }

    #[test]
    fn greeting_must_be_ok() {
        assert!(session("* OK Gimap ready\r\n").read_greeting().is_ok());
        assert!(session("* BYE go away\r\n").read_greeting().is_err());
        assert!(session("").read_greeting().is_err());
    }

    #[test]
    fn parses_gmail_fetch_items() {
        let text = r#"* 3 FETCH (X-GM-THRID 1789 X-GM-LABELS ("\\Inbox" AI/replied "Needs Reply") UID 55)"#;
        assert_eq!(parse_thread_id(text), Some(1789));
        assert_eq!(parse_uid(text), Some(55));
        assert_eq!(
            parse_labels(text),
            vec!["\\Inbox", "AI/replied", "Needs Reply"]
        );
        assert!(parse_labels("* 3 FETCH (UID 55)").is_empty());
    }

    #[test]
    fn parses_list_names() {
        let resp = Response {
            untagged: vec![
                ResponseLine {
                    text: r#"* LIST (\HasNoChildren) "/" "INBOX""#.into(),
                    literals: vec![],
                },
                ResponseLine {
                    text: r#"* LIST (\HasNoChildren) "/" "AI/no reply""#.into(),
                    literals: vec![],
                },
                ResponseLine {
                    text: r#"* LIST (\HasNoChildren) "/" Plain"#.into(),
                    literals: vec![],
                },
            ],
            status: "OK".into(),
        };
        assert_eq!(parse_list(&resp), vec!["INBOX", "AI/no reply", "Plain"]);
    }

    #[test]
    fn quoting_escapes_specials() {
        assert_eq!(quote(r#"from:"x" \y"#), r#""from:\"x\" \\y""#);
        assert_eq!(uid_set(&[1, 5, 9]), "1,5,9");
    }
}
