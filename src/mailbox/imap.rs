//! Raw IMAP over TLS, just enough protocol for the reply mailbox.
//!
//! Each call opens a fresh session: connect, login, select, one command,
//! logout. Sessions are blocking and run on the blocking pool via
//! `spawn_blocking`. Progress is tracked by the store checkpoint, not by
//! `\Seen` flags, so re-reading a message is always safe and UIDs are used
//! throughout (they survive reconnects; sequence numbers do not).

use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mail_parser::MessageParser;

use crate::config::MailboxConfig;
use crate::error::MailboxError;
use crate::mailbox::{FetchedMessage, Mailbox};

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// IMAP mailbox over TLS.
pub struct ImapMailbox {
    config: MailboxConfig,
}

impl ImapMailbox {
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn search_after(&self, id: u32) -> Result<Vec<u32>, MailboxError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || search_after_blocking(&config, id))
            .await
            .map_err(|e| MailboxError::Search(format!("search task panicked: {e}")))?
    }

    async fn fetch(&self, uid: u32) -> Result<FetchedMessage, MailboxError> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || fetch_blocking(&config, uid))
            .await
            .map_err(|e| MailboxError::Fetch {
                uid,
                reason: format!("fetch task panicked: {e}"),
            })?
    }
}

// ── IMAP session ────────────────────────────────────────────────────

/// One logged-in IMAP session with the reply folder selected.
struct Session {
    tls: TlsStream,
    tag: u32,
}

impl Session {
    fn open(config: &MailboxConfig) -> Result<Self, MailboxError> {
        let tcp = TcpStream::connect((&*config.host, config.port))
            .map_err(|e| MailboxError::Connect(format!("tcp connect: {e}")))?;
        tcp.set_read_timeout(Some(Duration::from_secs(30)))
            .map_err(|e| MailboxError::Connect(format!("read timeout: {e}")))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name: rustls::pki_types::ServerName<'_> =
            rustls::pki_types::ServerName::try_from(config.host.clone())
                .map_err(|e| MailboxError::Connect(format!("server name: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailboxError::Connect(format!("tls handshake: {e}")))?;
        let tls = rustls::StreamOwned::new(conn, tcp);

        let mut session = Self { tls, tag: 0 };

        // Server greeting
        session.read_line()?;

        let login = session.send_cmd(&format!(
            "LOGIN \"{}\" \"{}\"",
            config.username, config.password
        ))?;
        if !login.last().is_some_and(|l| l.contains("OK")) {
            return Err(MailboxError::Connect("IMAP login rejected".into()));
        }

        let select = session.send_cmd(&format!("SELECT \"{}\"", config.folder))?;
        if !select.last().is_some_and(|l| l.contains("OK")) {
            return Err(MailboxError::Connect(format!(
                "could not select folder {}",
                config.folder
            )));
        }

        Ok(session)
    }

    /// Read one CRLF-terminated line, byte at a time.
    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match std::io::Read::read(&mut self.tls, &mut byte) {
                Ok(0) => return Err(MailboxError::Connect("IMAP connection closed".into())),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
                Err(e) => return Err(MailboxError::Connect(format!("IMAP read: {e}"))),
            }
        }
    }

    /// Send one command and collect response lines through the tagged
    /// completion line.
    fn send_cmd(&mut self, cmd: &str) -> Result<Vec<String>, MailboxError> {
        self.tag += 1;
        let tag = format!("A{}", self.tag);
        let full = format!("{tag} {cmd}\r\n");
        IoWrite::write_all(&mut self.tls, full.as_bytes())
            .map_err(|e| MailboxError::Connect(format!("IMAP write: {e}")))?;
        IoWrite::flush(&mut self.tls)
            .map_err(|e| MailboxError::Connect(format!("IMAP flush: {e}")))?;

        let mut lines = Vec::new();
        loop {
            let line = self.read_line()?;
            let done = line.starts_with(&tag);
            lines.push(line);
            if done {
                return Ok(lines);
            }
        }
    }

    fn logout(mut self) {
        let _ = self.send_cmd("LOGOUT");
    }
}

// ── Blocking operations ─────────────────────────────────────────────

fn search_after_blocking(config: &MailboxConfig, id: u32) -> Result<Vec<u32>, MailboxError> {
    let mut session = Session::open(config)?;

    // "UID SEARCH UID n:*" still returns the last message when n is past
    // the end of the mailbox, so the floor is enforced again on the
    // parsed ids.
    let floor = id.saturating_add(1);
    let resp = session.send_cmd(&format!("UID SEARCH UID {floor}:*"))?;
    if !resp.last().is_some_and(|l| l.contains("OK")) {
        return Err(MailboxError::Search(format!(
            "UID SEARCH rejected: {}",
            resp.last().map(|l| l.trim()).unwrap_or("no response")
        )));
    }

    let mut uids = parse_search_response(&resp);
    uids.retain(|uid| *uid > id);
    uids.sort_unstable();

    session.logout();
    Ok(uids)
}

fn fetch_blocking(config: &MailboxConfig, uid: u32) -> Result<FetchedMessage, MailboxError> {
    let mut session = Session::open(config)?;

    let resp = session.send_cmd(&format!("UID FETCH {uid} (RFC822)"))?;
    if !resp.last().is_some_and(|l| l.contains("OK")) {
        return Err(MailboxError::Fetch {
            uid,
            reason: format!(
                "UID FETCH rejected: {}",
                resp.last().map(|l| l.trim()).unwrap_or("no response")
            ),
        });
    }
    if resp.len() < 3 {
        // Just the tagged OK: the message is gone (expunged between the
        // search and the fetch).
        return Err(MailboxError::Fetch {
            uid,
            reason: "message not in mailbox".into(),
        });
    }

    // First line is the untagged FETCH header, last is the tagged OK; the
    // raw message is everything in between (read_line keeps CRLFs).
    let raw: String = resp
        .iter()
        .skip(1)
        .take(resp.len().saturating_sub(2))
        .cloned()
        .collect();

    let message = parse_message(uid, raw.as_bytes())?;
    session.logout();
    Ok(message)
}

// ── Message parsing ─────────────────────────────────────────────────

/// Parse a raw RFC 822 payload into the fields the pipeline needs.
fn parse_message(uid: u32, raw: &[u8]) -> Result<FetchedMessage, MailboxError> {
    let parsed = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| MailboxError::Parse {
            uid,
            reason: "unparsable RFC 822 payload".into(),
        })?;

    Ok(FetchedMessage {
        uid,
        subject: parsed.subject().unwrap_or("").to_string(),
        body_text: extract_text(&parsed),
        sender_address: extract_sender(&parsed),
    })
}

/// Pull uids out of `* SEARCH 4 5 6` lines.
fn parse_search_response(lines: &[String]) -> Vec<u32> {
    let mut uids = Vec::new();
    for line in lines {
        if line.starts_with("* SEARCH") {
            uids.extend(
                line.split_whitespace()
                    .skip(2)
                    .filter_map(|part| part.parse::<u32>().ok()),
            );
        }
    }
    uids
}

/// Extract the sender address from a parsed email.
fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// Extract readable text from a parsed email.
fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    String::new()
}

/// Strip HTML tags from content (basic).
fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── Search response tests ───────────────────────────────────────

    #[test]
    fn search_lines_yield_uids() {
        let lines = vec![
            "* SEARCH 4 5 12\r\n".to_string(),
            "A2 OK SEARCH completed\r\n".to_string(),
        ];
        assert_eq!(parse_search_response(&lines), vec![4, 5, 12]);
    }

    #[test]
    fn empty_search_yields_nothing() {
        let lines = vec![
            "* SEARCH\r\n".to_string(),
            "A2 OK SEARCH completed\r\n".to_string(),
        ];
        assert!(parse_search_response(&lines).is_empty());
    }

    #[test]
    fn junk_tokens_are_skipped() {
        let lines = vec!["* SEARCH 4 x 9\r\n".to_string()];
        assert_eq!(parse_search_response(&lines), vec![4, 9]);
    }

    // ── Message parsing tests ───────────────────────────────────────

    #[test]
    fn plain_text_reply_parses() {
        let raw = b"From: Acme Supply <sales@acme.test>\r\n\
            Subject: RFP REPLY [RFP ID: 3]\r\n\
            Content-Type: text/plain\r\n\
            \r\n\
            Total $39,000. Delivery in 30 days.\r\n";

        let message = parse_message(7, raw).unwrap();
        assert_eq!(message.uid, 7);
        assert_eq!(message.subject, "RFP REPLY [RFP ID: 3]");
        assert_eq!(message.sender_address, "sales@acme.test");
        assert!(message.body_text.contains("Total $39,000"));
    }

    #[test]
    fn html_only_bodies_are_stripped() {
        let raw = b"From: sales@acme.test\r\n\
            Subject: RFP REPLY\r\n\
            Content-Type: text/html\r\n\
            \r\n\
            <p>Total <b>$5,000</b> for everything</p>\r\n";

        let message = parse_message(1, raw).unwrap();
        assert_eq!(message.body_text, "Total $5,000 for everything");
    }

    #[test]
    fn missing_sender_reads_as_unknown() {
        let raw = b"Subject: RFP REPLY\r\n\r\nhello\r\n";
        let message = parse_message(1, raw).unwrap();
        assert_eq!(message.sender_address, "unknown");
    }

    #[test]
    fn html_stripper_collapses_whitespace() {
        assert_eq!(
            strip_html("<div>Total\n  <b>$5k</b></div>"),
            "Total $5k"
        );
    }
}
