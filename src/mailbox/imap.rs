//! Minimal IMAP4rev1 client over implicit TLS (blocking).
//!
//! Covers exactly what a triage run needs: LOGIN, SELECT, SEARCH SINCE,
//! FETCH RFC822, NOOP and LOGOUT. Run inside `spawn_blocking`.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use rustls_pki_types::ServerName;
use tracing::debug;

use crate::config::MailConfig;
use crate::error::MailError;
use crate::mailbox::connection::{Connector, MailConnection, RawMessage};

/// Largest literal accepted from the server (one RFC822 message).
pub const MAX_LITERAL_BYTES: usize = 50 * 1024 * 1024;

/// TLS stream used for real connections.
pub type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

// ── Connector ───────────────────────────────────────────────────────

/// Opens TLS connections to a fixed IMAP endpoint.
#[derive(Debug, Clone)]
pub struct ImapConnector {
    host: String,
    port: u16,
    timeout: Duration,
}

impl ImapConnector {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    pub fn from_config(config: &MailConfig) -> Self {
        Self::new(config.imap_host.clone(), config.imap_port, config.timeout)
    }

    fn tls_config() -> Result<Arc<rustls::ClientConfig>, MailError> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(root_store)
        .with_no_client_auth();

        Ok(Arc::new(config))
    }
}

impl Connector for ImapConnector {
    type Conn = ImapConnection<TlsStream>;

    fn open(&self) -> Result<Self::Conn, MailError> {
        debug!(host = %self.host, port = self.port, "Opening IMAP connection");

        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| MailError::Network(format!("{} did not resolve", self.host)))?;

        let tcp = TcpStream::connect_timeout(&addr, self.timeout)?;
        tcp.set_read_timeout(Some(self.timeout))?;
        tcp.set_write_timeout(Some(self.timeout))?;

        let server_name = ServerName::try_from(self.host.clone())
            .map_err(|e| MailError::Network(format!("invalid server name {}: {e}", self.host)))?;
        let conn = rustls::ClientConnection::new(Self::tls_config()?, server_name)?;

        ImapConnection::handshake(rustls::StreamOwned::new(conn, tcp))
    }
}

// ── Protocol engine ─────────────────────────────────────────────────

/// Completion status of a tagged command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    No,
    Bad,
}

/// One untagged response, with any literals it carried.
#[derive(Debug, Clone, Default)]
pub struct Untagged {
    /// Line text without the `* ` prefix, continuation lines appended.
    pub text: String,
    pub literals: Vec<Vec<u8>>,
}

/// Everything the server sent for one command.
#[derive(Debug, Clone)]
pub struct Response {
    pub untagged: Vec<Untagged>,
    pub status: Status,
    /// Human-readable text after the status word.
    pub text: String,
}

/// An IMAP connection over any byte stream.
pub struct ImapConnection<S: Read + Write> {
    stream: BufReader<S>,
    next_tag: u32,
}

impl<S: Read + Write> ImapConnection<S> {
    /// Wrap a stream and consume the server greeting.
    pub fn handshake(stream: S) -> Result<Self, MailError> {
        let mut conn = Self {
            stream: BufReader::new(stream),
            next_tag: 1,
        };
        let greeting = conn.read_line()?;
        if !(greeting.starts_with("* OK") || greeting.starts_with("* PREAUTH")) {
            return Err(MailError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.trim_end()
            )));
        }
        Ok(conn)
    }

    /// Give back the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    fn read_line(&mut self) -> Result<String, MailError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(MailError::Network("IMAP connection closed".into()));
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    fn read_literal(&mut self, len: usize) -> Result<Vec<u8>, MailError> {
        if len > MAX_LITERAL_BYTES {
            return Err(MailError::Protocol(format!(
                "literal of {len} bytes exceeds {MAX_LITERAL_BYTES}"
            )));
        }
        let mut buf = vec![0u8; len];
        self.stream.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Send one command and collect its full response.
    pub fn command(&mut self, cmd: &str) -> Result<Response, MailError> {
        let tag = format!("A{:04}", self.next_tag);
        self.next_tag += 1;

        let writer = self.stream.get_mut();
        writer.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        writer.flush()?;

        let verb = cmd.split_whitespace().next().unwrap_or_default().to_ascii_uppercase();
        let mut untagged = Vec::new();

        loop {
            let line = self.read_line()?;

            if let Some(rest) = line.strip_prefix(&format!("{tag} ")) {
                let (status, text) = parse_status(rest)?;
                return Ok(Response {
                    untagged,
                    status,
                    text,
                });
            }

            if let Some(rest) = line.strip_prefix("* ") {
                let mut item = Untagged::default();
                let mut current = rest.to_string();
                while let Some(len) = literal_len(&current) {
                    item.text.push_str(current.trim_end());
                    item.literals.push(self.read_literal(len)?);
                    current = self.read_line()?;
                }
                item.text.push_str(current.trim_end());

                if verb != "LOGOUT" && item.text.starts_with("BYE") {
                    return Err(MailError::Protocol(format!("server closed: {}", item.text)));
                }
                untagged.push(item);
                continue;
            }

            return Err(MailError::Protocol(format!(
                "unexpected line: {}",
                line.trim_end()
            )));
        }
    }

    fn expect_ok(&mut self, cmd: &str, verb: &str) -> Result<Response, MailError> {
        let response = self.command(cmd)?;
        if response.status == Status::Ok {
            Ok(response)
        } else {
            Err(MailError::Rejected {
                command: verb.to_string(),
                reason: response.text,
            })
        }
    }
}

impl<S: Read + Write + Send> MailConnection for ImapConnection<S> {
    fn login(&mut self, user: &str, secret: &str) -> Result<(), MailError> {
        let response = self.command(&format!("LOGIN {} {}", quote(user), quote(secret)))?;
        match response.status {
            Status::Ok => Ok(()),
            _ => Err(MailError::Auth(response.text)),
        }
    }

    fn select(&mut self, folder: &str) -> Result<(), MailError> {
        self.expect_ok(&format!("SELECT {}", quote(folder)), "SELECT")?;
        Ok(())
    }

    fn search_since(&mut self, since: &str) -> Result<Vec<String>, MailError> {
        let response = self.expect_ok(&format!("SEARCH SINCE {since}"), "SEARCH")?;
        Ok(response
            .untagged
            .iter()
            .filter_map(|u| search_ids(&u.text))
            .flatten()
            .collect())
    }

    fn fetch(&mut self, id: &str) -> Result<RawMessage, MailError> {
        let response = self.expect_ok(&format!("FETCH {id} RFC822"), "FETCH")?;
        let payload = response
            .untagged
            .into_iter()
            .filter(|u| u.text.contains("FETCH"))
            .find_map(|u| u.literals.into_iter().next())
            .ok_or_else(|| MailError::Rejected {
                command: "FETCH".into(),
                reason: format!("no RFC822 body returned for {id}"),
            })?;
        Ok(RawMessage {
            id: id.to_string(),
            payload,
        })
    }

    fn noop(&mut self) -> Result<(), MailError> {
        self.expect_ok("NOOP", "NOOP")?;
        Ok(())
    }

    fn logout(&mut self) -> Result<(), MailError> {
        self.command("LOGOUT")?;
        Ok(())
    }
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Quote a string argument.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

/// Length of a literal announced at the end of a line (`... {123}\r\n`).
pub fn literal_len(line: &str) -> Option<usize> {
    let trimmed = line.trim_end_matches(['\r', '\n']);
    let body = trimmed.strip_suffix('}')?;
    let open = body.rfind('{')?;
    body[open + 1..].trim_end_matches('+').parse().ok()
}

/// Parse the part of a tagged line after the tag.
pub fn parse_status(rest: &str) -> Result<(Status, String), MailError> {
    let rest = rest.trim_end();
    let (word, text) = rest.split_once(' ').unwrap_or((rest, ""));
    let status = match word.to_ascii_uppercase().as_str() {
        "OK" => Status::Ok,
        "NO" => Status::No,
        "BAD" => Status::Bad,
        other => {
            return Err(MailError::Protocol(format!("unknown status {other}")));
        }
    };
    Ok((status, text.to_string()))
}

/// Identifiers from an untagged `SEARCH` line, if it is one.
pub fn search_ids(text: &str) -> Option<Vec<String>> {
    let mut parts = text.split_whitespace();
    if !parts.next()?.eq_ignore_ascii_case("SEARCH") {
        return None;
    }
    Some(
        parts
            .filter(|p| p.bytes().all(|b| b.is_ascii_digit()))
            .map(str::to_string)
            .collect(),
    )
}
