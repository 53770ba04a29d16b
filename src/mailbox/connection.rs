//! Connection abstraction for mail retrieval.
//!
//! `MailboxSession` only talks to these traits, so the reconnect logic can be
//! exercised against scripted servers in tests.

use crate::error::MailError;

/// Server handle for one mail item plus its raw RFC 822 payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Server-side identifier (IMAP sequence number).
    pub id: String,
    pub payload: Vec<u8>,
}

/// One open connection to a mail server.
///
/// Command-level refusals come back as `MailError::Rejected`; anything that
/// leaves the connection unusable is `Network` or `Protocol`.
pub trait MailConnection: Send {
    /// Authenticate. A credential refusal is `MailError::Auth`.
    fn login(&mut self, user: &str, secret: &str) -> Result<(), MailError>;

    /// Select a folder for subsequent search and fetch.
    fn select(&mut self, folder: &str) -> Result<(), MailError>;

    /// Identifiers of messages received on or after `since` (`DD-Mon-YYYY`),
    /// in server order (oldest first).
    fn search_since(&mut self, since: &str) -> Result<Vec<String>, MailError>;

    /// Full message payload for one identifier.
    fn fetch(&mut self, id: &str) -> Result<RawMessage, MailError>;

    /// No-op round trip.
    fn noop(&mut self) -> Result<(), MailError>;

    fn logout(&mut self) -> Result<(), MailError>;
}

/// Opens fresh connections. Called once on connect and again on each reconnect.
pub trait Connector: Send {
    type Conn: MailConnection;

    fn open(&self) -> Result<Self::Conn, MailError>;
}
