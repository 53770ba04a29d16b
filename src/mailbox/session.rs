//! Mailbox session: one authenticated connection plus the means to rebuild it.
//!
//! State machine:
//!
//! ```text
//! Disconnected → Connected → Authenticated ⇄ Stale
//!                                  │           │ reconnect → Authenticated
//!                                  └── close ──┴──────────→ Disconnected
//! ```
//!
//! Any connection-level error from a delegated command moves the session to
//! `Stale`. Commands on a session that is not `Authenticated` fail fast.

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::error::MailError;
use crate::mailbox::connection::{Connector, MailConnection, RawMessage};

/// Lifecycle state of a [`MailboxSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    Authenticated,
    /// Suspected dead; must be re-established before further use.
    Stale,
}

/// Outcome of a keep-alive probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Stale,
}

/// Login credentials kept for reconnects.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub address: String,
    pub secret: SecretString,
}

impl Credentials {
    pub fn new(address: impl Into<String>, secret: SecretString) -> Self {
        Self {
            address: address.into(),
            secret,
        }
    }
}

/// An authenticated mailbox connection that can repair itself.
pub struct MailboxSession<C: Connector> {
    connector: C,
    credentials: Credentials,
    conn: Option<C::Conn>,
    state: ConnectionState,
}

impl<C: Connector> MailboxSession<C> {
    /// Open a connection and authenticate.
    ///
    /// A credential refusal is `MailError::Auth`; everything else that goes
    /// wrong on the way is a network or protocol error.
    pub fn connect(connector: C, credentials: Credentials) -> Result<Self, MailError> {
        let mut session = Self {
            connector,
            credentials,
            conn: None,
            state: ConnectionState::Disconnected,
        };
        session.establish()?;
        info!(address = %session.credentials.address, "Connected to mail server");
        Ok(session)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn establish(&mut self) -> Result<(), MailError> {
        let conn = self.connector.open()?;
        self.conn = Some(conn);
        self.state = ConnectionState::Connected;

        // App passwords are often pasted as "abcd efgh ijkl mnop".
        let secret = strip_whitespace(self.credentials.secret.expose_secret());
        let login = match self.conn.as_mut() {
            Some(conn) => conn.login(&self.credentials.address, &secret),
            None => Err(MailError::InvalidState("connection vanished during login".into())),
        };

        match login {
            Ok(()) => {
                self.state = ConnectionState::Authenticated;
                Ok(())
            }
            Err(e) => {
                if let Some(mut conn) = self.conn.take() {
                    let _ = conn.logout();
                }
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Issue a NOOP. Marks the session `Stale` when it fails.
    pub fn keep_alive(&mut self) -> Liveness {
        match self.with_conn(|c| c.noop()) {
            Ok(()) => Liveness::Alive,
            Err(e) => {
                warn!(error = %e, "Keep-alive failed");
                self.state = ConnectionState::Stale;
                Liveness::Stale
            }
        }
    }

    /// Drop the current connection (best effort) and log in again.
    ///
    /// The selected folder is not restored; callers re-select.
    pub fn reconnect(&mut self) -> Result<(), MailError> {
        info!("Reconnecting to mail server");
        self.close();
        self.establish()
    }

    /// Best-effort LOGOUT. Never fails.
    pub fn close(&mut self) {
        if let Some(mut conn) = self.conn.take()
            && let Err(e) = conn.logout()
        {
            debug!(error = %e, "Logout failed (ignored)");
        }
        self.state = ConnectionState::Disconnected;
    }

    pub fn select(&mut self, folder: &str) -> Result<(), MailError> {
        self.with_conn(|c| c.select(folder))
    }

    pub fn search_since(&mut self, since: &str) -> Result<Vec<String>, MailError> {
        self.with_conn(|c| c.search_since(since))
    }

    pub fn fetch(&mut self, id: &str) -> Result<RawMessage, MailError> {
        self.with_conn(|c| c.fetch(id))
    }

    /// Run a command on an authenticated connection, tracking staleness.
    fn with_conn<T>(
        &mut self,
        op: impl FnOnce(&mut C::Conn) -> Result<T, MailError>,
    ) -> Result<T, MailError> {
        if self.state != ConnectionState::Authenticated {
            return Err(MailError::InvalidState(format!(
                "session is {:?}, not Authenticated",
                self.state
            )));
        }
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| MailError::InvalidState("no open connection".into()))?;

        let result = op(conn);
        if let Err(ref e) = result
            && e.is_connection_error()
        {
            self.state = ConnectionState::Stale;
        }
        result
    }
}

fn strip_whitespace(secret: &str) -> String {
    secret.chars().filter(|c| !c.is_whitespace()).collect()
}
