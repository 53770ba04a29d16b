//! Mail retrieval: IMAP transport, session lifecycle, fetch loop and decoding.

pub mod connection;
pub mod decode;
pub mod fetcher;
pub mod imap;
pub mod session;

pub use connection::{Connector, MailConnection, RawMessage};
pub use fetcher::{FetchOptions, MessageFetcher};
pub use imap::ImapConnector;
pub use session::{ConnectionState, Credentials, Liveness, MailboxSession};
