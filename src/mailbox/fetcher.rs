//! Recent-message retrieval with reconnect-and-continue.
//!
//! Select → SEARCH SINCE → newest first → fetch + decode one at a time.
//! A dead connection is repaired in place and the walk resumes at the next
//! identifier; if the repair fails the messages gathered so far are returned.

use chrono::{Days, Local, NaiveDate};
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_FOLDER, DEFAULT_MAX_MESSAGES, DEFAULT_SINCE_DAYS, MailConfig};
use crate::error::MailError;
use crate::mailbox::connection::Connector;
use crate::mailbox::decode::normalize;
use crate::mailbox::session::{Liveness, MailboxSession};
use crate::pipeline::types::NormalizedMessage;

/// A NOOP is sent before every Nth fetch (counting from the first).
pub const KEEP_ALIVE_EVERY: usize = 10;

/// IMAP SEARCH date format, e.g. `12-Oct-2026`.
const SEARCH_DATE_FORMAT: &str = "%d-%b-%Y";

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub folder: String,
    pub since_days: u32,
    pub max_messages: usize,
}

impl FetchOptions {
    pub fn from_config(config: &MailConfig) -> Self {
        Self {
            folder: config.folder.clone(),
            since_days: config.since_days,
            max_messages: config.max_messages,
        }
    }
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            folder: DEFAULT_FOLDER.to_string(),
            since_days: DEFAULT_SINCE_DAYS,
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }
}

/// Where the fetch loop stands between identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchState {
    /// Connection believed healthy.
    Running,
    /// Connection lost; repair before the next identifier.
    Repairing,
    /// Repair failed; stop and return what we have.
    Exhausted,
}

pub struct MessageFetcher {
    options: FetchOptions,
}

impl MessageFetcher {
    pub fn new(options: FetchOptions) -> Self {
        Self { options }
    }

    /// Fetch messages received within the window ending today (local time).
    pub fn fetch<C: Connector>(&self, session: &mut MailboxSession<C>) -> Vec<NormalizedMessage> {
        self.fetch_on(session, Local::now().date_naive())
    }

    /// Same as [`fetch`](Self::fetch) with an explicit "today".
    ///
    /// Never fails: select or search failure yields an empty list, and
    /// per-message problems only shrink the result.
    pub fn fetch_on<C: Connector>(
        &self,
        session: &mut MailboxSession<C>,
        today: NaiveDate,
    ) -> Vec<NormalizedMessage> {
        let since = since_boundary(today, self.options.since_days);
        let ids = match self.list_recent(session, &since) {
            Ok(ids) => ids,
            Err(e) => {
                warn!(folder = %self.options.folder, error = %e, "Could not list messages");
                return Vec::new();
            }
        };

        info!(count = ids.len(), since = %since, "Fetching messages");

        let mut messages = Vec::with_capacity(ids.len());
        let mut state = FetchState::Running;

        for (i, id) in ids.iter().enumerate() {
            if state == FetchState::Running
                && i % KEEP_ALIVE_EVERY == 0
                && session.keep_alive() == Liveness::Stale
            {
                state = FetchState::Repairing;
            }
            if state == FetchState::Repairing {
                state = self.repair(session);
            }
            if state == FetchState::Exhausted {
                warn!(
                    gathered = messages.len(),
                    remaining = ids.len() - i,
                    "Stopping fetch after failed reconnect"
                );
                break;
            }

            match session.fetch(id).and_then(|raw| normalize(&raw)) {
                Ok(message) => {
                    debug!(id = %id, subject = %message.subject, "Fetched message");
                    messages.push(message);
                }
                Err(e) if e.is_connection_error() => {
                    warn!(id = %id, error = %e, "Connection lost during fetch, skipping message");
                    state = FetchState::Repairing;
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "Skipping message");
                }
            }
        }

        messages
    }

    /// Select the folder and return up to `max_messages` identifiers, newest first.
    fn list_recent<C: Connector>(
        &self,
        session: &mut MailboxSession<C>,
        since: &str,
    ) -> Result<Vec<String>, MailError> {
        session.select(&self.options.folder)?;
        let mut ids = session.search_since(since)?;
        ids.reverse();
        ids.truncate(self.options.max_messages);
        Ok(ids)
    }

    fn repair<C: Connector>(&self, session: &mut MailboxSession<C>) -> FetchState {
        match session
            .reconnect()
            .and_then(|()| session.select(&self.options.folder))
        {
            Ok(()) => FetchState::Running,
            Err(e) => {
                warn!(error = %e, "Reconnect failed");
                FetchState::Exhausted
            }
        }
    }
}

/// `today - days`, formatted for IMAP SEARCH.
pub fn since_boundary(today: NaiveDate, days: u32) -> String {
    today
        .checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(NaiveDate::MIN)
        .format(SEARCH_DATE_FORMAT)
        .to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    use secrecy::SecretString;

    use super::*;
    use crate::mailbox::connection::{MailConnection, RawMessage};
    use crate::mailbox::session::Credentials;

    /// Scripted server: ids `1..=count`, oldest first.
    #[derive(Default)]
    struct Server {
        count: usize,
        opens: usize,
        noops: usize,
        searches: Vec<String>,
        selects: usize,
        /// 1-based NOOP call that fails.
        fail_noop_call: Option<usize>,
        fail_reopen: bool,
        fail_search: bool,
        rejected: HashSet<String>,
        /// Fetch of this id drops the connection (once).
        drop_on: Option<String>,
    }

    struct ScriptConnector(Arc<Mutex<Server>>);
    struct ScriptConn(Arc<Mutex<Server>>);

    impl Connector for ScriptConnector {
        type Conn = ScriptConn;

        fn open(&self) -> Result<ScriptConn, MailError> {
            let mut s = self.0.lock().unwrap();
            if s.opens > 0 && s.fail_reopen {
                return Err(MailError::Network("connection refused".into()));
            }
            s.opens += 1;
            Ok(ScriptConn(Arc::clone(&self.0)))
        }
    }

    impl MailConnection for ScriptConn {
        fn login(&mut self, _user: &str, _secret: &str) -> Result<(), MailError> {
            Ok(())
        }

        fn select(&mut self, _folder: &str) -> Result<(), MailError> {
            self.0.lock().unwrap().selects += 1;
            Ok(())
        }

        fn search_since(&mut self, since: &str) -> Result<Vec<String>, MailError> {
            let mut s = self.0.lock().unwrap();
            s.searches.push(since.to_string());
            if s.fail_search {
                return Err(MailError::Rejected {
                    command: "SEARCH".into(),
                    reason: "bad date".into(),
                });
            }
            Ok((1..=s.count).map(|n| n.to_string()).collect())
        }

        fn fetch(&mut self, id: &str) -> Result<RawMessage, MailError> {
            let mut s = self.0.lock().unwrap();
            if s.drop_on.as_deref() == Some(id) {
                s.drop_on = None;
                return Err(MailError::Network("connection reset".into()));
            }
            if s.rejected.contains(id) {
                return Err(MailError::Rejected {
                    command: "FETCH".into(),
                    reason: "gone".into(),
                });
            }
            Ok(RawMessage {
                id: id.to_string(),
                payload: format!(
                    "From: Sender {id} <s{id}@example.com>\r\n\
                     Subject: Message {id}\r\n\
                     Date: Mon, 12 Oct 2026 09:30:00 +0000\r\n\
                     \r\n\
                     Body of {id}.\r\n"
                )
                .into_bytes(),
            })
        }

        fn noop(&mut self) -> Result<(), MailError> {
            let mut s = self.0.lock().unwrap();
            s.noops += 1;
            if s.fail_noop_call == Some(s.noops) {
                Err(MailError::Network("broken pipe".into()))
            } else {
                Ok(())
            }
        }

        fn logout(&mut self) -> Result<(), MailError> {
            Ok(())
        }
    }

    fn server(count: usize) -> Arc<Mutex<Server>> {
        Arc::new(Mutex::new(Server {
            count,
            ..Server::default()
        }))
    }

    fn session(srv: &Arc<Mutex<Server>>) -> MailboxSession<ScriptConnector> {
        MailboxSession::connect(
            ScriptConnector(Arc::clone(srv)),
            Credentials::new("me@example.com", SecretString::from("secret")),
        )
        .unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn subjects(messages: &[NormalizedMessage]) -> Vec<String> {
        messages.iter().map(|m| m.subject.clone()).collect()
    }

    // ── Boundary tests ──────────────────────────────────────────────

    #[test]
    fn boundary_formats_imap_date() {
        assert_eq!(since_boundary(today(), 7), "12-Oct-2026");
        assert_eq!(since_boundary(today(), 0), "19-Oct-2026");
        let jan = NaiveDate::from_ymd_opt(2026, 1, 3).unwrap();
        assert_eq!(since_boundary(jan, 7), "27-Dec-2025");
    }

    // ── Fetch tests ─────────────────────────────────────────────────

    #[test]
    fn newest_first_and_bounded() {
        let srv = server(40);
        let mut session = session(&srv);
        let fetcher = MessageFetcher::new(FetchOptions::default());

        let messages = fetcher.fetch_on(&mut session, today());

        assert_eq!(messages.len(), 30);
        assert_eq!(messages[0].subject, "Message 40");
        assert_eq!(messages[29].subject, "Message 11");
        assert_eq!(messages[0].sender, "Sender 40");
        assert_eq!(srv.lock().unwrap().searches, vec!["12-Oct-2026".to_string()]);
    }

    #[test]
    fn custom_bound_respected() {
        let srv = server(8);
        let mut session = session(&srv);
        let fetcher = MessageFetcher::new(FetchOptions {
            max_messages: 3,
            ..FetchOptions::default()
        });
        let messages = fetcher.fetch_on(&mut session, today());
        assert_eq!(subjects(&messages), vec!["Message 8", "Message 7", "Message 6"]);
    }

    #[test]
    fn search_failure_yields_empty() {
        let srv = server(5);
        srv.lock().unwrap().fail_search = true;
        let mut session = session(&srv);
        let messages = MessageFetcher::new(FetchOptions::default()).fetch_on(&mut session, today());
        assert!(messages.is_empty());
    }

    #[test]
    fn keep_alive_every_tenth_message() {
        let srv = server(25);
        let mut session = session(&srv);
        MessageFetcher::new(FetchOptions::default()).fetch_on(&mut session, today());
        // Before messages 1, 11 and 21.
        assert_eq!(srv.lock().unwrap().noops, 3);
    }

    #[test]
    fn stale_keep_alive_on_eleventh_reconnects_once_and_continues() {
        let srv = server(15);
        srv.lock().unwrap().fail_noop_call = Some(2);
        let mut session = session(&srv);

        let messages = MessageFetcher::new(FetchOptions::default()).fetch_on(&mut session, today());

        assert_eq!(messages.len(), 15);
        assert_eq!(messages[10].subject, "Message 5");
        let s = srv.lock().unwrap();
        assert_eq!(s.opens, 2);
        // Initial select plus the re-select after reconnect.
        assert_eq!(s.selects, 2);
    }

    #[test]
    fn failed_repair_returns_partial() {
        let srv = server(15);
        {
            let mut s = srv.lock().unwrap();
            s.fail_noop_call = Some(2);
            s.fail_reopen = true;
        }
        let mut session = session(&srv);

        let messages = MessageFetcher::new(FetchOptions::default()).fetch_on(&mut session, today());

        assert_eq!(messages.len(), 10);
        assert_eq!(messages[9].subject, "Message 6");
    }

    #[test]
    fn rejected_fetch_is_skipped() {
        let srv = server(4);
        srv.lock().unwrap().rejected.insert("3".into());
        let mut session = session(&srv);

        let messages = MessageFetcher::new(FetchOptions::default()).fetch_on(&mut session, today());

        assert_eq!(subjects(&messages), vec!["Message 4", "Message 2", "Message 1"]);
        assert_eq!(srv.lock().unwrap().opens, 1);
    }

    #[test]
    fn dropped_connection_skips_and_resumes_at_next() {
        let srv = server(4);
        srv.lock().unwrap().drop_on = Some("3".into());
        let mut session = session(&srv);

        let messages = MessageFetcher::new(FetchOptions::default()).fetch_on(&mut session, today());

        assert_eq!(subjects(&messages), vec!["Message 4", "Message 2", "Message 1"]);
        assert_eq!(srv.lock().unwrap().opens, 2);
    }

    #[test]
    fn dropped_connection_with_failed_repair_returns_partial() {
        let srv = server(4);
        {
            let mut s = srv.lock().unwrap();
            s.drop_on = Some("3".into());
            s.fail_reopen = true;
        }
        let mut session = session(&srv);

        let messages = MessageFetcher::new(FetchOptions::default()).fetch_on(&mut session, today());

        assert_eq!(subjects(&messages), vec!["Message 4"]);
    }
}
