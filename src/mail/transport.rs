use crate::mail::error::TransportError;
use crate::mail::request::ConnectionRequest;
use crate::mail::RawMessage;

/// One authenticated connection to a remote mail store.
///
/// Calls block; the server runs them on tokio's blocking pool.
pub trait MailTransport {
    /// Opens `mailbox` read-only so that nothing is flagged on the server.
    fn lock_mailbox(&mut self, mailbox: &str) -> Result<(), TransportError>;
    fn release_mailbox(&mut self) -> Result<(), TransportError>;
    /// UIDs of the messages without `\Seen` in the locked mailbox.
    fn search_unseen(&mut self) -> Result<Vec<u32>, TransportError>;
    fn fetch_message(&mut self, uid: u32) -> Result<RawMessage, TransportError>;
    fn logout(&mut self) -> Result<(), TransportError>;
}

/// Opens transports. Shared across requests, so it holds no per-request state.
pub trait Connector: Send + Sync + 'static {
    type Transport: MailTransport;

    fn connect(&self, request: &ConnectionRequest) -> Result<Self::Transport, TransportError>;
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Condvar, Mutex};

    #[derive(Default, Debug)]
    pub struct Counters {
        pub connects: AtomicUsize,
        pub locks: AtomicUsize,
        pub releases: AtomicUsize,
        pub logouts: AtomicUsize,
        pub fetches: AtomicUsize,
    }

    impl Counters {
        pub fn get(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }
    }

    /// Holds every fetch until opened.
    #[derive(Default, Debug)]
    pub struct Gate {
        open: Mutex<bool>,
        cv: Condvar,
        pub entered: AtomicUsize,
    }

    impl Gate {
        pub fn open(&self) {
            *self.open.lock().unwrap() = true;
            self.cv.notify_all();
        }

        fn pass(&self) {
            self.entered.fetch_add(1, Ordering::SeqCst);
            let mut open = self.open.lock().unwrap();
            while !*open {
                open = self.cv.wait(open).unwrap();
            }
        }
    }

    /// In-memory mailbox. Messages are keyed by UID; those in `seen` carry
    /// the `\Seen` flag and are left out of searches.
    #[derive(Clone, Default)]
    pub struct MockConnector {
        pub messages: Vec<RawMessage>,
        pub seen: HashSet<u32>,
        pub connect_error: Option<String>,
        pub lock_error: Option<String>,
        pub release_error: Option<String>,
        pub logout_error: Option<String>,
        pub search_error: Option<String>,
        pub fail_fetch_of: HashSet<u32>,
        /// Error text for the UIDs in `fail_fetch_of`.
        pub fetch_error: Option<String>,
        pub fetch_gate: Option<Arc<Gate>>,
        pub counters: Arc<Counters>,
    }

    impl MockConnector {
        pub fn with_messages(messages: Vec<RawMessage>) -> Self {
            Self { messages, ..Default::default() }
        }
    }

    pub struct MockTransport {
        mailbox: MockConnector,
        locked: bool,
    }

    impl Connector for MockConnector {
        type Transport = MockTransport;

        fn connect(&self, _request: &ConnectionRequest) -> Result<MockTransport, TransportError> {
            self.counters.connects.fetch_add(1, Ordering::SeqCst);
            if let Some(e) = &self.connect_error {
                return Err(TransportError::new(e.clone()));
            }
            Ok(MockTransport { mailbox: self.clone(), locked: false })
        }
    }

    impl MailTransport for MockTransport {
        fn lock_mailbox(&mut self, _mailbox: &str) -> Result<(), TransportError> {
            assert!(!self.locked, "mailbox locked twice in one session");
            if let Some(e) = &self.mailbox.lock_error {
                return Err(TransportError::new(e.clone()));
            }
            self.mailbox.counters.locks.fetch_add(1, Ordering::SeqCst);
            self.locked = true;
            Ok(())
        }

        fn release_mailbox(&mut self) -> Result<(), TransportError> {
            assert!(self.locked, "release without lock");
            self.mailbox.counters.releases.fetch_add(1, Ordering::SeqCst);
            self.locked = false;
            match &self.mailbox.release_error {
                Some(e) => Err(TransportError::new(e.clone())),
                None => Ok(()),
            }
        }

        fn search_unseen(&mut self) -> Result<Vec<u32>, TransportError> {
            assert!(self.locked, "search outside of a mailbox lock");
            if let Some(e) = &self.mailbox.search_error {
                return Err(TransportError::new(e.clone()));
            }
            let seen = &self.mailbox.seen;
            Ok(self
                .mailbox
                .messages
                .iter()
                .filter_map(|m| m.uid)
                .filter(|uid| !seen.contains(uid))
                .collect())
        }

        fn fetch_message(&mut self, uid: u32) -> Result<RawMessage, TransportError> {
            assert!(self.locked, "fetch outside of a mailbox lock");
            assert!(!self.mailbox.seen.contains(&uid), "fetched seen message {uid}");
            self.mailbox.counters.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.mailbox.fetch_gate {
                gate.pass();
            }
            if self.mailbox.fail_fetch_of.contains(&uid) {
                let e = self.mailbox.fetch_error.as_deref().unwrap_or("connection reset by peer");
                return Err(TransportError::new(e));
            }
            self.mailbox
                .messages
                .iter()
                .find(|m| m.uid == Some(uid))
                .cloned()
                .ok_or_else(|| TransportError::new(format!("no message with uid {uid}")))
        }

        fn logout(&mut self) -> Result<(), TransportError> {
            self.mailbox.counters.logouts.fetch_add(1, Ordering::SeqCst);
            match &self.mailbox.logout_error {
                Some(e) => Err(TransportError::new(e.clone())),
                None => Ok(()),
            }
        }
    }

    /// A plain message with a `Date:` `day` days after 2024-01-01.
    pub fn message(uid: u32, day: u32, subject: &str) -> RawMessage {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .checked_add_days(chrono::Days::new(day as u64))
            .unwrap()
            .format("%a, %d %b %Y 10:00:00 +0000");
        let source = format!(
            "From: Sender {uid} <sender{uid}@example.org>\r\n\
             To: me@example.org\r\n\
             Subject: {subject}\r\n\
             Date: {date}\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\
             \r\n\
             Body of message {uid}.\r\n"
        );
        RawMessage { uid: Some(uid), source: Some(source.into_bytes()) }
    }
}
