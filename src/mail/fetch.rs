use tracing::{debug, warn};

use crate::mail::error::{MailError, TransportError};
use crate::mail::session::MailboxLock;
use crate::mail::transport::MailTransport;
use crate::mail::RawMessage;

/// Lazy stream over the unseen messages of a locked mailbox, newest first.
///
/// Yields at most `limit` items and stops for good after the first
/// transport error. Messages past the limit are never fetched.
pub struct UnseenMessages<'l, 's, T: MailTransport> {
    lock: &'l mut MailboxLock<'s, T>,
    pending: std::vec::IntoIter<u32>,
    remaining: usize,
    failed: bool,
}

impl<'s, T: MailTransport> MailboxLock<'s, T> {
    pub fn unseen(&mut self, limit: usize) -> Result<UnseenMessages<'_, 's, T>, MailError> {
        let mut uids = match self.transport().search_unseen() {
            Ok(uids) => uids,
            Err(e) => {
                let message = self.redact(&e.0);
                warn!(mailbox = %self.mailbox(), error = %message, "unseen search failed");
                return Err(MailError::Unreachable(message));
            }
        };
        // Higher UIDs were delivered later.
        uids.sort_unstable_by(|a, b| b.cmp(a));
        uids.dedup();
        debug!(mailbox = %self.mailbox(), unseen = uids.len(), limit, "unseen search done");

        Ok(UnseenMessages {
            lock: self,
            pending: uids.into_iter(),
            remaining: limit,
            failed: false,
        })
    }
}

impl<'l, 's, T: MailTransport> Iterator for UnseenMessages<'l, 's, T> {
    type Item = Result<RawMessage, TransportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        let uid = self.pending.next()?;
        match self.lock.transport().fetch_message(uid) {
            Ok(raw) => {
                self.remaining -= 1;
                Some(Ok(raw))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(TransportError(self.lock.redact(&e.0))))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.failed {
            return (0, Some(0));
        }
        (0, Some(self.remaining.min(self.pending.len())))
    }
}

impl<'l, 's, T: MailTransport> std::iter::FusedIterator for UnseenMessages<'l, 's, T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::request::ListRequest;
    use crate::mail::secret::Secret;
    use crate::mail::session::Session;
    use crate::mail::transport::mock::{message, Counters, MockConnector};
    use crate::mail::ConnectionRequest;

    fn request() -> ConnectionRequest {
        ListRequest {
            host: Some("h".into()),
            username: Some("u".into()),
            secret: Some(Secret::new("hunter2").into()),
            ..Default::default()
        }
        .validate(500)
        .unwrap()
    }

    fn uids(connector: &MockConnector, limit: usize) -> Vec<Result<Option<u32>, TransportError>> {
        let mut session = Session::open(connector, &request()).unwrap();
        let mut lock = session.lock("INBOX").unwrap();
        let stream = lock.unseen(limit).unwrap();
        stream.map(|r| r.map(|m| m.uid)).collect()
    }

    #[test]
    fn yields_newest_first_and_stops_at_limit() {
        let connector = MockConnector::with_messages((1..=5).map(|i| message(i, i, "m")).collect());
        let got = uids(&connector, 3);
        assert_eq!(got, vec![Ok(Some(5)), Ok(Some(4)), Ok(Some(3))]);
        assert_eq!(Counters::get(&connector.counters.fetches), 3);
    }

    #[test]
    fn exhausted_mailbox_ends_stream() {
        let connector = MockConnector::with_messages(vec![message(7, 1, "only")]);
        assert_eq!(uids(&connector, 10), vec![Ok(Some(7))]);
    }

    #[test]
    fn stream_fuses_after_transport_error() {
        let mut connector = MockConnector::with_messages((1..=5).map(|i| message(i, i, "m")).collect());
        connector.fail_fetch_of.insert(4);
        let got = uids(&connector, 10);
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], Ok(Some(5)));
        assert!(got[1].is_err());
        assert_eq!(Counters::get(&connector.counters.releases), 1);
        assert_eq!(Counters::get(&connector.counters.logouts), 1);
    }

    #[test]
    fn seen_messages_are_never_fetched() {
        let mut connector = MockConnector::with_messages((1..=6).map(|i| message(i, i, "m")).collect());
        connector.seen.extend([6, 4, 1]);
        assert_eq!(uids(&connector, 10), vec![Ok(Some(5)), Ok(Some(3)), Ok(Some(2))]);
        assert_eq!(Counters::get(&connector.counters.fetches), 3);
    }

    #[test]
    fn search_errors_are_redacted() {
        let connector = MockConnector {
            search_error: Some("UID SEARCH rejected for u/hunter2".into()),
            ..MockConnector::with_messages(vec![message(1, 1, "m")])
        };
        let mut session = Session::open(&connector, &request()).unwrap();
        let mut lock = session.lock("INBOX").unwrap();
        let err = lock.unseen(10).err().unwrap();
        assert_eq!(err, MailError::Unreachable("UID SEARCH rejected for u/***".into()));
        assert_eq!(Counters::get(&connector.counters.fetches), 0);
    }

    #[test]
    fn fetch_errors_are_redacted() {
        let mut connector = MockConnector::with_messages((1..=3).map(|i| message(i, i, "m")).collect());
        connector.fail_fetch_of.insert(3);
        connector.fetch_error = Some("session hunter2 expired".into());
        let got = uids(&connector, 10);
        assert_eq!(got, vec![Err(TransportError::new("session *** expired"))]);
    }
}
