use native_tls::{TlsConnector, TlsStream};
use std::net::TcpStream;
use tracing::debug;

use crate::mail::error::TransportError;
use crate::mail::request::ConnectionRequest;
use crate::mail::transport::{Connector, MailTransport};
use crate::mail::RawMessage;

const FETCH_ITEMS: &str = "(UID FLAGS ENVELOPE BODYSTRUCTURE BODY.PEEK[])";

fn is_localhost(host: &str) -> bool {
    host == "127.0.0.1" || host == "localhost" || host == "::1"
}

/// Opens IMAP sessions over TLS.
#[derive(Clone, Debug, Default)]
pub struct ImapConnector {
    /// Accept self-signed certificates from local bridges.
    pub trust_localhost_certs: bool,
}

impl ImapConnector {
    pub fn new(trust_localhost_certs: bool) -> Self {
        Self { trust_localhost_certs }
    }

    fn tls_connector_for(&self, host: &str) -> Result<TlsConnector, TransportError> {
        let mut b = TlsConnector::builder();

        if self.trust_localhost_certs && is_localhost(host) {
            b.danger_accept_invalid_certs(true);
            b.danger_accept_invalid_hostnames(true);
        }

        Ok(b.build()?)
    }
}

impl Connector for ImapConnector {
    type Transport = ImapTransport;

    fn connect(&self, req: &ConnectionRequest) -> Result<ImapTransport, TransportError> {
        let tls = self.tls_connector_for(&req.host)?;
        let addr = (req.host.as_str(), req.port);

        // Without implicit TLS we still upgrade before LOGIN.
        let client = if req.use_encryption {
            imap::connect(addr, &req.host, &tls)?
        } else {
            imap::connect_starttls(addr, &req.host, &tls)?
        };

        let session = client
            .login(&req.username, req.secret.expose())
            .map_err(|e| e.0)?;
        debug!(host = %req.host, tls = req.use_encryption, "imap login ok");

        Ok(ImapTransport { session })
    }
}

pub struct ImapTransport {
    session: imap::Session<TlsStream<TcpStream>>,
}

impl MailTransport for ImapTransport {
    fn lock_mailbox(&mut self, mailbox: &str) -> Result<(), TransportError> {
        let mbox = self.session.examine(mailbox)?;
        debug!(mailbox, exists = mbox.exists, unseen = ?mbox.unseen, "mailbox examined");
        Ok(())
    }

    fn release_mailbox(&mut self) -> Result<(), TransportError> {
        Ok(self.session.close()?)
    }

    fn search_unseen(&mut self) -> Result<Vec<u32>, TransportError> {
        Ok(self.session.uid_search("UNSEEN")?.into_iter().collect())
    }

    fn fetch_message(&mut self, uid: u32) -> Result<RawMessage, TransportError> {
        let fetches = self.session.uid_fetch(uid.to_string(), FETCH_ITEMS)?;
        // An expunged message yields no fetch response; hand it on without a
        // source so it is skipped like any other unreadable message.
        let Some(f) = fetches.iter().next() else {
            return Ok(RawMessage { uid: Some(uid), source: None });
        };

        Ok(RawMessage {
            uid: f.uid.or(Some(uid)),
            source: f.body().map(<[u8]>::to_vec),
        })
    }

    fn logout(&mut self) -> Result<(), TransportError> {
        Ok(self.session.logout()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localhost_detection() {
        assert!(is_localhost("127.0.0.1"));
        assert!(is_localhost("localhost"));
        assert!(!is_localhost("imap.example.org"));
    }

    #[test]
    fn tls_connector_builds_for_both_modes() {
        assert!(ImapConnector::new(true).tls_connector_for("localhost").is_ok());
        assert!(ImapConnector::new(false).tls_connector_for("imap.example.org").is_ok());
    }
}
