use tracing::{debug, warn};

use crate::mail::error::{classify_connect_error, MailError};
use crate::mail::request::ConnectionRequest;
use crate::mail::secret::{redact, Secret};
use crate::mail::transport::{Connector, MailTransport};

/// An open transport that is logged out exactly once, when closed or dropped.
pub struct Session<T: MailTransport> {
    transport: T,
    host: String,
    secret: Secret,
    closed: bool,
}

impl<T: MailTransport> Session<T> {
    pub fn open<C>(connector: &C, request: &ConnectionRequest) -> Result<Self, MailError>
    where
        C: Connector<Transport = T>,
    {
        let transport = connector.connect(request).map_err(|e| {
            let message = redact(&e.0, &request.secret);
            warn!(host = %request.host, error = %message, "connect failed");
            classify_connect_error(message)
        })?;
        debug!(host = %request.host, port = request.port, "session opened");

        Ok(Self {
            transport,
            host: request.host.clone(),
            secret: request.secret.clone(),
            closed: false,
        })
    }

    /// Claims `mailbox`. The lock borrows the session mutably, so a second
    /// lock cannot be taken until the first one is gone.
    pub fn lock(&mut self, mailbox: &str) -> Result<MailboxLock<'_, T>, MailError> {
        if let Err(e) = self.transport.lock_mailbox(mailbox) {
            let message = redact(&e.0, &self.secret);
            warn!(host = %self.host, mailbox, error = %message, "mailbox lock failed");
            return Err(MailError::Unreachable(message));
        }
        debug!(mailbox, "mailbox locked");

        Ok(MailboxLock {
            session: self,
            mailbox: mailbox.to_string(),
            released: false,
        })
    }

    pub fn close(mut self) {
        self.logout();
    }

    fn logout(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match self.transport.logout() {
            Ok(()) => debug!(host = %self.host, "session closed"),
            Err(e) => warn!(host = %self.host, error = %redact(&e.0, &self.secret), "logout failed"),
        }
    }
}

impl<T: MailTransport> Drop for Session<T> {
    fn drop(&mut self) {
        self.logout();
    }
}

/// Exclusive claim on one mailbox of a [`Session`], released on drop.
pub struct MailboxLock<'s, T: MailTransport> {
    session: &'s mut Session<T>,
    mailbox: String,
    released: bool,
}

impl<'s, T: MailTransport> MailboxLock<'s, T> {
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    pub(crate) fn transport(&mut self) -> &mut T {
        &mut self.session.transport
    }

    /// Masks the session's secret in a transport message.
    pub(crate) fn redact(&self, message: &str) -> String {
        redact(message, &self.session.secret)
    }

    pub fn release(mut self) {
        self.unlock();
    }

    fn unlock(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.session.transport.release_mailbox() {
            warn!(
                mailbox = %self.mailbox,
                error = %redact(&e.0, &self.session.secret),
                "mailbox release failed"
            );
        }
    }
}

impl<'s, T: MailTransport> Drop for MailboxLock<'s, T> {
    fn drop(&mut self) {
        self.unlock();
    }
}
