use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::mail::error::MailError;
use crate::mail::normalize::{fallback_id, normalize, NormalizeOptions};
use crate::mail::request::ConnectionRequest;
use crate::mail::session::Session;
use crate::mail::transport::Connector;
use crate::mail::NormalizedEmail;

/// Status class of a response, independent of the HTTP stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    BadRequest,
    Unauthorized,
    ServerError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::BadRequest => 400,
            Status::Unauthorized => 401,
            Status::ServerError => 500,
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into(), details: None }
    }
}

impl MailError {
    pub fn status(&self) -> Status {
        match self {
            MailError::Validation(_) => Status::BadRequest,
            MailError::Unauthorized(_) => Status::Unauthorized,
            MailError::Unreachable(_) => Status::ServerError,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            MailError::Validation(v) => ErrorBody {
                error: "Validation".to_string(),
                details: Some(v.0.clone()),
            },
            MailError::Unauthorized(m) | MailError::Unreachable(m) => ErrorBody::new(m.clone()),
        }
    }
}

// Dated messages newest first, undated ones after all of them.
fn newest_first(a: &NormalizedEmail, b: &NormalizedEmail) -> Ordering {
    match (a.date, b.date) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Orders messages newest first and keeps at most `limit`. The sort is
/// stable, so equal dates keep their fetch order.
pub fn assemble(mut emails: Vec<NormalizedEmail>, limit: usize) -> Vec<NormalizedEmail> {
    emails.sort_by(newest_first);
    emails.truncate(limit);

    let mut seen = HashSet::with_capacity(emails.len());
    for email in &mut emails {
        while !seen.insert(email.id.clone()) {
            email.id = fallback_id();
        }
    }
    emails
}

/// Runs one retrieval end to end on a fresh session.
///
/// Messages that fail to parse are skipped. A transport failure at any point
/// fails the whole request, and the lock and session are released on every
/// path.
pub fn retrieve<C: Connector>(
    connector: &C,
    request: &ConnectionRequest,
    opts: &NormalizeOptions,
) -> Result<Vec<NormalizedEmail>, MailError> {
    let mut session = Session::open(connector, request)?;
    let mut lock = session.lock(&request.mailbox)?;

    let mut emails = Vec::new();
    let mut skipped = 0usize;
    for raw in lock.unseen(request.limit)? {
        // Already redacted by the stream.
        let raw = raw.map_err(|e| {
            warn!(host = %request.host, mailbox = %request.mailbox, error = %e, "fetch interrupted");
            MailError::Unreachable(e.0)
        })?;
        let uid = raw.uid;
        match normalize(raw, opts) {
            Ok(email) => emails.push(email),
            Err(e) => {
                skipped += 1;
                warn!(?uid, error = %e, "skipping unparseable message");
            }
        }
    }

    lock.release();
    session.close();

    info!(
        host = %request.host,
        mailbox = %request.mailbox,
        count = emails.len(),
        skipped,
        "unseen messages retrieved"
    );
    Ok(assemble(emails, request.limit))
}
