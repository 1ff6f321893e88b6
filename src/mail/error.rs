use thiserror::Error;

/// Failure reported by a mail transport, carrying the server's or the
/// socket's own message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<imap::error::Error> for TransportError {
    fn from(e: imap::error::Error) -> Self {
        Self(e.to_string())
    }
}

impl From<native_tls::Error> for TransportError {
    fn from(e: native_tls::Error) -> Self {
        Self(e.to_string())
    }
}

/// Every problem found in a request, in the order they were checked.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid request: {}", .0.join(", "))]
pub struct ValidationError(pub Vec<String>);

/// A single message that could not be turned into a [`NormalizedEmail`].
///
/// [`NormalizedEmail`]: crate::mail::NormalizedEmail
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("message has no source")]
    MissingSource,
    #[error("malformed message: {0}")]
    Malformed(#[from] mailparse::MailParseError),
}

/// Request-level failure of the retrieval pipeline.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MailError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Unreachable(String),
}

const CREDENTIAL_MARKERS: [&str; 3] = ["auth", "login", "credential"];

/// Sorts a failed connect attempt into `Unauthorized` or `Unreachable` by
/// looking at what the server said.
pub fn classify_connect_error(message: String) -> MailError {
    let lower = message.to_lowercase();
    if CREDENTIAL_MARKERS.iter().any(|m| lower.contains(m)) {
        MailError::Unauthorized(message)
    } else {
        MailError::Unreachable(message)
    }
}
