use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::mail::error::ValidationError;
use crate::mail::secret::Secret;

pub const DEFAULT_PORT: u16 = 993;
pub const DEFAULT_MAILBOX: &str = "INBOX";
pub const DEFAULT_LIMIT: usize = 10;

/// Port as it arrives from a form: a number, or the text of one.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum PortInput {
    Number(i64),
    Text(String),
}

impl PortInput {
    fn to_port(&self) -> Option<u16> {
        let n = match self {
            PortInput::Number(n) => *n,
            PortInput::Text(s) => s.trim().parse::<i64>().ok()?,
        };
        u16::try_from(n).ok().filter(|p| *p > 0)
    }
}

/// A body field that may carry the wrong JSON type.
///
/// A mistyped field becomes `Invalid` instead of failing the whole body, so
/// validation can still report every problem. The offending value is
/// dropped, never kept around.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lenient<T> {
    Valid(T),
    Invalid,
}

impl<T> Lenient<T> {
    pub fn valid(&self) -> Option<&T> {
        match self {
            Lenient::Valid(v) => Some(v),
            Lenient::Invalid => None,
        }
    }
}

impl<T> From<T> for Lenient<T> {
    fn from(v: T) -> Self {
        Lenient::Valid(v)
    }
}

impl From<&str> for Lenient<String> {
    fn from(v: &str) -> Self {
        Lenient::Valid(v.to_string())
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Lenient<T> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(d)?;
        Ok(T::deserialize(value).map_or(Lenient::Invalid, Lenient::Valid))
    }
}

/// Body of a list request, exactly as the browser sent it.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    pub host: Option<Lenient<String>>,
    pub port: Option<Lenient<PortInput>>,
    #[serde(alias = "secure")]
    pub use_encryption: Option<Lenient<bool>>,
    #[serde(alias = "user")]
    pub username: Option<Lenient<String>>,
    #[serde(alias = "pass")]
    pub secret: Option<Lenient<Secret>>,
    #[serde(alias = "mailbox")]
    pub target_mailbox: Option<Lenient<String>>,
    #[serde(alias = "limit")]
    pub message_limit: Option<Lenient<i64>>,
}

/// Validated connection parameters for one retrieval.
#[derive(Clone, Debug)]
pub struct ConnectionRequest {
    pub host: String,
    pub port: u16,
    pub use_encryption: bool,
    pub username: String,
    pub secret: Secret,
    pub mailbox: String,
    pub limit: usize,
}

fn present(v: &Option<Lenient<String>>) -> Option<&str> {
    v.as_ref()
        .and_then(Lenient::valid)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

impl ListRequest {
    /// Checks every field and reports all problems at once. Limits above
    /// `max_limit` are lowered to it.
    pub fn validate(&self, max_limit: usize) -> Result<ConnectionRequest, ValidationError> {
        let mut errors = Vec::new();

        let host = present(&self.host);
        if host.is_none() {
            errors.push("host is required".to_string());
        }

        let username = present(&self.username);
        if username.is_none() {
            errors.push("username is required".to_string());
        }

        let secret = self
            .secret
            .as_ref()
            .and_then(Lenient::valid)
            .filter(|s| !s.is_blank());
        if secret.is_none() {
            errors.push("secret is required".to_string());
        }

        let port = match &self.port {
            None => Some(DEFAULT_PORT),
            Some(p) => p.valid().and_then(PortInput::to_port),
        };
        if port.is_none() {
            errors.push("port must be between 1 and 65535".to_string());
        }

        let use_encryption = match &self.use_encryption {
            None => Some(true),
            Some(b) => b.valid().copied(),
        };
        if use_encryption.is_none() {
            errors.push("useEncryption must be true or false".to_string());
        }

        let limit = match &self.message_limit {
            None => Some(DEFAULT_LIMIT),
            Some(n) => n
                .valid()
                .and_then(|n| usize::try_from(*n).ok())
                .filter(|n| *n > 0),
        };
        if limit.is_none() {
            errors.push("messageLimit must be a positive integer".to_string());
        }

        match (host, username, secret, port, use_encryption, limit) {
            (Some(host), Some(username), Some(secret), Some(port), Some(use_encryption), Some(limit))
                if errors.is_empty() =>
            {
                if limit > max_limit {
                    debug!(requested = limit, max_limit, "message limit lowered");
                }
                Ok(ConnectionRequest {
                    host: host.to_string(),
                    port,
                    use_encryption,
                    username: username.to_string(),
                    secret: secret.clone(),
                    mailbox: present(&self.target_mailbox)
                        .unwrap_or(DEFAULT_MAILBOX)
                        .to_string(),
                    limit: limit.min(max_limit),
                })
            }
            _ => Err(ValidationError(errors)),
        }
    }
}
