pub mod assemble;
pub mod error;
pub mod fetch;
pub mod imap;
pub mod normalize;
pub mod request;
pub mod secret;
pub mod session;
pub mod transport;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

pub use assemble::{assemble, retrieve, ErrorBody, Status};
pub use error::{MailError, ParseError, TransportError, ValidationError};
pub use normalize::{normalize, NormalizeOptions};
pub use request::{ConnectionRequest, ListRequest};
pub use secret::Secret;

/// One message as the transport handed it over: the server UID, when the
/// server reported one, and the full RFC 5322 source.
#[derive(Clone, Debug, Default)]
pub struct RawMessage {
    pub uid: Option<u32>,
    pub source: Option<Vec<u8>>,
}

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceProvider {
    Imap,
    Outlook,
    Thunderbird,
}

impl SourceProvider {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "imap" => Some(Self::Imap),
            "outlook" => Some(Self::Outlook),
            "thunderbird" => Some(Self::Thunderbird),
            _ => None,
        }
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEmail {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub to: Vec<String>,
    #[serde(serialize_with = "iso_millis", skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(rename = "provider")]
    pub source_provider: SourceProvider,
}

// Browsers parse `2024-05-01T10:00:00.000Z` everywhere; keep that exact shape.
fn iso_millis<S: Serializer>(date: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
    match date {
        Some(d) => s.serialize_str(&d.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => s.serialize_none(),
    }
}
