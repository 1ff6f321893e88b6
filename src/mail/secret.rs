use serde::Deserialize;
use std::fmt;

/// A password that lives for exactly one request.
///
/// It can be deserialized from a request body but never serialized, and its
/// `Debug`/`Display` output is masked. The transport reads it through
/// [`Secret::expose`] when logging in; nothing else should.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Masks every occurrence of `secret` in a message coming back from the
/// remote server, before it gets logged or returned to the caller.
pub fn redact(message: &str, secret: &Secret) -> String {
    if secret.is_blank() {
        return message.to_string();
    }
    message.replace(secret.expose(), "***")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_are_masked() {
        let s = Secret::new("hunter2");
        assert_eq!(format!("{:?}", s), "Secret(***)");
        assert_eq!(s.to_string(), "***");
        assert_eq!(s.expose(), "hunter2");
    }

    #[test]
    fn redact_replaces_every_occurrence() {
        let s = Secret::new("hunter2");
        assert_eq!(
            redact("LOGIN bob hunter2 failed (hunter2)", &s),
            "LOGIN bob *** failed (***)"
        );
    }

    #[test]
    fn redact_ignores_blank_secret() {
        assert_eq!(redact("nothing here", &Secret::new("  ")), "nothing here");
    }

    #[test]
    fn deserializes_from_plain_string() {
        let s: Secret = serde_json::from_str("\"pw\"").unwrap();
        assert_eq!(s.expose(), "pw");
    }
}
