//! Store credentials

use chrono::{DateTime, Utc};
use std::fmt;

pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

/// Access key pair with an optional session token
///
/// Temporary credentials from a role carry the instant they stop working.
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AwsCredentials {
    #[inline]
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expires_at: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether these credentials are still usable `margin` after `now`
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>, margin: chrono::Duration) -> bool {
        match self.expires_at {
            Some(expiry) => expiry - margin > now,
            None => true,
        }
    }

    /// Read from an arbitrary lookup; `None` unless both keys are set
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut creds = Self::new(get(ACCESS_KEY_ID)?, get(SECRET_ACCESS_KEY)?);
        creds.session_token = get(SESSION_TOKEN);
        Some(creds)
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_both_keys() {
        let only_id = |k: &str| (k == ACCESS_KEY_ID).then(|| "AKID".to_string());
        assert!(AwsCredentials::from_lookup(only_id).is_none());

        let creds = AwsCredentials::from_lookup(|k| match k {
            ACCESS_KEY_ID => Some(" AKID ".into()),
            SECRET_ACCESS_KEY => Some("secret".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(creds.access_key_id, "AKID");
        assert_eq!(creds.session_token, None);
    }

    #[test]
    fn debug_redacts_secrets() {
        let creds = AwsCredentials::new("AKID", "very-secret").with_session_token("tok");
        let shown = format!("{creds:?}");
        assert!(shown.contains("AKID"));
        assert!(!shown.contains("very-secret"));
        assert!(!shown.contains("tok\""));
    }

    #[test]
    fn expiry_honours_the_refresh_margin() {
        let now = Utc::now();
        let margin = chrono::Duration::minutes(5);
        let creds = AwsCredentials::new("AKID", "secret");
        assert!(creds.is_valid_at(now, margin));
        assert!(creds
            .clone()
            .with_expiry(now + chrono::Duration::hours(1))
            .is_valid_at(now, margin));
        assert!(!creds
            .with_expiry(now + chrono::Duration::minutes(4))
            .is_valid_at(now, margin));
    }
}
