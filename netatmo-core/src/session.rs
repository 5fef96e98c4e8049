use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tokens are treated as expired this long before the server says so.
const EXPIRY_LEEWAY_SECS: i64 = 10;

/// App identity issued at https://dev.netatmo.com/apps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self { client_id: client_id.into(), client_secret: client_secret.into() }
    }
}

/// Current OAuth2 state of a client.
///
/// A session produced by a token exchange always has an access token. A session
/// restored from a persisted refresh token starts without one and obtains it on
/// first use. `expires_at` is advisory: the API answering 401/403 is what
/// actually invalidates a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub credentials: ClientCredentials,
    pub access_token: Option<String>,
    pub token_type: String,
    pub refresh_token: Option<String>,
    /// Local instant the current access token was issued at.
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Session holding only a refresh token; no network involved.
    pub fn restored(credentials: ClientCredentials, refresh_token: impl Into<String>) -> Self {
        Self {
            credentials,
            access_token: None,
            token_type: "Bearer".to_string(),
            refresh_token: Some(refresh_token.into()),
            issued_at: None,
            expires_at: None,
        }
    }

    /// Install a freshly granted token. A grant that does not rotate the
    /// refresh token keeps the previous one.
    pub(crate) fn apply_grant(&mut self, grant: TokenGrant) {
        self.access_token = Some(grant.access_token);
        self.token_type = grant.token_type;
        if grant.refresh_token.is_some() {
            self.refresh_token = grant.refresh_token;
        }
        self.issued_at = Some(grant.issued_at);
        // An `expires_in` beyond chrono's range is treated as no expiry.
        self.expires_at = grant.expires_in.and_then(|secs| {
            Duration::try_seconds(secs).and_then(|d| grant.issued_at.checked_add_signed(d))
        });
    }

    /// Access token usable right now, if any.
    pub fn usable_access_token(&self, now: DateTime<Utc>) -> Option<&str> {
        if self.is_expired_at(now) {
            return None;
        }
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| now + Duration::seconds(EXPIRY_LEEWAY_SECS) >= at)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// A successful token-endpoint answer, stamped with the local issuance instant.
#[derive(Debug, Clone)]
pub(crate) struct TokenGrant {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub issued_at: DateTime<Utc>,
}
