use thiserror::Error;

/// Failures of a token-endpoint exchange (password, authorization code or refresh grant).
#[derive(Debug, Error)]
pub enum AuthError {
    /// The provider rejected the username/password pair.
    #[error("Invalid credentials: {message}")]
    InvalidCredentials { message: String },

    /// The provider rejected an authorization code or refresh token.
    #[error("Invalid grant: {message}")]
    InvalidGrant { message: String },

    /// The `state` returned on the redirect differs from the one we issued.
    #[error("Authorization state mismatch: the redirect did not originate from our request")]
    StateMismatch,

    #[error("Token endpoint returned unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Malformed token response: {message}")]
    MalformedResponse { message: String },

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl AuthError {
    /// `true` when retrying with the same credentials cannot succeed.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials { .. } | Self::InvalidGrant { .. } | Self::StateMismatch
        )
    }
}

/// Failures of an authenticated API request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// No session is installed on the client; nothing was sent.
    #[error("Not authenticated: no token available")]
    NotAuthenticated,

    /// The API answered with a non-success status. The body is kept for
    /// diagnostics only and is never decoded.
    #[error("Bad HTTP status {status}: {body}")]
    BadStatus { status: u16, body: String },

    /// Refreshing an expired or rejected access token failed.
    #[error("Token refresh failed: {0}")]
    Refresh(#[from] AuthError),

    #[error("Invalid request path: {0}")]
    InvalidPath(#[from] url::ParseError),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl RequestError {
    /// `true` if logging in again might resolve this error.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::NotAuthenticated => true,
            Self::BadStatus { status, .. } => matches!(status, 401 | 403),
            Self::Refresh(e) => e.is_rejection(),
            _ => false,
        }
    }
}

/// Failures of the station snapshot fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Request(#[from] RequestError),

    /// The response body did not match the expected device tree shape.
    #[error("Failed to decode station data: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

impl FetchError {
    pub fn is_auth_failure(&self) -> bool {
        match self {
            Self::Request(e) => e.is_auth_failure(),
            Self::Decode { .. } => false,
        }
    }
}

/// The device has not reported since it was last seen by the API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("No data available for device {device_id}")]
pub struct NoDataAvailable {
    pub device_id: String,
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let cut = (0..=MAX).rev().find(|i| body.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &body[..cut])
    } else {
        body.to_string()
    }
}
