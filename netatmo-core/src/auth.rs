//! OAuth2 exchanges against the Netatmo token endpoint.
//!
//! Three ways to obtain a [`Session`]:
//! - password grant ([`Authenticator::exchange_password`])
//! - browser redirect ([`Authenticator::authorization_url`] then
//!   [`Authenticator::exchange_authorization_code`])
//! - a persisted refresh token ([`Authenticator::restore_session`])

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::error::{AuthError, truncate_body};
use crate::session::{ClientCredentials, Session, TokenGrant};

pub const DEFAULT_BASE_URL: &str = "https://api.netatmo.net/";

/// Read access to weather station data; the only scope this client needs.
pub const SCOPE: &str = "read_station";

/// Provider URLs. Everything hangs off one host in production.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub authorize: Url,
    pub token: Url,
    pub api_base: Url,
}

impl Endpoints {
    /// Point every endpoint at `base` (`{base}oauth2/authorize`, `{base}oauth2/token`).
    pub fn with_base(base: &str) -> Result<Self, url::ParseError> {
        let mut api_base = Url::parse(base)?;
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }
        Ok(Self {
            authorize: api_base.join("oauth2/authorize")?,
            token: api_base.join("oauth2/token")?,
            api_base,
        })
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            authorize: Url::parse("https://api.netatmo.net/oauth2/authorize")
                .expect("static authorize URL is valid"),
            token: Url::parse("https://api.netatmo.net/oauth2/token")
                .expect("static token URL is valid"),
            api_base: Url::parse(DEFAULT_BASE_URL).expect("static base URL is valid"),
        }
    }
}

/// A consent URL handed to the user, plus what is needed to complete the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub redirect_uri: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_type")]
    token_type: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrantKind {
    Password,
    AuthorizationCode,
    RefreshToken,
}

impl GrantKind {
    fn as_str(self) -> &'static str {
        match self {
            GrantKind::Password => "password",
            GrantKind::AuthorizationCode => "authorization_code",
            GrantKind::RefreshToken => "refresh_token",
        }
    }
}

/// Produces sessions for one registered app.
#[derive(Debug, Clone)]
pub struct Authenticator {
    credentials: ClientCredentials,
    endpoints: Endpoints,
    http: Client,
}

impl Authenticator {
    pub fn new(credentials: ClientCredentials) -> Self {
        Self::with_endpoints(credentials, Endpoints::default())
    }

    pub fn with_endpoints(credentials: ClientCredentials, endpoints: Endpoints) -> Self {
        Self { credentials, endpoints, http: Client::new() }
    }

    pub fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// Resource-owner password grant.
    pub async fn exchange_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let grant = self
            .request_token(
                GrantKind::Password,
                &[("username", username), ("password", password), ("scope", SCOPE)],
            )
            .await?;

        info!(client_id = %self.credentials.client_id, "session established via password grant");
        Ok(self.session_from(grant))
    }

    /// Build the consent URL the user opens in a browser. No I/O.
    pub fn authorization_url(&self, redirect_uri: &str, state: &str) -> AuthorizationRequest {
        let mut url = self.endpoints.authorize.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", SCOPE)
            .append_pair("state", state)
            .append_pair("response_type", "code");

        AuthorizationRequest {
            url,
            redirect_uri: redirect_uri.to_string(),
            state: state.to_string(),
        }
    }

    /// Complete the redirect flow. `returned_state` is the `state` query
    /// parameter the provider appended to the redirect; it must equal the one
    /// in `request` or the code is not trusted and nothing is sent.
    pub async fn exchange_authorization_code(
        &self,
        request: &AuthorizationRequest,
        code: &str,
        returned_state: &str,
    ) -> Result<Session, AuthError> {
        if returned_state != request.state {
            return Err(AuthError::StateMismatch);
        }

        let grant = self
            .request_token(
                GrantKind::AuthorizationCode,
                &[
                    ("code", code),
                    ("redirect_uri", request.redirect_uri.as_str()),
                    ("scope", SCOPE),
                    ("state", returned_state),
                ],
            )
            .await?;

        info!(client_id = %self.credentials.client_id, "session established via authorization code");
        Ok(self.session_from(grant))
    }

    /// Wrap a persisted refresh token. The access token is obtained lazily by
    /// the first authenticated request.
    pub fn restore_session(&self, refresh_token: &str) -> Session {
        Session::restored(self.credentials.clone(), refresh_token)
    }

    /// Refresh-token grant, updating `session` in place.
    pub async fn refresh(&self, session: &mut Session) -> Result<(), AuthError> {
        let refresh_token = session
            .refresh_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::InvalidGrant { message: "no refresh token".to_string() })?;

        let grant = self
            .request_token(GrantKind::RefreshToken, &[("refresh_token", refresh_token.as_str())])
            .await?;

        session.apply_grant(grant);
        info!(client_id = %session.credentials.client_id, "access token refreshed");
        Ok(())
    }

    fn session_from(&self, grant: TokenGrant) -> Session {
        let mut session = Session {
            credentials: self.credentials.clone(),
            access_token: None,
            token_type: String::new(),
            refresh_token: None,
            issued_at: None,
            expires_at: None,
        };
        session.apply_grant(grant);
        session
    }

    async fn request_token(
        &self,
        kind: GrantKind,
        params: &[(&str, &str)],
    ) -> Result<TokenGrant, AuthError> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", kind.as_str()),
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];
        form.extend_from_slice(params);

        debug!(grant_type = kind.as_str(), url = %self.endpoints.token, "requesting token");

        let issued_at = Utc::now();
        let res = self.http.post(self.endpoints.token.clone()).form(&form).send().await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(rejection(kind, status, &body));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AuthError::MalformedResponse { message: e.to_string() })?;

        if parsed.access_token.is_empty() {
            return Err(AuthError::MalformedResponse {
                message: "empty access_token".to_string(),
            });
        }

        Ok(TokenGrant {
            access_token: parsed.access_token,
            token_type: parsed.token_type,
            refresh_token: parsed.refresh_token.filter(|t| !t.is_empty()),
            expires_in: parsed.expires_in,
            issued_at,
        })
    }
}

fn rejection(kind: GrantKind, status: StatusCode, body: &str) -> AuthError {
    if !matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    ) {
        return AuthError::UnexpectedStatus { status: status.as_u16(), body: truncate_body(body) };
    }

    let message = serde_json::from_str::<TokenErrorResponse>(body)
        .ok()
        .and_then(|e| match (e.error, e.error_description) {
            (Some(code), Some(desc)) => Some(format!("{code}: {desc}")),
            (Some(code), None) => Some(code),
            (None, desc) => desc,
        })
        .unwrap_or_else(|| format!("HTTP {status}"));

    match kind {
        GrantKind::Password => AuthError::InvalidCredentials { message },
        GrantKind::AuthorizationCode | GrantKind::RefreshToken => {
            AuthError::InvalidGrant { message }
        }
    }
}
