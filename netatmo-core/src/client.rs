//! Authenticated request execution.
//!
//! The client owns the session behind a mutex. Refreshes happen while the lock
//! is held so two concurrent callers never spend the same refresh token twice;
//! data requests run outside the lock.

use chrono::Utc;
use reqwest::{Method, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::auth::{AuthorizationRequest, Authenticator};
use crate::error::{AuthError, RequestError, truncate_body};
use crate::session::Session;

/// A successful (2xx) API response, body not yet decoded.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Netatmo API client: an [`Authenticator`] plus the session it produced.
#[derive(Debug)]
pub struct NetatmoClient {
    auth: Authenticator,
    session: Mutex<Option<Session>>,
}

impl NetatmoClient {
    /// Unauthenticated client. Requests fail with `NotAuthenticated` until a
    /// session is installed.
    pub fn new(auth: Authenticator) -> Self {
        Self { auth, session: Mutex::new(None) }
    }

    pub fn with_session(auth: Authenticator, session: Session) -> Self {
        Self { auth, session: Mutex::new(Some(session)) }
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    pub async fn set_session(&self, session: Session) {
        *self.session.lock().await = Some(session);
    }

    /// Snapshot of the current session, for persistence.
    pub async fn session(&self) -> Option<Session> {
        self.session.lock().await.clone()
    }

    /// Current refresh token. Reflects any rotation done by a transparent
    /// refresh, so read it again after each call before persisting.
    pub async fn refresh_token(&self) -> Option<String> {
        self.session.lock().await.as_ref().and_then(|s| s.refresh_token.clone())
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub async fn login_with_password(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let session = self.auth.exchange_password(username, password).await?;
        self.set_session(session).await;
        Ok(())
    }

    pub async fn login_with_code(
        &self,
        request: &AuthorizationRequest,
        code: &str,
        returned_state: &str,
    ) -> Result<(), AuthError> {
        let session = self.auth.exchange_authorization_code(request, code, returned_state).await?;
        self.set_session(session).await;
        Ok(())
    }

    pub fn restore_session(&self, refresh_token: &str) -> Session {
        self.auth.restore_session(refresh_token)
    }

    /// Send an authenticated request to `path` (relative to the API base).
    ///
    /// An expired or missing access token is refreshed first. Otherwise a
    /// 401/403 from the API triggers one refresh and one retry. Either way at
    /// most one refresh grant is spent per call, and a rejection that survives
    /// it is returned as `BadStatus`.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<RawResponse, RequestError> {
        let url = self.auth.endpoints().api_base.join(path.trim_start_matches('/'))?;

        let (token, refreshed) = self.access_token().await?;
        let res = self.send(method.clone(), url.clone(), query, &token).await?;

        // A token we just refreshed is not refreshed again.
        let res = if is_token_rejection(res.status()) && !refreshed {
            warn!(status = %res.status(), %url, "access token rejected");
            match self.refresh_after_rejection(&token).await? {
                Some(token) => self.send(method, url, query, &token).await?,
                None => res,
            }
        } else {
            res
        };

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(RequestError::BadStatus { status: status.as_u16(), body: truncate_body(&body) });
        }

        Ok(RawResponse { status, body })
    }

    async fn send(
        &self,
        method: Method,
        url: url::Url,
        query: &[(&str, &str)],
        token: &str,
    ) -> Result<reqwest::Response, RequestError> {
        debug!(%method, %url, "sending request");
        let res = self
            .auth
            .http()
            .request(method, url)
            .query(query)
            .bearer_auth(token)
            .send()
            .await?;
        Ok(res)
    }

    /// A usable access token, refreshing under the lock when needed. The flag
    /// reports whether a refresh grant was spent.
    async fn access_token(&self) -> Result<(String, bool), RequestError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(RequestError::NotAuthenticated)?;

        if let Some(token) = session.usable_access_token(Utc::now()) {
            return Ok((token.to_string(), false));
        }

        let refreshed = session.can_refresh();
        if refreshed {
            self.auth.refresh(session).await?;
        }

        // Expired with nothing to refresh with: let the server judge the stale token.
        let token = session
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(RequestError::NotAuthenticated)?;
        Ok((token, refreshed))
    }

    /// Token to retry with after a rejection: the one another caller already
    /// swapped in, or a freshly refreshed one. `None` when there is no way to
    /// get a different token.
    async fn refresh_after_rejection(&self, rejected: &str) -> Result<Option<String>, RequestError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(RequestError::NotAuthenticated)?;

        match session.access_token.as_deref() {
            Some(current) if current != rejected => return Ok(Some(current.to_string())),
            _ => {}
        }

        if !session.can_refresh() {
            return Ok(None);
        }

        self.auth.refresh(session).await?;
        Ok(session.access_token.clone())
    }
}

fn is_token_rejection(status: StatusCode) -> bool {
    matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
}
