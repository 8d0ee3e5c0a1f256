//! HTTP client for the account endpoints.
//!
//! Keeps the session cookie in its own cookie store and broadcasts an
//! [`AuthEvent`] after every state-changing call.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use url::Url;

use super::tracker::{AuthEvent, SessionSnapshot, SessionUser};
use super::{MonitorError, SessionBackend};

const EVENT_CAPACITY: usize = 16;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionBody {
    is_authenticated: bool,
    user: Option<SessionUser>,
    session_expiry: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody {
    user: SessionUser,
    session_expiry: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct SessionClient {
    http: reqwest::Client,
    base: Url,
    events: broadcast::Sender<AuthEvent>,
}

impl SessionClient {
    /// `base` is the server origin, e.g. `http://localhost:7300/`.
    pub fn new(base: &str) -> Result<Self, MonitorError> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let http = reqwest::Client::builder().cookie_store(true).build()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self { http, base, events })
    }

    /// Receive auth state changes made through this client.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// The underlying HTTP client, carrying the session cookie.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn url(&self, path: &str) -> Result<Url, MonitorError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    fn publish(&self, event: AuthEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn check(response: Response) -> Result<Response, MonitorError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_default();
        Err(MonitorError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    /// Fetch the session and announce it as a sign-in.
    async fn announce_sign_in(&self) -> Result<SessionSnapshot, MonitorError> {
        let snapshot = self.session().await?.ok_or_else(|| {
            MonitorError::InvalidResponse("no session after authentication".into())
        })?;
        self.publish(AuthEvent::SignedIn(snapshot.clone()));
        Ok(snapshot)
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<SessionSnapshot, MonitorError> {
        let response = self
            .http
            .post(self.url("api/auth/signup")?)
            .json(&json!({
                "email": email,
                "password": password,
                "firstName": first_name,
                "lastName": last_name,
            }))
            .send()
            .await?;
        Self::check(response).await?;
        self.announce_sign_in().await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionSnapshot, MonitorError> {
        let response = self
            .http
            .post(self.url("api/auth/signin")?)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        Self::check(response).await?;
        self.announce_sign_in().await
    }

    pub async fn sign_out(&self) -> Result<(), MonitorError> {
        let response = self.http.post(self.url("api/auth/signout")?).send().await?;
        Self::check(response).await?;
        self.publish(AuthEvent::SignedOut);
        Ok(())
    }

    /// Current session, or `None` when the server does not recognise one.
    pub async fn session(&self) -> Result<Option<SessionSnapshot>, MonitorError> {
        let response = self.http.get(self.url("api/auth/session")?).send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(None);
        }
        let body: SessionBody = Self::check(response).await?.json().await?;

        match (body.is_authenticated, body.user, body.session_expiry) {
            (true, Some(user), Some(expires_at)) => Ok(Some(SessionSnapshot { user, expires_at })),
            (false, _, _) => Ok(None),
            _ => Err(MonitorError::InvalidResponse(
                "authenticated session without user or expiry".into(),
            )),
        }
    }

    /// Swap the session token for a fresh one.
    pub async fn refresh(&self) -> Result<SessionSnapshot, MonitorError> {
        let response = self.http.post(self.url("api/auth/refresh")?).send().await?;
        let response = match Self::check(response).await {
            Ok(response) => response,
            Err(e) => {
                if matches!(e, MonitorError::Rejected { status: 401, .. }) {
                    self.publish(AuthEvent::SignedOut);
                }
                return Err(e);
            }
        };

        let body: RefreshBody = response.json().await?;
        let expires_at = body
            .session_expiry
            .ok_or_else(|| MonitorError::InvalidResponse("refresh without expiry".into()))?;

        let snapshot = SessionSnapshot {
            user: body.user,
            expires_at,
        };
        self.publish(AuthEvent::TokenRefreshed(snapshot.clone()));
        Ok(snapshot)
    }
}

#[async_trait]
impl SessionBackend for SessionClient {
    async fn current_session(&self) -> Result<Option<SessionSnapshot>, MonitorError> {
        self.session().await
    }

    async fn refresh(&self) -> Result<SessionSnapshot, MonitorError> {
        SessionClient::refresh(self).await
    }
}
