//! Supabase adapter.
//!
//! Implements [`IdentityProvider`] over the GoTrue endpoints (`/auth/v1/*`)
//! and [`ProfileRepository`] over PostgREST (`/rest/v1/<table>`). The client
//! keeps the current session in memory and broadcasts sign-in, sign-out and
//! token refresh to its subscribers. Reading the current session never
//! broadcasts a change other than a local sign-out.

use super::{
    IdentityProvider, OAuthProvider, OAuthRedirect, ProfileRepository, SessionBroadcaster,
    SessionEvent, SessionEventKind, SessionSubscription,
};
use crate::config::SupabaseConfig;
use crate::error::ProviderError;
use crate::state::{IdentityId, Profile, Session, SessionUser};
use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Supabase client shared by the identity and profile sides.
///
/// Cloning is cheap; clones share the session and the subscriber list.
#[derive(Debug, Clone)]
pub struct SupabaseClient {
    http: Client,
    config: Arc<SupabaseConfig>,
    session: Arc<Mutex<Option<Session>>>,
    broadcaster: SessionBroadcaster,
}

impl SupabaseClient {
    /// Client for the configured project.
    #[must_use]
    pub fn new(config: SupabaseConfig) -> Self {
        Self::with_http_client(config, Client::new())
    }

    /// Client using a preconfigured `reqwest` client.
    #[must_use]
    pub fn with_http_client(config: SupabaseConfig, http: Client) -> Self {
        Self {
            http,
            config: Arc::new(config),
            session: Arc::new(Mutex::new(None)),
            broadcaster: SessionBroadcaster::new(),
        }
    }

    /// The session currently held by the client.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.lock().clone()
    }

    /// Install a session obtained out of band and announce it as a sign-in.
    pub fn set_session(&self, session: Session) {
        self.store_session(SessionEventKind::SignedIn, Some(session));
    }

    /// Install a persisted session without treating it as a new sign-in.
    pub fn restore_session(&self, session: Session) {
        self.store_session(SessionEventKind::InitialSession, Some(session));
    }

    /// Finish an OAuth redirect.
    ///
    /// `redirect_url` is the URL the provider sent the browser back to; the
    /// tokens travel in its fragment
    /// (`#access_token=…&refresh_token=…&expires_in=…`).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Rejected`] when the provider reported an
    /// error in the fragment, [`ProviderError::Decode`] when no token is
    /// present, or the error of the follow-up user lookup.
    pub async fn complete_oauth_redirect(&self, redirect_url: &str) -> Result<Session, ProviderError> {
        let fragment = parse_fragment(redirect_url)?;

        if let Some(error) = fragment.error {
            return Err(ProviderError::Rejected {
                status: StatusCode::BAD_REQUEST.as_u16(),
                message: fragment.error_description.unwrap_or(error),
            });
        }

        let access_token = fragment
            .access_token
            .ok_or_else(|| ProviderError::Decode("redirect carries no access_token".into()))?;

        let user = self
            .fetch_user(&access_token)
            .await?
            .ok_or_else(|| ProviderError::Rejected {
                status: StatusCode::UNAUTHORIZED.as_u16(),
                message: "access token was not accepted".into(),
            })?;

        let mut session = Session::new(user, access_token);
        session.refresh_token = fragment.refresh_token;
        session.expires_at = expires_at(fragment.expires_in);

        tracing::info!(identity = %session.identity(), "OAuth redirect completed");
        self.store_session(SessionEventKind::SignedIn, Some(session.clone()));
        Ok(session)
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Rejected`] when there is no refresh token or
    /// the provider refuses it, and transport errors otherwise.
    pub async fn refresh_session(&self) -> Result<Session, ProviderError> {
        let session = self.exchange_refresh_token().await?;
        self.store_session(SessionEventKind::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn exchange_refresh_token(&self) -> Result<Session, ProviderError> {
        let refresh_token = self
            .session()
            .and_then(|session| session.refresh_token)
            .ok_or_else(|| ProviderError::Rejected {
                status: StatusCode::UNAUTHORIZED.as_u16(),
                message: "no refresh token".into(),
            })?;

        let response = self
            .authorized(
                self.http
                    .post(self.endpoint("/auth/v1/token"))
                    .query(&[("grant_type", "refresh_token")]),
                None,
            )
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let tokens: TokenResponse = response.json().await.map_err(transport_error)?;
        let session = tokens.into_session();

        tracing::debug!(identity = %session.identity(), "Access token refreshed");
        Ok(session)
    }

    fn store_session(&self, kind: SessionEventKind, session: Option<Session>) {
        *self.lock() = session.clone();
        let delivered = self.broadcaster.notify(&SessionEvent::new(kind, session));
        tracing::debug!(?kind, delivered, "Session change broadcast");
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.url.trim_end_matches('/'))
    }

    /// Attach the project key and a bearer token (the anon key when no
    /// session token is given).
    fn authorized(&self, request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
        let bearer = token.unwrap_or(&self.config.anon_key);
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer)
    }

    /// `Ok(None)` when the token is no longer accepted.
    async fn fetch_user(&self, access_token: &str) -> Result<Option<SessionUser>, ProviderError> {
        let response = self
            .authorized(self.http.get(self.endpoint("/auth/v1/user")), Some(access_token))
            .send()
            .await
            .map_err(transport_error)?;

        match response.status() {
            status if status.is_success() => {
                let user: UserResponse = response.json().await.map_err(transport_error)?;
                Ok(Some(user.into()))
            },
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            _ => Err(rejection(response).await),
        }
    }

    fn signed_out_locally(&self) {
        if self.lock().is_some() {
            self.store_session(SessionEventKind::SignedOut, None);
        }
    }
}

impl IdentityProvider for SupabaseClient {
    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<Session>, ProviderError>> + Send {
        let client = self.clone();

        async move {
            let Some(mut session) = client.session() else {
                return Ok(None);
            };

            // Refreshed tokens and metadata travel in the return value only.
            if session.is_expired_at(Utc::now()) {
                match client.exchange_refresh_token().await {
                    Ok(refreshed) => session = refreshed,
                    Err(ProviderError::Rejected { status, message }) if status < 500 => {
                        tracing::info!(status, %message, "Expired session could not be refreshed");
                        client.signed_out_locally();
                        return Ok(None);
                    },
                    Err(error) => return Err(error),
                }
            }

            let Some(user) = client.fetch_user(&session.access_token).await? else {
                tracing::info!(identity = %session.identity(), "Stored session was revoked");
                client.signed_out_locally();
                return Ok(None);
            };

            if user != session.user {
                tracing::debug!(identity = %session.identity(), "User metadata changed");
                session.user = user;
            }

            {
                let mut stored = client.lock();
                if stored.as_ref().map(Session::identity) == Some(session.identity()) {
                    *stored = Some(session.clone());
                }
            }
            Ok(Some(session))
        }
    }

    fn subscribe(&self) -> SessionSubscription {
        self.broadcaster.subscribe()
    }

    fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
    ) -> impl Future<Output = Result<OAuthRedirect, ProviderError>> + Send {
        let result = serde_urlencoded::to_string([
            ("provider", provider.as_str()),
            ("redirect_to", redirect_to),
        ])
        .map(|query| OAuthRedirect {
            provider,
            url: format!("{}?{query}", self.endpoint("/auth/v1/authorize")),
        })
        .map_err(|e| ProviderError::Decode(e.to_string()));

        std::future::ready(result)
    }

    fn sign_out(&self) -> impl Future<Output = Result<(), ProviderError>> + Send {
        let client = self.clone();

        async move {
            let Some(session) = client.session() else {
                return Ok(());
            };

            let response = client
                .authorized(
                    client.http.post(client.endpoint("/auth/v1/logout")),
                    Some(&session.access_token),
                )
                .send()
                .await
                .map_err(transport_error)?;

            // A token that is already invalid means the session is gone either way.
            let status = response.status();
            let accepted = status.is_success()
                || status == StatusCode::UNAUTHORIZED
                || status == StatusCode::FORBIDDEN;
            if !accepted {
                return Err(rejection(response).await);
            }

            client.signed_out_locally();
            Ok(())
        }
    }
}

impl ProfileRepository for SupabaseClient {
    fn get_profile_by_id(
        &self,
        id: &IdentityId,
    ) -> impl Future<Output = Result<Option<Profile>, ProviderError>> + Send {
        let client = self.clone();
        let id = *id;

        async move {
            let token = client.session().map(|session| session.access_token);
            let filter = format!("eq.{id}");

            let response = client
                .authorized(
                    client
                        .http
                        .get(client.endpoint(&format!("/rest/v1/{}", client.config.profiles_table)))
                        .query(&[("id", filter.as_str()), ("select", "*")]),
                    token.as_deref(),
                )
                .send()
                .await
                .map_err(transport_error)?;

            if !response.status().is_success() {
                return Err(rejection(response).await);
            }

            let rows: Vec<Profile> = response.json().await.map_err(transport_error)?;
            Ok(rows.into_iter().find(|profile| profile.id == id))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Wire types
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct UserResponse {
    id: IdentityId,
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    full_name: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
    picture: Option<String>,
}

impl From<UserResponse> for SessionUser {
    fn from(user: UserResponse) -> Self {
        let metadata = user.user_metadata;
        Self {
            id: user.id,
            email: user.email,
            display_name: metadata.full_name.or(metadata.name),
            avatar_url: metadata.avatar_url.or(metadata.picture),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    user: UserResponse,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let mut session = Session::new(self.user.into(), self.access_token);
        session.refresh_token = self.refresh_token;
        session.expires_at = expires_at(self.expires_in);
        session
    }
}

#[derive(Debug, Default, Deserialize)]
struct RedirectFragment {
    access_token: Option<String>,
    refresh_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_seconds")]
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .or(self.error)
    }
}

fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| value.parse().ok()))
}

fn parse_fragment(redirect_url: &str) -> Result<RedirectFragment, ProviderError> {
    let (_, fragment) = redirect_url
        .split_once('#')
        .ok_or_else(|| ProviderError::Decode("redirect URL has no fragment".into()))?;

    serde_urlencoded::from_str(fragment).map_err(|e| ProviderError::Decode(e.to_string()))
}

fn expires_at(expires_in: Option<i64>) -> Option<DateTime<Utc>> {
    expires_in
        .and_then(TimeDelta::try_seconds)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
}

fn transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::Timeout
    } else if error.is_decode() {
        ProviderError::Decode(error.to_string())
    } else {
        ProviderError::Network(error.to_string())
    }
}

async fn rejection(response: Response) -> ProviderError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(ErrorBody::into_message)
        .unwrap_or(body);

    tracing::warn!(status, %message, "Supabase rejected request");
    ProviderError::Rejected { status, message }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client() -> SupabaseClient {
        SupabaseClient::new(SupabaseConfig::new("https://project.supabase.co/", "anon"))
    }

    #[tokio::test]
    async fn authorize_url_is_encoded() {
        let redirect = client()
            .sign_in_with_oauth(OAuthProvider::Google, "http://localhost:5173/after login")
            .await
            .unwrap();

        assert_eq!(
            redirect.url,
            "https://project.supabase.co/auth/v1/authorize?provider=google&redirect_to=http%3A%2F%2Flocalhost%3A5173%2Fafter+login"
        );
    }

    #[test]
    fn fragment_tokens_are_parsed() {
        let fragment = parse_fragment(
            "http://localhost:5173/#access_token=abc&refresh_token=def&expires_in=3600&token_type=bearer",
        )
        .unwrap();

        assert_eq!(fragment.access_token.as_deref(), Some("abc"));
        assert_eq!(fragment.refresh_token.as_deref(), Some("def"));
        assert_eq!(fragment.expires_in, Some(3600));
    }

    #[tokio::test]
    async fn redirect_error_is_rejected_without_network() {
        let result = client()
            .complete_oauth_redirect(
                "http://localhost:5173/#error=access_denied&error_description=User+cancelled",
            )
            .await;

        assert_eq!(
            result,
            Err(ProviderError::Rejected {
                status: 400,
                message: "User cancelled".into()
            })
        );
    }

    #[test]
    fn redirect_without_fragment_is_malformed() {
        assert!(matches!(
            parse_fragment("http://localhost:5173/?code=1"),
            Err(ProviderError::Decode(_))
        ));
    }

    #[test]
    fn metadata_falls_back_to_provider_names() {
        let user: UserResponse = serde_json::from_value(serde_json::json!({
            "id": "5f1c7a3e-9d4b-4c8e-a2f1-0b3d6e9c8a71",
            "email": "ada@example.com",
            "user_metadata": { "name": "Ada", "picture": "https://img/ada.png" }
        }))
        .unwrap();

        let user = SessionUser::from(user);
        assert_eq!(user.display_name.as_deref(), Some("Ada"));
        assert_eq!(user.avatar_url.as_deref(), Some("https://img/ada.png"));
    }

    #[tokio::test]
    async fn restoring_a_session_notifies_subscribers() {
        let client = client();
        let mut subscription = client.subscribe();
        let session = Session::new(SessionUser::new(IdentityId::new()), "token");

        client.restore_session(session.clone());

        let event = subscription.events.recv().await.unwrap();
        assert_eq!(event.kind, SessionEventKind::InitialSession);
        assert_eq!(event.session, Some(session));
    }
}
