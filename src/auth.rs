use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, Key, PrivateCookieJar, SameSite};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::HostedAuthConfig;
use crate::error::AppError;
use crate::state::AppState;

/// Private cookie carrying the hosted-auth access token after sign-in.
pub const ACCESS_TOKEN_COOKIE: &str = "assetdrop-access-token";
/// Plain cookie set by the sign-in page holding the PKCE code verifier.
pub const CODE_VERIFIER_COOKIE: &str = "assetdrop-code-verifier";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid or expired access token")]
    InvalidToken,

    #[error("identity provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("identity provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Session returned by the PKCE code exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: AuthUser,
    /// Google access token when the sign-in provider was Google
    #[serde(default)]
    pub provider_token: Option<String>,
    #[serde(default)]
    pub provider_refresh_token: Option<String>,
}

/// Hosted identity service. Owner accounts live there, not in our database.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn user_for_token(&self, access_token: &str) -> Result<AuthUser, IdentityError>;

    async fn exchange_code(
        &self,
        auth_code: &str,
        code_verifier: &str,
    ) -> Result<AuthSession, IdentityError>;
}

#[derive(Clone)]
pub struct HostedAuth {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

#[derive(Deserialize)]
struct ProviderError {
    #[serde(default, alias = "error_description", alias = "msg")]
    message: Option<String>,
}

impl HostedAuth {
    pub fn new(http: reqwest::Client, config: &HostedAuthConfig) -> Self {
        HostedAuth {
            http,
            base_url: config.url.clone(),
            anon_key: config.anon_key.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for HostedAuth {
    async fn user_for_token(&self, access_token: &str) -> Result<AuthUser, IdentityError> {
        let resp = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(IdentityError::InvalidToken);
        }
        if !status.is_success() {
            return Err(rejected(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn exchange_code(
        &self,
        auth_code: &str,
        code_verifier: &str,
    ) -> Result<AuthSession, IdentityError> {
        let resp = self
            .http
            .post(format!("{}/auth/v1/token?grant_type=pkce", self.base_url))
            .header("apikey", &self.anon_key)
            .json(&serde_json::json!({
                "auth_code": auth_code,
                "code_verifier": code_verifier,
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(rejected(resp).await);
        }
        Ok(resp.json().await?)
    }
}

async fn rejected(resp: reqwest::Response) -> IdentityError {
    let status = resp.status().as_u16();
    let message = resp
        .json::<ProviderError>()
        .await
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| format!("status {status}"));
    IdentityError::Rejected { status, message }
}

/// The signed-in project owner.
#[derive(Debug, Clone)]
pub struct CurrentOwner {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Extract CurrentOwner from a bearer token or the session cookie
#[async_trait]
impl<S> FromRequestParts<S> for CurrentOwner
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);

        let token = access_token(&parts.headers, &app_state.cookie_key).ok_or_else(|| {
            debug!("Request carries no access token");
            AppError::Unauthorized("Unauthorized")
        })?;

        let user = app_state
            .identity
            .user_for_token(&token)
            .await
            .map_err(|err| match err {
                IdentityError::InvalidToken => {
                    warn!("Rejected access token");
                    AppError::Unauthorized("Unauthorized")
                }
                other => AppError::Identity(other),
            })?;

        debug!(user_id = %user.id, "Owner authenticated");
        Ok(CurrentOwner {
            id: user.id,
            email: user.email,
        })
    }
}

fn access_token(headers: &HeaderMap, key: &Key) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    PrivateCookieJar::from_headers(headers, key.clone())
        .get(ACCESS_TOKEN_COOKIE)
        .map(|c| c.value().to_string())
}

/// PKCE verifier the browser stored before redirecting to the provider.
pub fn code_verifier(headers: &HeaderMap) -> Option<String> {
    CookieJar::from_headers(headers)
        .get(CODE_VERIFIER_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Cookie holding the owner's session token.
pub fn session_cookie(access_token: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build(Cookie::new(ACCESS_TOKEN_COOKIE, access_token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

/// Only same-site paths are honoured as post-login destinations.
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => path,
        _ => "/dashboard",
    }
}
