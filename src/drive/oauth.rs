use std::time::Duration;

use axum::async_trait;
use oauth2::basic::{BasicClient, BasicErrorResponse, BasicErrorResponseType};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, RedirectUrl, RefreshToken,
    RequestTokenError, Scope, TokenResponse, TokenUrl,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::GoogleConfig;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

pub const DRIVE_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/drive.file",
    "https://www.googleapis.com/auth/userinfo.profile",
];

#[derive(Debug, Error)]
pub enum OAuthError {
    /// Google refused the refresh token or authorization code.
    #[error("grant is invalid or has been revoked")]
    InvalidGrant,

    #[error("token response did not include a refresh token")]
    MissingRefreshToken,

    #[error("token request failed: {0}")]
    Request(String),

    #[error("invalid OAuth endpoint: {0}")]
    Url(#[from] oauth2::url::ParseError),
}

/// Tokens issued by a code exchange or refresh.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    /// Google only returns a refresh token on the first consent.
    pub refresh_token: Option<String>,
    pub expires_in: Option<Duration>,
}

#[async_trait]
pub trait DriveAuthorizer: Send + Sync {
    /// Consent URL plus the CSRF state embedded in it.
    fn authorize_url(&self) -> (String, String);

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, OAuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, OAuthError>;
}

pub struct GoogleOAuth {
    client: BasicClient,
}

impl GoogleOAuth {
    pub fn new(cfg: &GoogleConfig) -> Result<Self, OAuthError> {
        let client = BasicClient::new(
            ClientId::new(cfg.client_id.clone()),
            Some(ClientSecret::new(cfg.client_secret.clone())),
            AuthUrl::new(GOOGLE_AUTH_URL.to_string())?,
            Some(TokenUrl::new(GOOGLE_TOKEN_URL.to_string())?),
        )
        .set_redirect_uri(RedirectUrl::new(cfg.redirect_uri.clone())?);

        Ok(GoogleOAuth { client })
    }
}

#[async_trait]
impl DriveAuthorizer for GoogleOAuth {
    fn authorize_url(&self) -> (String, String) {
        let mut request = self.client.authorize_url(CsrfToken::new_random);
        for scope in DRIVE_SCOPES {
            request = request.add_scope(Scope::new(scope.to_string()));
        }
        // offline + consent so Google always hands back a refresh token
        let (url, csrf) = request
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .url();

        (url.to_string(), csrf.secret().to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, OAuthError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(classify)?;

        info!("Exchanged Google authorization code");
        Ok(TokenGrant {
            access_token: token.access_token().secret().to_string(),
            refresh_token: token.refresh_token().map(|t| t.secret().to_string()),
            expires_in: token.expires_in(),
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, OAuthError> {
        let token = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(async_http_client)
            .await
            .map_err(classify)?;

        info!("Refreshed Google access token");
        Ok(TokenGrant {
            access_token: token.access_token().secret().to_string(),
            refresh_token: token.refresh_token().map(|t| t.secret().to_string()),
            expires_in: token.expires_in(),
        })
    }
}

fn classify<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> OAuthError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(resp)
            if *resp.error() == BasicErrorResponseType::InvalidGrant =>
        {
            warn!(response = %resp, "Google rejected the grant");
            OAuthError::InvalidGrant
        }
        RequestTokenError::ServerResponse(resp) => OAuthError::Request(resp.to_string()),
        other => OAuthError::Request(other.to_string()),
    }
}
