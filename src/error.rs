use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::auth::IdentityError;
use crate::drive::{DriveError, OAuthError};
use crate::email::EmailError;
use crate::portal::gate::UnavailableReason;

pub const DRIVE_NOT_CONNECTED: &str =
    "Google Drive not connected. Project owner needs to authorize Google Drive.";
pub const DRIVE_REVOKED: &str =
    "Google Drive access has been revoked. Please reconnect your account.";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("Password required")]
    PasswordRequired,

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{}", .0.message())]
    LinkUnavailable(UnavailableReason),

    #[error("{}", DRIVE_NOT_CONNECTED)]
    DriveNotConnected,

    /// The stored drive grant was revoked; the token row has been removed.
    #[error("token_revoked")]
    ReconnectRequired,

    #[error("drive error: {0}")]
    Drive(#[from] DriveError),

    #[error("oauth error: {0}")]
    OAuth(#[from] OAuthError),

    #[error("email error: {0}")]
    Email(#[from] EmailError),

    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("env error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(rename = "requiresReconnect", skip_serializing_if = "is_false")]
    pub requires_reconnect: bool,

    #[serde(rename = "passwordRequired", skip_serializing_if = "is_false")]
    pub password_required: bool,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        ErrorBody {
            error: error.into(),
            details: None,
            requires_reconnect: false,
            password_required: false,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl AppError {
    /// Status code and JSON body this error is rendered as.
    pub fn to_parts(&self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::BadRequest(msg) => {
                warn!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, ErrorBody::new(*msg))
            }
            AppError::Invalid(msg) => {
                warn!(message = %msg, "Invalid input");
                (StatusCode::BAD_REQUEST, ErrorBody::new(msg.clone()))
            }
            AppError::Unauthorized(msg) => {
                info!(message = %msg, "Unauthorized");
                (StatusCode::UNAUTHORIZED, ErrorBody::new(*msg))
            }
            AppError::PasswordRequired => {
                let mut body = ErrorBody::new("Password required");
                body.password_required = true;
                (StatusCode::UNAUTHORIZED, body)
            }
            AppError::Forbidden(msg) => {
                warn!(message = %msg, "Forbidden");
                (StatusCode::FORBIDDEN, ErrorBody::new(*msg))
            }
            AppError::NotFound(msg) => {
                info!(message = %msg, "Resource not found");
                (StatusCode::NOT_FOUND, ErrorBody::new(*msg))
            }
            AppError::LinkUnavailable(reason) => {
                let status = match reason {
                    UnavailableReason::Disabled => StatusCode::FORBIDDEN,
                    UnavailableReason::Expired => StatusCode::GONE,
                };
                (status, ErrorBody::new(reason.message()))
            }
            AppError::DriveNotConnected => {
                warn!("Project owner has not connected Google Drive");
                (StatusCode::FORBIDDEN, ErrorBody::new(DRIVE_NOT_CONNECTED))
            }
            AppError::ReconnectRequired => {
                let mut body = ErrorBody::new("token_revoked").with_details(DRIVE_REVOKED);
                body.requires_reconnect = true;
                (StatusCode::UNAUTHORIZED, body)
            }
            AppError::Drive(err) => {
                warn!(error = %err, "Google Drive request failed");
                drive_parts(err)
            }
            AppError::OAuth(err) => {
                error!(error = %err, "Google OAuth request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("Failed to refresh Google Drive token").with_details(err.to_string()),
                )
            }
            AppError::Email(err) => {
                warn!(error = %err, "Email delivery failed");
                let mut body = ErrorBody::new(err.user_message());
                if let Some(details) = err.details() {
                    body = body.with_details(details);
                }
                (err.status_code(), body)
            }
            AppError::Identity(err) => {
                info!(error = %err, "Identity check failed");
                match err {
                    IdentityError::InvalidToken => {
                        (StatusCode::UNAUTHORIZED, ErrorBody::new("Unauthorized"))
                    }
                    IdentityError::Rejected { message, .. } => (
                        StatusCode::BAD_REQUEST,
                        ErrorBody::new("Authentication failed").with_details(message.clone()),
                    ),
                    IdentityError::Transport(_) => (
                        StatusCode::BAD_GATEWAY,
                        ErrorBody::new("Authentication service unavailable"),
                    ),
                }
            }
            AppError::Db(_) | AppError::Io(_) | AppError::Env(_) | AppError::Other(_) => {
                error!(error = ?self, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("Internal server error"),
                )
            }
        }
    }
}

fn drive_parts(err: &DriveError) -> (StatusCode, ErrorBody) {
    match err {
        DriveError::NotFound => (
            StatusCode::NOT_FOUND,
            ErrorBody::new("File not found in Google Drive"),
        ),
        DriveError::RateLimited => (
            StatusCode::TOO_MANY_REQUESTS,
            ErrorBody::new("Google Drive rate limit exceeded. Please try again shortly."),
        ),
        DriveError::Unauthorized => (
            StatusCode::UNAUTHORIZED,
            ErrorBody::new("Google Drive rejected the stored credentials"),
        ),
        DriveError::Api { message, .. } => (
            StatusCode::BAD_GATEWAY,
            ErrorBody::new("Google Drive request failed").with_details(message.clone()),
        ),
        DriveError::Transport(_) => (
            StatusCode::BAD_GATEWAY,
            ErrorBody::new("Could not reach Google Drive"),
        ),
    }
}

// error --> HTTP mapping

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.to_parts();
        (status, Json(body)).into_response()
    }
}
