pub mod sendgrid;
pub mod templates;

use axum::http::StatusCode;
use thiserror::Error;

pub use sendgrid::{Mailer, OutgoingEmail, SendGrid, SentEmail};

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("{0} is not set")]
    NotConfigured(&'static str),

    #[error("provider rejected the API key")]
    InvalidCredentials,

    #[error("sender identity is not verified")]
    SenderUnverified,

    #[error("provider rate limit exceeded")]
    RateLimited,

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("template error: {0}")]
    Template(String),
}

impl EmailError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            EmailError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            EmailError::SenderUnverified => StatusCode::FORBIDDEN,
            EmailError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            EmailError::InvalidRecipient(_) => StatusCode::BAD_REQUEST,
            EmailError::NotConfigured(_)
            | EmailError::Provider { .. }
            | EmailError::Transport(_)
            | EmailError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the owner when a notification cannot be sent.
    pub fn user_message(&self) -> String {
        match self {
            EmailError::NotConfigured(_) => "Email service not configured".to_string(),
            EmailError::InvalidCredentials => {
                "Invalid SendGrid API key. Please check your email configuration.".to_string()
            }
            EmailError::SenderUnverified => {
                "Sender email not verified. Please verify your sender identity in SendGrid."
                    .to_string()
            }
            EmailError::RateLimited => {
                "Email rate limit exceeded. Please try again later.".to_string()
            }
            EmailError::InvalidRecipient(_) => "Invalid recipient email address".to_string(),
            EmailError::Provider { .. } | EmailError::Transport(_) | EmailError::Template(_) => {
                "Failed to send email".to_string()
            }
        }
    }

    pub fn details(&self) -> Option<String> {
        match self {
            EmailError::NotConfigured(key) => Some(format!("{key} is not set")),
            EmailError::InvalidRecipient(message) | EmailError::Provider { message, .. } => {
                Some(message.clone())
            }
            _ => None,
        }
    }
}
