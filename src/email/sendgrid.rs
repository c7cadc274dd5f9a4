use axum::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::config::SendGridConfig;
use crate::email::EmailError;

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct SentEmail {
    /// Provider message id, when the provider reports one
    pub message_id: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Whether credentials and a sender address are present.
    fn is_configured(&self) -> bool;

    /// Verified sender address, if configured.
    fn sender(&self) -> Option<&str>;

    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail, EmailError>;
}

pub struct SendGrid {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    from_email: Option<String>,
    from_name: String,
}

impl SendGrid {
    pub fn new(http: reqwest::Client, cfg: &SendGridConfig) -> Self {
        SendGrid {
            http,
            endpoint: SENDGRID_ENDPOINT.to_string(),
            api_key: cfg.api_key.clone(),
            from_email: cfg.from_email.clone(),
            from_name: cfg.from_name.clone(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }
}

#[async_trait]
impl Mailer for SendGrid {
    fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.from_email.is_some()
    }

    fn sender(&self) -> Option<&str> {
        self.from_email.as_deref()
    }

    async fn send(&self, email: &OutgoingEmail) -> Result<SentEmail, EmailError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(EmailError::NotConfigured("SENDGRID_API_KEY"))?;
        let from = self
            .from_email
            .as_deref()
            .ok_or(EmailError::NotConfigured("SENDGRID_FROM_EMAIL"))?;

        let payload = json!({
            "personalizations": [{ "to": [{ "email": email.to }] }],
            "from": { "email": from, "name": self.from_name },
            "subject": email.subject,
            "content": [
                { "type": "text/plain", "value": email.text },
                { "type": "text/html", "value": email.html },
            ],
        });

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            let message_id = resp
                .headers()
                .get("x-message-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            info!(to = %email.to, message_id = ?message_id, "Email accepted by SendGrid");
            return Ok(SentEmail { message_id });
        }

        let body = resp.text().await.unwrap_or_default();
        let err = classify(status, &body);
        warn!(to = %email.to, status = status.as_u16(), error = %err, "SendGrid rejected email");
        Err(err)
    }
}

#[derive(Deserialize, Default)]
struct ErrorEnvelope {
    #[serde(default)]
    errors: Vec<ProviderError>,
}

#[derive(Deserialize)]
struct ProviderError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    field: Option<String>,
}

/// Map a failed SendGrid response onto the error taxonomy owners see.
pub fn classify(status: StatusCode, body: &str) -> EmailError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let first_message = envelope
        .errors
        .first()
        .map(|e| e.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.chars().take(200).collect());
    let field_is = |name: &str| {
        envelope
            .errors
            .iter()
            .any(|e| e.field.as_deref().is_some_and(|f| f.starts_with(name)))
    };

    match status {
        StatusCode::UNAUTHORIZED => EmailError::InvalidCredentials,
        StatusCode::TOO_MANY_REQUESTS => EmailError::RateLimited,
        StatusCode::FORBIDDEN
            if field_is("from")
                || envelope
                    .errors
                    .iter()
                    .any(|e| e.message.contains("verified Sender Identity")) =>
        {
            EmailError::SenderUnverified
        }
        StatusCode::BAD_REQUEST if field_is("personalizations") => {
            EmailError::InvalidRecipient(first_message)
        }
        _ => EmailError::Provider {
            status: status.as_u16(),
            message: first_message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_means_bad_api_key() {
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, r#"{"errors":[{"message":"bad key"}]}"#),
            EmailError::InvalidCredentials
        ));
    }

    #[test]
    fn forbidden_sender_identity_is_reported_as_unverified() {
        let body = r#"{"errors":[{"message":"The from address does not match a verified Sender Identity.","field":"from"}]}"#;
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, body),
            EmailError::SenderUnverified
        ));
    }

    #[test]
    fn bad_personalization_is_an_invalid_recipient() {
        let body = r#"{"errors":[{"message":"Does not contain a valid address.","field":"personalizations.0.to.0.email"}]}"#;
        match classify(StatusCode::BAD_REQUEST, body) {
            EmailError::InvalidRecipient(msg) => assert_eq!(msg, "Does not contain a valid address."),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rate_limit_and_fallback() {
        assert!(matches!(
            classify(StatusCode::TOO_MANY_REQUESTS, ""),
            EmailError::RateLimited
        ));
        match classify(StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded") {
            EmailError::Provider { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn each_failure_has_a_distinct_status() {
        assert_eq!(EmailError::NotConfigured("SENDGRID_API_KEY").status_code().as_u16(), 500);
        assert_eq!(EmailError::InvalidCredentials.status_code().as_u16(), 401);
        assert_eq!(EmailError::SenderUnverified.status_code().as_u16(), 403);
        assert_eq!(EmailError::RateLimited.status_code().as_u16(), 429);
        assert_eq!(EmailError::InvalidRecipient("x".into()).status_code().as_u16(), 400);
    }

    #[tokio::test]
    async fn unconfigured_sender_fails_before_any_request() {
        let mailer = SendGrid::new(
            reqwest::Client::new(),
            &SendGridConfig {
                api_key: Some("key".into()),
                from_email: None,
                from_name: "AssetDrop".into(),
            },
        )
        .with_endpoint("http://127.0.0.1:9/v3/mail/send");

        assert!(!mailer.is_configured());
        let err = mailer
            .send(&OutgoingEmail {
                to: "client@example.com".into(),
                subject: "s".into(),
                html: "h".into(),
                text: "t".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EmailError::NotConfigured("SENDGRID_FROM_EMAIL")));
    }
}
