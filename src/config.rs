use std::time::Duration;

use tracing::error;

use crate::error::AppError;

const DEFAULT_APP_URL: &str = "http://localhost:3000";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_FROM_NAME: &str = "AssetDrop";
const DEFAULT_REVIEW_BATCH_DELAY_SECS: u64 = 300;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Runtime configuration, read once at startup from the process environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,

    /// Public base URL of the web app, used in redirects and email links
    pub app_url: String,

    pub google: GoogleConfig,
    pub auth: HostedAuthConfig,
    pub sendgrid: SendGridConfig,

    /// Bearer secret for the cron-invoked health check; open when unset
    pub cron_secret: Option<String>,

    /// Master key material for private cookies (at least 64 bytes)
    pub cookie_secret: Option<String>,

    /// Idle period before a project's reviewed assets are mailed out
    pub review_batch_delay: Duration,

    pub max_upload_bytes: usize,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct HostedAuthConfig {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Clone)]
pub struct SendGridConfig {
    pub api_key: Option<String>,
    pub from_email: Option<String>,
    pub from_name: String,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Ok(Config {
            database_url: required("DATABASE_URL")?,
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            app_url: optional("APP_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_APP_URL.to_string()),
            google: GoogleConfig {
                client_id: required("GOOGLE_CLIENT_ID")?,
                client_secret: required("GOOGLE_CLIENT_SECRET")?,
                redirect_uri: required("GOOGLE_REDIRECT_URI")?,
            },
            auth: HostedAuthConfig {
                url: required("AUTH_URL")?.trim_end_matches('/').to_string(),
                anon_key: required("AUTH_ANON_KEY")?,
            },
            sendgrid: SendGridConfig {
                api_key: optional("SENDGRID_API_KEY"),
                from_email: optional("SENDGRID_FROM_EMAIL"),
                from_name: optional("SENDGRID_FROM_NAME")
                    .unwrap_or_else(|| DEFAULT_FROM_NAME.to_string()),
            },
            cron_secret: optional("CRON_SECRET"),
            cookie_secret: optional("COOKIE_SECRET"),
            review_batch_delay: Duration::from_secs(parsed(
                "REVIEW_BATCH_DELAY_SECS",
                DEFAULT_REVIEW_BATCH_DELAY_SECS,
            )?),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            log_level: optional("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Link a client follows to re-open the collection portal.
    pub fn portal_url(&self, shareable_link_id: &str) -> String {
        format!("{}/collect/{}", self.app_url, shareable_link_id)
    }
}

fn required(key: &'static str) -> Result<String, AppError> {
    std::env::var(key).map_err(|e| {
        error!(key, "missing required environment variable");
        AppError::Env(e)
    })
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, AppError> {
    match optional(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            error!(key, value = %raw, "environment variable is not a valid number");
            AppError::Invalid(format!("{key} must be a number"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            database_url: "postgres://localhost/assetdrop".into(),
            bind_addr: DEFAULT_BIND_ADDR.into(),
            app_url: "https://assetdrop.example".into(),
            google: GoogleConfig {
                client_id: "id".into(),
                client_secret: "secret".into(),
                redirect_uri: "https://assetdrop.example/api/google-drive/callback".into(),
            },
            auth: HostedAuthConfig {
                url: "https://auth.example".into(),
                anon_key: "anon".into(),
            },
            sendgrid: SendGridConfig {
                api_key: None,
                from_email: None,
                from_name: DEFAULT_FROM_NAME.into(),
            },
            cron_secret: None,
            cookie_secret: None,
            review_batch_delay: Duration::from_secs(DEFAULT_REVIEW_BATCH_DELAY_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            log_level: "info".into(),
        }
    }

    #[test]
    fn portal_url_points_at_collect_page() {
        assert_eq!(
            sample().portal_url("abc123def456"),
            "https://assetdrop.example/collect/abc123def456"
        );
    }
}
