use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

use crate::dtos::{CheckResult, HealthChecks, HealthResponse};
use crate::email::OutgoingEmail;
use crate::error::AppError;
use crate::state::AppState;

const KEEP_ALIVE_INTERVAL_DAYS: i64 = 30;
const EMAIL_CHECK: &str = "email";

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/health-check", get(health_check))
}

fn authorized(headers: &HeaderMap, secret: Option<&str>) -> bool {
    let Some(secret) = secret else {
        return true;
    };
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| bool::from(token.as_bytes().ct_eq(secret.as_bytes())))
}

/// Whether the monthly keep-alive email is due.
pub fn keep_alive_due(last_sent: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_sent {
        None => true,
        Some(at) => now - at >= Duration::days(KEEP_ALIVE_INTERVAL_DAYS),
    }
}

fn passing(check: &CheckResult) -> bool {
    matches!(check.status.as_str(), "healthy" | "skipped" | "info")
}

async fn check_database(state: &AppState) -> CheckResult {
    match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => CheckResult::new("healthy", "Database connection OK"),
        Err(err) => {
            error!(error = ?err, "Database health check failed");
            CheckResult::new("unhealthy", "Database query failed")
        }
    }
}

async fn check_email(state: &AppState) -> CheckResult {
    let Some(sender) = state.mailer.sender().filter(|_| state.mailer.is_configured()) else {
        return CheckResult::new("skipped", "Email provider not configured");
    };

    let last_sent = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
        r#"
        SELECT MAX(email_sent_at)
        FROM health_check_logs
        WHERE check_type = $1
        "#,
    )
    .bind(EMAIL_CHECK)
    .fetch_one(&state.pool)
    .await;

    let last_sent = match last_sent {
        Ok(at) => at,
        Err(err) => {
            error!(error = ?err, "Failed to read keep-alive history");
            return CheckResult::new("unhealthy", "Could not read keep-alive history");
        }
    };

    let now = Utc::now();
    if !keep_alive_due(last_sent, now) {
        let days = last_sent.map(|at| (now - at).num_days()).unwrap_or_default();
        return CheckResult::new("healthy", format!("Keep-alive email sent {days} days ago"));
    }

    let email = OutgoingEmail {
        to: sender.to_string(),
        subject: "AssetDrop keep-alive".to_string(),
        html: format!("<p>Monthly keep-alive check from AssetDrop at {now}.</p>"),
        text: format!("Monthly keep-alive check from AssetDrop at {now}."),
    };
    if let Err(err) = state.mailer.send(&email).await {
        warn!(error = %err, "Keep-alive email failed");
        return CheckResult::new("unhealthy", err.user_message());
    }

    let logged = sqlx::query("INSERT INTO health_check_logs (check_type) VALUES ($1)")
        .bind(EMAIL_CHECK)
        .execute(&state.pool)
        .await;
    if let Err(err) = logged {
        warn!(error = ?err, "Keep-alive email sent but not recorded");
    }

    info!("Keep-alive email sent");
    CheckResult::new("healthy", "Keep-alive email sent")
}

#[utoipa::path(
    get,
    path = "/api/health-check",
    tag = "health",
    responses(
        (status = 200, description = "All checks passed", body = HealthResponse),
        (status = 401, description = "Missing or wrong cron secret"),
        (status = 500, description = "At least one check failed", body = HealthResponse)
    ),
    security(("bearer" = []))
)]
pub async fn health_check(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<HealthResponse>), AppError> {
    if !authorized(&headers, state.config.cron_secret.as_deref()) {
        warn!("Health check called without a valid cron secret");
        return Err(AppError::Unauthorized("Unauthorized"));
    }

    let checks = HealthChecks {
        database: check_database(&state).await,
        email: check_email(&state).await,
        google_drive: CheckResult::new("info", "Drive access is per owner and verified on use"),
    };

    let healthy = passing(&checks.database) && passing(&checks.email) && passing(&checks.google_drive);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    info!(healthy, "Health check completed");
    Ok((
        status,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            timestamp: Utc::now(),
            checks,
        }),
    ))
}
