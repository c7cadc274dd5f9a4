use serde::Serialize;
use serde_json::json;
use sqlx::{FromRow, PgPool};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::activity;
use crate::email::templates::{ReviewEmail, ReviewTemplates, ReviewedItem};
use crate::email::{EmailError, Mailer, OutgoingEmail};
use crate::error::AppError;
use crate::models::{ActivityAction, Asset, AssetStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
pub struct ReviewSummary {
    pub approved: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub email_id: Option<String>,
    pub summary: ReviewSummary,
}

/// Per-client asset counts shown before a batch is sent.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ClientReviewCounts {
    pub client_email: String,
    pub approved: i64,
    pub rejected: i64,
    pub pending: i64,
}

#[derive(FromRow)]
struct ProjectHeader {
    name: String,
    user_id: Uuid,
    shareable_link_id: String,
}

/// Fail fast when the email provider is missing credentials or a sender.
pub fn require_mailer(mailer: &dyn Mailer) -> Result<(), EmailError> {
    if mailer.is_configured() {
        return Ok(());
    }
    let missing = if mailer.sender().is_some() {
        "SENDGRID_API_KEY"
    } else {
        "SENDGRID_FROM_EMAIL"
    };
    Err(EmailError::NotConfigured(missing))
}

/// Split a client's assets into approved and rejected items; pending ones
/// are left out.
pub fn partition_reviewed(assets: &[Asset]) -> (Vec<ReviewedItem>, Vec<ReviewedItem>) {
    let mut approved = Vec::new();
    let mut rejected = Vec::new();
    for asset in assets {
        match asset.status {
            AssetStatus::Approved => approved.push(ReviewedItem {
                file_name: asset.file_name.clone(),
                note: asset.approval_remark.clone(),
            }),
            AssetStatus::Rejected => rejected.push(ReviewedItem {
                file_name: asset.file_name.clone(),
                note: asset.rejection_reason.clone(),
            }),
            AssetStatus::Pending => {}
        }
    }
    (approved, rejected)
}

/// Email one client the review results of their assets in a project.
pub async fn send_review_notification(
    state: &AppState,
    project_id: Uuid,
    client_email: &str,
) -> Result<DeliveryOutcome, AppError> {
    require_mailer(state.mailer.as_ref())?;

    let project = sqlx::query_as::<_, ProjectHeader>(
        r#"
        SELECT name, user_id, shareable_link_id
        FROM projects
        WHERE id = $1
        "#,
    )
    .bind(project_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("Project not found"))?;

    let assets = sqlx::query_as::<_, Asset>(
        r#"
        SELECT id, project_id, form_field_id, file_name, file_type, file_size,
               google_drive_file_id, status, uploaded_by, metadata, rejection_reason,
               approval_remark, client_email, created_at, updated_at
        FROM assets
        WHERE project_id = $1 AND client_email = $2
        ORDER BY created_at ASC
        "#,
    )
    .bind(project_id)
    .bind(client_email)
    .fetch_all(&state.pool)
    .await?;

    if assets.is_empty() {
        return Err(AppError::NotFound("No assets found for this client"));
    }

    let (approved, rejected) = partition_reviewed(&assets);
    if approved.is_empty() && rejected.is_empty() {
        return Err(AppError::BadRequest(
            "No reviewed assets found. All assets are still pending.",
        ));
    }

    let reupload_url = state.config.portal_url(&project.shareable_link_id);
    let body = ReviewEmail {
        project_name: &project.name,
        approved: &approved,
        rejected: &rejected,
        reupload_url: &reupload_url,
    };
    let rendered = ReviewTemplates::new()?.render(&body)?;
    let email = OutgoingEmail {
        to: client_email.to_string(),
        subject: rendered.subject,
        html: rendered.html,
        text: rendered.text,
    };

    let sent = state.mailer.send(&email).await?;
    let summary = ReviewSummary {
        approved: approved.len(),
        rejected: rejected.len(),
    };

    activity::record(
        &state.pool,
        project_id,
        Some(project.user_id),
        ActivityAction::ReviewNotificationSent,
        json!({
            "client_email": client_email,
            "approved_count": summary.approved,
            "rejected_count": summary.rejected,
            "email_id": sent.message_id,
        }),
    )
    .await;

    info!(
        project_id = %project_id,
        client_email,
        approved = summary.approved,
        rejected = summary.rejected,
        "Review notification delivered"
    );

    Ok(DeliveryOutcome {
        email_id: sent.message_id,
        summary,
    })
}

/// Approved/rejected/pending counts for each of `emails` in a project.
pub async fn client_review_counts(
    pool: &PgPool,
    project_id: Uuid,
    emails: &[String],
) -> Result<Vec<ClientReviewCounts>, AppError> {
    let rows = sqlx::query_as::<_, ClientReviewCounts>(
        r#"
        SELECT client_email,
               COUNT(*) FILTER (WHERE status = 'approved') AS approved,
               COUNT(*) FILTER (WHERE status = 'rejected') AS rejected,
               COUNT(*) FILTER (WHERE status = 'pending') AS pending
        FROM assets
        WHERE project_id = $1 AND client_email = ANY($2)
        GROUP BY client_email
        ORDER BY client_email
        "#,
    )
    .bind(project_id)
    .bind(emails)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
