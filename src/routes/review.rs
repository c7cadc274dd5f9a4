use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::activity;
use crate::auth::CurrentOwner;
use crate::drive::DriveSession;
use crate::dtos::{
    ApproveRequest, BatchSendResponse, RejectRequest, ReviewBatchResponse, ReviewResponse,
    SuccessResponse,
};
use crate::error::AppError;
use crate::models::{ActivityAction, Asset, AssetStatus};
use crate::notify::{batcher, delivery};
use crate::routes::projects::owned_project;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/assets/:id/approve", post(approve_asset))
        .route("/api/assets/:id/reject", post(reject_asset))
        .route(
            "/api/projects/:id/review-batch",
            get(review_batch).delete(stop_review_batch),
        )
        .route("/api/projects/:id/review-batch/send", post(send_review_batch))
        .route("/api/projects/:id/review-batch/reset", post(reset_review_batch))
}

/// A pending asset in one of the owner's projects.
async fn pending_asset(pool: &PgPool, asset_id: Uuid, owner_id: Uuid) -> Result<Asset, AppError> {
    let asset = sqlx::query_as::<_, Asset>(
        r#"
        SELECT a.id, a.project_id, a.form_field_id, a.file_name, a.file_type, a.file_size,
               a.google_drive_file_id, a.status, a.uploaded_by, a.metadata, a.rejection_reason,
               a.approval_remark, a.client_email, a.created_at, a.updated_at
        FROM assets a
        JOIN projects p ON p.id = a.project_id
        WHERE a.id = $1 AND p.user_id = $2
        "#,
    )
    .bind(asset_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Asset not found"))?;

    if asset.status != AssetStatus::Pending {
        return Err(AppError::BadRequest("Asset has already been reviewed"));
    }
    Ok(asset)
}

/// Move a pending asset to a reviewed status. The update is conditional on
/// the row still being pending.
async fn mark_reviewed(
    pool: &PgPool,
    asset_id: Uuid,
    status: AssetStatus,
    remark: Option<&str>,
    reason: Option<&str>,
) -> Result<Asset, AppError> {
    sqlx::query_as::<_, Asset>(
        r#"
        UPDATE assets
        SET status = $2, approval_remark = $3, rejection_reason = $4, updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING id, project_id, form_field_id, file_name, file_type, file_size,
                  google_drive_file_id, status, uploaded_by, metadata, rejection_reason,
                  approval_remark, client_email, created_at, updated_at
        "#,
    )
    .bind(asset_id)
    .bind(status)
    .bind(remark)
    .bind(reason)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::BadRequest("Asset has already been reviewed"))
}

fn note(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn queue_notification(state: &AppState, asset: &Asset) {
    if let Some(email) = asset.client_email.as_deref() {
        state.batcher.register(asset.project_id, asset.id, email);
    }
}

#[utoipa::path(
    post,
    path = "/api/assets/{id}/approve",
    tag = "review",
    params(("id" = Uuid, Path, description = "Asset ID")),
    request_body = ApproveRequest,
    responses(
        (status = 200, description = "Asset approved", body = ReviewResponse),
        (status = 400, description = "Already reviewed"),
        (status = 404, description = "Asset not found")
    ),
    security(("bearer" = []))
)]
pub async fn approve_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
    owner: CurrentOwner,
    body: Option<Json<ApproveRequest>>,
) -> Result<Json<ReviewResponse>, AppError> {
    let remark = note(body.and_then(|Json(b)| b.remark));
    pending_asset(&state.pool, asset_id, owner.id).await?;

    let asset = mark_reviewed(
        &state.pool,
        asset_id,
        AssetStatus::Approved,
        remark.as_deref(),
        None,
    )
    .await?;

    activity::record(
        &state.pool,
        asset.project_id,
        Some(owner.id),
        ActivityAction::AssetApproved,
        json!({
            "asset_id": asset.id,
            "file_name": asset.file_name,
            "remark": asset.approval_remark,
        }),
    )
    .await;
    queue_notification(&state, &asset);

    info!(asset_id = %asset_id, "Asset approved");
    Ok(Json(ReviewResponse {
        success: true,
        asset,
        deleted_from_drive: false,
    }))
}

#[utoipa::path(
    post,
    path = "/api/assets/{id}/reject",
    tag = "review",
    params(("id" = Uuid, Path, description = "Asset ID")),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Asset rejected", body = ReviewResponse),
        (status = 400, description = "Already reviewed"),
        (status = 404, description = "Asset not found")
    ),
    security(("bearer" = []))
)]
pub async fn reject_asset(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
    owner: CurrentOwner,
    body: Option<Json<RejectRequest>>,
) -> Result<Json<ReviewResponse>, AppError> {
    let reason = note(body.and_then(|Json(b)| b.reason));
    pending_asset(&state.pool, asset_id, owner.id).await?;

    let asset = mark_reviewed(
        &state.pool,
        asset_id,
        AssetStatus::Rejected,
        None,
        reason.as_deref(),
    )
    .await?;

    // Drive delete runs after the pending-guarded update, never before: only
    // the request that won the update gets here, so the file is deleted at
    // most once. A failed delete never undoes the rejection.
    let deleted_from_drive = if asset.is_text_response() {
        false
    } else {
        match DriveSession::open(&state, owner.id).await {
            Ok(mut session) => session.delete_best_effort(&asset.google_drive_file_id).await,
            Err(err) => {
                warn!(asset_id = %asset_id, error = %err, "Drive unavailable; rejected file left in place");
                false
            }
        }
    };

    activity::record(
        &state.pool,
        asset.project_id,
        Some(owner.id),
        ActivityAction::AssetRejected,
        json!({
            "asset_id": asset.id,
            "file_name": asset.file_name,
            "reason": asset.rejection_reason,
            "deleted_from_drive": deleted_from_drive,
        }),
    )
    .await;
    queue_notification(&state, &asset);

    info!(asset_id = %asset_id, deleted_from_drive, "Asset rejected");
    Ok(Json(ReviewResponse {
        success: true,
        asset,
        deleted_from_drive,
    }))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}/review-batch",
    tag = "review",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Pending notification batch", body = ReviewBatchResponse),
        (status = 404, description = "Project not found")
    ),
    security(("bearer" = []))
)]
pub async fn review_batch(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    owner: CurrentOwner,
) -> Result<Json<ReviewBatchResponse>, AppError> {
    owned_project(&state.pool, project_id, owner.id).await?;

    let snapshot = state.batcher.snapshot(project_id);
    let clients = if snapshot.emails.is_empty() {
        Vec::new()
    } else {
        delivery::client_review_counts(&state.pool, project_id, &snapshot.emails).await?
    };

    Ok(Json(ReviewBatchResponse {
        active: snapshot.active,
        time_remaining: snapshot.remaining_label,
        remaining_seconds: snapshot.remaining.as_secs(),
        progress: snapshot.progress,
        reviewed_count: snapshot.reviewed_count,
        clients,
    }))
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/review-batch/send",
    tag = "review",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Batch sent", body = BatchSendResponse),
        (status = 400, description = "Nothing to send"),
        (status = 500, description = "Email not configured")
    ),
    security(("bearer" = []))
)]
pub async fn send_review_batch(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    owner: CurrentOwner,
) -> Result<Json<BatchSendResponse>, AppError> {
    owned_project(&state.pool, project_id, owner.id).await?;
    delivery::require_mailer(state.mailer.as_ref())?;

    let emails = state.batcher.take_now(project_id);
    if emails.is_empty() {
        return Err(AppError::BadRequest("No reviewed assets waiting for notification"));
    }

    let report = batcher::dispatch(&state, project_id, &emails).await;
    Ok(Json(BatchSendResponse {
        success: report.failed == 0,
        sent: report.sent,
        failed: report.failed,
        errors: report.errors,
    }))
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/review-batch/reset",
    tag = "review",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses((status = 200, description = "Whether a countdown was extended", body = SuccessResponse)),
    security(("bearer" = []))
)]
pub async fn reset_review_batch(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    owner: CurrentOwner,
) -> Result<Json<SuccessResponse>, AppError> {
    owned_project(&state.pool, project_id, owner.id).await?;
    let success = state.batcher.reset(project_id);
    Ok(Json(SuccessResponse { success }))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{id}/review-batch",
    tag = "review",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses((status = 200, description = "Whether a pending batch was dropped", body = SuccessResponse)),
    security(("bearer" = []))
)]
pub async fn stop_review_batch(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    owner: CurrentOwner,
) -> Result<Json<SuccessResponse>, AppError> {
    owned_project(&state.pool, project_id, owner.id).await?;
    let success = state.batcher.stop(project_id);
    info!(project_id = %project_id, dropped = success, "Review batch stopped");
    Ok(Json(SuccessResponse { success }))
}
