use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tracing::info;

use crate::auth::CurrentOwner;
use crate::dtos::{SendReviewNotificationRequest, SendReviewNotificationResponse};
use crate::error::AppError;
use crate::notify::delivery;
use crate::routes::projects::owned_project;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/send-review-notification", post(send_review_notification))
}

#[utoipa::path(
    post,
    path = "/api/send-review-notification",
    tag = "notifications",
    request_body = SendReviewNotificationRequest,
    responses(
        (status = 200, description = "Review email sent", body = SendReviewNotificationResponse),
        (status = 400, description = "Missing fields or nothing reviewed yet"),
        (status = 404, description = "Project or client assets not found"),
        (status = 429, description = "Email rate limit exceeded"),
        (status = 500, description = "Email provider not configured")
    ),
    security(("bearer" = []))
)]
pub async fn send_review_notification(
    State(state): State<AppState>,
    owner: CurrentOwner,
    Json(body): Json<SendReviewNotificationRequest>,
) -> Result<Json<SendReviewNotificationResponse>, AppError> {
    let client_email = body.client_email.as_deref().map(str::trim).filter(|e| !e.is_empty());
    let (Some(client_email), Some(project_id)) = (client_email, body.project_id) else {
        return Err(AppError::BadRequest(
            "Missing required fields: clientEmail and projectId",
        ));
    };

    delivery::require_mailer(state.mailer.as_ref())?;
    owned_project(&state.pool, project_id, owner.id).await?;

    let outcome = delivery::send_review_notification(&state, project_id, client_email).await?;
    let dequeued = state.batcher.forget_client(project_id, client_email);
    info!(project_id = %project_id, user_id = %owner.id, dequeued, "Review notification requested");

    Ok(Json(SendReviewNotificationResponse {
        success: true,
        email_id: outcome.email_id,
        summary: outcome.summary,
    }))
}
