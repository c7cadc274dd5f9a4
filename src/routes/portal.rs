use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::drive::tokens;
use crate::dtos::{
    PortalField, PortalProject, PortalView, SubmissionStatus, SubmissionsQuery,
    SubmissionsResponse, UnlockRequest,
};
use crate::error::AppError;
use crate::models::{Asset, Project};
use crate::portal::gate::LinkSettings;
use crate::portal::PortalGate;
use crate::routes::projects::form_fields;
use crate::state::AppState;

pub const LINK_PASSWORD_HEADER: &str = "x-link-password";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/portal/:link_id", get(open_portal))
        .route("/api/portal/:link_id/unlock", post(unlock_portal))
        .route("/api/portal/:link_id/submissions", get(list_submissions))
}

async fn project_by_link(pool: &PgPool, link_id: &str) -> Result<Project, AppError> {
    sqlx::query_as::<_, Project>(
        r#"
        SELECT id, user_id, name, client_name, description, status, shareable_link_id,
               link_password, link_expiry, link_disabled, google_drive_folder_id,
               created_at, updated_at
        FROM projects
        WHERE shareable_link_id = $1
        "#,
    )
    .bind(link_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Link not found"))
}

fn header_password(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(LINK_PASSWORD_HEADER)
        .and_then(|v| v.to_str().ok())
}

/// Look up the link and pass it through the gate.
async fn admitted(
    pool: &PgPool,
    link_id: &str,
    password: Option<&str>,
) -> Result<(Project, PortalGate), AppError> {
    let project = project_by_link(pool, link_id).await?;
    let mut gate = PortalGate::open(LinkSettings::from(&project), Utc::now());
    gate.admit(password)?;
    debug!(project_id = %project.id, state = gate.state().as_str(), "Portal visitor admitted");
    Ok((project, gate))
}

async fn portal_view(state: &AppState, project: Project, gate: &PortalGate) -> Result<PortalView, AppError> {
    let fields = form_fields(&state.pool, project.id).await?;
    let drive_connected = tokens::load(&state.pool, project.user_id).await?.is_some();

    Ok(PortalView {
        state: gate.state().as_str().to_string(),
        project: PortalProject {
            id: project.id,
            name: project.name,
            client_name: project.client_name,
            description: project.description,
        },
        form_fields: fields.into_iter().map(PortalField::from).collect(),
        drive_connected,
    })
}

#[utoipa::path(
    get,
    path = "/api/portal/{link_id}",
    tag = "portal",
    params(
        ("link_id" = String, Path, description = "Shareable link id"),
        ("X-Link-Password" = Option<String>, Header, description = "Link password, when one is set")
    ),
    responses(
        (status = 200, description = "Portal form", body = PortalView),
        (status = 401, description = "Password required or incorrect"),
        (status = 403, description = "Link disabled"),
        (status = 404, description = "Link not found"),
        (status = 410, description = "Link expired")
    )
)]
pub async fn open_portal(
    State(state): State<AppState>,
    Path(link_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PortalView>, AppError> {
    let (project, gate) = admitted(&state.pool, &link_id, header_password(&headers)).await?;
    Ok(Json(portal_view(&state, project, &gate).await?))
}

#[utoipa::path(
    post,
    path = "/api/portal/{link_id}/unlock",
    tag = "portal",
    params(("link_id" = String, Path, description = "Shareable link id")),
    request_body = UnlockRequest,
    responses(
        (status = 200, description = "Portal unlocked", body = PortalView),
        (status = 401, description = "Incorrect password"),
        (status = 403, description = "Link disabled"),
        (status = 410, description = "Link expired")
    )
)]
pub async fn unlock_portal(
    State(state): State<AppState>,
    Path(link_id): Path<String>,
    Json(body): Json<UnlockRequest>,
) -> Result<Json<PortalView>, AppError> {
    let (project, gate) = admitted(&state.pool, &link_id, Some(&body.password)).await?;
    info!(project_id = %project.id, "Portal unlocked");
    Ok(Json(portal_view(&state, project, &gate).await?))
}

#[utoipa::path(
    get,
    path = "/api/portal/{link_id}/submissions",
    tag = "portal",
    params(
        ("link_id" = String, Path, description = "Shareable link id"),
        SubmissionsQuery,
        ("X-Link-Password" = Option<String>, Header, description = "Link password, when one is set")
    ),
    responses(
        (status = 200, description = "Review status of the client's submissions", body = SubmissionsResponse),
        (status = 400, description = "Missing email"),
        (status = 401, description = "Password required or incorrect")
    )
)]
pub async fn list_submissions(
    State(state): State<AppState>,
    Path(link_id): Path<String>,
    Query(query): Query<SubmissionsQuery>,
    headers: HeaderMap,
) -> Result<Json<SubmissionsResponse>, AppError> {
    let email = query.email.trim();
    if email.is_empty() {
        return Err(AppError::BadRequest("Email is required"));
    }

    let (project, mut gate) = admitted(&state.pool, &link_id, header_password(&headers)).await?;
    gate.mark_submitted()?;

    let assets = sqlx::query_as::<_, Asset>(
        r#"
        SELECT id, project_id, form_field_id, file_name, file_type, file_size,
               google_drive_file_id, status, uploaded_by, metadata, rejection_reason,
               approval_remark, client_email, created_at, updated_at
        FROM assets
        WHERE project_id = $1 AND client_email = $2
        ORDER BY created_at DESC
        "#,
    )
    .bind(project.id)
    .bind(email)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(SubmissionsResponse {
        state: gate.state().as_str().to_string(),
        submissions: assets.into_iter().map(SubmissionStatus::from).collect(),
    }))
}
