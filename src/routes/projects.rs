use std::collections::HashSet;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;
use sqlx::{FromRow, PgPool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::activity;
use crate::auth::CurrentOwner;
use crate::drive::DriveSession;
use crate::dtos::{
    ActivityQuery, CreateProjectRequest, DownloadQuery, DownloadResponse, GroupedAssets,
    ProjectAssetsResponse, ProjectDetail, ProjectRef, ProjectSummary, SaveFormRequest,
    SaveFormResponse, SuccessResponse, UpdateProjectRequest,
};
use crate::error::AppError;
use crate::models::{ActivityAction, ActivityLog, Asset, FormField, NewActivity, Project, ProjectStatus};
use crate::state::AppState;

const LINK_ID_LEN: usize = 12;
const DEFAULT_ACTIVITY_LIMIT: i64 = 100;
const MAX_ACTIVITY_LIMIT: i64 = 500;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route(
            "/api/projects/:id",
            get(get_project).patch(update_project).delete(delete_project),
        )
        .route("/api/projects/:id/archive", post(archive_project))
        .route("/api/projects/:id/form", put(save_form))
        .route("/api/projects/:id/assets", get(list_assets))
        .route("/api/projects/:id/download", get(download_asset))
        .route("/api/projects/:id/activity", get(list_activity))
}

/// Project by id, regardless of owner.
pub(crate) async fn find_project(pool: &PgPool, project_id: Uuid) -> Result<Project, AppError> {
    sqlx::query_as::<_, Project>(
        r#"
        SELECT id, user_id, name, client_name, description, status, shareable_link_id,
               link_password, link_expiry, link_disabled, google_drive_folder_id,
               created_at, updated_at
        FROM projects
        WHERE id = $1
        "#,
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Project not found"))
}

/// Project by id, only when `owner_id` owns it. Someone else's project is
/// reported as missing.
pub(crate) async fn owned_project(
    pool: &PgPool,
    project_id: Uuid,
    owner_id: Uuid,
) -> Result<Project, AppError> {
    sqlx::query_as::<_, Project>(
        r#"
        SELECT id, user_id, name, client_name, description, status, shareable_link_id,
               link_password, link_expiry, link_disabled, google_drive_folder_id,
               created_at, updated_at
        FROM projects
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(project_id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Project not found"))
}

pub(crate) async fn form_fields(pool: &PgPool, project_id: Uuid) -> Result<Vec<FormField>, AppError> {
    let fields = sqlx::query_as::<_, FormField>(
        r#"
        SELECT id, project_id, field_type, label, help_text, internal_note, is_required,
               field_order, storage_subfolder, created_at
        FROM form_fields
        WHERE project_id = $1
        ORDER BY field_order ASC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;

    Ok(fields)
}

#[derive(FromRow)]
struct ProjectWithCounts {
    #[sqlx(flatten)]
    project: Project,
    total_assets: i64,
    approved_assets: i64,
}

pub fn completion_percentage(approved: i64, total: i64) -> i64 {
    if total <= 0 {
        return 0;
    }
    ((approved as f64 / total as f64) * 100.0).round() as i64
}

/// Random public link id, lowercase hex.
pub fn new_link_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(LINK_ID_LEN);
    id
}

#[utoipa::path(
    get,
    path = "/api/projects",
    tag = "projects",
    responses(
        (status = 200, description = "Owner's projects with completion", body = [ProjectSummary]),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = []))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    owner: CurrentOwner,
) -> Result<Json<Vec<ProjectSummary>>, AppError> {
    let rows = sqlx::query_as::<_, ProjectWithCounts>(
        r#"
        SELECT p.id, p.user_id, p.name, p.client_name, p.description, p.status,
               p.shareable_link_id, p.link_password, p.link_expiry, p.link_disabled,
               p.google_drive_folder_id, p.created_at, p.updated_at,
               COUNT(a.id) AS total_assets,
               COUNT(a.id) FILTER (WHERE a.status = 'approved') AS approved_assets
        FROM projects p
        LEFT JOIN assets a ON a.project_id = p.id
        WHERE p.user_id = $1
        GROUP BY p.id
        ORDER BY p.created_at DESC
        "#,
    )
    .bind(owner.id)
    .fetch_all(&state.pool)
    .await?;

    debug!(user_id = %owner.id, count = rows.len(), "Listed projects");

    let projects = rows
        .into_iter()
        .map(|row| ProjectSummary {
            completion_percentage: completion_percentage(row.approved_assets, row.total_assets),
            total_assets: row.total_assets,
            approved_assets: row.approved_assets,
            project: row.project,
        })
        .collect();
    Ok(Json(projects))
}

#[utoipa::path(
    post,
    path = "/api/projects",
    tag = "projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 400, description = "Missing name")
    ),
    security(("bearer" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    owner: CurrentOwner,
    Json(body): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Project name is required"));
    }

    let project = sqlx::query_as::<_, Project>(
        r#"
        INSERT INTO projects (user_id, name, client_name, description, shareable_link_id)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, user_id, name, client_name, description, status, shareable_link_id,
                  link_password, link_expiry, link_disabled, google_drive_folder_id,
                  created_at, updated_at
        "#,
    )
    .bind(owner.id)
    .bind(name)
    .bind(body.client_name.as_deref().map(str::trim).filter(|s| !s.is_empty()))
    .bind(body.description.as_deref())
    .bind(new_link_id())
    .fetch_one(&state.pool)
    .await?;

    activity::record(
        &state.pool,
        project.id,
        Some(owner.id),
        ActivityAction::ProjectCreated,
        json!({ "name": project.name }),
    )
    .await;

    info!(project_id = %project.id, user_id = %owner.id, "Project created");
    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}",
    tag = "projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project with its form", body = ProjectDetail),
        (status = 404, description = "Project not found")
    ),
    security(("bearer" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    owner: CurrentOwner,
) -> Result<Json<ProjectDetail>, AppError> {
    let project = owned_project(&state.pool, project_id, owner.id).await?;
    let form_fields = form_fields(&state.pool, project_id).await?;

    Ok(Json(ProjectDetail {
        has_password: project.has_password(),
        project,
        form_fields,
    }))
}

#[utoipa::path(
    patch,
    path = "/api/projects/{id}",
    tag = "projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Updated project", body = Project),
        (status = 400, description = "Invalid settings"),
        (status = 404, description = "Project not found")
    ),
    security(("bearer" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    owner: CurrentOwner,
    Json(body): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, AppError> {
    let current = owned_project(&state.pool, project_id, owner.id).await?;
    let mut next = current.clone();
    let mut updated_fields: Vec<&'static str> = Vec::new();

    if let Some(name) = body.name {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("Project name cannot be empty"));
        }
        next.name = name.to_string();
        updated_fields.push("name");
    }
    if let Some(client_name) = body.client_name {
        next.client_name = client_name;
        updated_fields.push("client_name");
    }
    if let Some(description) = body.description {
        next.description = description;
        updated_fields.push("description");
    }
    if let Some(status) = body.status {
        next.status = status;
        updated_fields.push("status");
    }
    if let Some(password) = body.link_password {
        next.link_password = password.filter(|p| !p.is_empty());
        updated_fields.push("link_password");
    }
    if let Some(expiry) = body.link_expiry {
        next.link_expiry = expiry;
        updated_fields.push("link_expiry");
    }
    if let Some(disabled) = body.link_disabled {
        next.link_disabled = disabled;
        updated_fields.push("link_disabled");
    }

    if updated_fields.is_empty() {
        return Ok(Json(current));
    }

    let project = sqlx::query_as::<_, Project>(
        r#"
        UPDATE projects
        SET name = $2, client_name = $3, description = $4, status = $5,
            link_password = $6, link_expiry = $7, link_disabled = $8, updated_at = NOW()
        WHERE id = $1
        RETURNING id, user_id, name, client_name, description, status, shareable_link_id,
                  link_password, link_expiry, link_disabled, google_drive_folder_id,
                  created_at, updated_at
        "#,
    )
    .bind(project_id)
    .bind(&next.name)
    .bind(&next.client_name)
    .bind(&next.description)
    .bind(next.status)
    .bind(&next.link_password)
    .bind(next.link_expiry)
    .bind(next.link_disabled)
    .fetch_one(&state.pool)
    .await?;

    for (action, details) in link_setting_changes(&current, &project) {
        activity::record(&state.pool, project_id, Some(owner.id), action, details).await;
    }
    activity::record(
        &state.pool,
        project_id,
        Some(owner.id),
        ActivityAction::ProjectUpdated,
        json!({ "updated_fields": updated_fields }),
    )
    .await;

    info!(project_id = %project_id, fields = ?updated_fields, "Project settings updated");
    Ok(Json(project))
}

/// Activity entries for the link settings that actually changed.
pub fn link_setting_changes(
    before: &Project,
    after: &Project,
) -> Vec<(ActivityAction, serde_json::Value)> {
    let mut changes = Vec::new();

    if before.has_password() != after.has_password() {
        let action = if after.has_password() {
            ActivityAction::LinkPasswordEnabled
        } else {
            ActivityAction::LinkPasswordDisabled
        };
        changes.push((action, json!({})));
    }
    if before.link_expiry != after.link_expiry {
        changes.push((
            ActivityAction::LinkExpiryUpdated,
            json!({ "link_expiry": after.link_expiry }),
        ));
    }
    if before.link_disabled != after.link_disabled {
        let action = if after.link_disabled {
            ActivityAction::LinkDisabled
        } else {
            ActivityAction::LinkEnabled
        };
        changes.push((action, json!({})));
    }
    changes
}

#[utoipa::path(
    post,
    path = "/api/projects/{id}/archive",
    tag = "projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Archived project", body = Project),
        (status = 404, description = "Project not found")
    ),
    security(("bearer" = []))
)]
pub async fn archive_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    owner: CurrentOwner,
) -> Result<Json<Project>, AppError> {
    let project = sqlx::query_as::<_, Project>(
        r#"
        UPDATE projects
        SET status = $3, updated_at = NOW()
        WHERE id = $1 AND user_id = $2
        RETURNING id, user_id, name, client_name, description, status, shareable_link_id,
                  link_password, link_expiry, link_disabled, google_drive_folder_id,
                  created_at, updated_at
        "#,
    )
    .bind(project_id)
    .bind(owner.id)
    .bind(ProjectStatus::Archived)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("Project not found"))?;

    activity::record(
        &state.pool,
        project_id,
        Some(owner.id),
        ActivityAction::ProjectArchived,
        json!({ "name": project.name }),
    )
    .await;

    Ok(Json(project))
}

#[utoipa::path(
    delete,
    path = "/api/projects/{id}",
    tag = "projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project deleted", body = SuccessResponse),
        (status = 404, description = "Project not found")
    ),
    security(("bearer" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    owner: CurrentOwner,
) -> Result<Json<SuccessResponse>, AppError> {
    let project = owned_project(&state.pool, project_id, owner.id).await?;

    if let Some(folder_id) = project.google_drive_folder_id.as_deref() {
        match DriveSession::open(&state, owner.id).await {
            Ok(mut session) => {
                session.delete_best_effort(folder_id).await;
            }
            Err(err) => {
                warn!(project_id = %project_id, error = %err, "Skipping drive folder cleanup");
            }
        }
    }

    let mut tx = state.pool.begin().await?;
    let purged = activity::purge_project(&mut *tx, project_id).await?;
    sqlx::query("DELETE FROM projects WHERE id = $1")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(project_id = %project_id, activity_rows = purged, "Project deleted");
    Ok(Json(SuccessResponse::ok()))
}

#[utoipa::path(
    put,
    path = "/api/projects/{id}/form",
    tag = "projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    request_body = SaveFormRequest,
    responses(
        (status = 200, description = "Saved form fields", body = SaveFormResponse),
        (status = 400, description = "Invalid field"),
        (status = 404, description = "Project not found")
    ),
    security(("bearer" = []))
)]
pub async fn save_form(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    owner: CurrentOwner,
    Json(body): Json<SaveFormRequest>,
) -> Result<Json<SaveFormResponse>, AppError> {
    owned_project(&state.pool, project_id, owner.id).await?;

    if let Some(pos) = body.fields.iter().position(|f| f.label.trim().is_empty()) {
        return Err(AppError::Invalid(format!("Field {} needs a label", pos + 1)));
    }
    if body.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(AppError::BadRequest("Project name cannot be empty"));
    }

    // Existing ids survive the rewrite so asset links stay intact.
    let mut seen = HashSet::new();
    let ids: Vec<Uuid> = body
        .fields
        .iter()
        .map(|f| {
            f.id.as_deref()
                .and_then(|raw| Uuid::parse_str(raw).ok())
                .filter(|id| seen.insert(*id))
                .unwrap_or_else(Uuid::new_v4)
        })
        .collect();

    let mut tx = state.pool.begin().await?;

    if body.name.is_some() || body.client_name.is_some() || body.description.is_some() {
        sqlx::query(
            r#"
            UPDATE projects
            SET name = COALESCE($2, name),
                client_name = COALESCE($3, client_name),
                description = COALESCE($4, description),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(project_id)
        .bind(body.name.as_deref().map(str::trim))
        .bind(body.client_name.as_deref())
        .bind(body.description.as_deref())
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query(
        r#"
        UPDATE assets
        SET form_field_id = NULL, updated_at = NOW()
        WHERE project_id = $1
          AND form_field_id IS NOT NULL
          AND NOT (form_field_id = ANY($2))
        "#,
    )
    .bind(project_id)
    .bind(&ids)
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM form_fields WHERE project_id = $1")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

    let mut fields = Vec::with_capacity(body.fields.len());
    for (order, (input, id)) in body.fields.iter().zip(&ids).enumerate() {
        let field = sqlx::query_as::<_, FormField>(
            r#"
            INSERT INTO form_fields
                (id, project_id, field_type, label, help_text, internal_note, is_required,
                 field_order, storage_subfolder)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, project_id, field_type, label, help_text, internal_note, is_required,
                      field_order, storage_subfolder, created_at
            "#,
        )
        .bind(id)
        .bind(project_id)
        .bind(input.field_type)
        .bind(input.label.trim())
        .bind(&input.help_text)
        .bind(&input.internal_note)
        .bind(input.is_required)
        .bind(order as i32)
        .bind(
            input
                .storage_subfolder
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty()),
        )
        .fetch_one(&mut *tx)
        .await?;
        fields.push(field);
    }

    activity::log_action(
        &mut *tx,
        NewActivity {
            project_id,
            user_id: Some(owner.id),
            action: ActivityAction::FormUpdated,
            details: json!({ "field_count": fields.len() }),
        },
    )
    .await?;

    tx.commit().await?;

    info!(project_id = %project_id, fields = fields.len(), "Form saved");
    Ok(Json(SaveFormResponse {
        success: true,
        fields,
    }))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}/assets",
    tag = "projects",
    params(("id" = Uuid, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Assets grouped by form field", body = ProjectAssetsResponse),
        (status = 404, description = "Project not found")
    ),
    security(("bearer" = []))
)]
pub async fn list_assets(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    owner: CurrentOwner,
) -> Result<Json<ProjectAssetsResponse>, AppError> {
    let project = owned_project(&state.pool, project_id, owner.id).await?;

    let assets = sqlx::query_as::<_, Asset>(
        r#"
        SELECT id, project_id, form_field_id, file_name, file_type, file_size,
               google_drive_file_id, status, uploaded_by, metadata, rejection_reason,
               approval_remark, client_email, created_at, updated_at
        FROM assets
        WHERE project_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(project_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(ProjectAssetsResponse {
        project: ProjectRef {
            id: project.id,
            name: project.name,
        },
        assets: GroupedAssets::from_assets(assets),
    }))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}/download",
    tag = "projects",
    params(
        ("id" = Uuid, Path, description = "Project ID"),
        DownloadQuery
    ),
    responses(
        (status = 200, description = "Drive download link", body = DownloadResponse),
        (status = 400, description = "Missing file id"),
        (status = 404, description = "Asset not found")
    ),
    security(("bearer" = []))
)]
pub async fn download_asset(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<DownloadQuery>,
    owner: CurrentOwner,
) -> Result<Json<DownloadResponse>, AppError> {
    let file_id = query
        .file_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(AppError::BadRequest("File ID is required"))?;

    owned_project(&state.pool, project_id, owner.id).await?;

    let asset = sqlx::query_as::<_, Asset>(
        r#"
        SELECT id, project_id, form_field_id, file_name, file_type, file_size,
               google_drive_file_id, status, uploaded_by, metadata, rejection_reason,
               approval_remark, client_email, created_at, updated_at
        FROM assets
        WHERE project_id = $1 AND google_drive_file_id = $2
        LIMIT 1
        "#,
    )
    .bind(project_id)
    .bind(file_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::NotFound("Asset not found"))?;

    if asset.is_text_response() {
        return Err(AppError::BadRequest("Text responses have no downloadable file"));
    }

    let mut session = DriveSession::open(&state, owner.id).await?;
    let file = session.get_file(file_id).await?;
    let download_url = file
        .download_link()
        .map(str::to_string)
        .ok_or(AppError::NotFound("Download link not available"))?;

    activity::record(
        &state.pool,
        project_id,
        Some(owner.id),
        ActivityAction::AssetDownloaded,
        json!({ "asset_id": asset.id, "file_name": asset.file_name }),
    )
    .await;

    Ok(Json(DownloadResponse {
        success: true,
        download_url,
        file_name: asset.file_name,
    }))
}

#[utoipa::path(
    get,
    path = "/api/projects/{id}/activity",
    tag = "projects",
    params(
        ("id" = Uuid, Path, description = "Project ID"),
        ActivityQuery
    ),
    responses(
        (status = 200, description = "Activity, newest first", body = [ActivityLog]),
        (status = 404, description = "Project not found")
    ),
    security(("bearer" = []))
)]
pub async fn list_activity(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
    Query(query): Query<ActivityQuery>,
    owner: CurrentOwner,
) -> Result<Json<Vec<ActivityLog>>, AppError> {
    owned_project(&state.pool, project_id, owner.id).await?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT);
    let rows = activity::list_for_project(&state.pool, project_id, limit).await?;
    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn project() -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "Rebrand".into(),
            client_name: None,
            description: None,
            status: ProjectStatus::Pending,
            shareable_link_id: new_link_id(),
            link_password: None,
            link_expiry: None,
            link_disabled: false,
            google_drive_folder_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn completion_rounds_and_handles_empty_projects() {
        assert_eq!(completion_percentage(0, 0), 0);
        assert_eq!(completion_percentage(1, 3), 33);
        assert_eq!(completion_percentage(2, 3), 67);
        assert_eq!(completion_percentage(4, 4), 100);
    }

    #[test]
    fn link_ids_are_twelve_hex_chars() {
        let id = new_link_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_link_id());
    }

    #[test]
    fn only_changed_link_settings_are_logged() {
        let before = project();
        let mut after = before.clone();
        after.link_password = Some("pw".into());
        after.link_disabled = true;

        let actions: Vec<_> = link_setting_changes(&before, &after)
            .into_iter()
            .map(|(a, _)| a)
            .collect();
        assert_eq!(
            actions,
            vec![ActivityAction::LinkPasswordEnabled, ActivityAction::LinkDisabled]
        );
    }

    #[test]
    fn clearing_password_and_moving_expiry() {
        let mut before = project();
        before.link_password = Some("pw".into());
        let mut after = before.clone();
        after.link_password = None;
        after.link_expiry = Some(Utc::now() + Duration::days(7));

        let actions: Vec<_> = link_setting_changes(&before, &after)
            .into_iter()
            .map(|(a, _)| a)
            .collect();
        assert_eq!(
            actions,
            vec![ActivityAction::LinkPasswordDisabled, ActivityAction::LinkExpiryUpdated]
        );
    }
}
