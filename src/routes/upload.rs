use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::json;
use sqlx::types::Json as Jsonb;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::activity;
use crate::drive::{folders, DriveSession, FileUpload};
use crate::dtos::{SubmitTextRequest, SubmitTextResponse, UploadResponse};
use crate::error::AppError;
use crate::models::{ActivityAction, Asset, FormField, CLIENT_UPLOADER, TEXT_RESPONSE_SENTINEL};
use crate::portal::gate::{self, LinkSettings};
use crate::portal::validation::{check_client_email, check_file_name, check_text, text_file_name};
use crate::routes::projects::{find_project, form_fields};
use crate::state::AppState;

const DEFAULT_MIME: &str = "application/octet-stream";
// file_type column width
const MAX_MIME_LEN: usize = 255;

pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/api/upload",
            post(upload_file).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/api/submit-text", post(submit_text))
}

#[derive(Default)]
struct UploadForm {
    file: Option<(String, String, Bytes)>,
    project_id: Option<String>,
    form_field_id: Option<String>,
    client_email: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Invalid(e.body_text()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "upload.bin".to_string());
                let mime = field
                    .content_type()
                    .filter(|m| m.len() <= MAX_MIME_LEN)
                    .map(str::to_string)
                    .unwrap_or_else(|| DEFAULT_MIME.to_string());
                let bytes = field.bytes().await.map_err(|e| {
                    warn!(error = %e, "Failed to read uploaded file");
                    AppError::Invalid(e.body_text())
                })?;
                form.file = Some((file_name, mime, bytes));
            }
            "projectId" => form.project_id = non_empty(field.text().await.ok()),
            "formFieldId" => form.form_field_id = non_empty(field.text().await.ok()),
            "clientEmail" => form.client_email = non_empty(field.text().await.ok()),
            other => debug!(field = other, "Ignoring unknown multipart field"),
        }
    }
    Ok(form)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn project_field(
    state: &AppState,
    project_id: Uuid,
    field_id: Uuid,
) -> Result<FormField, AppError> {
    sqlx::query_as::<_, FormField>(
        r#"
        SELECT id, project_id, field_type, label, help_text, internal_note, is_required,
               field_order, storage_subfolder, created_at
        FROM form_fields
        WHERE id = $1 AND project_id = $2
        "#,
    )
    .bind(field_id)
    .bind(project_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or(AppError::BadRequest("Form field does not belong to this project"))
}

#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "intake",
    request_body(
        content = String,
        content_type = "multipart/form-data",
        description = "Fields: file, projectId, formFieldId (optional), clientEmail (optional)"
    ),
    responses(
        (status = 200, description = "File stored in the owner's drive", body = UploadResponse),
        (status = 400, description = "Missing file or project id"),
        (status = 403, description = "Drive not connected or link disabled"),
        (status = 404, description = "Project not found"),
        (status = 410, description = "Link expired")
    )
)]
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    info!("File upload request received");

    let form = read_form(multipart).await?;
    let (Some((file_name, mime_type, bytes)), Some(raw_project_id)) = (form.file, form.project_id)
    else {
        return Err(AppError::BadRequest("Missing file or projectId"));
    };
    let project_id =
        Uuid::parse_str(&raw_project_id).map_err(|_| AppError::BadRequest("Invalid projectId"))?;
    check_file_name(&file_name).map_err(AppError::Invalid)?;
    check_client_email(form.client_email.as_deref()).map_err(AppError::Invalid)?;

    let project = find_project(&state.pool, project_id).await?;
    gate::ensure_available(&LinkSettings::from(&project), Utc::now())?;

    let field = match form.form_field_id.as_deref() {
        Some(raw) => {
            let field_id =
                Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("Invalid formFieldId"))?;
            Some(project_field(&state, project_id, field_id).await?)
        }
        None => None,
    };

    let mut session = DriveSession::open(&state, project.user_id).await?;
    let subfolder = field.as_ref().and_then(|f| f.storage_subfolder.as_deref());
    let folder_id = folders::resolve_upload_folder(
        &state.pool,
        &state.folder_locks,
        &mut session,
        &project,
        subfolder,
    )
    .await?;

    let size = bytes.len() as i64;
    let upload = FileUpload {
        name: file_name.clone(),
        mime_type: mime_type.clone(),
        parent_id: folder_id,
        bytes,
    };
    let drive_file = session.upload_file(&upload).await?;
    debug!(file_id = %drive_file.id, "File stored in drive");

    let inserted = sqlx::query_as::<_, Asset>(
        r#"
        INSERT INTO assets
            (project_id, form_field_id, file_name, file_type, file_size,
             google_drive_file_id, uploaded_by, client_email)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, project_id, form_field_id, file_name, file_type, file_size,
                  google_drive_file_id, status, uploaded_by, metadata, rejection_reason,
                  approval_remark, client_email, created_at, updated_at
        "#,
    )
    .bind(project_id)
    .bind(field.as_ref().map(|f| f.id))
    .bind(&file_name)
    .bind(&mime_type)
    .bind(drive_file.size_bytes().unwrap_or(size))
    .bind(&drive_file.id)
    .bind(CLIENT_UPLOADER)
    .bind(&form.client_email)
    .fetch_one(&state.pool)
    .await;

    // No row means no way to find the file again; take it back out of the drive.
    let asset = match inserted {
        Ok(asset) => asset,
        Err(err) => {
            warn!(project_id = %project_id, file_id = %drive_file.id, error = ?err, "Asset insert failed after upload");
            session.delete_best_effort(&drive_file.id).await;
            return Err(err.into());
        }
    };

    activity::record(
        &state.pool,
        project_id,
        None,
        ActivityAction::AssetUploaded,
        json!({
            "asset_id": asset.id,
            "file_name": asset.file_name,
            "file_size": asset.file_size,
            "client_email": asset.client_email,
        }),
    )
    .await;

    info!(project_id = %project_id, asset_id = %asset.id, "Upload complete");
    Ok(Json(UploadResponse {
        success: true,
        asset,
    }))
}

#[utoipa::path(
    post,
    path = "/api/submit-text",
    tag = "intake",
    request_body = SubmitTextRequest,
    responses(
        (status = 200, description = "Text responses stored", body = SubmitTextResponse),
        (status = 400, description = "Invalid response"),
        (status = 404, description = "Project not found")
    )
)]
pub async fn submit_text(
    State(state): State<AppState>,
    Json(body): Json<SubmitTextRequest>,
) -> Result<Json<SubmitTextResponse>, AppError> {
    if body.text_responses.is_empty() {
        return Err(AppError::BadRequest("No text responses provided"));
    }

    let project = find_project(&state.pool, body.project_id).await?;
    gate::ensure_available(&LinkSettings::from(&project), Utc::now())?;

    let fields: HashMap<Uuid, FormField> = form_fields(&state.pool, project.id)
        .await?
        .into_iter()
        .map(|f| (f.id, f))
        .collect();

    // Validate everything before writing anything.
    let mut rows = Vec::with_capacity(body.text_responses.len());
    for response in &body.text_responses {
        let content = response.metadata.content();
        if content.trim().is_empty() {
            return Err(AppError::BadRequest("Response content cannot be empty"));
        }

        let field = match response.form_field_id {
            Some(id) => Some(
                fields
                    .get(&id)
                    .ok_or(AppError::BadRequest("Form field does not belong to this project"))?,
            ),
            None => None,
        };
        let label = match field {
            Some(field) => {
                if field.field_type != response.metadata.field_type() {
                    return Err(AppError::BadRequest("Response type does not match form field"));
                }
                field.label.as_str()
            }
            None => "Response",
        };
        check_text(response.metadata.field_type(), label, content).map_err(AppError::Invalid)?;

        let file_name = response
            .file_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| text_file_name(label));
        check_file_name(&file_name).map_err(AppError::Invalid)?;
        check_client_email(response.client_email.as_deref()).map_err(AppError::Invalid)?;
        rows.push((response, file_name, content.len() as i64));
    }

    let mut tx = state.pool.begin().await?;
    let mut assets = Vec::with_capacity(rows.len());
    for (response, file_name, size) in rows {
        let asset = sqlx::query_as::<_, Asset>(
            r#"
            INSERT INTO assets
                (project_id, form_field_id, file_name, file_type, file_size,
                 google_drive_file_id, uploaded_by, metadata, client_email)
            VALUES ($1, $2, $3, 'text/plain', $4, $5, $6, $7, $8)
            RETURNING id, project_id, form_field_id, file_name, file_type, file_size,
                      google_drive_file_id, status, uploaded_by, metadata, rejection_reason,
                      approval_remark, client_email, created_at, updated_at
            "#,
        )
        .bind(project.id)
        .bind(response.form_field_id)
        .bind(&file_name)
        .bind(size)
        .bind(TEXT_RESPONSE_SENTINEL)
        .bind(CLIENT_UPLOADER)
        .bind(Jsonb(&response.metadata))
        .bind(&response.client_email)
        .fetch_one(&mut *tx)
        .await?;
        assets.push(asset);
    }
    tx.commit().await?;

    activity::record(
        &state.pool,
        project.id,
        None,
        ActivityAction::AssetUploaded,
        json!({
            "text_responses": assets.len(),
            "asset_ids": assets.iter().map(|a| a.id).collect::<Vec<_>>(),
            "client_email": body.text_responses.iter().find_map(|r| r.client_email.clone()),
        }),
    )
    .await;

    info!(project_id = %project.id, count = assets.len(), "Text responses stored");
    Ok(Json(SubmitTextResponse {
        success: true,
        count: assets.len(),
        assets,
    }))
}
