use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use subtle::ConstantTimeEq;
use time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::CurrentOwner;
use crate::drive::{tokens, DriveSession};
use crate::dtos::{
    AuthUrlResponse, DeleteFileRequest, DeleteFolderRequest, DriveCallbackQuery,
    DriveStatusResponse, RefreshTokenResponse, SuccessResponse,
};
use crate::error::AppError;
use crate::routes::app_redirect;
use crate::state::AppState;

const STATE_COOKIE: &str = "assetdrop-drive-state";
const OWNER_COOKIE: &str = "assetdrop-drive-owner";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/google-drive/auth-url", get(auth_url))
        .route("/api/google-drive/callback", get(callback))
        .route("/api/google-drive/refresh-token", post(refresh_token))
        .route("/api/google-drive/delete-file", delete(delete_file))
        .route("/api/google-drive/delete-folder", delete(delete_folder))
        .route("/api/google-drive/status", get(status))
        .route("/api/google-drive/disconnect", delete(disconnect))
}

#[utoipa::path(
    get,
    path = "/api/google-drive/auth-url",
    tag = "google-drive",
    responses(
        (status = 200, description = "Consent URL", body = AuthUrlResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer" = []))
)]
pub async fn auth_url(
    State(state): State<AppState>,
    owner: CurrentOwner,
    jar: PrivateCookieJar,
) -> (PrivateCookieJar, Json<AuthUrlResponse>) {
    let (url, csrf) = state.oauth.authorize_url();
    info!(user_id = %owner.id, "Issued Google Drive consent URL");

    let jar = jar
        .add(flow_cookie(STATE_COOKIE, csrf))
        .add(flow_cookie(OWNER_COOKIE, owner.id.to_string()));
    (jar, Json(AuthUrlResponse { url }))
}

#[utoipa::path(
    get,
    path = "/api/google-drive/callback",
    tag = "google-drive",
    params(DriveCallbackQuery),
    responses((status = 303, description = "Redirect to the dashboard with the outcome"))
)]
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<DriveCallbackQuery>,
    jar: PrivateCookieJar,
) -> Response {
    let expected_state = jar.get(STATE_COOKIE).map(|c| c.value().to_owned());
    let owner_id = jar
        .get(OWNER_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok());
    let jar = jar
        .remove(clear_cookie(STATE_COOKIE))
        .remove(clear_cookie(OWNER_COOKIE));

    let (key, value) = complete_consent(&state, &query, expected_state, owner_id).await;
    (jar, app_redirect(&state.config.app_url, "/dashboard", &[(key, value.as_str())])).into_response()
}

/// Dashboard query parameter describing how the consent round-trip ended.
async fn complete_consent(
    state: &AppState,
    query: &DriveCallbackQuery,
    expected_state: Option<String>,
    owner_id: Option<Uuid>,
) -> (&'static str, String) {
    if let Some(error) = query.error.as_deref() {
        warn!(error, "Google consent was not granted");
        return ("error", error.to_string());
    }
    let Some(code) = query.code.as_deref() else {
        return ("error", "missing_code".to_string());
    };

    let state_matches = match (query.state.as_deref(), expected_state.as_deref()) {
        (Some(got), Some(want)) => bool::from(got.as_bytes().ct_eq(want.as_bytes())),
        _ => false,
    };
    if !state_matches {
        warn!("Drive callback state mismatch");
        return ("error", "invalid_state".to_string());
    }
    let Some(owner_id) = owner_id else {
        return ("error", "auth_required".to_string());
    };

    let stored = match state.oauth.exchange_code(code).await {
        Ok(grant) => tokens::store_grant(&state.pool, owner_id, &grant).await,
        Err(err) => Err(AppError::OAuth(err)),
    };
    match stored {
        Ok(token) => {
            info!(user_id = %owner_id, expires_at = %token.token_expiry, "Google Drive connected");
            ("drive_connected", "true".to_string())
        }
        Err(err) => {
            warn!(user_id = %owner_id, error = %err, "Drive callback failed");
            ("error", "callback_failed".to_string())
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/google-drive/refresh-token",
    tag = "google-drive",
    responses(
        (status = 200, description = "Refreshed token", body = RefreshTokenResponse),
        (status = 401, description = "Grant revoked; reconnect required"),
        (status = 404, description = "No stored token")
    ),
    security(("bearer" = []))
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    owner: CurrentOwner,
) -> Result<Json<RefreshTokenResponse>, AppError> {
    let token = tokens::load(&state.pool, owner.id)
        .await?
        .ok_or(AppError::NotFound("No Google Drive token found"))?;

    let refreshed = tokens::refresh_stored_token(&state.pool, state.oauth.as_ref(), &token).await?;
    Ok(Json(RefreshTokenResponse {
        access_token: refreshed.access_token,
        refresh_token: refreshed.refresh_token,
        expires_at: refreshed.token_expiry,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/google-drive/delete-file",
    tag = "google-drive",
    request_body = DeleteFileRequest,
    responses(
        (status = 200, description = "File deleted", body = SuccessResponse),
        (status = 403, description = "Drive not connected")
    ),
    security(("bearer" = []))
)]
pub async fn delete_file(
    State(state): State<AppState>,
    owner: CurrentOwner,
    Json(body): Json<DeleteFileRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let file_id = body.file_id.trim();
    if file_id.is_empty() {
        return Err(AppError::BadRequest("File ID is required"));
    }

    let mut session = DriveSession::open(&state, owner.id).await?;
    session.delete_file(file_id).await?;
    info!(user_id = %owner.id, file_id, "Drive file deleted");
    Ok(Json(SuccessResponse::ok()))
}

#[utoipa::path(
    delete,
    path = "/api/google-drive/delete-folder",
    tag = "google-drive",
    request_body = DeleteFolderRequest,
    responses(
        (status = 200, description = "Folder deleted", body = SuccessResponse),
        (status = 403, description = "Drive not connected")
    ),
    security(("bearer" = []))
)]
pub async fn delete_folder(
    State(state): State<AppState>,
    owner: CurrentOwner,
    Json(body): Json<DeleteFolderRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let folder_id = body.folder_id.trim();
    if folder_id.is_empty() {
        return Err(AppError::BadRequest("Folder ID is required"));
    }

    // folders are files in Drive; deleting one trashes its contents too
    let mut session = DriveSession::open(&state, owner.id).await?;
    session.delete_file(folder_id).await?;
    info!(user_id = %owner.id, folder_id, "Drive folder deleted");
    Ok(Json(SuccessResponse::ok()))
}

#[utoipa::path(
    get,
    path = "/api/google-drive/status",
    tag = "google-drive",
    responses((status = 200, description = "Connection status", body = DriveStatusResponse)),
    security(("bearer" = []))
)]
pub async fn status(
    State(state): State<AppState>,
    owner: CurrentOwner,
) -> Result<Json<DriveStatusResponse>, AppError> {
    let token = tokens::load(&state.pool, owner.id).await?;
    Ok(Json(DriveStatusResponse {
        connected: token.is_some(),
        expires_at: token.map(|t| t.token_expiry),
    }))
}

#[utoipa::path(
    delete,
    path = "/api/google-drive/disconnect",
    tag = "google-drive",
    responses((status = 200, description = "Stored token removed", body = SuccessResponse)),
    security(("bearer" = []))
)]
pub async fn disconnect(
    State(state): State<AppState>,
    owner: CurrentOwner,
) -> Result<Json<SuccessResponse>, AppError> {
    let removed = tokens::delete(&state.pool, owner.id).await?;
    info!(user_id = %owner.id, removed, "Google Drive disconnected");
    Ok(Json(SuccessResponse::ok()))
}

fn flow_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build(Cookie::new(name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::minutes(15))
        .build()
}

fn clear_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build(Cookie::new(name, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}
