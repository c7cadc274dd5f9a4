use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

use crate::drive::DriveFile;
use crate::dtos::{
    ApproveRequest, AuthUrlResponse, BatchSendResponse, CheckResult, CreateProjectRequest,
    DeleteFileRequest, DeleteFolderRequest, DownloadResponse, DriveStatusResponse,
    FormFieldInput, GroupedAssets, HealthChecks, HealthResponse, PortalField, PortalProject,
    PortalView, ProjectAssetsResponse, ProjectDetail, ProjectRef, ProjectSummary,
    RefreshTokenResponse, RejectRequest, ReviewBatchResponse, ReviewResponse, SaveFormRequest,
    SaveFormResponse, SendReviewNotificationRequest, SendReviewNotificationResponse,
    SubmissionStatus, SubmissionsResponse, SubmitTextRequest, SubmitTextResponse,
    SuccessResponse, TextResponseInput, UnlockRequest, UpdateProjectRequest, UploadResponse,
};
use crate::models::{
    ActivityAction, ActivityLog, Asset, AssetStatus, FieldType, FormField, Project, ProjectStatus,
    ResponseMetadata,
};
use crate::notify::delivery::{ClientReviewCounts, ReviewSummary};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::auth::auth_callback,
        crate::routes::auth::google_callback,
        crate::routes::drive::auth_url,
        crate::routes::drive::callback,
        crate::routes::drive::refresh_token,
        crate::routes::drive::delete_file,
        crate::routes::drive::delete_folder,
        crate::routes::drive::status,
        crate::routes::drive::disconnect,
        crate::routes::upload::upload_file,
        crate::routes::upload::submit_text,
        crate::routes::projects::list_projects,
        crate::routes::projects::create_project,
        crate::routes::projects::get_project,
        crate::routes::projects::update_project,
        crate::routes::projects::archive_project,
        crate::routes::projects::delete_project,
        crate::routes::projects::save_form,
        crate::routes::projects::list_assets,
        crate::routes::projects::download_asset,
        crate::routes::projects::list_activity,
        crate::routes::review::approve_asset,
        crate::routes::review::reject_asset,
        crate::routes::review::review_batch,
        crate::routes::review::send_review_batch,
        crate::routes::review::reset_review_batch,
        crate::routes::review::stop_review_batch,
        crate::routes::notifications::send_review_notification,
        crate::routes::portal::open_portal,
        crate::routes::portal::unlock_portal,
        crate::routes::portal::list_submissions,
        crate::routes::health::health_check,
    ),
    components(schemas(
        Project,
        ProjectStatus,
        FormField,
        FieldType,
        Asset,
        AssetStatus,
        ResponseMetadata,
        ActivityLog,
        ActivityAction,
        DriveFile,
        SuccessResponse,
        AuthUrlResponse,
        RefreshTokenResponse,
        DeleteFileRequest,
        DeleteFolderRequest,
        DriveStatusResponse,
        UploadResponse,
        TextResponseInput,
        SubmitTextRequest,
        SubmitTextResponse,
        ProjectSummary,
        CreateProjectRequest,
        ProjectDetail,
        UpdateProjectRequest,
        FormFieldInput,
        SaveFormRequest,
        SaveFormResponse,
        ProjectRef,
        GroupedAssets,
        ProjectAssetsResponse,
        DownloadResponse,
        ApproveRequest,
        RejectRequest,
        ReviewResponse,
        ReviewBatchResponse,
        BatchSendResponse,
        ClientReviewCounts,
        ReviewSummary,
        SendReviewNotificationRequest,
        SendReviewNotificationResponse,
        PortalProject,
        PortalField,
        PortalView,
        UnlockRequest,
        SubmissionStatus,
        SubmissionsResponse,
        CheckResult,
        HealthChecks,
        HealthResponse,
    )),
    tags(
        (name = "auth", description = "Owner sign-in callbacks"),
        (name = "google-drive", description = "Drive connection and file management"),
        (name = "intake", description = "Client file and text submissions"),
        (name = "projects", description = "Project, form and asset management"),
        (name = "review", description = "Asset review and notification batching"),
        (name = "notifications", description = "Review result emails"),
        (name = "portal", description = "Public collection portal"),
        (name = "health", description = "Cron-invoked health check"),
    ),
    info(
        title = "AssetDrop API",
        version = "1.0.0",
        description = "Collect client assets into the owner's Google Drive, review them, and notify clients"
    ),
    servers(
        (url = "http://localhost:3000", description = "Development server")
    )
)]
pub struct ApiDoc;

pub fn openapi_with_security() -> utoipa::openapi::OpenApi {
    let mut openapi = ApiDoc::openapi();
    if let Some(components) = openapi.components.as_mut() {
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
    openapi
}
