use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::models::{Asset, AssetStatus, FieldType, FormField, Project, ProjectStatus, ResponseMetadata};
use crate::notify::delivery::{ClientReviewCounts, ReviewSummary};

#[derive(Debug, Serialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        SuccessResponse { success: true }
    }
}

// ---- google drive ----

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthUrlResponse {
    pub url: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DriveCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshTokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteFileRequest {
    #[serde(rename = "fileId")]
    pub file_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DeleteFolderRequest {
    #[serde(rename = "folderId")]
    pub folder_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DriveStatusResponse {
    pub connected: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

// ---- intake ----

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub asset: Asset,
}

/// One inline text answer from the portal.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TextResponseInput {
    pub form_field_id: Option<Uuid>,
    pub file_name: Option<String>,
    pub metadata: ResponseMetadata,
    pub client_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitTextRequest {
    #[serde(rename = "projectId")]
    pub project_id: Uuid,
    #[serde(rename = "textResponses")]
    pub text_responses: Vec<TextResponseInput>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SubmitTextResponse {
    pub success: bool,
    pub count: usize,
    pub assets: Vec<Asset>,
}

// ---- projects ----

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub total_assets: i64,
    pub approved_assets: i64,
    /// Rounded share of approved assets, 0 when the project is empty
    pub completion_percentage: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    pub name: String,
    pub client_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub has_password: bool,
    pub form_fields: Vec<FormField>,
}

/// Settings edit. Absent keys are left alone; `null` clears nullable ones.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct UpdateProjectRequest {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub client_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    pub status: Option<ProjectStatus>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub link_password: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub link_expiry: Option<Option<DateTime<Utc>>>,
    pub link_disabled: Option<bool>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FormFieldInput {
    /// Existing field id; kept when it is a valid UUID
    pub id: Option<String>,
    pub field_type: FieldType,
    pub label: String,
    pub help_text: Option<String>,
    pub internal_note: Option<String>,
    #[serde(default)]
    pub is_required: bool,
    pub storage_subfolder: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SaveFormRequest {
    pub name: Option<String>,
    pub client_name: Option<String>,
    pub description: Option<String>,
    pub fields: Vec<FormFieldInput>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SaveFormResponse {
    pub success: bool,
    pub fields: Vec<FormField>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectRef {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct GroupedAssets {
    /// Assets keyed by the form field they answer
    #[schema(value_type = Object)]
    pub grouped: BTreeMap<Uuid, Vec<Asset>>,
    pub ungrouped: Vec<Asset>,
    pub total: usize,
}

impl GroupedAssets {
    pub fn from_assets(assets: Vec<Asset>) -> Self {
        let mut out = GroupedAssets {
            total: assets.len(),
            ..GroupedAssets::default()
        };
        for asset in assets {
            match asset.form_field_id {
                Some(field_id) => out.grouped.entry(field_id).or_default().push(asset),
                None => out.ungrouped.push(asset),
            }
        }
        out
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectAssetsResponse {
    pub project: ProjectRef,
    pub assets: GroupedAssets,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DownloadQuery {
    #[serde(rename = "fileId")]
    pub file_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DownloadResponse {
    pub success: bool,
    #[serde(rename = "downloadUrl")]
    pub download_url: String,
    pub file_name: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

// ---- review ----

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ApproveRequest {
    pub remark: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewResponse {
    pub success: bool,
    pub asset: Asset,
    pub deleted_from_drive: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReviewBatchResponse {
    pub active: bool,
    /// Countdown as `M:SS`
    pub time_remaining: String,
    pub remaining_seconds: u64,
    pub progress: f64,
    pub reviewed_count: usize,
    pub clients: Vec<ClientReviewCounts>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchSendResponse {
    pub success: bool,
    pub sent: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

// ---- notifications ----

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendReviewNotificationRequest {
    #[serde(rename = "clientEmail")]
    pub client_email: Option<String>,
    #[serde(rename = "projectId")]
    pub project_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SendReviewNotificationResponse {
    pub success: bool,
    #[serde(rename = "emailId")]
    pub email_id: Option<String>,
    pub summary: ReviewSummary,
}

// ---- portal ----

#[derive(Debug, Serialize, ToSchema)]
pub struct PortalProject {
    pub id: Uuid,
    pub name: String,
    pub client_name: Option<String>,
    pub description: Option<String>,
}

/// Form field as shown to clients; the owner's internal note is omitted.
#[derive(Debug, Serialize, ToSchema)]
pub struct PortalField {
    pub id: Uuid,
    pub field_type: FieldType,
    pub label: String,
    pub help_text: Option<String>,
    pub is_required: bool,
    pub field_order: i32,
}

impl From<FormField> for PortalField {
    fn from(field: FormField) -> Self {
        PortalField {
            id: field.id,
            field_type: field.field_type,
            label: field.label,
            help_text: field.help_text,
            is_required: field.is_required,
            field_order: field.field_order,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PortalView {
    pub state: String,
    pub project: PortalProject,
    pub form_fields: Vec<PortalField>,
    pub drive_connected: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UnlockRequest {
    pub password: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SubmissionsQuery {
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmissionStatus {
    pub id: Uuid,
    pub form_field_id: Option<Uuid>,
    pub file_name: String,
    pub status: AssetStatus,
    pub rejection_reason: Option<String>,
    pub approval_remark: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Asset> for SubmissionStatus {
    fn from(asset: Asset) -> Self {
        SubmissionStatus {
            id: asset.id,
            form_field_id: asset.form_field_id,
            file_name: asset.file_name,
            status: asset.status,
            rejection_reason: asset.rejection_reason,
            approval_remark: asset.approval_remark,
            created_at: asset.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmissionsResponse {
    pub state: String,
    pub submissions: Vec<SubmissionStatus>,
}

// ---- auth & health ----

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuthCallbackQuery {
    pub code: Option<String>,
    pub next: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CheckResult {
    pub status: String,
    pub message: String,
}

impl CheckResult {
    pub fn new(status: &str, message: impl Into<String>) -> Self {
        CheckResult {
            status: status.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    pub database: CheckResult,
    pub email: CheckResult,
    pub google_drive: CheckResult,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub checks: HealthChecks,
}
