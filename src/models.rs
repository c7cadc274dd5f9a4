use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Drive file id stored on assets that carry an inline text response
/// instead of an uploaded file.
pub const TEXT_RESPONSE_SENTINEL: &str = "text-response";

/// Uploader tag for anonymous portal submissions.
pub const CLIENT_UPLOADER: &str = "client";

/// Project model - one collection link owned by a single user
/// Maps to the `projects` table
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Project {
    /// Primary key - UUID
    pub id: Uuid,

    /// Owning user (hosted auth user id)
    pub user_id: Uuid,

    pub name: String,
    pub client_name: Option<String>,
    pub description: Option<String>,
    pub status: ProjectStatus,

    /// Public link id used in `/collect/{id}`; unique and never changes
    pub shareable_link_id: String,

    /// Plaintext link password, if the portal is gated
    #[serde(skip_serializing)]
    pub link_password: Option<String>,

    pub link_expiry: Option<DateTime<Utc>>,
    pub link_disabled: bool,

    /// Cached id of the project's folder inside the owner's drive
    pub google_drive_folder_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn has_password(&self) -> bool {
        self.link_password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Pending,
    InReview,
    Complete,
    Archived,
}

/// FormField model - one configured input on a project's portal form
/// Maps to the `form_fields` table
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct FormField {
    pub id: Uuid,
    pub project_id: Uuid,
    pub field_type: FieldType,
    pub label: String,
    pub help_text: Option<String>,
    pub internal_note: Option<String>,
    pub is_required: bool,

    /// Dense 0-based position within the project
    pub field_order: i32,

    /// Optional subfolder (under the project folder) for uploaded files
    pub storage_subfolder: Option<String>,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    FileUpload,
    TextInput,
    UrlField,
    ImageGallery,
    AudioVideo,
    CodeSnippet,
    SectionHeader,
}

impl FieldType {
    /// Fields whose answers are uploaded files.
    pub fn accepts_files(self) -> bool {
        matches!(
            self,
            FieldType::FileUpload | FieldType::ImageGallery | FieldType::AudioVideo
        )
    }

    /// Fields whose answers are stored inline as text responses.
    pub fn accepts_text(self) -> bool {
        matches!(
            self,
            FieldType::TextInput | FieldType::UrlField | FieldType::CodeSnippet
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::FileUpload => "file_upload",
            FieldType::TextInput => "text_input",
            FieldType::UrlField => "url_field",
            FieldType::ImageGallery => "image_gallery",
            FieldType::AudioVideo => "audio_video",
            FieldType::CodeSnippet => "code_snippet",
            FieldType::SectionHeader => "section_header",
        }
    }
}

/// Asset model - one submitted file or inline text response
/// Maps to the `assets` table
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Asset {
    pub id: Uuid,
    pub project_id: Uuid,
    pub form_field_id: Option<Uuid>,
    pub file_name: String,

    /// MIME type as reported by the uploader
    pub file_type: Option<String>,

    /// Size in bytes - BIGINT NULLABLE
    pub file_size: Option<i64>,

    /// Remote drive file id, or [`TEXT_RESPONSE_SENTINEL`] for text responses
    pub google_drive_file_id: String,

    pub status: AssetStatus,
    pub uploaded_by: String,

    /// Inline content for text responses
    #[schema(value_type = Option<ResponseMetadata>)]
    pub metadata: Option<Json<ResponseMetadata>>,

    pub rejection_reason: Option<String>,
    pub approval_remark: Option<String>,
    pub client_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    pub fn is_text_response(&self) -> bool {
        self.google_drive_file_id == TEXT_RESPONSE_SENTINEL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Pending,
    Approved,
    Rejected,
}

/// Inline content of a text-type submission, keyed by the field type it
/// answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "field_type", rename_all = "snake_case")]
pub enum ResponseMetadata {
    TextInput { content: String },
    UrlField { content: String },
    CodeSnippet { content: String },
}

impl ResponseMetadata {
    /// Build the metadata variant for `field_type`; `None` for non-text fields.
    pub fn for_field(field_type: FieldType, content: String) -> Option<Self> {
        match field_type {
            FieldType::TextInput => Some(ResponseMetadata::TextInput { content }),
            FieldType::UrlField => Some(ResponseMetadata::UrlField { content }),
            FieldType::CodeSnippet => Some(ResponseMetadata::CodeSnippet { content }),
            _ => None,
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            ResponseMetadata::TextInput { .. } => FieldType::TextInput,
            ResponseMetadata::UrlField { .. } => FieldType::UrlField,
            ResponseMetadata::CodeSnippet { .. } => FieldType::CodeSnippet,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ResponseMetadata::TextInput { content }
            | ResponseMetadata::UrlField { content }
            | ResponseMetadata::CodeSnippet { content } => content,
        }
    }
}

/// ActivityLog model - append-only audit trail entry
/// Maps to the `activity_log` table
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ActivityLog {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action_type: ActivityAction,
    #[schema(value_type = Object)]
    pub action_details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActivityAction {
    AssetUploaded,
    AssetApproved,
    AssetRejected,
    AssetDownloaded,
    ReviewNotificationSent,
    ProjectCreated,
    ProjectUpdated,
    ProjectArchived,
    FormUpdated,
    LinkPasswordEnabled,
    LinkPasswordDisabled,
    LinkExpiryUpdated,
    LinkDisabled,
    LinkEnabled,
}

/// New activity log input - for creating entries without ID and timestamp
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub project_id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: ActivityAction,
    pub details: serde_json::Value,
}

/// UserToken model - the owner's drive OAuth credentials
/// Maps to the `user_tokens` table
#[derive(Debug, Clone, FromRow)]
pub struct UserToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expiry: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
