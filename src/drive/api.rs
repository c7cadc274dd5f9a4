use axum::async_trait;
use axum::body::Bytes;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;
use utoipa::ToSchema;
use uuid::Uuid;

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const FILE_FIELDS: &str = "id,name,mimeType,size,webViewLink,webContentLink,thumbnailLink";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("access token rejected")]
    Unauthorized,

    #[error("file not found")]
    NotFound,

    #[error("rate limited")]
    RateLimited,

    #[error("drive api returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// File resource as returned by the Drive v3 API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: Option<String>,

    /// Byte count, serialized by Drive as a decimal string
    pub size: Option<String>,

    pub web_view_link: Option<String>,
    pub web_content_link: Option<String>,
    pub thumbnail_link: Option<String>,
}

impl DriveFile {
    pub fn size_bytes(&self) -> Option<i64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }

    /// Best link for fetching the file: direct content, then the viewer page.
    pub fn download_link(&self) -> Option<&str> {
        self.web_content_link
            .as_deref()
            .or(self.web_view_link.as_deref())
    }
}

/// File bytes plus the metadata Drive needs to store them.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    pub mime_type: String,
    pub parent_id: String,
    pub bytes: Bytes,
}

/// Drive operations used by the service. Every call takes the caller's
/// current access token; refresh is handled one level up.
#[async_trait]
pub trait DriveApi: Send + Sync {
    async fn find_folder(
        &self,
        access_token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<String>, DriveError>;

    async fn create_folder(
        &self,
        access_token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, DriveError>;

    async fn upload_file(
        &self,
        access_token: &str,
        upload: &FileUpload,
    ) -> Result<DriveFile, DriveError>;

    async fn get_file(&self, access_token: &str, file_id: &str) -> Result<DriveFile, DriveError>;

    /// Delete a file or folder by id.
    async fn delete_file(&self, access_token: &str, file_id: &str) -> Result<(), DriveError>;
}

#[derive(Clone)]
pub struct GoogleDrive {
    http: reqwest::Client,
    api_base: String,
    upload_base: String,
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FolderRef>,
}

#[derive(Deserialize)]
struct FolderRef {
    id: String,
}

impl GoogleDrive {
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_base_urls(http, API_BASE, UPLOAD_BASE)
    }

    pub fn with_base_urls(http: reqwest::Client, api_base: &str, upload_base: &str) -> Self {
        GoogleDrive {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DriveApi for GoogleDrive {
    async fn find_folder(
        &self,
        access_token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<String>, DriveError> {
        let query = folder_query(name, parent_id);
        debug!(query = %query, "Searching drive folder");

        let resp = self
            .http
            .get(format!("{}/files", self.api_base))
            .bearer_auth(access_token)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id,name)"),
                ("spaces", "drive"),
            ])
            .send()
            .await?;
        let list: FileList = check(resp).await?.json().await?;

        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    async fn create_folder(
        &self,
        access_token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, DriveError> {
        let mut body = json!({ "name": name, "mimeType": FOLDER_MIME });
        if let Some(parent) = parent_id {
            body["parents"] = json!([parent]);
        }

        let resp = self
            .http
            .post(format!("{}/files", self.api_base))
            .bearer_auth(access_token)
            .query(&[("fields", "id")])
            .json(&body)
            .send()
            .await?;
        let folder: FolderRef = check(resp).await?.json().await?;

        debug!(folder_id = %folder.id, name, "Created drive folder");
        Ok(folder.id)
    }

    async fn upload_file(
        &self,
        access_token: &str,
        upload: &FileUpload,
    ) -> Result<DriveFile, DriveError> {
        let boundary = format!("assetdrop-{}", Uuid::new_v4().simple());
        let metadata = json!({ "name": upload.name, "parents": [upload.parent_id] });
        let body = multipart_related(&boundary, &metadata, &upload.mime_type, &upload.bytes);

        let resp = self
            .http
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(access_token)
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await?;

        Ok(check(resp).await?.json().await?)
    }

    async fn get_file(&self, access_token: &str, file_id: &str) -> Result<DriveFile, DriveError> {
        let resp = self
            .http
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(access_token)
            .query(&[("fields", FILE_FIELDS)])
            .send()
            .await?;

        Ok(check(resp).await?.json().await?)
    }

    async fn delete_file(&self, access_token: &str, file_id: &str) -> Result<(), DriveError> {
        let resp = self
            .http
            .delete(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(access_token)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}

/// Drive search query for a non-trashed folder called `name`.
pub fn folder_query(name: &str, parent_id: Option<&str>) -> String {
    let mut query = format!(
        "name='{}' and mimeType='{}' and trashed=false",
        escape_query_literal(name),
        FOLDER_MIME
    );
    if let Some(parent) = parent_id {
        query.push_str(&format!(" and '{}' in parents", escape_query_literal(parent)));
    }
    query
}

fn escape_query_literal(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_related(
    boundary: &str,
    metadata: &serde_json::Value,
    mime_type: &str,
    bytes: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("--{boundary}\r\nContent-Type: {mime_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorReason>,
}

#[derive(Deserialize)]
struct ApiErrorReason {
    #[serde(default)]
    reason: String,
}

async fn check(resp: reqwest::Response) -> Result<reqwest::Response, DriveError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(classify(status, &body))
}

/// Translate a failed Drive response into a [`DriveError`].
pub fn classify(status: StatusCode, body: &str) -> DriveError {
    let detail = serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|e| e.error)
        .ok();
    let rate_limited = detail.as_ref().is_some_and(|d| {
        d.errors
            .iter()
            .any(|e| e.reason == "rateLimitExceeded" || e.reason == "userRateLimitExceeded")
    });

    match status {
        StatusCode::UNAUTHORIZED => DriveError::Unauthorized,
        StatusCode::NOT_FOUND => DriveError::NotFound,
        StatusCode::TOO_MANY_REQUESTS => DriveError::RateLimited,
        StatusCode::FORBIDDEN if rate_limited => DriveError::RateLimited,
        _ => DriveError::Api {
            status: status.as_u16(),
            message: detail
                .map(|d| d.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| body.chars().take(200).collect()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_query_escapes_quotes_and_scopes_to_parent() {
        let q = folder_query("Client's \\ assets", Some("root123"));
        assert_eq!(
            q,
            "name='Client\\'s \\\\ assets' and mimeType='application/vnd.google-apps.folder' \
             and trashed=false and 'root123' in parents"
        );
    }

    #[test]
    fn forbidden_with_rate_limit_reason_is_rate_limited() {
        let body = r#"{"error":{"code":403,"message":"Rate Limit Exceeded",
            "errors":[{"reason":"userRateLimitExceeded"}]}}"#;
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, body),
            DriveError::RateLimited
        ));
    }

    #[test]
    fn other_failures_keep_the_api_message() {
        let body = r#"{"error":{"code":403,"message":"The user does not have sufficient permissions"}}"#;
        match classify(StatusCode::FORBIDDEN, body) {
            DriveError::Api { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "The user does not have sufficient permissions");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(classify(StatusCode::UNAUTHORIZED, ""), DriveError::Unauthorized));
        assert!(matches!(classify(StatusCode::NOT_FOUND, ""), DriveError::NotFound));
    }

    #[test]
    fn multipart_body_wraps_metadata_and_content() {
        let body = multipart_related("b", &json!({"name": "a.txt"}), "text/plain", b"hello");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("--b\r\nContent-Type: application/json"));
        assert!(text.contains("{\"name\":\"a.txt\"}"));
        assert!(text.contains("Content-Type: text/plain\r\n\r\nhello\r\n--b--"));
    }

    #[test]
    fn size_and_download_link_fall_back_sensibly() {
        let file = DriveFile {
            id: "f".into(),
            name: "logo.png".into(),
            mime_type: Some("image/png".into()),
            size: Some("2048".into()),
            web_view_link: Some("https://drive.google.com/file/d/f/view".into()),
            web_content_link: None,
            thumbnail_link: None,
        };
        assert_eq!(file.size_bytes(), Some(2048));
        assert_eq!(file.download_link(), Some("https://drive.google.com/file/d/f/view"));
    }
}
