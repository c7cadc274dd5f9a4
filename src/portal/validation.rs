use std::collections::HashMap;

use axum::body::Bytes;
use thiserror::Error;
use uuid::Uuid;

use crate::dtos::TextResponseInput;
use crate::models::{FieldType, FormField, ResponseMetadata};

/// A file picked in the portal, not yet uploaded.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Clone)]
pub enum FieldAnswer {
    Files(Vec<PendingFile>),
    Text(String),
}

/// Everything a client filled in, keyed by form field id.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub client_email: Option<String>,
    pub answers: HashMap<Uuid, FieldAnswer>,
}

impl Submission {
    pub fn with_text(mut self, field_id: Uuid, value: impl Into<String>) -> Self {
        self.answers.insert(field_id, FieldAnswer::Text(value.into()));
        self
    }

    pub fn with_files(mut self, field_id: Uuid, files: Vec<PendingFile>) -> Self {
        self.answers.insert(field_id, FieldAnswer::Files(files));
        self
    }

    fn text(&self, field_id: Uuid) -> Option<&str> {
        match self.answers.get(&field_id) {
            Some(FieldAnswer::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn files(&self, field_id: Uuid) -> &[PendingFile] {
        match self.answers.get(&field_id) {
            Some(FieldAnswer::Files(files)) => files,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field_id: Uuid,
    pub message: String,
}

impl ValidationError {
    fn new(field: &FormField, message: String) -> Self {
        ValidationError {
            field_id: field.id,
            message,
        }
    }
}

/// Check one text answer against its field type.
pub fn check_text(field_type: FieldType, label: &str, content: &str) -> Result<(), String> {
    if field_type == FieldType::UrlField && !content.trim().is_empty() {
        let parsed = reqwest::Url::parse(content.trim())
            .map_err(|_| format!("{label} must be a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(format!("{label} must be a valid URL"));
        }
    }
    Ok(())
}

/// Validate a submission against the form, in field order. The first
/// failing field is reported.
pub fn validate_submission(
    fields: &[FormField],
    submission: &Submission,
) -> Result<(), ValidationError> {
    let mut ordered: Vec<&FormField> = fields.iter().collect();
    ordered.sort_by_key(|f| f.field_order);

    for field in ordered {
        let ft = field.field_type;
        if ft.accepts_files() {
            if field.is_required && submission.files(field.id).is_empty() {
                return Err(ValidationError::new(field, format!("{} is required", field.label)));
            }
        } else if ft.accepts_text() {
            let value = submission.text(field.id).unwrap_or_default();
            if field.is_required && value.trim().is_empty() {
                return Err(ValidationError::new(field, format!("{} is required", field.label)));
            }
            check_text(ft, &field.label, value).map_err(|msg| ValidationError::new(field, msg))?;
        }
    }
    Ok(())
}

/// Text answers that should be stored, one per non-blank text field.
pub fn text_responses(fields: &[FormField], submission: &Submission) -> Vec<TextResponseInput> {
    let mut ordered: Vec<&FormField> = fields.iter().filter(|f| f.field_type.accepts_text()).collect();
    ordered.sort_by_key(|f| f.field_order);

    ordered
        .into_iter()
        .filter_map(|field| {
            let value = submission.text(field.id)?;
            if value.trim().is_empty() {
                return None;
            }
            let metadata = ResponseMetadata::for_field(field.field_type, value.to_string())?;
            Some(TextResponseInput {
                form_field_id: Some(field.id),
                file_name: Some(text_file_name(&field.label)),
                metadata,
                client_email: submission.client_email.clone(),
            })
        })
        .collect()
}

/// Longest file name an asset row can hold.
pub const MAX_FILE_NAME_CHARS: usize = 255;
/// Longest client email an asset row can hold.
pub const MAX_CLIENT_EMAIL_CHARS: usize = 320;

const TEXT_SUFFIX: &str = ".txt";

/// Display name stored for an inline text answer. Long labels are cut so
/// the name still fits an asset row.
pub fn text_file_name(label: &str) -> String {
    let stem: String = label
        .chars()
        .take(MAX_FILE_NAME_CHARS - TEXT_SUFFIX.len())
        .collect();
    format!("{stem}{TEXT_SUFFIX}")
}

pub fn check_file_name(name: &str) -> Result<(), String> {
    if name.chars().count() > MAX_FILE_NAME_CHARS {
        return Err(format!("File name must be at most {MAX_FILE_NAME_CHARS} characters"));
    }
    Ok(())
}

pub fn check_client_email(email: Option<&str>) -> Result<(), String> {
    match email {
        Some(email) if email.chars().count() > MAX_CLIENT_EMAIL_CHARS => Err(format!(
            "Client email must be at most {MAX_CLIENT_EMAIL_CHARS} characters"
        )),
        _ => Ok(()),
    }
}
