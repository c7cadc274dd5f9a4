use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dtos::{SubmitTextRequest, SubmitTextResponse, UploadResponse};
use crate::models::{Asset, FormField};
use crate::portal::validation::{self, Submission, ValidationError};

const DRIVE_NOT_CONNECTED_HINT: &str = "The project owner needs to connect their Google Drive \
     account before files can be uploaded. Please contact them to set this up.";

#[derive(Debug, Error)]
pub enum PortalClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    DriveNotConnected(&'static str),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },
}

#[derive(Debug, Default)]
pub struct SubmissionReceipt {
    pub uploaded: Vec<Asset>,
    pub text_saved: usize,
}

#[derive(Deserialize)]
struct ServerError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    details: Option<String>,
}

/// Client-side portal flow: validate, upload each file, then store the text
/// answers in one request.
#[derive(Clone)]
pub struct PortalClient {
    http: reqwest::Client,
    base_url: String,
}

impl PortalClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        PortalClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn submit(
        &self,
        project_id: Uuid,
        fields: &[FormField],
        submission: &Submission,
    ) -> Result<SubmissionReceipt, PortalClientError> {
        validation::validate_submission(fields, submission)?;

        let mut receipt = SubmissionReceipt::default();
        for field in fields.iter().filter(|f| f.field_type.accepts_files()) {
            for file in submission.files(field.id) {
                let part = Part::bytes(file.bytes.to_vec())
                    .file_name(file.file_name.clone())
                    .mime_str(&file.mime_type)?;
                let mut form = Form::new()
                    .part("file", part)
                    .text("projectId", project_id.to_string())
                    .text("formFieldId", field.id.to_string());
                if let Some(email) = &submission.client_email {
                    form = form.text("clientEmail", email.clone());
                }

                debug!(file_name = %file.file_name, field_id = %field.id, "Uploading portal file");
                let resp = self
                    .http
                    .post(format!("{}/api/upload", self.base_url))
                    .multipart(form)
                    .send()
                    .await?;
                let uploaded: UploadResponse = parse(resp).await?;
                receipt.uploaded.push(uploaded.asset);
            }
        }

        let text_responses = validation::text_responses(fields, submission);
        if !text_responses.is_empty() {
            let resp = self
                .http
                .post(format!("{}/api/submit-text", self.base_url))
                .json(&SubmitTextRequest {
                    project_id,
                    text_responses,
                })
                .send()
                .await?;
            let saved: SubmitTextResponse = parse(resp).await?;
            receipt.text_saved = saved.count;
        }

        info!(
            project_id = %project_id,
            files = receipt.uploaded.len(),
            text = receipt.text_saved,
            "Portal submission complete"
        );
        Ok(receipt)
    }
}

async fn parse<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> Result<T, PortalClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let body: ServerError = resp.json().await.unwrap_or(ServerError {
        error: String::new(),
        details: None,
    });
    if body.error.contains("Google Drive not connected") {
        return Err(PortalClientError::DriveNotConnected(DRIVE_NOT_CONNECTED_HINT));
    }
    let message = if body.error.is_empty() {
        body.details.unwrap_or_else(|| "Unknown error".to_string())
    } else {
        body.error
    };
    Err(PortalClientError::Server {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldType;
    use crate::portal::validation::tests::field;

    #[tokio::test]
    async fn invalid_submission_never_touches_the_network() {
        let brief = field("Brief", FieldType::TextInput, true, 0);
        let logo = field("Logo", FieldType::FileUpload, true, 1);
        let submission = Submission::default().with_text(brief.id, "Bold colours");

        // nothing listens here; a network call would surface as Http
        let client = PortalClient::new(reqwest::Client::new(), "http://127.0.0.1:9");
        let err = client
            .submit(Uuid::new_v4(), &[brief, logo], &submission)
            .await
            .unwrap_err();

        match err {
            PortalClientError::Validation(v) => assert_eq!(v.message, "Logo is required"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn submission_with_nothing_to_send_is_a_no_op() {
        let header = field("Intro", FieldType::SectionHeader, false, 0);
        let client = PortalClient::new(reqwest::Client::new(), "http://127.0.0.1:9");
        let receipt = client
            .submit(Uuid::new_v4(), &[header], &Submission::default())
            .await
            .unwrap();
        assert!(receipt.uploaded.is_empty());
        assert_eq!(receipt.text_saved, 0);
    }
}
