use std::future::Future;

use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::drive::api::{DriveApi, DriveError, DriveFile, FileUpload};
use crate::drive::oauth::DriveAuthorizer;
use crate::drive::tokens;
use crate::error::AppError;
use crate::models::UserToken;
use crate::state::AppState;

/// Drive access on behalf of one owner. The token is refreshed before use
/// when expired, and once more if Drive rejects it mid-call; every refresh
/// is persisted.
pub struct DriveSession<'a> {
    pool: &'a PgPool,
    drive: &'a dyn DriveApi,
    oauth: &'a dyn DriveAuthorizer,
    token: UserToken,
}

impl<'a> DriveSession<'a> {
    pub async fn open(state: &'a AppState, owner_id: Uuid) -> Result<DriveSession<'a>, AppError> {
        let token = tokens::load(&state.pool, owner_id)
            .await?
            .ok_or(AppError::DriveNotConnected)?;

        Self::with_token(&state.pool, state.drive.as_ref(), state.oauth.as_ref(), token).await
    }

    pub async fn with_token(
        pool: &'a PgPool,
        drive: &'a dyn DriveApi,
        oauth: &'a dyn DriveAuthorizer,
        token: UserToken,
    ) -> Result<DriveSession<'a>, AppError> {
        let token = if tokens::is_expired(&token, Utc::now()) {
            debug!(user_id = %token.user_id, "Stored drive token expired, refreshing before use");
            tokens::refresh_stored_token(pool, oauth, &token).await?
        } else {
            token
        };

        Ok(DriveSession {
            pool,
            drive,
            oauth,
            token,
        })
    }

    pub fn owner_id(&self) -> Uuid {
        self.token.user_id
    }

    async fn authorized<T, F, Fut>(&mut self, op: F) -> Result<T, AppError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, DriveError>>,
    {
        match op(self.token.access_token.clone()).await {
            Err(DriveError::Unauthorized) => {
                info!(user_id = %self.token.user_id, "Drive rejected access token, refreshing and retrying");
                self.token = tokens::refresh_stored_token(self.pool, self.oauth, &self.token).await?;
                op(self.token.access_token.clone()).await.map_err(AppError::from)
            }
            other => other.map_err(AppError::from),
        }
    }

    pub async fn find_folder(
        &mut self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<String>, AppError> {
        let drive = self.drive;
        self.authorized(move |token| async move { drive.find_folder(&token, name, parent_id).await })
            .await
    }

    pub async fn create_folder(
        &mut self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, AppError> {
        let drive = self.drive;
        self.authorized(move |token| async move { drive.create_folder(&token, name, parent_id).await })
            .await
    }

    pub async fn upload_file(&mut self, upload: &FileUpload) -> Result<DriveFile, AppError> {
        let drive = self.drive;
        self.authorized(move |token| async move { drive.upload_file(&token, upload).await })
            .await
    }

    pub async fn get_file(&mut self, file_id: &str) -> Result<DriveFile, AppError> {
        let drive = self.drive;
        self.authorized(move |token| async move { drive.get_file(&token, file_id).await })
            .await
    }

    pub async fn delete_file(&mut self, file_id: &str) -> Result<(), AppError> {
        let drive = self.drive;
        self.authorized(move |token| async move { drive.delete_file(&token, file_id).await })
            .await
    }

    /// Delete without failing the caller; returns whether the file is gone.
    pub async fn delete_best_effort(&mut self, file_id: &str) -> bool {
        match self.delete_file(file_id).await {
            Ok(()) => {
                info!(file_id, "Deleted file from drive");
                true
            }
            Err(err) => {
                warn!(file_id, error = %err, "Failed to delete file from drive");
                false
            }
        }
    }
}
