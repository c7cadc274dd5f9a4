use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use sqlx::PgPool;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::drive::session::DriveSession;
use crate::error::AppError;
use crate::models::Project;

/// Top-level folder every project folder lives under.
pub const ROOT_FOLDER_NAME: &str = "AssetDrop";

/// Per-owner locks serializing folder search-then-create within this process.
#[derive(Clone, Default)]
pub struct FolderLocks {
    owners: Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>,
}

impl FolderLocks {
    pub async fn lock(&self, owner_id: Uuid) -> OwnedMutexGuard<()> {
        let slot = {
            let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
            owners.entry(owner_id).or_default().clone()
        };
        slot.lock_owned().await
    }
}

/// Find a folder by name under `parent_id`, creating it when missing.
pub async fn ensure_folder(
    session: &mut DriveSession<'_>,
    name: &str,
    parent_id: Option<&str>,
) -> Result<String, AppError> {
    if let Some(id) = session.find_folder(name, parent_id).await? {
        debug!(folder_id = %id, name, "Reusing existing drive folder");
        return Ok(id);
    }
    let id = session.create_folder(name, parent_id).await?;
    info!(folder_id = %id, name, "Created drive folder");
    Ok(id)
}

async fn cached_folder(pool: &PgPool, project_id: Uuid) -> Result<Option<String>, AppError> {
    let cached = sqlx::query_scalar::<_, Option<String>>(
        r#"
        SELECT google_drive_folder_id
        FROM projects
        WHERE id = $1
        "#,
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .flatten();

    Ok(cached)
}

/// Resolve the folder an upload for `project` should land in:
/// `AssetDrop/<project name>[/<subfolder>]`.
///
/// Holds the owner's [`FolderLocks`] entry while searching and creating, and
/// no database connection across the drive calls. The project folder id is
/// cached on the project row only if no other writer cached one first; the
/// loser's folder is removed again.
pub async fn resolve_upload_folder(
    pool: &PgPool,
    locks: &FolderLocks,
    session: &mut DriveSession<'_>,
    project: &Project,
    subfolder: Option<&str>,
) -> Result<String, AppError> {
    let _guard = locks.lock(project.user_id).await;

    // Another intake may have created the folder while we waited.
    let project_folder = match cached_folder(pool, project.id).await? {
        Some(id) => id,
        None => create_project_folder(pool, session, project).await?,
    };

    match subfolder.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => ensure_folder(session, name, Some(&project_folder)).await,
        None => Ok(project_folder),
    }
}

async fn create_project_folder(
    pool: &PgPool,
    session: &mut DriveSession<'_>,
    project: &Project,
) -> Result<String, AppError> {
    let root = ensure_folder(session, ROOT_FOLDER_NAME, None).await?;
    let id = session.create_folder(&project.name, Some(&root)).await?;

    let stored = sqlx::query_scalar::<_, String>(
        r#"
        UPDATE projects
        SET google_drive_folder_id = $1, updated_at = NOW()
        WHERE id = $2 AND google_drive_folder_id IS NULL
        RETURNING google_drive_folder_id
        "#,
    )
    .bind(&id)
    .bind(project.id)
    .fetch_optional(pool)
    .await?;

    if stored.is_some() {
        info!(project_id = %project.id, folder_id = %id, "Created project folder");
        return Ok(id);
    }

    let Some(winner) = cached_folder(pool, project.id).await? else {
        return Err(AppError::NotFound("Project not found"));
    };
    warn!(
        project_id = %project.id,
        folder_id = %id,
        kept = %winner,
        "Project folder was cached concurrently; removing duplicate"
    );
    session.delete_best_effort(&id).await;
    Ok(winner)
}
