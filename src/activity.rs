use serde_json::Value;
use sqlx::{PgExecutor, PgPool};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ActivityAction, ActivityLog, NewActivity};

pub async fn log_action<'e>(
    executor: impl PgExecutor<'e>,
    entry: NewActivity,
) -> Result<ActivityLog, AppError> {
    let row = sqlx::query_as::<_, ActivityLog>(
        r#"
        INSERT INTO activity_log (project_id, user_id, action_type, action_details)
        VALUES ($1, $2, $3, $4)
        RETURNING id, project_id, user_id, action_type, action_details, created_at
        "#,
    )
    .bind(entry.project_id)
    .bind(entry.user_id)
    .bind(entry.action)
    .bind(&entry.details)
    .fetch_one(executor)
    .await
    .map_err(|e| {
        error!(error = ?e, "Failed to insert activity log");
        AppError::Db(e)
    })?;

    info!(
        project_id = %entry.project_id,
        user_id = ?entry.user_id,
        action = ?entry.action,
        "Activity logged"
    );

    Ok(row)
}

/// Write an activity entry without failing the caller.
pub async fn record(
    pool: &PgPool,
    project_id: Uuid,
    user_id: Option<Uuid>,
    action: ActivityAction,
    details: Value,
) {
    let entry = NewActivity {
        project_id,
        user_id,
        action,
        details,
    };
    if let Err(err) = log_action(pool, entry).await {
        warn!(error = %err, project_id = %project_id, action = ?action, "Activity log write skipped");
    }
}

/// Project activity, newest first.
pub async fn list_for_project(
    pool: &PgPool,
    project_id: Uuid,
    limit: i64,
) -> Result<Vec<ActivityLog>, AppError> {
    let rows = sqlx::query_as::<_, ActivityLog>(
        r#"
        SELECT id, project_id, user_id, action_type, action_details, created_at
        FROM activity_log
        WHERE project_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(project_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn purge_project<'e>(
    executor: impl PgExecutor<'e>,
    project_id: Uuid,
) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM activity_log WHERE project_id = $1")
        .bind(project_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}
