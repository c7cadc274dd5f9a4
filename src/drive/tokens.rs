use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::drive::oauth::{DriveAuthorizer, OAuthError, TokenGrant};
use crate::error::AppError;
use crate::models::UserToken;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

pub fn expiry_from(now: DateTime<Utc>, expires_in: Option<Duration>) -> DateTime<Utc> {
    let lifetime = expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME);
    now + chrono::Duration::from_std(lifetime).unwrap_or_else(|_| chrono::Duration::hours(1))
}

pub fn is_expired(token: &UserToken, now: DateTime<Utc>) -> bool {
    token.token_expiry <= now
}

pub async fn load(pool: &PgPool, user_id: Uuid) -> Result<Option<UserToken>, AppError> {
    let token = sqlx::query_as::<_, UserToken>(
        r#"
        SELECT id, user_id, access_token, refresh_token, token_expiry, created_at, updated_at
        FROM user_tokens
        WHERE user_id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(token)
}

/// Insert or overwrite the owner's token row.
pub async fn store(
    pool: &PgPool,
    user_id: Uuid,
    access_token: &str,
    refresh_token: &str,
    expiry: DateTime<Utc>,
) -> Result<UserToken, AppError> {
    let token = sqlx::query_as::<_, UserToken>(
        r#"
        INSERT INTO user_tokens (user_id, access_token, refresh_token, token_expiry)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (user_id) DO UPDATE
        SET access_token = EXCLUDED.access_token,
            refresh_token = EXCLUDED.refresh_token,
            token_expiry = EXCLUDED.token_expiry,
            updated_at = NOW()
        RETURNING id, user_id, access_token, refresh_token, token_expiry, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(access_token)
    .bind(refresh_token)
    .bind(expiry)
    .fetch_one(pool)
    .await?;

    Ok(token)
}

pub async fn delete(pool: &PgPool, user_id: Uuid) -> Result<bool, AppError> {
    let result = sqlx::query("DELETE FROM user_tokens WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Store tokens from a fresh consent. A grant without a refresh token
/// cannot be kept alive and is refused.
pub async fn store_grant(
    pool: &PgPool,
    user_id: Uuid,
    grant: &TokenGrant,
) -> Result<UserToken, AppError> {
    let refresh = grant
        .refresh_token
        .as_deref()
        .ok_or(OAuthError::MissingRefreshToken)?;
    let expiry = expiry_from(Utc::now(), grant.expires_in);
    store(pool, user_id, &grant.access_token, refresh, expiry).await
}

/// Exchange the stored refresh token and persist the result. A revoked
/// grant removes the row and yields [`AppError::ReconnectRequired`].
pub async fn refresh_stored_token(
    pool: &PgPool,
    oauth: &dyn DriveAuthorizer,
    token: &UserToken,
) -> Result<UserToken, AppError> {
    match oauth.refresh(&token.refresh_token).await {
        Ok(grant) => {
            let refresh = grant
                .refresh_token
                .as_deref()
                .unwrap_or(&token.refresh_token);
            let expiry = expiry_from(Utc::now(), grant.expires_in);
            let updated = store(pool, token.user_id, &grant.access_token, refresh, expiry).await?;
            info!(user_id = %token.user_id, expires_at = %updated.token_expiry, "Drive token refreshed");
            Ok(updated)
        }
        Err(OAuthError::InvalidGrant) => {
            warn!(user_id = %token.user_id, "Drive grant revoked, removing stored token");
            if let Err(err) = delete(pool, token.user_id).await {
                warn!(error = ?err, user_id = %token.user_id, "Failed to remove revoked token");
            }
            Err(AppError::ReconnectRequired)
        }
        Err(err) => Err(AppError::OAuth(err)),
    }
}
