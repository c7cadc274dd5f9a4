use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use sqlx::PgPool;
use tracing::warn;

use crate::auth::IdentityProvider;
use crate::config::Config;
use crate::drive::folders::FolderLocks;
use crate::drive::{DriveApi, DriveAuthorizer};
use crate::email::Mailer;
use crate::notify::NotificationBatcher;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub drive: Arc<dyn DriveApi>,
    pub oauth: Arc<dyn DriveAuthorizer>,
    pub mailer: Arc<dyn Mailer>,
    pub identity: Arc<dyn IdentityProvider>,
    pub batcher: NotificationBatcher,
    pub folder_locks: FolderLocks,
    pub cookie_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// Signing key for private cookies. Without a configured secret a fresh key
/// is generated, so cookies do not survive a restart.
pub fn cookie_key(secret: Option<&str>) -> Key {
    match secret.map(str::as_bytes) {
        Some(bytes) if bytes.len() >= 64 => Key::from(bytes),
        Some(_) => {
            warn!("COOKIE_SECRET shorter than 64 bytes; using a random key");
            Key::generate()
        }
        None => Key::generate(),
    }
}
