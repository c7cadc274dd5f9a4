use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use assetdrop::auth::HostedAuth;
use assetdrop::config::Config;
use assetdrop::drive::folders::FolderLocks;
use assetdrop::drive::{GoogleDrive, GoogleOAuth};
use assetdrop::email::SendGrid;
use assetdrop::notify::{self, NotificationBatcher};
use assetdrop::{routes, state, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        bind_addr = %config.bind_addr,
        app_url = %config.app_url,
        email_configured = config.sendgrid.api_key.is_some() && config.sendgrid.from_email.is_some(),
        review_batch_delay_secs = config.review_batch_delay.as_secs(),
        "Starting AssetDrop"
    );

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied");

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;

    let state = AppState {
        pool,
        drive: Arc::new(GoogleDrive::new(http.clone())),
        oauth: Arc::new(GoogleOAuth::new(&config.google)?),
        mailer: Arc::new(SendGrid::new(http.clone(), &config.sendgrid)),
        identity: Arc::new(HostedAuth::new(http, &config.auth)),
        batcher: NotificationBatcher::new(config.review_batch_delay),
        folder_locks: FolderLocks::default(),
        cookie_key: state::cookie_key(config.cookie_secret.as_deref()),
        config: Arc::new(config),
    };

    notify::batcher::spawn(state.clone());

    let bind_addr = state.config.bind_addr.clone();
    let app = routes::router(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    info!("HTTP server listening on {}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
