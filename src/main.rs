//! Jobtrack sync server.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jobtrack_sync::config::Config;
use jobtrack_sync::db::{self, Repository};
use jobtrack_sync::documents::LocalBlobStorage;
use jobtrack_sync::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Jobtrack sync server");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Blob directory: {:?}", config.blob_dir);
    tracing::info!("Bind address: {}", config.bind_addr);

    // Warn if PSK is not configured
    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (JOBTRACK_API_PSK). Authentication is disabled!");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));
    tracing::info!("Database ready at revision {}", repo.get_revision_id().await?);

    // Initialize blob storage
    tokio::fs::create_dir_all(&config.blob_dir).await?;
    let blobs = Arc::new(LocalBlobStorage::new(&config.blob_dir, &config.public_url));

    // Create application state
    let state = AppState {
        repo,
        blobs,
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
