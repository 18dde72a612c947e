use std::sync::Arc;

use tracing::{error, info};

use fallcrate::{Config, Database, FileService, FsBlobStore, ServiceLimits, SqliteMetadataStore};

#[tokio::main]
async fn main() {
    // Load configuration
    let mut config = match Config::load("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            Config::default()
        }
    };
    config.apply_env_overrides();

    // Initialize logging
    if let Err(e) = fallcrate::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        fallcrate::logging::init_console_only(&config.logging.level);
    }

    info!("Fallcrate - personal cloud file manager");

    if let Err(e) = run(config).await {
        error!(error = %e, "startup failed");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> fallcrate::Result<()> {
    config.validate()?;

    let db = Database::open(&config.storage.database_path).await?;
    let metadata = Arc::new(SqliteMetadataStore::new(db).await?);
    let blobs = Arc::new(FsBlobStore::new(&config.storage.blob_path)?);
    info!(
        database = %config.storage.database_path,
        blobs = %config.storage.blob_path,
        "storage opened"
    );

    let mut service = FileService::new(metadata, blobs, ServiceLimits::from_config(&config));
    service.refresh().await;

    info!(
        nodes = service.nodes().len(),
        used = service.storage_used(),
        limit = service.storage_limit(),
        "tree loaded"
    );
    Ok(())
}
