//! Resume ingestion server binary
//!
//! Run with: cargo run -p resume-ingest --bin resume-ingest-server [-- config.toml]

use resume_ingest::{config::IngestConfig, server::IngestServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "resume_ingest=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path);
            IngestConfig::from_file(&path)?
        }
        None => IngestConfig::default(),
    }
    .with_env_overrides()?;

    tracing::info!("Configuration loaded");
    tracing::info!("  - Backend: {:?}", config.backend);
    tracing::info!("  - Max concurrency: {}", config.processing.max_concurrency);
    tracing::info!("  - Batch size: {}", config.processing.batch_size);
    tracing::info!("  - Max retries: {}", config.processing.max_retries);
    tracing::info!("  - Database: {}", config.storage.database_path.display());

    let server = IngestServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/jobs             - Start a folder job");
    println!("  GET  /api/jobs/:id         - Job progress");
    println!("  GET  /api/jobs/:id/results - Parsed results");
    println!("  POST /api/parse            - Parse a single file");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
