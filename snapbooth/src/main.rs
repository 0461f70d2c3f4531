use std::path::PathBuf;
use std::sync::Arc;

use snapbooth::config::EngineConfig;
use snapbooth::engine::Engine;
use snapbooth::logging;
use snapbooth::volumes::RemovableDiskEnumerator;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config_path =
        std::env::var("SNAPBOOTH_CONFIG").unwrap_or_else(|_| "snapbooth.json".to_string());
    let mut config = EngineConfig::load(std::path::Path::new(&config_path))?;

    if let Ok(dir) = std::env::var("SNAPBOOTH_STATE_DIR") {
        config.state_dir = PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("SNAPBOOTH_LOG_DIR") {
        config.log_dir = PathBuf::from(dir);
    }

    // Keep the guard alive so buffered file output flushes on exit.
    let _guard = logging::init_logging(&config.log_dir)?;

    tracing::info!("snapbooth engine starting");

    let engine = Engine::new(config, Arc::new(RemovableDiskEnumerator::new()));
    engine.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");

    engine.shutdown().await;

    Ok(())
}
