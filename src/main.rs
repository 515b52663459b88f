use std::error::Error;

use livenews::app::make_app;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();
    let (state, pipeline) = make_app().await?;

    let handle = pipeline.spawn();
    info!(
        refresh_secs = state.config.refresh_interval.as_secs(),
        "News refresh running, press Ctrl+C to stop"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
    }

    info!("Shutting down...");
    handle.shutdown().await;
    Ok(())
}
