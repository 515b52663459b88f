use tracing::{info, Level};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt, Registry};

use crate::{
    models::error::Result,
    utils::{config::Config, pipeline::RefreshPipeline, state::AppState},
};

pub fn parse_level(log_level: &str) -> Level {
    match log_level.trim().to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}

pub fn init_tracing(config: &Config) {
    let level = parse_level(&config.log_level);

    let filter = filter::Targets::new()
        .with_target("sqlx::query", Level::WARN)
        .with_target("html5ever", Level::WARN)
        .with_target(env!("CARGO_CRATE_NAME"), level)
        .with_default(Level::INFO);

    let tracing_layer = tracing_subscriber::fmt::layer();

    Registry::default().with(tracing_layer).with(filter).init();
}

pub async fn make_app() -> Result<(AppState, RefreshPipeline)> {
    let config = Config::init()?;
    init_tracing(&config);

    info!("Initializing application...");
    info!(
        model_dir = %config.model_dir.display(),
        persistent = config.database_url.is_some(),
        "Configuration loaded successfully"
    );

    let (state, pipeline) = AppState::init(config).await?;
    info!("Application initialized successfully");

    Ok((state, pipeline))
}
