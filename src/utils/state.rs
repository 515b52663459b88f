use std::sync::Arc;

use reqwest::Client;
use tokio::sync::watch;

use crate::{
    models::{error::Result, news::Article},
    utils::{
        classifier_store::ClassifierStore,
        config::Config,
        fetcher::{ArticleSource, GuardianFetcher},
        news_store::{MemoryNewsStore, NewsStore},
        pg_store::PgNewsStore,
        pipeline::{PipelineConfig, RefreshPipeline, RefreshStatus},
        serving_cache::ServingCache,
    },
};

/// Shared handles for the read paths. The pipeline owns the write side.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn NewsStore>,
    pub cache: Arc<ServingCache<Vec<Article>>>,
    pub classifier_store: ClassifierStore,
    pub config: Config,
    pub refresh_status: watch::Receiver<RefreshStatus>,
}

impl AppState {
    /// Builds the state and the pipeline that feeds it.
    pub async fn init(config: Config) -> Result<(Self, RefreshPipeline)> {
        let store: Arc<dyn NewsStore> = match &config.database_url {
            Some(url) => Arc::new(PgNewsStore::connect(url).await?),
            None => {
                tracing::warn!("DATABASE_URL not set, news will be kept in memory");
                Arc::new(MemoryNewsStore::new())
            }
        };

        let source = Arc::new(GuardianFetcher::new(
            Client::builder().build()?,
            config.guardian_base_url.clone(),
            config.guardian_api_key.clone(),
        ));

        Ok(Self::assemble(config, store, source))
    }

    pub fn assemble(
        config: Config,
        store: Arc<dyn NewsStore>,
        source: Arc<dyn ArticleSource>,
    ) -> (Self, RefreshPipeline) {
        let classifier_store = ClassifierStore::new(config.model_dir.clone());
        let pipeline = RefreshPipeline::new(
            source,
            classifier_store.clone(),
            store.clone(),
            PipelineConfig {
                refresh_interval: config.refresh_interval,
                retry_interval: config.retry_interval,
                ..Default::default()
            },
        );

        let state = AppState {
            store,
            cache: Arc::new(ServingCache::new(config.cache_ttl)),
            classifier_store,
            refresh_status: pipeline.status(),
            config,
        };
        (state, pipeline)
    }
}
