pub mod classifier_store;
pub mod config;
pub mod fetcher;
pub mod news_store;
pub mod pg_store;
pub mod pipeline;
pub mod serving_cache;
pub mod state;
