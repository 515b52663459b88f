use std::sync::Arc;

use tracing::debug;

use crate::{
    models::{
        error::{Error, Result},
        news::Article,
    },
    utils::{
        news_store::{CategoryQuery, RECENT_LIMIT},
        pipeline::RefreshStatus,
        state::AppState,
    },
};

pub const ALL_NEWS_KEY: &str = "all_live_news";

pub fn category_key(category: &str) -> String {
    format!("news_category_{category}")
}

/// Latest articles, newest first, served from the cache when fresh.
pub async fn list_recent(state: &AppState) -> Result<Arc<Vec<Article>>> {
    state
        .cache
        .get_or_compute(ALL_NEWS_KEY, || state.store.query_recent(RECENT_LIMIT))
        .await
}

/// Articles matching `category`. An empty match is `NotFound` and is
/// not cached, so the category is re-queried on the next request.
pub async fn list_by_category(state: &AppState, category: &str) -> Result<Arc<Vec<Article>>> {
    let query = CategoryQuery::new(category)?;
    let key = category_key(&query.category);

    state
        .cache
        .get_or_compute(&key, || async {
            let found = state.store.query_by_category(&query).await?;
            if found.is_empty() {
                debug!(category = %query.category, "no news for category");
                return Err(Error::NotFound(format!(
                    "news for category {}",
                    query.category
                )));
            }
            Ok(found)
        })
        .await
}

pub async fn get_by_id(state: &AppState, id: i64) -> Result<Article> {
    state
        .store
        .get_by_id(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("news item {id}")))
}

pub fn refresh_status(state: &AppState) -> RefreshStatus {
    state.refresh_status.borrow().clone()
}
