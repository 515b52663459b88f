use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};

use crate::models::{
    error::{Error, Result},
    news::{Article, ArticleFields},
};

pub const RECENT_LIMIT: i64 = 20;
pub const CATEGORY_LIMIT: i64 = 10;
pub const SPORTS_LIMIT: i64 = 15;

/// Categories that all widen to a plain "sport" match.
pub const SPORTS_SYNONYMS: [&str; 4] = ["sports", "sport", "football", "cricket"];

/// Case-insensitive substring match over category, section name and title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryQuery {
    /// Trimmed, lowercased category as requested.
    pub category: String,
    /// Substring actually searched for.
    pub term: String,
    pub limit: i64,
}

impl CategoryQuery {
    pub fn new(category: &str) -> Result<Self> {
        let category = category.trim().to_lowercase();
        if category.is_empty() {
            return Err(Error::Validation("Category must not be empty".to_string()));
        }

        let (term, limit) = if SPORTS_SYNONYMS.contains(&category.as_str()) {
            ("sport".to_string(), SPORTS_LIMIT)
        } else {
            (category.clone(), CATEGORY_LIMIT)
        };

        Ok(Self {
            category,
            term,
            limit,
        })
    }

    pub fn matches(&self, article: &Article) -> bool {
        [
            &article.news_category,
            &article.section_name,
            &article.title,
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&self.term))
    }
}

/// System of record for classified articles, keyed by `web_url`.
#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Inserts or overwrites the record for `web_url`, keeping its id.
    async fn upsert(&self, web_url: &str, fields: ArticleFields) -> Result<Article>;

    /// Newest first by publication date.
    async fn query_recent(&self, limit: i64) -> Result<Vec<Article>>;

    /// Newest first, capped at `query.limit`.
    async fn query_by_category(&self, query: &CategoryQuery) -> Result<Vec<Article>>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;
}

#[derive(Debug)]
pub struct MemoryNewsStore {
    articles: DashMap<String, Article>,
    next_id: AtomicI64,
}

impl Default for MemoryNewsStore {
    fn default() -> Self {
        Self {
            articles: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl MemoryNewsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    fn newest_first(&self, filter: impl Fn(&Article) -> bool, limit: i64) -> Vec<Article> {
        let mut found: Vec<Article> = self
            .articles
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| {
            b.publication_date
                .cmp(&a.publication_date)
                .then_with(|| b.id.cmp(&a.id))
        });
        found.truncate(usize::try_from(limit).unwrap_or(0));
        found
    }
}

#[async_trait]
impl NewsStore for MemoryNewsStore {
    async fn upsert(&self, web_url: &str, fields: ArticleFields) -> Result<Article> {
        let article = match self.articles.entry(web_url.to_string()) {
            Entry::Occupied(mut entry) => {
                let article = fields.into_article(entry.get().id, web_url.to_string());
                entry.insert(article.clone());
                article
            }
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let article = fields.into_article(id, web_url.to_string());
                entry.insert(article.clone());
                article
            }
        };
        Ok(article)
    }

    async fn query_recent(&self, limit: i64) -> Result<Vec<Article>> {
        Ok(self.newest_first(|_| true, limit))
    }

    async fn query_by_category(&self, query: &CategoryQuery) -> Result<Vec<Article>> {
        Ok(self.newest_first(|a| query.matches(a), query.limit))
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        Ok(self
            .articles
            .iter()
            .find(|entry| entry.value().id == id)
            .map(|entry| entry.value().clone()))
    }
}
