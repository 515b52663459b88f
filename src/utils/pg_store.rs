use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::{
    models::{
        error::Result,
        news::{Article, ArticleFields},
    },
    utils::news_store::{CategoryQuery, NewsStore},
};

const COLUMNS: &str = "id, web_url, title, publication_date, news_category, section_id, \
                       section_name, type, img_url, prediction, is_sports";

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS live_news (
    id               BIGSERIAL PRIMARY KEY,
    web_url          TEXT NOT NULL UNIQUE,
    title            TEXT NOT NULL,
    publication_date TIMESTAMPTZ NOT NULL,
    news_category    TEXT NOT NULL,
    section_id       TEXT NOT NULL,
    section_name     TEXT NOT NULL,
    type             TEXT NOT NULL,
    img_url          TEXT,
    prediction       BOOLEAN NOT NULL,
    is_sports        BOOLEAN NOT NULL,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at       TIMESTAMPTZ NOT NULL DEFAULT now()
)"#;

const CREATE_DATE_INDEX: &str = "CREATE INDEX IF NOT EXISTS live_news_publication_date_idx \
                                 ON live_news (publication_date DESC)";

#[derive(Clone, Debug)]
pub struct PgNewsStore {
    pool: PgPool,
}

impl PgNewsStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .idle_timeout(Some(std::time::Duration::from_secs(60)))
            .connect(database_url)
            .await?;
        info!("Database connection pool created successfully");

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_DATE_INDEX).execute(&self.pool).await?;
        Ok(())
    }
}

/// Escapes LIKE wildcards so the term is matched literally.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl NewsStore for PgNewsStore {
    async fn upsert(&self, web_url: &str, fields: ArticleFields) -> Result<Article> {
        let sql = format!(
            "INSERT INTO live_news \
                 (web_url, title, publication_date, news_category, section_id, section_name, \
                  type, img_url, prediction, is_sports) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (web_url) DO UPDATE SET \
                 title = EXCLUDED.title, \
                 publication_date = EXCLUDED.publication_date, \
                 news_category = EXCLUDED.news_category, \
                 section_id = EXCLUDED.section_id, \
                 section_name = EXCLUDED.section_name, \
                 type = EXCLUDED.type, \
                 img_url = EXCLUDED.img_url, \
                 prediction = EXCLUDED.prediction, \
                 is_sports = EXCLUDED.is_sports, \
                 updated_at = now() \
             RETURNING {COLUMNS}"
        );

        let article = sqlx::query_as::<_, Article>(&sql)
            .bind(web_url)
            .bind(fields.title)
            .bind(fields.publication_date)
            .bind(fields.news_category)
            .bind(fields.section_id)
            .bind(fields.section_name)
            .bind(fields.kind)
            .bind(fields.img_url)
            .bind(fields.prediction)
            .bind(fields.is_sports)
            .fetch_one(&self.pool)
            .await?;
        Ok(article)
    }

    async fn query_recent(&self, limit: i64) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM live_news ORDER BY publication_date DESC, id DESC LIMIT $1"
        );
        let articles = sqlx::query_as::<_, Article>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(articles)
    }

    async fn query_by_category(&self, query: &CategoryQuery) -> Result<Vec<Article>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM live_news \
             WHERE news_category ILIKE $1 OR section_name ILIKE $1 OR title ILIKE $1 \
             ORDER BY publication_date DESC, id DESC LIMIT $2"
        );
        let articles = sqlx::query_as::<_, Article>(&sql)
            .bind(like_pattern(&query.term))
            .bind(query.limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(articles)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        let sql = format!("SELECT {COLUMNS} FROM live_news WHERE id = $1");
        let article = sqlx::query_as::<_, Article>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(article)
    }
}
