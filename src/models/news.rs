use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// A classified article as stored. `web_url` is the natural key.
#[derive(FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub web_url: String,
    pub title: String,
    pub publication_date: DateTime<Utc>,
    pub news_category: String,
    pub section_id: String,
    pub section_name: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub img_url: Option<String>,
    pub prediction: bool,
    pub is_sports: bool,
}

/// Everything the pipeline writes for one `web_url`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleFields {
    pub title: String,
    pub publication_date: DateTime<Utc>,
    pub news_category: String,
    pub section_id: String,
    pub section_name: String,
    pub kind: String,
    pub img_url: Option<String>,
    pub prediction: bool,
    pub is_sports: bool,
}

impl ArticleFields {
    pub fn into_article(self, id: i64, web_url: String) -> Article {
        Article {
            id,
            web_url,
            title: self.title,
            publication_date: self.publication_date,
            news_category: self.news_category,
            section_id: self.section_id,
            section_name: self.section_name,
            kind: self.kind,
            img_url: self.img_url,
            prediction: self.prediction,
            is_sports: self.is_sports,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct FeedResponse {
    pub response: FeedResults,
}

#[derive(Deserialize, Debug, Default)]
pub struct FeedResults {
    #[serde(default)]
    pub results: Vec<RawArticle>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct RawArticle {
    #[serde(rename = "webUrl")]
    pub web_url: String,
    #[serde(rename = "webTitle")]
    pub web_title: String,
    #[serde(rename = "webPublicationDate")]
    pub web_publication_date: DateTime<Utc>,
    #[serde(rename = "sectionId")]
    pub section_id: String,
    #[serde(rename = "sectionName")]
    pub section_name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub fields: Option<RawFields>,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
pub struct RawFields {
    pub thumbnail: Option<String>,
}

impl RawArticle {
    /// Feed thumbnail, treating empty strings and the literal "None" as absent.
    pub fn thumbnail(&self) -> Option<&str> {
        self.fields
            .as_ref()
            .and_then(|f| f.thumbnail.as_deref())
            .map(str::trim)
            .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("none"))
    }
}
