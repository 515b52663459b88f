use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::{header::USER_AGENT, Client, StatusCode};
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::models::{
    error::{Error, Result},
    news::{FeedResponse, RawArticle},
};

pub const FEED_TIMEOUT: Duration = Duration::from_secs(15);
pub const SCRAPE_TIMEOUT: Duration = Duration::from_secs(20);

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// One remote listing endpoint and how its articles are labelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSpec {
    pub name: &'static str,
    /// Path under the feed base URL.
    pub path: &'static str,
    pub page_size: u32,
    pub is_sports: bool,
}

impl FeedSpec {
    pub const SPORTS: FeedSpec = FeedSpec {
        name: "sports",
        path: "sport",
        page_size: 20,
        is_sports: true,
    };

    pub const GENERAL: FeedSpec = FeedSpec {
        name: "general",
        path: "search",
        page_size: 10,
        is_sports: false,
    };

    /// Sports feed first; it has priority.
    pub fn defaults() -> Vec<FeedSpec> {
        vec![Self::SPORTS, Self::GENERAL]
    }

    pub fn category_for(&self, article: &RawArticle) -> String {
        if self.is_sports {
            "Sports".to_string()
        } else if article.section_name.trim().is_empty() {
            "General".to_string()
        } else {
            article.section_name.clone()
        }
    }
}

/// Where the pipeline gets articles and images from.
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch_batch(&self, feed: &FeedSpec) -> Result<Vec<RawArticle>>;

    /// Best-effort lookup of a lead image. Never fails; absence means
    /// nothing usable was found.
    async fn scrape_image(&self, url: &str) -> Option<String>;
}

#[derive(Clone, Debug)]
pub struct GuardianFetcher {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GuardianFetcher {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn feed_url(&self, feed: &FeedSpec) -> String {
        format!("{}/{}", self.base_url, feed.path)
    }
}

#[async_trait]
impl ArticleSource for GuardianFetcher {
    async fn fetch_batch(&self, feed: &FeedSpec) -> Result<Vec<RawArticle>> {
        let page_size = feed.page_size.to_string();
        let res = self
            .client
            .get(self.feed_url(feed))
            .query(&[
                ("api-key", self.api_key.as_str()),
                ("show-fields", "thumbnail"),
                ("page-size", page_size.as_str()),
            ])
            .timeout(FEED_TIMEOUT)
            .send()
            .await
            .and_then(|res| res.error_for_status())
            .map_err(|e| Error::ExternalFetch(format!("{} feed: {e}", feed.name)))?;

        let body: FeedResponse = res
            .json()
            .await
            .map_err(|e| Error::ExternalFetch(format!("{} feed body: {e}", feed.name)))?;

        debug!(
            feed = feed.name,
            count = body.response.results.len(),
            "feed fetched"
        );
        Ok(body.response.results)
    }

    async fn scrape_image(&self, url: &str) -> Option<String> {
        let res = self
            .client
            .get(url)
            .header(USER_AGENT, random_user_agent())
            .timeout(SCRAPE_TIMEOUT)
            .send()
            .await;

        let body = match res {
            Ok(res) if res.status() == StatusCode::OK => res.text().await,
            Ok(res) => {
                debug!(url, status = %res.status(), "article page not available");
                return None;
            }
            Err(e) => {
                warn!(url, "Image scraping error: {e}");
                return None;
            }
        };

        match body {
            Ok(html) => extract_image(&html),
            Err(e) => {
                warn!(url, "Image scraping error: {e}");
                None
            }
        }
    }
}

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Lead image of an article page. Tried in order: Open Graph, Twitter
/// card, schema.org `itemprop=image`, first image inside `<article>`.
pub fn extract_image(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let first_attr = |selector: &str, attr: &str| -> Option<String> {
        let selector = Selector::parse(selector).ok()?;
        let value = document.select(&selector).next()?.value().attr(attr)?.trim();
        (!value.is_empty()).then(|| value.to_string())
    };

    first_attr(r#"meta[property="og:image"]"#, "content")
        .or_else(|| first_attr(r#"meta[name="twitter:image"]"#, "content"))
        .or_else(|| first_attr(r#"img[itemprop="image"]"#, "src"))
        .or_else(|| {
            let article = Selector::parse("article").ok()?;
            let img = Selector::parse("img").ok()?;
            let src = document
                .select(&article)
                .next()?
                .select(&img)
                .next()?
                .value()
                .attr("src")?
                .trim();
            (!src.is_empty()).then(|| src.to_string())
        })
}
