use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle, time::timeout};
use tracing::{debug, error, info, warn};

use crate::{
    models::{
        classifier::ClassifierPair,
        error::{Error, Result},
        news::{ArticleFields, RawArticle},
    },
    utils::{
        classifier_store::ClassifierStore,
        fetcher::{ArticleSource, FeedSpec, FEED_TIMEOUT, SCRAPE_TIMEOUT},
        news_store::NewsStore,
    },
};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub feeds: Vec<FeedSpec>,
    /// Sleep after a clean iteration.
    pub refresh_interval: Duration,
    /// Sleep after a failed or partial iteration.
    pub retry_interval: Duration,
    /// Upper bound on one feed request, on top of the source's own timeout.
    pub feed_deadline: Duration,
    /// Upper bound on one image lookup.
    pub enrich_deadline: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            feeds: FeedSpec::defaults(),
            refresh_interval: Duration::from_secs(600),
            retry_interval: Duration::from_secs(60),
            feed_deadline: FEED_TIMEOUT + Duration::from_secs(5),
            enrich_deadline: SCRAPE_TIMEOUT + Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Starting,
    Fetching,
    Classifying,
    Persisting,
    SleepingAfterSuccess,
    SleepingAfterError,
    Stopped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub stored: usize,
    pub enriched: usize,
    pub failed_feeds: Vec<String>,
}

impl CycleReport {
    pub fn is_clean(&self) -> bool {
        self.failed_feeds.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshStatus {
    pub state: PipelineState,
    pub iterations: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_cycle: Option<CycleReport>,
}

impl Default for RefreshStatus {
    fn default() -> Self {
        Self {
            state: PipelineState::Starting,
            iterations: 0,
            last_success_at: None,
            last_error: None,
            last_cycle: None,
        }
    }
}

/// Fetch, enrich, classify and upsert on a fixed interval until stopped.
/// The only writer to the news store.
pub struct RefreshPipeline {
    source: Arc<dyn ArticleSource>,
    classifier_store: ClassifierStore,
    store: Arc<dyn NewsStore>,
    config: PipelineConfig,
    status: watch::Sender<RefreshStatus>,
}

impl RefreshPipeline {
    pub fn new(
        source: Arc<dyn ArticleSource>,
        classifier_store: ClassifierStore,
        store: Arc<dyn NewsStore>,
        config: PipelineConfig,
    ) -> Self {
        let (status, _) = watch::channel(RefreshStatus::default());
        Self {
            source,
            classifier_store,
            store,
            config,
            status,
        }
    }

    pub fn status(&self) -> watch::Receiver<RefreshStatus> {
        self.status.subscribe()
    }

    fn set_state(&self, state: PipelineState) {
        self.status.send_modify(|status| status.state = state);
    }

    pub fn spawn(self) -> PipelineHandle {
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(stop_rx));
        PipelineHandle { stop, task }
    }

    /// Loops until `shutdown` turns true or its sender is dropped. The
    /// signal is checked between iterations and interrupts the sleep.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Refresh pipeline started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            info!("Starting news refresh...");
            let delay = match self.run_once().await {
                Ok(report) if report.is_clean() => {
                    info!(
                        stored = report.stored,
                        enriched = report.enriched,
                        "News refresh completed successfully"
                    );
                    self.status.send_modify(|status| {
                        status.iterations += 1;
                        status.last_success_at = Some(Utc::now());
                        status.last_error = None;
                        status.last_cycle = Some(report);
                        status.state = PipelineState::SleepingAfterSuccess;
                    });
                    self.config.refresh_interval
                }
                Ok(report) => {
                    warn!(
                        stored = report.stored,
                        failed = ?report.failed_feeds,
                        "News refresh completed with failed feeds"
                    );
                    self.status.send_modify(|status| {
                        status.iterations += 1;
                        status.last_error =
                            Some(format!("failed feeds: {}", report.failed_feeds.join(", ")));
                        status.last_cycle = Some(report);
                        status.state = PipelineState::SleepingAfterError;
                    });
                    self.config.retry_interval
                }
                Err(e) => {
                    error!("Auto-refresh error: {e}");
                    self.status.send_modify(|status| {
                        status.iterations += 1;
                        status.last_error = Some(e.to_string());
                        status.last_cycle = None;
                        status.state = PipelineState::SleepingAfterError;
                    });
                    self.config.retry_interval
                }
            };

            debug!(?delay, "refresh pipeline sleeping");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        self.set_state(PipelineState::Stopped);
        info!("Refresh pipeline stopped");
    }

    /// One iteration. Each feed is guarded on its own; the iteration
    /// only fails outright when no feed could be processed or the
    /// classifier pair could not be obtained.
    pub async fn run_once(&self) -> Result<CycleReport> {
        let pair = self.classifier_store.load().await?;
        let mut report = CycleReport::default();

        for feed in &self.config.feeds {
            match self.process_feed(feed, &pair, &mut report).await {
                Ok(stored) => {
                    info!(feed = feed.name, stored, "feed processed");
                }
                Err(e) => {
                    warn!(feed = feed.name, "Feed processing failed: {e}");
                    report.failed_feeds.push(feed.name.to_string());
                }
            }
        }

        if !self.config.feeds.is_empty() && report.failed_feeds.len() == self.config.feeds.len()
        {
            return Err(Error::ExternalFetch(format!(
                "all feeds failed: {}",
                report.failed_feeds.join(", ")
            )));
        }
        Ok(report)
    }

    async fn process_feed(
        &self,
        feed: &FeedSpec,
        pair: &ClassifierPair,
        report: &mut CycleReport,
    ) -> Result<usize> {
        self.set_state(PipelineState::Fetching);
        let articles = timeout(self.config.feed_deadline, self.source.fetch_batch(feed))
            .await
            .map_err(|_| Error::ExternalFetch(format!("{} feed timed out", feed.name)))??;

        self.set_state(PipelineState::Classifying);
        let mut prepared = Vec::with_capacity(articles.len());
        for raw in articles {
            let (web_url, fields, enriched) = self.prepare(feed, raw, pair).await?;
            if enriched {
                report.enriched += 1;
            }
            prepared.push((web_url, fields));
        }

        self.set_state(PipelineState::Persisting);
        let mut stored = 0;
        for (web_url, fields) in prepared {
            self.store.upsert(&web_url, fields).await?;
            stored += 1;
        }
        report.stored += stored;
        Ok(stored)
    }

    /// Fills a missing image and classifies the title. The bool reports
    /// whether enrichment found an image.
    async fn prepare(
        &self,
        feed: &FeedSpec,
        raw: RawArticle,
        pair: &ClassifierPair,
    ) -> Result<(String, ArticleFields, bool)> {
        let (img_url, enriched) = match raw.thumbnail() {
            Some(thumbnail) => (Some(thumbnail.to_string()), false),
            None => {
                let found = self.enrich(&raw.web_url).await;
                let enriched = found.is_some();
                (found, enriched)
            }
        };

        let prediction = pair
            .is_real(&raw.web_title)
            .map_err(|e| Error::ModelCorruption(e.to_string()))?;

        let fields = ArticleFields {
            news_category: feed.category_for(&raw),
            title: raw.web_title,
            publication_date: raw.web_publication_date,
            section_id: raw.section_id,
            section_name: raw.section_name,
            kind: raw.kind,
            img_url,
            prediction,
            is_sports: feed.is_sports,
        };
        Ok((raw.web_url, fields, enriched))
    }

    async fn enrich(&self, web_url: &str) -> Option<String> {
        match timeout(self.config.enrich_deadline, self.source.scrape_image(web_url)).await {
            Ok(found) => found,
            Err(_) => {
                debug!(web_url, "image lookup timed out");
                None
            }
        }
    }
}

/// Owner side of a spawned pipeline.
pub struct PipelineHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    /// Signals the loop and waits for it to finish its current step.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            error!("Refresh pipeline task failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use crate::{
        models::news::RawFields,
        utils::news_store::{CategoryQuery, MemoryNewsStore},
    };

    fn raw(url: &str, title: &str, thumbnail: Option<&str>) -> RawArticle {
        RawArticle {
            web_url: url.to_string(),
            web_title: title.to_string(),
            web_publication_date: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            section_id: "world".to_string(),
            section_name: "World news".to_string(),
            kind: "article".to_string(),
            fields: Some(RawFields {
                thumbnail: thumbnail.map(str::to_string),
            }),
        }
    }

    #[derive(Default)]
    struct StubSource {
        sports: Vec<RawArticle>,
        general: Vec<RawArticle>,
        sports_hangs: bool,
        general_fails: bool,
        scrape_hangs: bool,
        image: Option<String>,
        scrapes: AtomicUsize,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl ArticleSource for StubSource {
        async fn fetch_batch(&self, feed: &FeedSpec) -> Result<Vec<RawArticle>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if feed.is_sports {
                if self.sports_hangs {
                    std::future::pending::<()>().await;
                }
                Ok(self.sports.clone())
            } else if self.general_fails {
                Err(Error::ExternalFetch("general feed: 503".into()))
            } else {
                Ok(self.general.clone())
            }
        }

        async fn scrape_image(&self, _url: &str) -> Option<String> {
            self.scrapes.fetch_add(1, Ordering::SeqCst);
            if self.scrape_hangs {
                std::future::pending::<()>().await;
            }
            self.image.clone()
        }
    }

    fn pipeline(
        source: Arc<StubSource>,
        store: Arc<MemoryNewsStore>,
        dir: &std::path::Path,
    ) -> RefreshPipeline {
        RefreshPipeline::new(
            source,
            ClassifierStore::new(dir),
            store,
            PipelineConfig {
                feed_deadline: Duration::from_millis(100),
                enrich_deadline: Duration::from_millis(100),
                refresh_interval: Duration::from_secs(600),
                retry_interval: Duration::from_secs(60),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn stores_both_feeds_with_feed_specific_labels() {
        let tmp = tempfile::tempdir().unwrap();
        let source = Arc::new(StubSource {
            sports: vec![raw(
                "https://example.com/s1",
                "Cup final ends in draw",
                Some("https://img/s1.jpg"),
            )],
            general: vec![raw(
                "https://example.com/g1",
                "Verified report from trusted journalist",
                Some("https://img/g1.jpg"),
            )],
            ..Default::default()
        });
        let store = Arc::new(MemoryNewsStore::new());

        let report = pipeline(source.clone(), store.clone(), tmp.path())
            .run_once()
            .await
            .unwrap();

        assert_eq!(report.stored, 2);
        assert!(report.is_clean());
        assert_eq!(source.scrapes.load(Ordering::SeqCst), 0);

        let sports = store
            .query_by_category(&CategoryQuery::new("sports").unwrap())
            .await
            .unwrap();
        assert_eq!(sports.len(), 1);
        assert_eq!(sports[0].news_category, "Sports");
        assert!(sports[0].is_sports);

        let general = store
            .query_by_category(&CategoryQuery::new("world").unwrap())
            .await
            .unwrap();
        assert_eq!(general[0].news_category, "World news");
        assert!(!general[0].is_sports);
        assert!(general[0].prediction);
    }

    #[tokio::test]
    async fn hanging_feed_does_not_block_the_other_feed() {
        let tmp = tempfile::tempdir().unwrap();
        let source = Arc::new(StubSource {
            sports: vec![raw(
                "https://example.com/s1",
                "Never arrives at all",
                None,
            )],
            general: vec![raw(
                "https://example.com/g1",
                "Summit opens in Geneva",
                None,
            )],
            sports_hangs: true,
            ..Default::default()
        });
        let store = Arc::new(MemoryNewsStore::new());

        let report = pipeline(source, store.clone(), tmp.path())
            .run_once()
            .await
            .unwrap();

        assert_eq!(report.failed_feeds, vec!["sports".to_string()]);
        assert_eq!(report.stored, 1);
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.query_recent(20).await.unwrap()[0].web_url,
            "https://example.com/g1"
        );
    }

    #[tokio::test]
    async fn all_feeds_failing_fails_the_iteration() {
        let tmp = tempfile::tempdir().unwrap();
        let source = Arc::new(StubSource {
            sports_hangs: true,
            general_fails: true,
            ..Default::default()
        });
        let store = Arc::new(MemoryNewsStore::new());

        let err = pipeline(source, store.clone(), tmp.path())
            .run_once()
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ExternalFetch(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn missing_thumbnail_is_enriched_or_left_absent() {
        let tmp = tempfile::tempdir().unwrap();
        let articles = vec![
            raw("https://example.com/g1", "Summit opens in Geneva", None),
            raw("https://example.com/g2", "Markets close higher", Some("None")),
        ];

        let found = Arc::new(StubSource {
            general: articles.clone(),
            image: Some("https://img/og.jpg".into()),
            ..Default::default()
        });
        let store = Arc::new(MemoryNewsStore::new());
        let report = pipeline(found.clone(), store.clone(), tmp.path())
            .run_once()
            .await
            .unwrap();
        assert_eq!(report.enriched, 2);
        assert_eq!(found.scrapes.load(Ordering::SeqCst), 2);
        for article in store.query_recent(20).await.unwrap() {
            assert_eq!(article.img_url.as_deref(), Some("https://img/og.jpg"));
        }

        let nothing = Arc::new(StubSource {
            general: articles,
            ..Default::default()
        });
        let store = Arc::new(MemoryNewsStore::new());
        let report = pipeline(nothing, store.clone(), tmp.path())
            .run_once()
            .await
            .unwrap();
        assert_eq!(report.stored, 2);
        assert_eq!(report.enriched, 0);
        for article in store.query_recent(20).await.unwrap() {
            assert_eq!(article.img_url, None);
        }
    }

    #[tokio::test]
    async fn hanging_image_lookup_still_stores_the_article() {
        let tmp = tempfile::tempdir().unwrap();
        let source = Arc::new(StubSource {
            sports: vec![raw("https://example.com/s1", "Cup final ends in draw", None)],
            general: vec![
                raw("https://example.com/g1", "Summit opens in Geneva", None),
                raw(
                    "https://example.com/g2",
                    "Markets close higher",
                    Some("https://img/g2.jpg"),
                ),
            ],
            scrape_hangs: true,
            image: Some("https://img/never.jpg".into()),
            ..Default::default()
        });
        let store = Arc::new(MemoryNewsStore::new());

        let report = tokio::time::timeout(
            Duration::from_secs(5),
            pipeline(source.clone(), store.clone(), tmp.path()).run_once(),
        )
        .await
        .expect("image lookups must be bounded")
        .unwrap();

        assert_eq!(report.stored, 3);
        assert_eq!(report.enriched, 0);
        assert!(report.is_clean());
        assert_eq!(source.scrapes.load(Ordering::SeqCst), 2);

        let hung = store.query_recent(20).await.unwrap();
        let img = |url: &str| {
            hung.iter()
                .find(|a| a.web_url == url)
                .map(|a| a.img_url.clone())
                .unwrap()
        };
        assert_eq!(img("https://example.com/s1"), None);
        assert_eq!(img("https://example.com/g1"), None);
        assert_eq!(img("https://example.com/g2").as_deref(), Some("https://img/g2.jpg"));
    }

    #[tokio::test]
    async fn repeated_cycles_upsert_instead_of_duplicating() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryNewsStore::new());

        let before = Arc::new(StubSource {
            general: vec![raw(
                "https://example.com/g1",
                "Original headline here",
                Some("https://img/1.jpg"),
            )],
            ..Default::default()
        });
        pipeline(before, store.clone(), tmp.path())
            .run_once()
            .await
            .unwrap();

        let after = Arc::new(StubSource {
            general: vec![raw(
                "https://example.com/g1",
                "Corrected headline here",
                Some("https://img/1.jpg"),
            )],
            ..Default::default()
        });
        pipeline(after, store.clone(), tmp.path())
            .run_once()
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.query_recent(20).await.unwrap()[0].title,
            "Corrected headline here"
        );
    }

    #[tokio::test]
    async fn shutdown_interrupts_the_sleep() {
        let tmp = tempfile::tempdir().unwrap();
        let source = Arc::new(StubSource {
            general: vec![raw(
                "https://example.com/g1",
                "Summit opens in Geneva",
                Some("https://img/1.jpg"),
            )],
            ..Default::default()
        });
        let store = Arc::new(MemoryNewsStore::new());
        let pipeline = pipeline(source.clone(), store.clone(), tmp.path());
        let mut status = pipeline.status();

        let handle = pipeline.spawn();
        status
            .wait_for(|s| s.state == PipelineState::SleepingAfterSuccess)
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("pipeline did not stop");

        assert_eq!(status.borrow().state, PipelineState::Stopped);
        assert_eq!(status.borrow().iterations, 1);
        assert!(status.borrow().last_success_at.is_some());
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(store.len(), 1);
    }
}
