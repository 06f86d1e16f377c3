use crate::metrics::Metrics;
use crate::models::Item;
use anyhow::{Context, Result};
use async_trait::async_trait;
use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from a single feed page request
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Request for page {page} failed: {source}")]
    Request {
        page: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("Page {page} returned HTTP {status}")]
    Status { page: u32, status: u16 },

    #[error("Page {page} is not a topic list: {source}")]
    Decode {
        page: u32,
        #[source]
        source: reqwest::Error,
    },
}

/// Supplier of eligible items for the navigation queue.
///
/// `fetch_batch` never fails: transport problems end the batch early and
/// whatever was already collected is returned.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ItemSource: Send + Sync {
    async fn fetch_batch(&self, limit: usize) -> Vec<Item>;
}

#[derive(Debug, Default, Deserialize)]
struct LatestResponse {
    #[serde(default)]
    topic_list: Option<TopicList>,
}

#[derive(Debug, Default, Deserialize)]
struct TopicList {
    #[serde(default)]
    topics: Vec<Item>,
}

/// Items with fewer posts than `ceiling`, in feed order
pub fn filter_eligible(items: Vec<Item>, ceiling: u32) -> Vec<Item> {
    items
        .into_iter()
        .filter(|item| item.post_count < ceiling)
        .collect()
}

/// Upper bound on listing pages requested for one batch
pub const DEFAULT_MAX_PAGES: u32 = 20;

/// Paginated client for a forum's `latest.json` listing
pub struct HttpItemSource {
    client: reqwest::Client,
    base_url: String,
    comment_ceiling: u32,
    max_pages: u32,
    metrics: Arc<Metrics>,
}

impl HttpItemSource {
    pub fn new(
        base_url: impl Into<String>,
        comment_ceiling: u32,
        timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for the topic feed")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            comment_ceiling,
            max_pages: DEFAULT_MAX_PAGES,
            metrics,
        })
    }

    pub fn with_max_pages(mut self, max_pages: u32) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    pub fn page_url(&self, page: u32) -> String {
        format!("{}/latest.json?no_definitions=true&page={}", self.base_url, page)
    }

    /// Fetch one listing page, returning its raw (unfiltered) topics
    pub async fn fetch_page(&self, page: u32) -> Result<Vec<Item>, SourceError> {
        let resp = self
            .client
            .get(self.page_url(page))
            .send()
            .await
            .map_err(|source| SourceError::Request { page, source })?;

        if !resp.status().is_success() {
            return Err(SourceError::Status {
                page,
                status: resp.status().as_u16(),
            });
        }

        let body: LatestResponse = resp
            .json()
            .await
            .map_err(|source| SourceError::Decode { page, source })?;

        Ok(body.topic_list.map(|list| list.topics).unwrap_or_default())
    }
}

#[async_trait]
impl ItemSource for HttpItemSource {
    async fn fetch_batch(&self, limit: usize) -> Vec<Item> {
        let mut collected: IndexMap<u64, Item> = IndexMap::new();
        let mut seen: IndexSet<u64> = IndexSet::new();
        let mut page = 1;

        while collected.len() < limit {
            if page > self.max_pages {
                tracing::debug!("Stopping after {} pages", self.max_pages);
                break;
            }

            let topics = match self.fetch_page(page).await {
                Ok(topics) => topics,
                Err(e) => {
                    tracing::warn!(
                        "Fetching topics failed, keeping {} so far: {}",
                        collected.len(),
                        e
                    );
                    self.metrics.record_fetch_failure();
                    break;
                }
            };
            self.metrics.record_page_fetched();

            if topics.is_empty() {
                tracing::debug!("Page {} has no topics, feed exhausted", page);
                break;
            }

            let unseen = topics.iter().filter(|t| seen.insert(t.id)).count();
            if unseen == 0 {
                tracing::debug!("Page {} repeats topics already seen, feed exhausted", page);
                break;
            }

            for item in filter_eligible(topics, self.comment_ceiling) {
                collected.entry(item.id).or_insert(item);
            }
            page += 1;
        }

        let batch: Vec<Item> = collected.into_values().take(limit).collect();
        self.metrics.record_items_enqueued(batch.len());
        tracing::info!("Fetched {} eligible topics", batch.len());
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn topics_body(topics: &[(u64, u32)]) -> String {
        let topics: Vec<_> = topics
            .iter()
            .map(|(id, posts)| serde_json::json!({ "id": id, "posts_count": posts }))
            .collect();
        serde_json::json!({ "topic_list": { "topics": topics } }).to_string()
    }

    async fn mount_page(server: &wiremock::MockServer, page: u32, body: String) {
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/latest.json"))
            .and(wiremock::matchers::query_param("no_definitions", "true"))
            .and(wiremock::matchers::query_param("page", page.to_string()))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_raw(body, "application/json"),
            )
            .mount(server)
            .await;
    }

    fn source(base: &str, ceiling: u32) -> HttpItemSource {
        HttpItemSource::new(base, ceiling, Duration::from_secs(5), Arc::new(Metrics::new()))
            .unwrap()
    }

    #[test]
    fn test_page_url_shape() {
        let source = source("https://linux.do/", 1000);
        assert_eq!(
            source.page_url(3),
            "https://linux.do/latest.json?no_definitions=true&page=3"
        );
    }

    #[test]
    fn test_filter_is_strictly_below_ceiling() {
        let items = vec![Item::new(1, 1500), Item::new(2, 999), Item::new(3, 1000)];
        let eligible = filter_eligible(items, 1000);
        assert_eq!(eligible, vec![Item::new(2, 999)]);
    }

    #[tokio::test]
    async fn test_fetch_batch_stops_on_empty_page() {
        let server = wiremock::MockServer::start().await;
        mount_page(&server, 1, topics_body(&[(1, 10), (2, 1500)])).await;
        mount_page(&server, 2, topics_body(&[(3, 20)])).await;
        mount_page(&server, 3, topics_body(&[])).await;

        let batch = source(&server.uri(), 1000).fetch_batch(100).await;
        assert_eq!(batch.iter().map(|i| i.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_fetch_batch_truncates_to_limit() {
        let server = wiremock::MockServer::start().await;
        mount_page(&server, 1, topics_body(&[(1, 1), (2, 1), (3, 1)])).await;

        let batch = source(&server.uri(), 1000).fetch_batch(2).await;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, 1);
    }

    #[tokio::test]
    async fn test_fetch_batch_keeps_partial_results_on_failure() {
        let server = wiremock::MockServer::start().await;
        mount_page(&server, 1, topics_body(&[(1, 1)])).await;
        wiremock::Mock::given(wiremock::matchers::query_param("page", "2"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let batch = source(&server.uri(), 1000).fetch_batch(100).await;
        assert_eq!(batch, vec![Item::new(1, 1)]);
    }

    #[tokio::test]
    async fn test_fetch_batch_ends_when_pages_repeat() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/latest.json"))
            .respond_with(
                wiremock::ResponseTemplate::new(200).set_body_raw(
                    topics_body(&[(1, 1), (2, 1), (3, 1)]),
                    "application/json",
                ),
            )
            .mount(&server)
            .await;

        let batch = tokio::time::timeout(
            Duration::from_secs(5),
            source(&server.uri(), 1000).fetch_batch(100),
        )
        .await
        .expect("fetch_batch should end on a repeated page");

        assert_eq!(batch.iter().map(|i| i.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_batch_respects_page_bound() {
        let server = wiremock::MockServer::start().await;
        for page in 1..=5u64 {
            mount_page(&server, page as u32, topics_body(&[(page, 5000)])).await;
        }

        let batch = source(&server.uri(), 1000)
            .with_max_pages(3)
            .fetch_batch(10)
            .await;

        assert!(batch.is_empty());
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    proptest! {
        #[test]
        fn prop_filter_never_admits_ceiling_or_above(
            posts in proptest::collection::vec(0u32..5000, 0..50),
            ceiling in 1u32..3000,
        ) {
            let items: Vec<Item> = posts
                .iter()
                .enumerate()
                .map(|(i, p)| Item::new(i as u64, *p))
                .collect();
            let eligible = filter_eligible(items, ceiling);
            prop_assert!(eligible.iter().all(|i| i.post_count < ceiling));
            prop_assert_eq!(eligible.len(), posts.iter().filter(|p| **p < ceiling).count());
        }
    }
}
