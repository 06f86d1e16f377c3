use crate::metrics::Metrics;
use crate::models::Item;
use crate::page::Page;
use crate::services::item_source::ItemSource;
use crate::state::SessionManager;
use std::sync::Arc;

/// Navigation Controller
///
/// Owns the queue discipline: refill from the [`ItemSource`] only when the
/// queue is empty, then take the head and display it.
pub struct Navigator {
    source: Arc<dyn ItemSource>,
    session: SessionManager,
    page: Arc<dyn Page>,
    base_url: String,
    batch_size: usize,
    metrics: Arc<Metrics>,
}

impl Navigator {
    pub fn new(
        source: Arc<dyn ItemSource>,
        session: SessionManager,
        page: Arc<dyn Page>,
        base_url: impl Into<String>,
        batch_size: usize,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            source,
            session,
            page,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            batch_size,
            metrics,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fill an empty queue with a fresh batch. Returns the queue length afterwards.
    pub async fn replenish_if_empty(&self) -> usize {
        let queued = self.session.read(|s| s.pending_queue.len());
        if queued > 0 {
            return queued;
        }

        tracing::info!("Queue empty, fetching up to {} topics", self.batch_size);
        let batch = self.source.fetch_batch(self.batch_size).await;
        let len = batch.len();
        self.session.replace_queue(batch);
        len
    }

    /// Move to the next queued item.
    ///
    /// Returns the item navigated to, or `None` when nothing is available even
    /// after replenishment. A failed navigation still consumes the item.
    pub async fn advance(&self) -> Option<Item> {
        if self.replenish_if_empty().await == 0 {
            tracing::info!("No eligible topics available");
            return None;
        }

        let item = self.session.dequeue()?;
        let url = item.url(&self.base_url);

        match self.page.navigate(&url).await {
            Ok(()) => {
                self.metrics.record_navigation();
                tracing::info!(
                    "Opened topic {} ({} posts), {} left in queue",
                    item.id,
                    item.post_count,
                    self.session.read(|s| s.pending_queue.len())
                );
            }
            Err(e) => tracing::warn!("Failed to open topic {}: {}", item.id, e),
        }

        Some(item)
    }
}
