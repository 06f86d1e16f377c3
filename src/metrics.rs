// Performance metrics module
//
// Lightweight counters for what the reader has done during this process

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Engine activity counters
///
/// Uses atomic operations so timers and the event loop can record without
/// locks. Logged on shutdown.
#[derive(Debug)]
pub struct Metrics {
    /// Feed pages fetched successfully
    pub pages_fetched: AtomicU64,

    /// Feed requests that ended a batch early
    pub fetch_failures: AtomicU64,

    /// Items placed in the queue by replenishment
    pub items_enqueued: AtomicU64,

    /// Page transitions to queued items
    pub navigations: AtomicU64,

    /// Times the bottom check signalled end of content
    pub bottom_signals: AtomicU64,

    pub scroll_ticks: AtomicU64,

    pub reactions_dispatched: AtomicU64,

    pub reaction_failures: AtomicU64,

    /// Reload controls pressed by the health monitor
    pub recoveries_triggered: AtomicU64,

    pub exports_written: AtomicU64,

    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            pages_fetched: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            items_enqueued: AtomicU64::new(0),
            navigations: AtomicU64::new(0),
            bottom_signals: AtomicU64::new(0),
            scroll_ticks: AtomicU64::new(0),
            reactions_dispatched: AtomicU64::new(0),
            reaction_failures: AtomicU64::new(0),
            recoveries_triggered: AtomicU64::new(0),
            exports_written: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_page_fetched(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failure(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_items_enqueued(&self, count: usize) {
        self.items_enqueued
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_navigation(&self) {
        self.navigations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bottom_signal(&self) {
        self.bottom_signals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scroll_tick(&self) {
        self.scroll_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reaction(&self) {
        self.reactions_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reaction_failure(&self) {
        self.reaction_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovery(&self) {
        self.recoveries_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_export(&self) {
        self.exports_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Reader Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Feed: {} pages fetched, {} failures, {} items enqueued",
            self.pages_fetched.load(Ordering::Relaxed),
            self.fetch_failures.load(Ordering::Relaxed),
            self.items_enqueued.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Reading: {} navigations, {} bottom signals, {} scroll ticks",
            self.navigations.load(Ordering::Relaxed),
            self.bottom_signals.load(Ordering::Relaxed),
            self.scroll_ticks.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Reactions: {} dispatched, {} failed",
            self.reactions_dispatched.load(Ordering::Relaxed),
            self.reaction_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Recoveries: {}, exports: {}",
            self.recoveries_triggered.load(Ordering::Relaxed),
            self.exports_written.load(Ordering::Relaxed)
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
