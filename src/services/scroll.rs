//! Scroll Driver
//!
//! Two independent tasks while scrolling: a fixed-period ticker that moves the
//! viewport, and a bottom check on its own delay that signals the engine once
//! the end of content is near. Both are owned through their `JoinHandle`s, so
//! restarting replaces them instead of stacking new ones.

use crate::engine::EngineEvent;
use crate::metrics::Metrics;
use crate::models::ScrollSettings;
use crate::page::Page;
use crate::state::SessionManager;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollState {
    Idle,
    Scrolling,
}

pub struct ScrollDriver {
    page: Arc<dyn Page>,
    session: SessionManager,
    settings: ScrollSettings,
    events: mpsc::UnboundedSender<EngineEvent>,
    metrics: Arc<Metrics>,
    tick_task: Option<JoinHandle<()>>,
    bottom_task: Option<JoinHandle<()>>,
}

impl ScrollDriver {
    pub fn new(
        page: Arc<dyn Page>,
        session: SessionManager,
        settings: ScrollSettings,
        events: mpsc::UnboundedSender<EngineEvent>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            page,
            session,
            settings,
            events,
            metrics,
            tick_task: None,
            bottom_task: None,
        }
    }

    /// Enter `Scrolling`, replacing any ticker and bottom check already running
    pub fn start(&mut self) {
        self.cancel_tasks();

        let page = Arc::clone(&self.page);
        let metrics = Arc::clone(&self.metrics);
        let step = self.settings.step_px;
        let period = self.settings.tick_period();

        self.tick_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = page.scroll_by(step).await {
                    tracing::debug!("Scroll tick failed: {}", e);
                }
                metrics.record_scroll_tick();
            }
        }));

        self.bottom_task = Some(tokio::spawn(bottom_check_loop(
            Arc::clone(&self.page),
            self.session.clone(),
            self.settings.clone(),
            self.events.clone(),
            Arc::clone(&self.metrics),
        )));

        tracing::info!(
            "Scrolling started: {}px every {:?}",
            self.settings.step_px,
            self.settings.tick_period()
        );
    }

    /// Enter `Idle`, leaving no outstanding timers
    pub fn stop(&mut self) {
        if self.cancel_tasks() {
            tracing::info!("Scrolling stopped");
        }
    }

    fn cancel_tasks(&mut self) -> bool {
        let mut cancelled = false;
        if let Some(task) = self.tick_task.take() {
            task.abort();
            cancelled = true;
        }
        if let Some(task) = self.bottom_task.take() {
            task.abort();
            cancelled = true;
        }
        cancelled
    }

    pub fn state(&self) -> ScrollState {
        if self.active_tickers() > 0 {
            ScrollState::Scrolling
        } else {
            ScrollState::Idle
        }
    }

    /// Live scroll tickers (0 or 1)
    pub fn active_tickers(&self) -> usize {
        self.tick_task.iter().filter(|t| !t.is_finished()).count()
    }

    /// Live bottom checks (0 or 1)
    pub fn active_bottom_checks(&self) -> usize {
        self.bottom_task.iter().filter(|t| !t.is_finished()).count()
    }
}

impl Drop for ScrollDriver {
    fn drop(&mut self) {
        self.cancel_tasks();
    }
}

/// Check for the bottom now and then on every delay until it is reached.
///
/// Self-gates on the reading flag at every iteration, so a stale check exits
/// on its own. Stops rescheduling after signalling.
async fn bottom_check_loop(
    page: Arc<dyn Page>,
    session: SessionManager,
    settings: ScrollSettings,
    events: mpsc::UnboundedSender<EngineEvent>,
    metrics: Arc<Metrics>,
) {
    loop {
        if !session.read(|s| s.reading_enabled) {
            tracing::debug!("Reading disabled, bottom check exits");
            return;
        }

        match page.scroll_metrics().await {
            Ok(Some(m)) if m.is_near_bottom(settings.bottom_threshold_px) => {
                tracing::info!("Reached bottom of page, requesting next topic");
                metrics.record_bottom_signal();
                let _ = events.send(EngineEvent::ReachedBottom);
                return;
            }
            Ok(Some(_)) => {}
            Ok(None) => tracing::debug!("Page height unavailable, skipping bottom check"),
            Err(e) => tracing::debug!("Bottom check failed: {}", e),
        }

        tokio::time::sleep(settings.bottom_check_delay()).await;
    }
}
