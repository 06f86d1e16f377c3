//! The reader engine.
//!
//! [`AutoReader`] owns the session and every service, and runs a single event
//! loop: bottom-of-page signals and control commands are handled one at a
//! time, to completion, in arrival order. Timers live in the services as
//! spawned tasks and only ever talk back to the engine through this loop.

use crate::metrics::Metrics;
use crate::models::{AutoReadConfig, Item};
use crate::page::Page;
use crate::services::{
    DispatchState, HealthMonitor, ItemSource, MarkdownExporter, Navigator, ReactionDispatcher,
    ScrollDriver, ScrollState,
};
use crate::state::SessionManager;
use crate::ui::ControlCommand;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Inputs to the engine loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The bottom check saw the end of content
    ReachedBottom,
    /// The health monitor reloaded the page in place
    PageReloaded,
    Command(ControlCommand),
    Shutdown,
}

/// Cloneable sender for driving a running [`AutoReader`]
#[derive(Clone, Debug)]
pub struct AutoReaderHandle {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl AutoReaderHandle {
    pub fn new(tx: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self { tx }
    }

    /// Queue a command. Returns `false` if the engine has stopped.
    pub fn send(&self, command: ControlCommand) -> bool {
        self.tx.send(EngineEvent::Command(command)).is_ok()
    }

    pub fn shutdown(&self) -> bool {
        self.tx.send(EngineEvent::Shutdown).is_ok()
    }
}

pub struct AutoReader {
    config: AutoReadConfig,
    session: SessionManager,
    page: Arc<dyn Page>,
    scroll: ScrollDriver,
    navigator: Navigator,
    reactions: ReactionDispatcher,
    health: HealthMonitor,
    exporter: MarkdownExporter,
    metrics: Arc<Metrics>,
    events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
}

impl AutoReader {
    pub fn new(
        config: AutoReadConfig,
        session: SessionManager,
        page: Arc<dyn Page>,
        source: Arc<dyn ItemSource>,
        base_url: impl Into<String>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let ceiling = config.limits.comment_ceiling;
        let dropped = session.retain_queue(|item: &Item| item.post_count < ceiling);
        if dropped > 0 {
            tracing::info!(
                "Dropped {} queued topics at or above the {} post ceiling",
                dropped,
                ceiling
            );
        }

        let scroll = ScrollDriver::new(
            Arc::clone(&page),
            session.clone(),
            config.scroll.clone(),
            events_tx.clone(),
            Arc::clone(&metrics),
        );
        let navigator = Navigator::new(
            source,
            session.clone(),
            Arc::clone(&page),
            base_url,
            config.limits.batch_size,
            Arc::clone(&metrics),
        );
        let reactions = ReactionDispatcher::new(
            Arc::clone(&page),
            session.clone(),
            config.reactions.clone(),
            config.limits.reaction_cap,
            Arc::clone(&metrics),
        );
        let health = HealthMonitor::new(
            Arc::clone(&page),
            config.reload.clone(),
            events_tx.clone(),
            Arc::clone(&metrics),
        );
        let exporter = MarkdownExporter::new(config.export.dir.as_str(), Arc::clone(&metrics));

        Self {
            config,
            session,
            page,
            scroll,
            navigator,
            reactions,
            health,
            exporter,
            metrics,
            events_tx,
            events_rx,
        }
    }

    pub fn handle(&self) -> AutoReaderHandle {
        AutoReaderHandle::new(self.events_tx.clone())
    }

    /// Start the health monitor and activate the current page
    pub fn start(&mut self) {
        tracing::info!("Reader starting on {}", self.navigator.base_url());
        self.health.start();
        self.on_page_loaded();
    }

    /// Resume whatever the persisted flags ask for on a freshly loaded page
    fn on_page_loaded(&mut self) {
        let (reading, liking) = self
            .session
            .read(|s| (s.reading_enabled, s.liking_enabled));

        // Controls found on the previous page are stale now
        self.reactions.invalidate();

        if reading {
            self.scroll.start();
        } else {
            self.scroll.stop();
        }
        if liking {
            self.reactions.activate();
        }
    }

    /// Flip reading and start or stop scrolling. Returns the new flag.
    pub fn toggle_reading(&mut self) -> bool {
        let enabled = self.session.toggle_reading();
        if enabled {
            tracing::info!("Reading enabled");
            self.scroll.start();
        } else {
            tracing::info!("Reading disabled");
            self.scroll.stop();
        }
        enabled
    }

    /// Flip liking and start a pass when turned on. Returns the new flag.
    ///
    /// Turning liking off lets a running pass stop at its next check.
    pub fn toggle_liking(&mut self) -> bool {
        let enabled = self.session.toggle_liking();
        if enabled {
            tracing::info!("Liking enabled");
            self.reactions.activate();
        } else {
            tracing::info!("Liking disabled");
        }
        enabled
    }

    async fn on_reached_bottom(&mut self) {
        if !self.session.read(|s| s.reading_enabled) {
            tracing::debug!("Bottom signal while not reading, ignored");
            return;
        }

        match self.navigator.advance().await {
            Some(_) => self.on_page_loaded(),
            None => {
                tracing::info!("Nothing left to read, scrolling stopped until reading is restarted");
                self.scroll.stop();
            }
        }
    }

    async fn export_current(&self) {
        match self.exporter.export(self.page.as_ref()).await {
            Ok(Some(path)) => tracing::info!("Article saved to {}", path),
            Ok(None) => {}
            Err(e) => tracing::warn!("Export failed: {:#}", e),
        }
    }

    fn log_status(&self) {
        let state = self.session.snapshot();
        tracing::info!(
            "Status: reading={} ({:?}), liking={} ({:?}), reactions={}/{}, queued={}",
            state.reading_enabled,
            self.scroll.state(),
            state.liking_enabled,
            self.reactions.state(),
            state.reaction_count,
            self.config.limits.reaction_cap,
            state.pending_queue.len()
        );
    }

    /// Handle one event to completion. Returns `false` when the loop should end.
    pub async fn handle_event(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::ReachedBottom => self.on_reached_bottom().await,
            EngineEvent::PageReloaded => {
                tracing::info!("Page reloaded after recovery, reactivating");
                self.on_page_loaded();
            }
            EngineEvent::Command(command) => match command {
                ControlCommand::ToggleReading => {
                    self.toggle_reading();
                }
                ControlCommand::ToggleLiking => {
                    self.toggle_liking();
                }
                ControlCommand::Export => self.export_current().await,
                ControlCommand::Status => self.log_status(),
                ControlCommand::Quit => return false,
            },
            EngineEvent::Shutdown => return false,
        }
        true
    }

    /// Wait for the next event without handling it
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.events_rx.recv().await
    }

    /// Run until quit or shutdown, then tear everything down
    pub async fn run(&mut self) {
        while let Some(event) = self.events_rx.recv().await {
            if !self.handle_event(event).await {
                break;
            }
        }
        self.shutdown();
    }

    /// Cancel every timer the engine owns
    pub fn shutdown(&mut self) {
        self.scroll.stop();
        self.reactions.invalidate();
        self.health.stop();
        tracing::info!("Reader stopped");
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn scroll(&self) -> &ScrollDriver {
        &self.scroll
    }

    pub fn scroll_state(&self) -> ScrollState {
        self.scroll.state()
    }

    pub fn reaction_state(&self) -> DispatchState {
        self.reactions.state()
    }

    pub fn health_running(&self) -> bool {
        self.health.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::MemoryPage;
    use crate::services::item_source::MockItemSource;
    use crate::state::MemoryStore;
    use std::time::Duration;

    fn engine(source: MockItemSource, page: Arc<MemoryPage>) -> AutoReader {
        let session = SessionManager::new(Arc::new(MemoryStore::new()));
        AutoReader::new(
            AutoReadConfig::default(),
            session,
            page,
            Arc::new(source),
            "https://linux.do",
            Arc::new(Metrics::new()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_bottom_signal_ignored_when_not_reading() {
        let mut source = MockItemSource::new();
        source.expect_fetch_batch().never();
        let page = Arc::new(MemoryPage::new("https://linux.do/latest"));
        let mut reader = engine(source, page.clone());

        assert!(reader.handle_event(EngineEvent::ReachedBottom).await);
        assert!(page.navigations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_and_shutdown_end_loop() {
        let page = Arc::new(MemoryPage::new("https://linux.do/latest"));
        let mut reader = engine(MockItemSource::new(), page);

        assert!(!reader.handle_event(EngineEvent::Command(ControlCommand::Quit)).await);
        assert!(!reader.handle_event(EngineEvent::Shutdown).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reading_follows_bottom_to_next_topic() {
        let mut source = MockItemSource::new();
        source
            .expect_fetch_batch()
            .times(1)
            .returning(|_| vec![Item::new(11, 3), Item::new(12, 3)]);
        let page = Arc::new(MemoryPage::new("https://linux.do/latest"));
        page.set_content_height(Some(900.0));
        let mut reader = engine(source, page.clone());

        reader.start();
        assert!(reader.toggle_reading());

        let event = reader.next_event().await.unwrap();
        assert_eq!(event, EngineEvent::ReachedBottom);
        reader.handle_event(event).await;

        assert_eq!(page.navigations(), vec!["https://linux.do/t/topic/11".to_string()]);
        assert_eq!(reader.scroll_state(), ScrollState::Scrolling);
        assert_eq!(reader.scroll().active_tickers(), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        reader.shutdown();
        assert!(!reader.health_running());
    }
}
