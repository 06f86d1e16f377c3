//! Integration tests for the AutoReader engine
//!
//! All timer behaviour runs on tokio's paused clock. These tests verify:
//! - FIFO navigation on bottom-of-page signals
//! - Terminal behaviour when the feed is exhausted
//! - Toggle semantics of the Scroll Driver (no duplicate timers)
//! - Lifetime reaction cap across navigations
//! - Health monitoring independent of the reading and liking flags
//! - Reactivation after the health monitor reloads the page

use async_trait::async_trait;
use autoread::engine::{AutoReader, EngineEvent};
use autoread::models::AutoReadConfig;
use autoread::page::{ControlKind, MemoryPage};
use autoread::services::{DispatchState, ItemSource, ScrollState};
use autoread::state::MemoryStore;
use autoread::ui::ControlCommand;
use autoread::{Item, Metrics, SessionManager};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BASE: &str = "https://linux.do";

/// Feed that hands out prepared batches, then nothing
#[derive(Default)]
struct ScriptedSource {
    batches: Mutex<Vec<Vec<Item>>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    fn new(batches: Vec<Vec<Item>>) -> Self {
        Self {
            batches: Mutex::new(batches),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemSource for ScriptedSource {
    async fn fetch_batch(&self, limit: usize) -> Vec<Item> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut batches = self.batches.lock().unwrap();
        if batches.is_empty() {
            return Vec::new();
        }
        let mut batch = batches.remove(0);
        batch.truncate(limit);
        batch
    }
}

struct Harness {
    reader: AutoReader,
    session: SessionManager,
    page: Arc<MemoryPage>,
    source: Arc<ScriptedSource>,
}

fn harness_with(config: AutoReadConfig, batches: Vec<Vec<Item>>) -> Harness {
    let session = SessionManager::new(Arc::new(MemoryStore::new()));
    let page = Arc::new(MemoryPage::new(format!("{}/latest", BASE)));
    let source = Arc::new(ScriptedSource::new(batches));
    let reader = AutoReader::new(
        config,
        session.clone(),
        page.clone(),
        source.clone(),
        BASE,
        Arc::new(Metrics::new()),
    );
    Harness {
        reader,
        session,
        page,
        source,
    }
}

fn harness(batches: Vec<Vec<Item>>) -> Harness {
    harness_with(AutoReadConfig::default(), batches)
}

#[tokio::test(start_paused = true)]
async fn test_two_advances_visit_a_then_b_leaving_c() {
    let mut h = harness(vec![]);
    h.session
        .replace_queue(vec![Item::new(1, 5), Item::new(2, 5), Item::new(3, 5)]);
    h.session.set_reading(true);

    h.reader.handle_event(EngineEvent::ReachedBottom).await;
    h.reader.handle_event(EngineEvent::ReachedBottom).await;

    assert_eq!(
        h.page.navigations(),
        vec![format!("{}/t/topic/1", BASE), format!("{}/t/topic/2", BASE)]
    );
    assert_eq!(h.session.read(|s| s.pending_queue.clone()), vec![Item::new(3, 5)]);
    assert_eq!(h.source.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_empty_feed_leaves_reader_idle() {
    let mut h = harness(vec![]);
    h.reader.start();
    h.reader.toggle_reading();
    assert_eq!(h.reader.scroll_state(), ScrollState::Scrolling);

    h.reader.handle_event(EngineEvent::ReachedBottom).await;

    assert!(h.page.navigations().is_empty());
    assert_eq!(h.source.calls(), 1);
    assert_eq!(h.reader.scroll_state(), ScrollState::Idle);
    assert_eq!(h.reader.scroll().active_bottom_checks(), 0);
    // Flag stays set so a later start retries
    assert!(h.session.read(|s| s.reading_enabled));
}

#[tokio::test(start_paused = true)]
async fn test_restarting_reading_after_exhausted_feed_fetches_again() {
    let mut h = harness(vec![vec![], vec![Item::new(5, 3)]]);
    assert!(h.reader.toggle_reading());
    h.reader.handle_event(EngineEvent::ReachedBottom).await;
    assert_eq!(h.reader.scroll_state(), ScrollState::Idle);

    // Off, then on again
    assert!(!h.reader.toggle_reading());
    assert!(h.reader.toggle_reading());
    assert_eq!(h.reader.scroll_state(), ScrollState::Scrolling);

    h.reader.handle_event(EngineEvent::ReachedBottom).await;
    assert_eq!(h.source.calls(), 2);
    assert_eq!(h.page.navigations(), vec![format!("{}/t/topic/5", BASE)]);
}

#[tokio::test(start_paused = true)]
async fn test_toggle_reading_off_cancels_tick_and_bottom_check() {
    let mut h = harness(vec![]);
    h.page.set_content_height(Some(100_000.0));

    assert!(h.reader.toggle_reading());
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(h.reader.scroll().active_tickers(), 1);
    assert_eq!(h.reader.scroll().active_bottom_checks(), 1);

    assert!(!h.reader.toggle_reading());
    assert_eq!(h.reader.scroll().active_tickers(), 0);
    assert_eq!(h.reader.scroll().active_bottom_checks(), 0);

    let position = h.page.scroll_y();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.page.scroll_y(), position);

    assert!(h.reader.toggle_reading());
    assert_eq!(h.reader.scroll().active_tickers(), 1);
    assert_eq!(h.reader.scroll().active_bottom_checks(), 1);

    // One ticker: 30px per 30ms
    let before = h.page.scroll_calls();
    tokio::time::sleep(Duration::from_millis(301)).await;
    let ticks = h.page.scroll_calls() - before;
    assert!((10..=11).contains(&ticks), "unexpected tick count {}", ticks);
}

#[tokio::test(start_paused = true)]
async fn test_reading_through_feed_via_event_loop() {
    let mut h = harness(vec![vec![Item::new(21, 3), Item::new(22, 3)]]);
    h.page.set_content_height(Some(1000.0));

    h.reader.start();
    h.reader.toggle_reading();

    for _ in 0..3 {
        let event = h.reader.next_event().await.unwrap();
        assert_eq!(event, EngineEvent::ReachedBottom);
        h.reader.handle_event(event).await;
    }

    assert_eq!(
        h.page.navigations(),
        vec![format!("{}/t/topic/21", BASE), format!("{}/t/topic/22", BASE)]
    );
    assert_eq!(h.source.calls(), 2);
    assert_eq!(h.reader.scroll_state(), ScrollState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_reaction_cap_holds_across_navigations() {
    let mut config = AutoReadConfig::default();
    config.limits.reaction_cap = 3;
    let mut h = harness_with(config, vec![]);
    h.session
        .replace_queue(vec![Item::new(1, 5), Item::new(2, 5), Item::new(3, 5)]);
    h.session.set_reading(true);

    for _ in 0..2 {
        h.page.add_reaction("Like this post");
    }
    h.reader.toggle_liking();

    for _ in 0..3 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        for _ in 0..2 {
            h.page.add_reaction("点赞此帖子");
        }
        h.reader.handle_event(EngineEvent::ReachedBottom).await;
    }
    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(h.session.read(|s| s.reaction_count), 3);
    let reactions = h
        .page
        .triggered()
        .into_iter()
        .filter(|(kind, _)| *kind == ControlKind::Reaction)
        .count();
    assert_eq!(reactions, 3);
    assert_eq!(h.reader.reaction_state(), DispatchState::Off);
}

#[tokio::test(start_paused = true)]
async fn test_liking_toggle_at_cap_is_noop() {
    let mut config = AutoReadConfig::default();
    config.limits.reaction_cap = 1;
    let mut h = harness_with(config, vec![]);
    h.session.record_reaction(1);
    h.page.add_reaction("Like this post");

    assert!(h.reader.toggle_liking());
    assert_eq!(h.reader.reaction_state(), DispatchState::Off);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(h.page.triggered().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_health_monitor_runs_without_reading_or_liking() {
    let mut h = harness(vec![]);
    h.page.set_body_text("崩溃啦");
    h.page.add_button("重新加载");

    h.reader.start();
    tokio::time::sleep(Duration::from_millis(3500)).await;

    assert!(h.reader.health_running());
    assert!(!h.page.triggered().is_empty());

    h.reader.shutdown();
    assert!(!h.reader.health_running());
}

#[tokio::test(start_paused = true)]
async fn test_recovery_reload_restarts_liking_pass() {
    let mut config = AutoReadConfig::default();
    config.reactions.delay_ms = 5000;
    let mut h = harness_with(config, vec![]);
    h.page.add_reaction("Like this post");
    h.page.add_reaction("Like this post");
    h.session.set_liking(true);

    h.reader.start();
    assert_eq!(h.reader.reaction_state(), DispatchState::Dispatching);
    // First pass has found its controls and is waiting out the delay
    tokio::time::sleep(Duration::from_millis(100)).await;

    h.page.set_body_text("崩溃啦");
    h.page.add_button("重新加载");

    let event = h.reader.next_event().await.unwrap();
    assert_eq!(event, EngineEvent::PageReloaded);
    assert_eq!(h.page.epoch(), 1);

    h.page.set_body_text("");
    assert!(h.reader.handle_event(event).await);
    assert_eq!(h.reader.reaction_state(), DispatchState::Dispatching);

    tokio::time::sleep(Duration::from_secs(20)).await;

    let triggered = h.page.triggered();
    let reactions = triggered
        .iter()
        .filter(|(kind, _)| *kind == ControlKind::Reaction)
        .count();
    let reloads = triggered
        .iter()
        .filter(|(kind, _)| *kind == ControlKind::Button)
        .count();
    assert_eq!(reactions, 2);
    assert_eq!(reloads, 1);
    assert_eq!(h.session.read(|s| s.reaction_count), 2);
    assert_eq!(
        h.reader.metrics().recoveries_triggered.load(Ordering::Relaxed),
        1
    );
    assert_eq!(h.reader.reaction_state(), DispatchState::Off);
}

#[tokio::test(start_paused = true)]
async fn test_queue_entries_above_ceiling_dropped_at_startup() {
    let session = SessionManager::new(Arc::new(MemoryStore::new()));
    session.replace_queue(vec![Item::new(1, 10), Item::new(2, 5000), Item::new(3, 999)]);

    let _reader = AutoReader::new(
        AutoReadConfig::default(),
        session.clone(),
        Arc::new(MemoryPage::new(BASE)),
        Arc::new(ScriptedSource::default()),
        BASE,
        Arc::new(Metrics::new()),
    );

    let ids: Vec<u64> = session.read(|s| s.pending_queue.iter().map(|i| i.id).collect());
    assert_eq!(ids, vec![1, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_commands_through_handle() {
    let mut h = harness(vec![]);
    let handle = h.reader.handle();

    assert!(handle.send(ControlCommand::ToggleReading));
    assert!(handle.send(ControlCommand::Status));
    assert!(handle.send(ControlCommand::Quit));

    h.reader.run().await;

    assert!(h.session.read(|s| s.reading_enabled));
    assert_eq!(h.reader.scroll_state(), ScrollState::Idle);
}
