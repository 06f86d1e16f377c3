//! In-memory page provider.
//!
//! Models just enough of a topic page for the engine: a scrollable body of a
//! given height, free text, reaction controls and buttons. Navigation resets
//! the viewport and bumps the epoch, so stale control handles are rejected the
//! way a real reload would invalidate them.

use super::{
    Article, ControlKind, ControlQuery, ControlRef, Page, PageError, PageResult, ScrollMetrics,
};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct MemoryControl {
    kind: ControlKind,
    label: String,
    pressed: bool,
    fails: bool,
}

#[derive(Debug)]
struct MemoryPageState {
    url: String,
    epoch: u64,
    scroll_y: f64,
    viewport_height: f64,
    content_height: Option<f64>,
    body_text: String,
    controls: Vec<MemoryControl>,
    article: Option<Article>,
    navigations: Vec<String>,
    triggered: Vec<(ControlKind, String)>,
    scroll_calls: usize,
    fail_navigation: bool,
}

#[derive(Debug)]
pub struct MemoryPage {
    state: Mutex<MemoryPageState>,
}

impl MemoryPage {
    /// A page at `url`, 800px viewport over 4000px of content
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(MemoryPageState {
                url: url.into(),
                epoch: 0,
                scroll_y: 0.0,
                viewport_height: 800.0,
                content_height: Some(4000.0),
                body_text: String::new(),
                controls: Vec::new(),
                article: None,
                navigations: Vec::new(),
                triggered: Vec::new(),
                scroll_calls: 0,
                fail_navigation: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MemoryPageState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// `None` simulates a page without a measurable body
    pub fn set_content_height(&self, height: Option<f64>) {
        self.lock().content_height = height;
    }

    pub fn set_body_text(&self, text: impl Into<String>) {
        self.lock().body_text = text.into();
    }

    pub fn add_reaction(&self, label: impl Into<String>) {
        self.push_control(ControlKind::Reaction, label.into(), false);
    }

    /// A reaction control that errors when triggered
    pub fn add_failing_reaction(&self, label: impl Into<String>) {
        self.push_control(ControlKind::Reaction, label.into(), true);
    }

    pub fn add_button(&self, text: impl Into<String>) {
        self.push_control(ControlKind::Button, text.into(), false);
    }

    pub fn set_article(&self, article: Option<Article>) {
        self.lock().article = article;
    }

    pub fn fail_navigation(&self, fail: bool) {
        self.lock().fail_navigation = fail;
    }

    fn push_control(&self, kind: ControlKind, label: String, fails: bool) {
        self.lock().controls.push(MemoryControl {
            kind,
            label,
            pressed: false,
            fails,
        });
    }

    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    pub fn triggered(&self) -> Vec<(ControlKind, String)> {
        self.lock().triggered.clone()
    }

    pub fn scroll_y(&self) -> f64 {
        self.lock().scroll_y
    }

    pub fn scroll_calls(&self) -> usize {
        self.lock().scroll_calls
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }
}

#[async_trait]
impl Page for MemoryPage {
    async fn current_url(&self) -> PageResult<String> {
        Ok(self.lock().url.clone())
    }

    async fn navigate(&self, url: &str) -> PageResult<()> {
        let mut state = self.lock();
        if state.fail_navigation {
            return Err(PageError::Navigation {
                url: url.to_string(),
                reason: "navigation disabled".to_string(),
            });
        }

        state.url = url.to_string();
        state.epoch += 1;
        state.scroll_y = 0.0;
        state.navigations.push(url.to_string());
        Ok(())
    }

    async fn reloaded(&self) -> PageResult<()> {
        let mut state = self.lock();
        state.epoch += 1;
        state.scroll_y = 0.0;
        Ok(())
    }

    async fn scroll_by(&self, dy: f64) -> PageResult<()> {
        let mut state = self.lock();
        state.scroll_calls += 1;

        let max_y = state
            .content_height
            .map(|h| (h - state.viewport_height).max(0.0))
            .unwrap_or(0.0);
        state.scroll_y = (state.scroll_y + dy).clamp(0.0, max_y);
        Ok(())
    }

    async fn scroll_metrics(&self) -> PageResult<Option<ScrollMetrics>> {
        let state = self.lock();
        Ok(state.content_height.map(|content_height| ScrollMetrics {
            scroll_y: state.scroll_y,
            viewport_height: state.viewport_height,
            content_height,
        }))
    }

    async fn contains_text(&self, needle: &str) -> PageResult<bool> {
        Ok(self.lock().body_text.contains(needle))
    }

    async fn find_controls(&self, query: &ControlQuery) -> PageResult<Vec<ControlRef>> {
        let state = self.lock();
        let kind = query.kind();

        Ok(state
            .controls
            .iter()
            .filter(|c| c.kind == kind)
            .enumerate()
            .filter(|(_, c)| !c.pressed && query.matches(&c.label))
            .map(|(index, c)| ControlRef {
                kind,
                index,
                label: c.label.clone(),
                epoch: state.epoch,
            })
            .collect())
    }

    async fn trigger(&self, control: &ControlRef) -> PageResult<()> {
        let mut state = self.lock();
        if control.epoch != state.epoch {
            return Err(PageError::StaleControl(control.label.clone()));
        }

        let target = state
            .controls
            .iter_mut()
            .filter(|c| c.kind == control.kind)
            .nth(control.index)
            .ok_or_else(|| PageError::ControlMissing(control.label.clone()))?;

        if target.fails {
            return Err(PageError::Script(format!("click on '{}' threw", target.label)));
        }
        if target.kind == ControlKind::Reaction {
            target.pressed = true;
        }

        state.triggered.push((control.kind, control.label.clone()));
        Ok(())
    }

    async fn article(&self) -> PageResult<Option<Article>> {
        Ok(self.lock().article.clone())
    }
}
