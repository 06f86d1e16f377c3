//! Reaction Dispatcher
//!
//! One activation is one pass over the reaction controls visible at that
//! moment, in document order, with a fixed delay before every action. A pass
//! is never aborted mid-delay; it re-checks the liking flag, the lifetime cap
//! and its own generation at each resumption point and stops there.

use crate::metrics::Metrics;
use crate::models::ReactionSettings;
use crate::page::{ControlQuery, Page};
use crate::state::SessionManager;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Off,
    Dispatching,
}

/// Why a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every control found was attempted
    Completed,
    /// Liking was turned off while the pass was running
    Disabled,
    CapReached,
    /// A newer activation (or a navigation) took over
    Superseded,
    /// Enumerating controls failed
    PageUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub found: usize,
    pub triggered: usize,
    pub failed: usize,
    pub stop_reason: StopReason,
}

impl PassSummary {
    fn new() -> Self {
        Self {
            found: 0,
            triggered: 0,
            failed: 0,
            stop_reason: StopReason::Completed,
        }
    }
}

#[derive(Clone)]
struct PassContext {
    page: Arc<dyn Page>,
    session: SessionManager,
    settings: ReactionSettings,
    cap: u32,
    generation: Arc<AtomicU64>,
    metrics: Arc<Metrics>,
}

impl PassContext {
    fn stop_reason(&self, generation: u64) -> Option<StopReason> {
        if self.generation.load(Ordering::SeqCst) != generation {
            return Some(StopReason::Superseded);
        }
        let (liking, cap_reached) = self
            .session
            .read(|s| (s.liking_enabled, s.cap_reached(self.cap)));
        if !liking {
            Some(StopReason::Disabled)
        } else if cap_reached {
            Some(StopReason::CapReached)
        } else {
            None
        }
    }
}

pub struct ReactionDispatcher {
    ctx: PassContext,
    pass: Option<JoinHandle<PassSummary>>,
}

impl ReactionDispatcher {
    pub fn new(
        page: Arc<dyn Page>,
        session: SessionManager,
        settings: ReactionSettings,
        cap: u32,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            ctx: PassContext {
                page,
                session,
                settings,
                cap,
                generation: Arc::new(AtomicU64::new(0)),
                metrics,
            },
            pass: None,
        }
    }

    /// Start one pass over the current page.
    ///
    /// Returns `false` without doing anything when liking is off or the cap is
    /// already reached. Any earlier pass is superseded.
    pub fn activate(&mut self) -> bool {
        let (liking, count) = self
            .ctx
            .session
            .read(|s| (s.liking_enabled, s.reaction_count));

        if !liking {
            return false;
        }
        if count >= self.ctx.cap {
            tracing::info!(
                "Reaction cap reached ({}/{}), not dispatching",
                count,
                self.ctx.cap
            );
            return false;
        }

        let generation = self.ctx.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.pass = Some(tokio::spawn(run_pass(self.ctx.clone(), generation)));
        true
    }

    /// Make any running pass stop at its next resumption point
    pub fn invalidate(&mut self) {
        self.ctx.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn state(&self) -> DispatchState {
        match &self.pass {
            Some(pass) if !pass.is_finished() => DispatchState::Dispatching,
            _ => DispatchState::Off,
        }
    }

    /// Wait for the latest pass and return its summary
    pub async fn join(&mut self) -> Option<PassSummary> {
        let pass = self.pass.take()?;
        match pass.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!("Reaction pass did not complete: {}", e);
                None
            }
        }
    }
}

async fn run_pass(ctx: PassContext, generation: u64) -> PassSummary {
    let mut summary = PassSummary::new();
    let query = ControlQuery::Reaction {
        labels: ctx.settings.labels.clone(),
    };

    let controls = match ctx.page.find_controls(&query).await {
        Ok(controls) => controls,
        Err(e) => {
            tracing::warn!("Could not enumerate reaction controls: {}", e);
            summary.stop_reason = StopReason::PageUnavailable;
            return summary;
        }
    };
    summary.found = controls.len();

    if controls.is_empty() {
        tracing::debug!("No reaction controls on this page");
        return summary;
    }
    tracing::info!("Found {} reaction controls", controls.len());

    for control in controls {
        if let Some(reason) = ctx.stop_reason(generation) {
            summary.stop_reason = reason;
            break;
        }

        tokio::time::sleep(ctx.settings.delay()).await;

        if let Some(reason) = ctx.stop_reason(generation) {
            summary.stop_reason = reason;
            break;
        }

        match ctx.page.trigger(&control).await {
            Ok(()) => match ctx.session.record_reaction(ctx.cap) {
                Some(count) => {
                    summary.triggered += 1;
                    ctx.metrics.record_reaction();
                    tracing::info!("Reacted ({}/{})", count, ctx.cap);
                }
                None => {
                    summary.stop_reason = StopReason::CapReached;
                    break;
                }
            },
            Err(e) => {
                summary.failed += 1;
                ctx.metrics.record_reaction_failure();
                tracing::warn!("Reaction on '{}' failed: {}", control.label, e);
            }
        }
    }

    if summary.stop_reason == StopReason::CapReached {
        tracing::info!("Reaction cap of {} reached", ctx.cap);
    }
    tracing::debug!(?summary, "Reaction pass finished");
    summary
}
