// State management module
//
// This module provides the SessionManager which owns the reader's SessionState,
// persists every mutation to the backing KvStore, and emits change events for
// the control surface.

pub mod store;

use crate::models::{Item, SessionState};
use std::sync::{Arc, RwLock};
use store::{KvStore, StoreError, keys};
use tokio::sync::broadcast;

pub use store::{JsonFileStore, MemoryStore};

/// Change events emitted when the session is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    ReadingChanged { enabled: bool },

    LikingChanged { enabled: bool },

    ReactionRecorded { count: u32 },

    /// The pending queue was replaced by a fresh batch
    QueueReplaced { len: usize },

    /// The head of the queue was taken for navigation
    ItemDequeued { id: u64, remaining: usize },
}

/// Session owner with write-through persistence and event emission
///
/// - Loads [`SessionState`] once at construction (after first-run seeding)
/// - Every [`update()`](Self::update) is read-modify-persist under one write lock,
///   so timers sharing the manager never observe torn state
/// - Emits [`StateChange`] events on a broadcast channel
///
/// Store write failures are logged; the in-memory state stays authoritative for
/// the rest of the process.
pub struct SessionManager {
    state: Arc<RwLock<SessionState>>,
    store: Arc<dyn KvStore>,
    state_tx: broadcast::Sender<StateChange>,
}

impl SessionManager {
    /// Seed defaults on first run, then load the persisted session
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        if let Err(e) = store::initialize_first_run(store.as_ref()) {
            tracing::warn!("Failed to seed default session state: {}", e);
        }

        let state = store::load_session(store.as_ref());
        tracing::info!(
            "Session loaded: reading={}, liking={}, reactions={}, queued={}",
            state.reading_enabled,
            state.liking_enabled,
            state.reaction_count,
            state.pending_queue.len()
        );

        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(state)),
            store,
            state_tx,
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Execute a function with read access to the session
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SessionState) -> R,
    {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    /// Mutate the session, persist what changed, and emit events
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut SessionState),
    {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let old_state = state.clone();

        update_fn(&mut state);

        if let Err(e) = self.persist(&old_state, &state) {
            tracing::warn!("Failed to persist session state: {}", e);
        }

        let changes = Self::detect_changes(&old_state, &state);
        for change in &changes {
            // No subscribers is fine
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn persist(&self, old: &SessionState, new: &SessionState) -> Result<(), StoreError> {
        let store = self.store.as_ref();

        if old.reading_enabled != new.reading_enabled {
            store.set(keys::READING, &new.reading_enabled.to_string())?;
        }
        if old.liking_enabled != new.liking_enabled {
            store.set(keys::LIKING, &new.liking_enabled.to_string())?;
        }
        if old.reaction_count != new.reaction_count {
            store.set(keys::REACTION_COUNT, &new.reaction_count.to_string())?;
        }
        if old.pending_queue != new.pending_queue {
            store::put_queue(store, &new.pending_queue)?;
        }

        Ok(())
    }

    fn detect_changes(old: &SessionState, new: &SessionState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.reading_enabled != new.reading_enabled {
            changes.push(StateChange::ReadingChanged {
                enabled: new.reading_enabled,
            });
        }

        if old.liking_enabled != new.liking_enabled {
            changes.push(StateChange::LikingChanged {
                enabled: new.liking_enabled,
            });
        }

        if old.reaction_count != new.reaction_count {
            changes.push(StateChange::ReactionRecorded {
                count: new.reaction_count,
            });
        }

        if old.pending_queue != new.pending_queue {
            // A dequeue is the old queue minus its head
            let dequeued = old.pending_queue.len() == new.pending_queue.len() + 1
                && old.pending_queue[1..] == new.pending_queue[..];

            if dequeued {
                changes.push(StateChange::ItemDequeued {
                    id: old.pending_queue[0].id,
                    remaining: new.pending_queue.len(),
                });
            } else {
                changes.push(StateChange::QueueReplaced {
                    len: new.pending_queue.len(),
                });
            }
        }

        changes
    }

    // Convenience methods for the engine

    pub fn set_reading(&self, enabled: bool) -> Vec<StateChange> {
        self.update(|state| state.reading_enabled = enabled)
    }

    /// Flip the reading flag, returning the new value
    pub fn toggle_reading(&self) -> bool {
        let mut enabled = false;
        self.update(|state| {
            state.reading_enabled = !state.reading_enabled;
            enabled = state.reading_enabled;
        });
        enabled
    }

    pub fn set_liking(&self, enabled: bool) -> Vec<StateChange> {
        self.update(|state| state.liking_enabled = enabled)
    }

    /// Flip the liking flag, returning the new value
    pub fn toggle_liking(&self) -> bool {
        let mut enabled = false;
        self.update(|state| {
            state.liking_enabled = !state.liking_enabled;
            enabled = state.liking_enabled;
        });
        enabled
    }

    /// Count one reaction unless the lifetime cap is already reached.
    ///
    /// Returns the new count, or `None` when the cap blocked the increment.
    pub fn record_reaction(&self, cap: u32) -> Option<u32> {
        let mut recorded = None;
        self.update(|state| {
            if state.reaction_count < cap {
                state.reaction_count += 1;
                recorded = Some(state.reaction_count);
            }
        });
        recorded
    }

    pub fn replace_queue(&self, items: Vec<Item>) -> Vec<StateChange> {
        self.update(|state| state.pending_queue = items)
    }

    /// Remove and return the head of the queue (FIFO)
    pub fn dequeue(&self) -> Option<Item> {
        let mut item = None;
        self.update(|state| {
            if !state.pending_queue.is_empty() {
                item = Some(state.pending_queue.remove(0));
            }
        });
        item
    }

    /// Keep only queued items matching `keep`, returning how many were dropped
    pub fn retain_queue<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&Item) -> bool,
    {
        let mut dropped = 0;
        self.update(|state| {
            let before = state.pending_queue.len();
            state.pending_queue.retain(|item| keep(item));
            dropped = before - state.pending_queue.len();
        });
        dropped
    }
}

// Cloning shares the same session and channel
impl Clone for SessionManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            store: Arc::clone(&self.store),
            state_tx: self.state_tx.clone(),
        }
    }
}
