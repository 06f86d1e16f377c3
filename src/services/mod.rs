//! Services module - the reader's timed behaviours.
//!
//! Each service owns one concern and talks to the displayed page only through
//! the [`Page`](crate::page::Page) trait. None of them decides *when* to run;
//! the [`AutoReader`](crate::engine::AutoReader) engine wires them together.
//!
//! # Components
//!
//! - [`ItemSource`] / [`HttpItemSource`]: paginated fetch of eligible topics
//!   from the forum's `latest.json` listing
//! - [`ScrollDriver`]: fixed-period scroll ticker plus an independent bottom check
//! - [`Navigator`]: FIFO queue discipline and page transitions
//! - [`ReactionDispatcher`]: rate-limited, capped reaction passes
//! - [`HealthMonitor`]: watchdog that presses the page's reload control on crash
//! - [`MarkdownExporter`]: one-shot export of the displayed topic
//!
//! # Failure model
//!
//! Services never surface errors to the engine. Transport failures shorten a
//! batch, action failures are logged and skipped, and missing page features
//! turn the dependent step into a no-op for that cycle.

pub mod export;
pub mod health;
pub mod item_source;
pub mod navigation;
pub mod reactions;
pub mod scroll;

pub use export::MarkdownExporter;
pub use health::{HealthMonitor, HealthStatus, check_once};
pub use item_source::{HttpItemSource, ItemSource, SourceError, filter_eligible};
pub use navigation::Navigator;
pub use reactions::{DispatchState, PassSummary, ReactionDispatcher, StopReason};
pub use scroll::{ScrollDriver, ScrollState};
