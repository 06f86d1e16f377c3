// AutoRead - unattended reader for Discourse forums
//
// This is the library crate containing the engine, its services and the page
// interface. The binary crate (main.rs) attaches to a browser and runs it.

pub mod config;
pub mod engine;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod page;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use engine::{AutoReader, AutoReaderHandle, EngineEvent};
pub use metrics::Metrics;
pub use models::{AutoReadConfig, Item, SessionState};
pub use page::{MemoryPage, Page};
pub use state::{SessionManager, StateChange};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
