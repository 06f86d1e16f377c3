//! Data models for the AutoRead application.
//!
//! - [`SessionState`]: flags, reaction counter and pending queue persisted across page loads
//! - [`Item`]: one feed entry the reader will navigate to
//! - [`AutoReadConfig`]: tuning knobs loaded from `autoread.yaml`
//!
//! Config structs derive `Serialize`/`Deserialize` for YAML persistence. Session state is
//! only ever mutated through [`SessionManager`](crate::state::SessionManager).

pub mod config;
pub mod session;

pub use config::{
    AutoReadConfig, ExportSettings, LimitSettings, NetworkSettings, ReactionSettings,
    ReloadSettings, ScrollSettings, SelectorSettings, SiteSettings, StorageSettings,
    determine_base_url,
};
pub use session::{Item, SessionState};
