use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete configuration loaded from `autoread.yaml`
///
/// Every section falls back to its defaults when absent, so a partial file
/// (or no file at all) yields a usable configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoReadConfig {
    pub sites: SiteSettings,
    pub scroll: ScrollSettings,
    pub limits: LimitSettings,
    pub reactions: ReactionSettings,
    pub reload: ReloadSettings,
    pub selectors: SelectorSettings,
    pub network: NetworkSettings,
    pub storage: StorageSettings,
    pub export: ExportSettings,
}

/// Forums the reader is allowed to operate on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteSettings {
    pub base_urls: Vec<String>,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            base_urls: vec![
                "https://linux.do".to_string(),
                "https://meta.discourse.org".to_string(),
                "https://meta.appinn.net".to_string(),
                "https://community.openai.com".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollSettings {
    /// Pixels advanced per scroll tick
    pub step_px: f64,
    pub tick_ms: u64,
    /// Delay between bottom-of-page checks (independent of the tick)
    pub bottom_check_ms: u64,
    /// Distance from the end of content that counts as "bottom"
    pub bottom_threshold_px: f64,
}

impl Default for ScrollSettings {
    fn default() -> Self {
        Self {
            step_px: 30.0,
            tick_ms: 30,
            bottom_check_ms: 500,
            bottom_threshold_px: 200.0,
        }
    }
}

impl ScrollSettings {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    pub fn bottom_check_delay(&self) -> Duration {
        Duration::from_millis(self.bottom_check_ms.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    /// Topics with this many posts or more are never queued
    pub comment_ceiling: u32,
    /// Maximum number of items fetched into the queue at once
    pub batch_size: usize,
    /// Lifetime cap on reactions for the persisted counter
    pub reaction_cap: u32,
    /// Most listing pages requested while filling one batch
    pub max_pages: u32,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            comment_ceiling: 1000,
            batch_size: 100,
            reaction_cap: 50,
            max_pages: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionSettings {
    /// Minimum wait before each reaction
    pub delay_ms: u64,
    /// Accepted control labels (title text of a "like" button)
    pub labels: Vec<String>,
}

impl Default for ReactionSettings {
    fn default() -> Self {
        Self {
            delay_ms: 3000,
            labels: vec!["点赞此帖子".to_string(), "Like this post".to_string()],
        }
    }
}

impl ReactionSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadSettings {
    /// Text that marks the host page as crashed
    pub error_signature: String,
    /// Text of the page's own reload control
    pub recovery_label: String,
    pub check_interval_ms: u64,
}

impl Default for ReloadSettings {
    fn default() -> Self {
        Self {
            error_signature: "崩溃啦".to_string(),
            recovery_label: "重新加载".to_string(),
            check_interval_ms: 3000,
        }
    }
}

impl ReloadSettings {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }
}

/// CSS selectors used by browser-backed page providers.
///
/// The engine itself never reads these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorSettings {
    pub reaction_button: String,
    pub button: String,
    pub article_title: String,
    pub article_content: String,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            reaction_button: ".discourse-reactions-reaction-button".to_string(),
            button: "button".to_string(),
            article_title: "#topic-title > div > h1 > a.fancy-title > span".to_string(),
            article_content:
                "#post_1 > div.row > div.topic-body.clearfix > div.regular.contents > div.cooked"
                    .to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub request_timeout_secs: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 15,
        }
    }
}

impl NetworkSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// State file name, relative to the config directory
    pub state_file: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            state_file: "autoread-state.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub dir: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            dir: "exports".to_string(),
        }
    }
}

/// Pick the base URL for the page currently displayed.
///
/// Returns the first configured base URL that `current_url` starts with, or
/// the first configured one when none matches. `None` only when no base URLs
/// are configured at all.
pub fn determine_base_url(current_url: &str, sites: &SiteSettings) -> Option<String> {
    sites
        .base_urls
        .iter()
        .find(|base| current_url.starts_with(base.as_str()))
        .or_else(|| sites.base_urls.first())
        .map(|base| base.trim_end_matches('/').to_string())
}
