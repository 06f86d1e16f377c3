//! Chrome DevTools Protocol page provider.
//!
//! Each [`Page`] operation evaluates a small script in the attached tab. The
//! selectors come from [`SelectorSettings`]; nothing outside this file knows
//! about markup.

use super::{
    Article, ControlKind, ControlQuery, ControlRef, Page, PageError, PageResult, ScrollMetrics,
};
use crate::models::SelectorSettings;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chromiumoxide::Browser;
use chromiumoxide::page::Page as ChromePage;
use futures::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// How long to wait for a self-initiated reload to finish
const RELOAD_SETTLE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Deserialize)]
struct JsonVersion {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Ask a Chrome started with `--remote-debugging-port` for its WebSocket URL
pub async fn discover_ws_url(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/version", port);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")?;

    let resp = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to connect to Chrome debug port {}", port))?;

    if !resp.status().is_success() {
        return Err(anyhow!("Chrome /json/version returned {}", resp.status()));
    }

    let body: JsonVersion = resp
        .json()
        .await
        .context("Failed to parse Chrome /json/version response")?;

    Ok(body.web_socket_debugger_url)
}

/// Page backed by a live Chrome tab
pub struct CdpPage {
    page: ChromePage,
    selectors: SelectorSettings,
    epoch: AtomicU64,
    // Keeps the connection alive for as long as the page is used
    _browser: Browser,
}

impl CdpPage {
    /// Attach to the browser at `ws_url` and pick a tab.
    ///
    /// Prefers an open tab whose URL starts with one of `base_urls`; otherwise
    /// opens `fallback_url` in a new tab.
    pub async fn attach(
        ws_url: &str,
        base_urls: &[String],
        fallback_url: &str,
        selectors: SelectorSettings,
    ) -> Result<Self> {
        let (browser, mut handler) = Browser::connect(ws_url)
            .await
            .with_context(|| format!("Failed to connect to browser at {}", ws_url))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler event error: {}", e);
                }
            }
            tracing::debug!("Browser handler terminated");
        });

        let mut chosen = None;
        for page in browser.pages().await.context("Failed to list browser tabs")? {
            if let Ok(Some(url)) = page.url().await {
                if base_urls.iter().any(|base| url.starts_with(base.as_str())) {
                    tracing::info!("Attaching to open tab {}", url);
                    chosen = Some(page);
                    break;
                }
            }
        }

        let page = match chosen {
            Some(page) => page,
            None => {
                tracing::info!("No tab on a configured site, opening {}", fallback_url);
                browser
                    .new_page(fallback_url)
                    .await
                    .with_context(|| format!("Failed to open {}", fallback_url))?
            }
        };

        Ok(Self {
            page,
            selectors,
            epoch: AtomicU64::new(0),
            _browser: browser,
        })
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> PageResult<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| PageError::Script(e.to_string()))?;
        let value = result.value().cloned().unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    fn selector_for(&self, kind: ControlKind) -> &str {
        match kind {
            ControlKind::Reaction => &self.selectors.reaction_button,
            ControlKind::Button => &self.selectors.button,
        }
    }
}

/// Quote a Rust string as a JavaScript string literal
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[derive(Deserialize)]
struct FoundControl {
    index: usize,
    label: String,
}

#[derive(Deserialize)]
struct RawMetrics {
    scroll_y: f64,
    viewport_height: f64,
    content_height: Option<f64>,
}

#[async_trait]
impl Page for CdpPage {
    async fn current_url(&self) -> PageResult<String> {
        self.page
            .url()
            .await
            .map_err(|e| PageError::Protocol(e.to_string()))?
            .ok_or_else(|| PageError::Protocol("tab has no URL".to_string()))
    }

    async fn navigate(&self, url: &str) -> PageResult<()> {
        tracing::info!("Navigating to {}", url);
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.page
            .goto(url)
            .await
            .map_err(|e| PageError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn reloaded(&self) -> PageResult<()> {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        match tokio::time::timeout(RELOAD_SETTLE_TIMEOUT, self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(PageError::Protocol(e.to_string())),
            Err(_) => {
                tracing::debug!("No navigation seen within {:?} of reload", RELOAD_SETTLE_TIMEOUT);
                Ok(())
            }
        }
    }

    async fn scroll_by(&self, dy: f64) -> PageResult<()> {
        let script = format!("(() => {{ window.scrollBy({{ top: {dy}, behavior: 'auto' }}); return true; }})()");
        let _: serde_json::Value = self.eval(script).await?;
        Ok(())
    }

    async fn scroll_metrics(&self) -> PageResult<Option<ScrollMetrics>> {
        let script = "(() => ({ \
            scroll_y: window.scrollY, \
            viewport_height: window.innerHeight, \
            content_height: document.body ? document.body.offsetHeight : null \
        }))()"
            .to_string();
        let raw: RawMetrics = self.eval(script).await?;

        Ok(raw.content_height.map(|content_height| ScrollMetrics {
            scroll_y: raw.scroll_y,
            viewport_height: raw.viewport_height,
            content_height,
        }))
    }

    async fn contains_text(&self, needle: &str) -> PageResult<bool> {
        let script = format!(
            "(() => !!document.body && document.body.innerText.includes({}))()",
            js_string(needle)
        );
        self.eval(script).await
    }

    async fn find_controls(&self, query: &ControlQuery) -> PageResult<Vec<ControlRef>> {
        let kind = query.kind();
        let selector = js_string(self.selector_for(kind));

        let label_expr = match kind {
            ControlKind::Reaction => "el.title || ''",
            ControlKind::Button => "(el.textContent || '').trim()",
        };
        let script = format!(
            "(() => Array.from(document.querySelectorAll({selector}))\
                .map((el, index) => ({{ index, label: {label_expr} }})))()"
        );

        let epoch = self.epoch.load(Ordering::SeqCst);
        let found: Vec<FoundControl> = self.eval(script).await?;

        Ok(found
            .into_iter()
            .filter(|c| query.matches(&c.label))
            .map(|c| ControlRef {
                kind,
                index: c.index,
                label: c.label,
                epoch,
            })
            .collect())
    }

    async fn trigger(&self, control: &ControlRef) -> PageResult<()> {
        if control.epoch != self.epoch.load(Ordering::SeqCst) {
            return Err(PageError::StaleControl(control.label.clone()));
        }

        let selector = js_string(self.selector_for(control.kind));
        let script = format!(
            "(() => {{ const el = document.querySelectorAll({selector})[{}]; \
                if (!el) return false; el.click(); return true; }})()",
            control.index
        );

        let clicked: bool = self.eval(script).await?;
        if clicked {
            Ok(())
        } else {
            Err(PageError::ControlMissing(control.label.clone()))
        }
    }

    async fn article(&self) -> PageResult<Option<Article>> {
        let script = format!(
            "(() => {{ const t = document.querySelector({}); const c = document.querySelector({}); \
                if (!t || !c) return null; \
                return {{ title: t.textContent.trim(), content_html: c.innerHTML }}; }})()",
            js_string(&self.selectors.article_title),
            js_string(&self.selectors.article_content)
        );
        self.eval(script).await
    }
}
