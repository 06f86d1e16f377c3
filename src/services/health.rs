use crate::engine::EngineEvent;
use crate::metrics::Metrics;
use crate::models::ReloadSettings;
use crate::page::{ControlQuery, Page};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Outcome of one watchdog tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    /// The error signature was present and the recovery control was pressed.
    /// Controls found before the reload are stale.
    Recovered,
    /// The error signature was present but no recovery control was found
    FatalWithoutRecovery,
}

/// Look for the host page's crash signature and press its recovery control.
///
/// Page provider errors are treated as healthy for this tick.
pub async fn check_once(page: &dyn Page, settings: &ReloadSettings, metrics: &Metrics) -> HealthStatus {
    match page.contains_text(&settings.error_signature).await {
        Ok(true) => {}
        Ok(false) => return HealthStatus::Healthy,
        Err(e) => {
            tracing::debug!("Health check could not read page: {}", e);
            return HealthStatus::Healthy;
        }
    }

    let query = ControlQuery::Button {
        text: settings.recovery_label.clone(),
    };
    let recovery = match page.find_controls(&query).await {
        Ok(controls) => controls.into_iter().next(),
        Err(e) => {
            tracing::debug!("Health check could not look for recovery control: {}", e);
            None
        }
    };

    let Some(control) = recovery else {
        tracing::warn!("Page shows an error but has no recovery control");
        return HealthStatus::FatalWithoutRecovery;
    };

    match page.trigger(&control).await {
        Ok(()) => {
            metrics.record_recovery();
            tracing::info!("Page error detected, triggered '{}'", control.label);
            if let Err(e) = page.reloaded().await {
                tracing::warn!("Page did not settle after recovery: {}", e);
            }
            HealthStatus::Recovered
        }
        Err(e) => {
            tracing::warn!("Recovery control failed: {}", e);
            HealthStatus::FatalWithoutRecovery
        }
    }
}

/// Health Monitor
///
/// Polls independently of the reading and liking flags from the moment it is
/// started until the engine shuts down. Each recovery is reported to the
/// engine as [`EngineEvent::PageReloaded`].
pub struct HealthMonitor {
    page: Arc<dyn Page>,
    settings: ReloadSettings,
    events: mpsc::UnboundedSender<EngineEvent>,
    metrics: Arc<Metrics>,
    task: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    pub fn new(
        page: Arc<dyn Page>,
        settings: ReloadSettings,
        events: mpsc::UnboundedSender<EngineEvent>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            page,
            settings,
            events,
            metrics,
            task: None,
        }
    }

    /// Start polling; no-op when already running
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let page = Arc::clone(&self.page);
        let settings = self.settings.clone();
        let metrics = Arc::clone(&self.metrics);
        let events = self.events.clone();

        tracing::info!(
            "Health monitor started, checking every {:?}",
            settings.check_interval()
        );
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(settings.check_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if check_once(page.as_ref(), &settings, &metrics).await == HealthStatus::Recovered
                    && events.send(EngineEvent::PageReloaded).is_err()
                {
                    tracing::debug!("Engine gone, reload not reported");
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::info!("Health monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{ControlKind, MemoryPage, PageError};
    use std::time::Duration;

    fn crashed_page() -> Arc<MemoryPage> {
        let page = Arc::new(MemoryPage::new("https://linux.do/t/topic/1"));
        page.set_body_text("哎呀，崩溃啦！");
        page
    }

    #[tokio::test]
    async fn test_healthy_page_is_left_alone() {
        let page = MemoryPage::new("https://linux.do");
        page.add_button("重新加载");

        let status = check_once(&page, &ReloadSettings::default(), &Metrics::new()).await;
        assert_eq!(status, HealthStatus::Healthy);
        assert!(page.triggered().is_empty());
    }

    #[tokio::test]
    async fn test_crash_with_recovery_control_reloads() {
        let page = crashed_page();
        page.add_button("返回首页");
        page.add_button("重新加载");
        let metrics = Metrics::new();

        let status = check_once(page.as_ref(), &ReloadSettings::default(), &metrics).await;
        assert_eq!(status, HealthStatus::Recovered);
        assert_eq!(
            page.triggered(),
            vec![(ControlKind::Button, "重新加载".to_string())]
        );
    }

    #[tokio::test]
    async fn test_recovery_makes_found_controls_stale() {
        let page = crashed_page();
        page.add_button("重新加载");
        page.add_reaction("Like this post");
        let query = ControlQuery::Reaction {
            labels: vec!["Like this post".to_string()],
        };
        let before = page.find_controls(&query).await.unwrap();

        let status = check_once(page.as_ref(), &ReloadSettings::default(), &Metrics::new()).await;

        assert_eq!(status, HealthStatus::Recovered);
        assert!(matches!(
            page.trigger(&before[0]).await,
            Err(PageError::StaleControl(_))
        ));
    }

    #[tokio::test]
    async fn test_crash_without_recovery_control() {
        let page = crashed_page();
        let status = check_once(page.as_ref(), &ReloadSettings::default(), &Metrics::new()).await;
        assert_eq!(status, HealthStatus::FatalWithoutRecovery);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_polls_until_stopped() {
        let page = crashed_page();
        page.add_button("重新加载");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut monitor = HealthMonitor::new(
            page.clone(),
            ReloadSettings::default(),
            tx,
            Arc::new(Metrics::new()),
        );

        monitor.start();
        monitor.start();
        tokio::time::sleep(Duration::from_millis(6500)).await;
        assert!(monitor.is_running());
        assert_eq!(page.triggered().len(), 3);
        for _ in 0..3 {
            assert_eq!(rx.try_recv().unwrap(), EngineEvent::PageReloaded);
        }
        assert!(rx.try_recv().is_err());

        monitor.stop();
        assert!(!monitor.is_running());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(page.triggered().len(), 3);
    }
}
