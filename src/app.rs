//! Application coordinator.
//!
//! Binds a [`Settings`] snapshot to the fetch orchestrator and the batch
//! downloader for the two host entry points: an interactive refresh and the
//! periodic background sweep. The two only differ in how they report a
//! batch (toast vs. system notification).

use std::sync::Arc;
use std::time::Duration;

use crate::config::{Settings, MIN_BACKGROUND_INTERVAL_MINUTES};
use crate::download::{run_batch, AbortReason, BatchPlan, BatchSummary};
use crate::feed::{FetchOutcome, Fetcher, Origin};
use crate::notify::{auto_download_message, Notifier, BACKGROUND_BODY, BACKGROUND_TITLE};
use crate::storage::LocalStore;

/// Outcome of a background sweep, as reported to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundResult {
    NewData,
    NoData,
    Failed,
}

/// Result of [`App::refresh`].
#[derive(Debug, Clone)]
pub struct Refresh {
    pub outcome: FetchOutcome,
    /// Present when the refresh triggered an auto-download batch.
    pub auto_download: Option<BatchSummary>,
}

pub struct App {
    fetcher: Fetcher,
    settings: Settings,
    notifier: Arc<dyn Notifier>,
}

impl App {
    pub fn new(fetcher: Fetcher, settings: Settings, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            fetcher,
            settings,
            notifier,
        }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn store(&self) -> &LocalStore {
        self.fetcher.store()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Interactive fetch of `source_id` honouring the wifi-only preference.
    ///
    /// An online result with auto-download enabled runs a batch over the
    /// configured auto-download sources and toasts the number saved.
    pub async fn refresh(&self, source_id: &str) -> Refresh {
        let outcome = self.fetcher.fetch_news(self.settings.wifi_only, source_id).await;

        let auto_download = if outcome.origin == Origin::Online && self.settings.auto_download {
            Some(self.download().await)
        } else {
            None
        };

        Refresh {
            outcome,
            auto_download,
        }
    }

    /// Interactive batch download; toasts the count when anything was saved.
    pub async fn download(&self) -> BatchSummary {
        let summary = run_batch(&self.fetcher, &self.plan(self.settings.wifi_only)).await;
        if summary.saved > 0 {
            self.notifier.toast(&auto_download_message(summary.saved));
        }
        summary
    }

    /// One background sweep.
    ///
    /// Does nothing unless auto-download is enabled. Sources are fetched
    /// regardless of the interactive wifi preference; the batch's own wifi
    /// gate still applies. New articles produce a single system notification
    /// with no per-source detail.
    pub async fn background_sweep(&self) -> BackgroundResult {
        if !self.settings.auto_download {
            tracing::info!("Auto-download disabled, background sweep skipped");
            return BackgroundResult::NoData;
        }

        let summary = run_batch(&self.fetcher, &self.plan(false)).await;
        match summary.aborted {
            Some(AbortReason::Reachability) => return BackgroundResult::Failed,
            Some(AbortReason::NotOnWifi) => return BackgroundResult::NoData,
            None => {}
        }

        if summary.saved > 0 {
            self.notifier.notify(BACKGROUND_TITLE, BACKGROUND_BODY);
            BackgroundResult::NewData
        } else {
            BackgroundResult::NoData
        }
    }

    /// Run [`background_sweep`](Self::background_sweep) every `interval` until
    /// Ctrl-C. The first sweep runs immediately. Intervals under 15 minutes are
    /// raised to 15 minutes.
    pub async fn run_background(&self, interval: Duration) {
        let minimum = Duration::from_secs(MIN_BACKGROUND_INTERVAL_MINUTES * 60);
        let mut ticker = tokio::time::interval(interval.max(minimum));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let result = self.background_sweep().await;
                    tracing::info!(result = ?result, "Background sweep finished");
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Interrupted, stopping background sweeps");
                    break;
                }
            }
        }
    }

    fn plan(&self, fetch_wifi_only: bool) -> BatchPlan {
        BatchPlan {
            sources: self.settings.auto_download_sources.clone(),
            wifi_only: self.settings.auto_download_wifi_only,
            fetch_wifi_only,
            is_premium: self.settings.is_premium,
        }
    }
}
