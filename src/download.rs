//! Quota-aware batch downloader.
//!
//! One pure async entry point, [`run_batch`], serves both the interactive
//! auto-download after a refresh and the periodic background sweep. Callers
//! decide what to do with the returned [`BatchSummary`].

use crate::feed::{Fetcher, Origin};
use crate::net::Reachability;
use crate::sources::DEFAULT_SOURCE_ID;

/// Articles a non-premium account may save per source per day.
pub const DAILY_CAP: u32 = 10;

/// Inputs for one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    /// Source ids in processing order. Empty means the default source.
    pub sources: Vec<String>,
    /// Abort the whole batch unless the current transport is wifi.
    pub wifi_only: bool,
    /// Wifi preference handed to the fetch orchestrator for each source.
    pub fetch_wifi_only: bool,
    pub is_premium: bool,
}

impl BatchPlan {
    fn source_ids(&self) -> Vec<&str> {
        if self.sources.is_empty() {
            vec![DEFAULT_SOURCE_ID]
        } else {
            self.sources.iter().map(String::as_str).collect()
        }
    }
}

/// What happened to one source in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    /// Daily cap already reached; nothing was fetched.
    QuotaReached,
    /// Fetched (from network or cache) and `saved` new articles stored.
    Processed { origin: Origin, saved: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source_id: String,
    pub status: SourceStatus,
}

/// Why a batch stopped before processing any source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// The wifi gate was set and the transport is not wifi.
    NotOnWifi,
    /// The network state could not be determined.
    Reachability,
}

/// Result of [`run_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// New articles saved across all sources.
    pub saved: usize,
    pub aborted: Option<AbortReason>,
    pub sources: Vec<SourceReport>,
}

impl BatchSummary {
    fn aborted(reason: AbortReason) -> Self {
        Self {
            aborted: Some(reason),
            ..Self::default()
        }
    }
}

/// Fetch and save articles for every source in `plan`.
///
/// Sources are processed sequentially in list order. For non-premium plans a
/// source whose daily count has reached [`DAILY_CAP`] is skipped without a
/// fetch, and saving stops once the running count for a source reaches the
/// cap. Articles that are already saved do not count. A source that yields
/// nothing never stops the sources after it.
pub async fn run_batch(fetcher: &Fetcher, plan: &BatchPlan) -> BatchSummary {
    if plan.wifi_only {
        match fetcher.reachability().network_state().await {
            Ok(state) if state.is_wifi() => {}
            Ok(state) => {
                tracing::info!(connected = state.connected, kind = ?state.kind, "Not on wifi, skipping batch download");
                return BatchSummary::aborted(AbortReason::NotOnWifi);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reachability query failed, skipping batch download");
                return BatchSummary::aborted(AbortReason::Reachability);
            }
        }
    }

    let store = fetcher.store();
    let mut summary = BatchSummary::default();

    for requested in plan.source_ids() {
        let source_id = fetcher.registry().resolve(requested).id.clone();

        let mut running = store.get_daily_download_count(&source_id).await;
        if !plan.is_premium && running >= DAILY_CAP {
            tracing::info!(source = %source_id, count = running, cap = DAILY_CAP, "Daily limit reached, skipping source");
            summary.sources.push(SourceReport {
                source_id,
                status: SourceStatus::QuotaReached,
            });
            continue;
        }

        let outcome = fetcher.fetch_news(plan.fetch_wifi_only, &source_id).await;
        let mut saved = 0;
        for article in &outcome.articles {
            if !plan.is_premium && running >= DAILY_CAP {
                tracing::info!(source = %source_id, cap = DAILY_CAP, "Daily limit reached mid-batch");
                break;
            }
            if store.save_article(article).await {
                let stored = store.increment_daily_download_count(&source_id).await;
                // A failed counter write reports 0; keep counting locally.
                running = stored.max(running + 1);
                saved += 1;
            }
        }

        tracing::info!(source = %source_id, origin = %outcome.origin, saved = saved, "Source processed");
        summary.saved += saved;
        summary.sources.push(SourceReport {
            source_id,
            status: SourceStatus::Processed {
                origin: outcome.origin,
                saved,
            },
        });
    }

    tracing::info!(saved = summary.saved, sources = summary.sources.len(), "Batch download complete");
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Connection, Reachability, StaticReachability};
    use crate::sources::{Registry, Source, SourceFormat};
    use crate::storage::LocalStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{any, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rss_with(prefix: &str, count: usize) -> String {
        let items: String = (0..count)
            .map(|i| format!("<item><guid>{prefix}-{i}</guid><title>Story {i}</title></item>"))
            .collect();
        format!(r#"<?xml version="1.0"?><rss version="2.0"><channel>{items}</channel></rss>"#)
    }

    fn source(id: &str, url: String) -> Source {
        Source {
            id: id.to_string(),
            name: format!("{id} news"),
            urls: vec![url],
            format: SourceFormat::Xml,
            verify_cert: true,
            placeholder_image: "https://news.test/logo.png".to_string(),
        }
    }

    async fn fetcher(sources: Vec<Source>, connection: Connection) -> Fetcher {
        let reachability: Arc<dyn Reachability> = Arc::new(StaticReachability::new(connection.state()));
        Fetcher::new(
            Registry::new(sources, "borneo"),
            LocalStore::open(":memory:").await.unwrap(),
            reachability,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn plan(sources: &[&str], is_premium: bool) -> BatchPlan {
        BatchPlan {
            sources: sources.iter().map(|s| s.to_string()).collect(),
            wifi_only: true,
            fetch_wifi_only: false,
            is_premium,
        }
    }

    #[tokio::test]
    async fn test_non_premium_stops_at_cap() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(rss_with("b", 15)))
            .mount(&mock_server)
            .await;

        let fetcher = fetcher(vec![source("borneo", mock_server.uri())], Connection::Wifi).await;
        let summary = run_batch(&fetcher, &plan(&["borneo"], false)).await;

        assert_eq!(summary.saved, 10);
        assert_eq!(fetcher.store().get_saved_articles().await.len(), 10);
        assert_eq!(fetcher.store().get_daily_download_count("borneo").await, 10);
    }

    #[tokio::test]
    async fn test_premium_bypasses_cap() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(rss_with("b", 15)))
            .mount(&mock_server)
            .await;

        let fetcher = fetcher(vec![source("borneo", mock_server.uri())], Connection::Wifi).await;
        for _ in 0..DAILY_CAP {
            fetcher.store().increment_daily_download_count("borneo").await;
        }

        let summary = run_batch(&fetcher, &plan(&["borneo"], true)).await;
        assert_eq!(summary.saved, 15);
    }

    #[tokio::test]
    async fn test_exhausted_quota_skips_fetch() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(rss_with("b", 3)))
            .expect(0)
            .mount(&mock_server)
            .await;

        let fetcher = fetcher(vec![source("borneo", mock_server.uri())], Connection::Wifi).await;
        for _ in 0..DAILY_CAP {
            fetcher.store().increment_daily_download_count("borneo").await;
        }

        let summary = run_batch(&fetcher, &plan(&["borneo"], false)).await;
        assert_eq!(summary.saved, 0);
        assert_eq!(
            summary.sources,
            vec![SourceReport {
                source_id: "borneo".to_string(),
                status: SourceStatus::QuotaReached,
            }]
        );
        assert!(fetcher.store().get_saved_articles().await.is_empty());
    }

    #[tokio::test]
    async fn test_wifi_gate_aborts_whole_batch() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(rss_with("b", 3)))
            .expect(0)
            .mount(&mock_server)
            .await;

        let fetcher = fetcher(vec![source("borneo", mock_server.uri())], Connection::Cellular).await;
        let summary = run_batch(&fetcher, &plan(&["borneo"], false)).await;

        assert_eq!(summary.aborted, Some(AbortReason::NotOnWifi));
        assert_eq!(summary.saved, 0);
        assert!(summary.sources.is_empty());
    }

    #[tokio::test]
    async fn test_already_saved_articles_do_not_count() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(rss_with("b", 4)))
            .mount(&mock_server)
            .await;

        let fetcher = fetcher(vec![source("borneo", mock_server.uri())], Connection::Wifi).await;
        assert_eq!(run_batch(&fetcher, &plan(&["borneo"], false)).await.saved, 4);
        assert_eq!(run_batch(&fetcher, &plan(&["borneo"], false)).await.saved, 0);
        assert_eq!(fetcher.store().get_daily_download_count("borneo").await, 4);
    }

    #[tokio::test]
    async fn test_failing_source_does_not_stop_later_sources() {
        let mock_server = MockServer::start().await;
        Mock::given(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;
        Mock::given(path("/up"))
            .respond_with(ResponseTemplate::new(200).set_body_string(rss_with("s", 2)))
            .mount(&mock_server)
            .await;

        let fetcher = fetcher(
            vec![
                source("borneo", format!("{}/down", mock_server.uri())),
                source("suara", format!("{}/up", mock_server.uri())),
            ],
            Connection::Wifi,
        )
        .await;

        let summary = run_batch(&fetcher, &plan(&["borneo", "suara"], false)).await;
        assert_eq!(summary.saved, 2);
        assert_eq!(
            summary.sources[0].status,
            SourceStatus::Processed {
                origin: Origin::Cache,
                saved: 0
            }
        );
        assert_eq!(
            summary.sources[1].status,
            SourceStatus::Processed {
                origin: Origin::Online,
                saved: 2
            }
        );
    }

    #[tokio::test]
    async fn test_empty_source_list_uses_default() {
        let mock_server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(rss_with("b", 1)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let fetcher = fetcher(vec![source("borneo", mock_server.uri())], Connection::Wifi).await;
        let summary = run_batch(&fetcher, &plan(&[], false)).await;
        assert_eq!(summary.saved, 1);
        assert_eq!(summary.sources[0].source_id, "borneo");
    }
}
