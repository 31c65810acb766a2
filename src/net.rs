//! Network reachability.
//!
//! The fetch orchestrator and the batch downloader only need two facts about
//! the network: whether it is up and whether the active transport is wifi.
//! [`Reachability`] is the seam for that query.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Timeout for a single reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport classification. Only `Wifi` is special to the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Wifi,
    Cellular,
    Ethernet,
    Unknown,
}

/// Snapshot of the current network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkState {
    pub connected: bool,
    pub kind: ConnectionKind,
}

impl NetworkState {
    pub fn offline() -> Self {
        Self {
            connected: false,
            kind: ConnectionKind::Unknown,
        }
    }

    pub fn is_wifi(&self) -> bool {
        self.connected && self.kind == ConnectionKind::Wifi
    }
}

/// Connection declared in the config file's `[network]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connection {
    #[default]
    Wifi,
    Cellular,
    Ethernet,
    Offline,
}

impl Connection {
    pub fn state(self) -> NetworkState {
        let kind = match self {
            Connection::Wifi => ConnectionKind::Wifi,
            Connection::Cellular => ConnectionKind::Cellular,
            Connection::Ethernet => ConnectionKind::Ethernet,
            Connection::Offline => return NetworkState::offline(),
        };
        NetworkState {
            connected: true,
            kind,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReachabilityError {
    #[error("reachability probe could not be sent: {0}")]
    Probe(String),
}

/// Source of the current [`NetworkState`].
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn network_state(&self) -> Result<NetworkState, ReachabilityError>;
}

/// Reports a fixed state.
#[derive(Debug, Clone)]
pub struct StaticReachability {
    state: NetworkState,
}

impl StaticReachability {
    pub fn new(state: NetworkState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Reachability for StaticReachability {
    async fn network_state(&self) -> Result<NetworkState, ReachabilityError> {
        Ok(self.state)
    }
}

/// Probes a URL with `HEAD` and reports the configured connection kind when
/// anything answers.
///
/// Any HTTP response counts as connected, including error statuses. A
/// transport failure or timeout counts as offline.
#[derive(Debug, Clone)]
pub struct ProbeReachability {
    client: reqwest::Client,
    probe_url: String,
    kind: ConnectionKind,
}

impl ProbeReachability {
    pub fn new(probe_url: impl Into<String>, connection: Connection) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;
        Ok(Self {
            client,
            probe_url: probe_url.into(),
            // An "offline" declaration still defers to the probe for liveness.
            kind: match connection.state() {
                NetworkState { connected: true, kind } => kind,
                _ => ConnectionKind::Unknown,
            },
        })
    }
}

#[async_trait]
impl Reachability for ProbeReachability {
    async fn network_state(&self) -> Result<NetworkState, ReachabilityError> {
        let request = self
            .client
            .head(&self.probe_url)
            .build()
            .map_err(|e| ReachabilityError::Probe(e.to_string()))?;

        match self.client.execute(request).await {
            Ok(response) => {
                tracing::debug!(url = %self.probe_url, status = %response.status(), "Reachability probe answered");
                Ok(NetworkState {
                    connected: true,
                    kind: self.kind,
                })
            }
            Err(e) => {
                tracing::debug!(url = %self.probe_url, error = %e, "Reachability probe failed");
                Ok(NetworkState::offline())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_connection_states() {
        assert!(Connection::Wifi.state().is_wifi());
        assert_eq!(
            Connection::Cellular.state(),
            NetworkState {
                connected: true,
                kind: ConnectionKind::Cellular
            }
        );
        assert!(!Connection::Offline.state().connected);
        assert!(!NetworkState::offline().is_wifi());
    }

    #[tokio::test]
    async fn test_static_reachability() {
        let r = StaticReachability::new(Connection::Ethernet.state());
        let state = r.network_state().await.unwrap();
        assert!(state.connected);
        assert_eq!(state.kind, ConnectionKind::Ethernet);
    }

    #[tokio::test]
    async fn test_probe_any_status_is_connected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let probe = ProbeReachability::new(mock_server.uri(), Connection::Cellular).unwrap();
        let state = probe.network_state().await.unwrap();
        assert!(state.connected);
        assert_eq!(state.kind, ConnectionKind::Cellular);
    }

    #[tokio::test]
    async fn test_probe_refused_is_offline() {
        // Grab a free port, then release it so nothing is listening.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let probe = ProbeReachability::new(format!("http://127.0.0.1:{port}/"), Connection::Wifi).unwrap();
        let state = probe.network_state().await.unwrap();
        assert_eq!(state, NetworkState::offline());
    }

    #[tokio::test]
    async fn test_probe_invalid_url_is_error() {
        let probe = ProbeReachability::new("not a url", Connection::Wifi).unwrap();
        assert!(probe.network_state().await.is_err());
    }
}
