use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::{Edge, EdgeEvent, EdgeNotifier, EdgeStatus, EdgeStatusReport};
use crate::config::DiscoveryConfig;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("no edges found in region {region}")]
    EmptyRegion { region: String },
    #[error("edge discovery already started")]
    AlreadyStarted,
}

/// Shape of the discovery API response.
#[derive(Debug, Deserialize)]
struct DiscoveryResponse {
    #[serde(default)]
    regions: HashMap<String, Vec<DiscoveredEdge>>,
}

#[derive(Debug, Deserialize)]
struct DiscoveredEdge {
    name: String,
    #[serde(default)]
    status: String,
}

/// Periodic poller of the edge discovery API.
///
/// Each tick fetches the region's edge list, keeps only entries reporting
/// `status == "up"`, and diffs against the current registry. New subdomains
/// are expanded to full domains via the configured format string and emitted
/// as `Added`; vanished subdomains are emitted as `Removed`. A failed tick
/// (network error, empty or missing region) is logged and skipped without
/// touching the registry.
pub struct EdgeDiscovery {
    config: DiscoveryConfig,
    client: Client,
    notifier: EdgeNotifier,
    edges: Mutex<HashMap<String, Edge>>,
    started: AtomicBool,
    shutdown: watch::Sender<bool>,
}

impl EdgeDiscovery {
    pub fn new(config: DiscoveryConfig, client: Client) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            client,
            notifier: EdgeNotifier::new(),
            edges: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Register for membership events. Subscribe before `start` to observe
    /// the initial edge set as `Added` events.
    pub fn subscribe(&self) -> UnboundedReceiver<EdgeEvent> {
        self.notifier.subscribe()
    }

    /// Spawn the polling loop. One-shot: a second call is an error. The
    /// first poll runs immediately, then on the configured interval.
    pub fn start(self: &Arc<Self>) -> Result<(), DiscoveryError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(DiscoveryError::AlreadyStarted);
        }

        let this = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                api = %this.config.api,
                region = %this.config.region,
                "edge discovery started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = this.poll_once().await {
                            warn!(error = %e, "discovery poll failed, keeping current edge set");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("edge discovery stopped");
                            break;
                        }
                    }
                }
            }
        });

        Ok(())
    }

    /// Signal the polling loop to exit. Safe to call more than once.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Run a single fetch-and-diff cycle.
    pub async fn poll_once(&self) -> Result<(), DiscoveryError> {
        let subdomains = self.fetch_subdomains().await?;
        self.update_edges(subdomains);
        Ok(())
    }

    /// Current registry contents for the operator endpoint.
    pub fn status_report(&self) -> Vec<EdgeStatusReport> {
        let edges = self.edges.lock().expect("edge registry lock poisoned");
        let mut report: Vec<EdgeStatusReport> = edges
            .iter()
            .map(|(name, edge)| EdgeStatusReport {
                name: name.clone(),
                domain: edge.domain.clone(),
                status: edge.status,
                discovered_at: edge.discovered_at,
            })
            .collect();
        report.sort_by(|a, b| a.name.cmp(&b.name));
        report
    }

    async fn fetch_subdomains(&self) -> Result<Vec<String>, DiscoveryError> {
        let response: DiscoveryResponse = self
            .client
            .get(&self.config.api)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let edges = response
            .regions
            .get(&self.config.region)
            .filter(|edges| !edges.is_empty())
            .ok_or_else(|| DiscoveryError::EmptyRegion {
                region: self.config.region.clone(),
            })?;

        Ok(edges
            .iter()
            .filter(|edge| edge.status == "up")
            .map(|edge| edge.name.clone())
            .collect())
    }

    fn update_edges(&self, subdomains: Vec<String>) {
        let mut edges = self.edges.lock().expect("edge registry lock poisoned");

        let observed: std::collections::HashSet<&str> =
            subdomains.iter().map(String::as_str).collect();

        let removed: Vec<String> = edges
            .keys()
            .filter(|name| !observed.contains(name.as_str()))
            .cloned()
            .collect();

        for name in removed {
            if let Some(edge) = edges.remove(&name) {
                info!(subdomain = %name, domain = %edge.domain, "edge removed from discovery");
                self.notifier.emit(&edge.domain, EdgeStatus::Removed);
            }
        }

        for name in subdomains {
            if edges.contains_key(&name) {
                continue;
            }
            let domain = self.config.format_domain(&name);
            info!(subdomain = %name, domain = %domain, "edge discovered");
            edges.insert(
                name,
                Edge {
                    domain: domain.clone(),
                    status: EdgeStatus::Up,
                    discovered_at: Utc::now(),
                },
            );
            self.notifier.emit(&domain, EdgeStatus::Added);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(api: String) -> DiscoveryConfig {
        DiscoveryConfig {
            api,
            region: "eu".into(),
            domain_format: "%s.edge.example.com".into(),
            refresh_interval: Duration::from_secs(60),
        }
    }

    fn discovery(api: String) -> EdgeDiscovery {
        EdgeDiscovery::new(config(api), Client::new())
    }

    fn region_body(edges: &[(&str, &str)]) -> serde_json::Value {
        let entries: Vec<_> = edges
            .iter()
            .map(|(name, status)| json!({"name": name, "status": status}))
            .collect();
        json!({"regions": {"eu": entries}})
    }

    fn drain(rx: &mut UnboundedReceiver<EdgeEvent>) -> Vec<EdgeEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn first_poll_emits_added_for_every_up_edge() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(region_body(&[("e1", "up"), ("e2", "up"), ("e3", "down")])),
            )
            .mount(&server)
            .await;

        let discovery = discovery(server.uri());
        let mut rx = discovery.subscribe();
        discovery.poll_once().await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.status == EdgeStatus::Added));
        let domains: Vec<&str> = events.iter().map(|e| e.domain.as_str()).collect();
        assert!(domains.contains(&"e1.edge.example.com"));
        assert!(domains.contains(&"e2.edge.example.com"));
        // e3 is filtered out before diffing.
        assert!(!domains.contains(&"e3.edge.example.com"));
    }

    #[tokio::test]
    async fn churn_emits_removed_then_added() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(region_body(&[
                ("e1", "up"),
                ("e2", "up"),
            ])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(region_body(&[
                ("e2", "up"),
                ("e3", "up"),
            ])))
            .mount(&server)
            .await;

        let discovery = discovery(server.uri());
        let mut rx = discovery.subscribe();

        discovery.poll_once().await.unwrap();
        let initial = drain(&mut rx);
        assert_eq!(initial.len(), 2);

        discovery.poll_once().await.unwrap();
        let churn = drain(&mut rx);
        assert_eq!(
            churn,
            vec![
                EdgeEvent {
                    domain: "e1.edge.example.com".into(),
                    status: EdgeStatus::Removed,
                },
                EdgeEvent {
                    domain: "e3.edge.example.com".into(),
                    status: EdgeStatus::Added,
                },
            ]
        );
    }

    #[tokio::test]
    async fn empty_region_is_transient_and_keeps_state() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(region_body(&[("e1", "up")])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"regions": {}})))
            .mount(&server)
            .await;

        let discovery = discovery(server.uri());
        let mut rx = discovery.subscribe();

        discovery.poll_once().await.unwrap();
        drain(&mut rx);

        let err = discovery.poll_once().await.unwrap_err();
        assert!(matches!(err, DiscoveryError::EmptyRegion { .. }));

        // No events were emitted and the registry is untouched.
        assert!(drain(&mut rx).is_empty());
        assert_eq!(discovery.status_report().len(), 1);
    }

    #[tokio::test]
    async fn fetch_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let discovery = discovery(server.uri());
        assert!(matches!(
            discovery.poll_once().await,
            Err(DiscoveryError::Http(_))
        ));
    }

    #[tokio::test]
    async fn status_report_lists_discovered_edges() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(region_body(&[
                ("b", "up"),
                ("a", "up"),
            ])))
            .mount(&server)
            .await;

        let discovery = discovery(server.uri());
        discovery.poll_once().await.unwrap();

        let report = discovery.status_report();
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].name, "a");
        assert_eq!(report[0].domain, "a.edge.example.com");
        assert_eq!(report[0].status, EdgeStatus::Up);
    }

    #[tokio::test]
    async fn start_is_one_shot_and_stop_is_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(region_body(&[("e1", "up")])))
            .mount(&server)
            .await;

        let mut config = config(server.uri());
        config.refresh_interval = Duration::from_millis(20);
        let discovery = Arc::new(EdgeDiscovery::new(config, Client::new()));
        let mut rx = discovery.subscribe();

        discovery.start().unwrap();
        assert!(matches!(
            discovery.start(),
            Err(DiscoveryError::AlreadyStarted)
        ));

        let added = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("poller should emit within the interval")
            .unwrap();
        assert_eq!(added.status, EdgeStatus::Added);

        discovery.stop();
        discovery.stop();
    }
}
