//! Edge discovery and membership events.
//!
//! A background poller fetches the live edge set for one region from the
//! discovery API, diffs it against the current registry, and pushes
//! add/remove events to every subscriber. Load balancers subscribe to keep
//! their membership view current.

mod poller;

pub use poller::{DiscoveryError, EdgeDiscovery};

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Lifecycle status of an edge server.
///
/// `Added → Up ↔ Down → Removed`. With liveness checking disabled an edge is
/// treated as `Up` from the moment it is discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeStatus {
    Added,
    Up,
    Down,
    Removed,
}

impl fmt::Display for EdgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
            Self::Removed => write!(f, "removed"),
        }
    }
}

/// A membership change for a single edge domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeEvent {
    pub domain: String,
    pub status: EdgeStatus,
}

/// An edge known to the registry.
#[derive(Debug, Clone)]
pub struct Edge {
    pub domain: String,
    pub status: EdgeStatus,
    pub discovered_at: DateTime<Utc>,
}

/// One row of the operator-facing status report.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeStatusReport {
    pub name: String,
    pub domain: String,
    pub status: EdgeStatus,
    pub discovered_at: DateTime<Utc>,
}

/// Fan-out of edge events to subscribers.
///
/// Delivery is serialized under the subscriber-list mutex, so every
/// subscriber observes events for a given edge in emission order. Queues are
/// unbounded: a slow subscriber buffers instead of blocking the poller.
#[derive(Default)]
pub struct EdgeNotifier {
    subscribers: Mutex<Vec<UnboundedSender<EdgeEvent>>>,
}

impl EdgeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<EdgeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .expect("edge notifier lock poisoned")
            .push(tx);
        rx
    }

    pub fn emit(&self, domain: &str, status: EdgeStatus) {
        let event = EdgeEvent {
            domain: domain.to_string(),
            status,
        };
        let mut subscribers = self
            .subscribers
            .lock()
            .expect("edge notifier lock poisoned");
        // Dropped receivers are pruned as they are discovered.
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .expect("edge notifier lock poisoned")
            .len()
    }
}
