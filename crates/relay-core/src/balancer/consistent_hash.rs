use std::collections::HashSet;
use std::io::Cursor;
use std::sync::{Arc, Mutex, RwLock};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

use super::{Balancer, RouteError};
use crate::config::ConfigError;
use crate::discovery::{EdgeEvent, EdgeStatus};

/// One position on the hash ring.
#[derive(Debug, Clone)]
struct RingEntry {
    key: u32,
    domain: Arc<str>,
}

/// Consistent-hash balancer with sticky session-to-edge affinity.
///
/// Each edge occupies `replication_factor` positions on a ring of `u32`
/// keys. Replica keys are a deterministic function of the domain name alone:
/// the domain's 64-bit MurmurHash3 seeds a portable generator whose first R
/// draws become the keys. Two processes holding the same edge set therefore
/// build identical rings.
///
/// A request is hashed with 32-bit MurmurHash3 over the session key
/// concatenated with the chunk URI. The channel is deliberately left out so
/// multi-bitrate requests for the same chunk sequence stay on one edge. The
/// request routes to the first ring entry at or after its key, wrapping to
/// the start. Adding or removing an edge remaps only the keys adjacent to
/// its replicas.
///
/// Membership changes arrive as discovery events consumed on a dedicated
/// task. Mutations build a new ring off-line and publish it with a single
/// swap under the write lock, so a concurrent route call always observes a
/// complete ring.
pub struct ConsistentHashBalancer {
    replication_factor: usize,
    ring: RwLock<Vec<RingEntry>>,
    known: Mutex<HashSet<String>>,
}

impl ConsistentHashBalancer {
    /// Build the balancer and spawn the event-consumer task. Fails on a zero
    /// replication factor.
    pub fn new(
        replication_factor: usize,
        events: UnboundedReceiver<EdgeEvent>,
    ) -> Result<Arc<Self>, ConfigError> {
        let balancer = Self::with_replication_factor(replication_factor)?;

        let this = Arc::clone(&balancer);
        tokio::spawn(async move {
            let mut events = events;
            while let Some(event) = events.recv().await {
                this.apply_event(&event);
            }
        });

        Ok(balancer)
    }

    /// Build the balancer without an event feed; membership is then driven
    /// through [`apply_event`](Self::apply_event) directly.
    pub fn with_replication_factor(replication_factor: usize) -> Result<Arc<Self>, ConfigError> {
        if replication_factor == 0 {
            return Err(ConfigError::ZeroReplicationFactor);
        }
        Ok(Arc::new(Self {
            replication_factor,
            ring: RwLock::new(Vec::new()),
            known: Mutex::new(HashSet::new()),
        }))
    }

    /// Fold one membership event into the ring. Idempotent per domain.
    pub fn apply_event(&self, event: &EdgeEvent) {
        match event.status {
            EdgeStatus::Added | EdgeStatus::Up => self.add_domain(&event.domain),
            EdgeStatus::Removed | EdgeStatus::Down => self.remove_domain(&event.domain),
        }
    }

    pub fn ring_len(&self) -> usize {
        self.ring.read().expect("hash ring lock poisoned").len()
    }

    fn add_domain(&self, domain: &str) {
        // The known-set guard is held across the rebuild, serializing
        // mutations while routes proceed on the old ring.
        let mut known = self.known.lock().expect("known edge set lock poisoned");
        if !known.insert(domain.to_string()) {
            return;
        }

        let shared: Arc<str> = Arc::from(domain);
        let mut entries = self.ring.read().expect("hash ring lock poisoned").clone();
        entries.reserve(self.replication_factor);

        let mut rng = ChaCha8Rng::seed_from_u64(domain_seed(domain));
        for _ in 0..self.replication_factor {
            entries.push(RingEntry {
                key: rng.gen::<u32>(),
                domain: Arc::clone(&shared),
            });
        }
        // Stable sort keeps insertion order for equal keys.
        entries.sort_by_key(|entry| entry.key);

        *self.ring.write().expect("hash ring lock poisoned") = entries;
        info!(domain, "added edge to hash ring");
    }

    fn remove_domain(&self, domain: &str) {
        let mut known = self.known.lock().expect("known edge set lock poisoned");
        if !known.remove(domain) {
            return;
        }

        let entries: Vec<RingEntry> = self
            .ring
            .read()
            .expect("hash ring lock poisoned")
            .iter()
            .filter(|entry| &*entry.domain != domain)
            .cloned()
            .collect();

        *self.ring.write().expect("hash ring lock poisoned") = entries;
        info!(domain, "removed edge from hash ring");
    }
}

impl Balancer for ConsistentHashBalancer {
    fn route_segment(
        &self,
        session_key: &str,
        channel: &str,
        chunk: &str,
    ) -> Result<String, RouteError> {
        let key = request_key(session_key, chunk);

        let ring = self.ring.read().expect("hash ring lock poisoned");
        if ring.is_empty() {
            return Err(RouteError::NoServers);
        }

        let index = ring.partition_point(|entry| entry.key < key);
        let index = if index == ring.len() { 0 } else { index };

        Ok(format!(
            "https://{}/hls/{}/{}",
            ring[index].domain, channel, chunk
        ))
    }
}

/// 63-bit seed derived from the edge domain's 64-bit MurmurHash3.
fn domain_seed(domain: &str) -> u64 {
    let digest = murmur3::murmur3_x64_128(&mut Cursor::new(domain.as_bytes()), 0)
        .expect("hashing an in-memory buffer cannot fail");
    (digest as u64) & (i64::MAX as u64)
}

/// 32-bit request key over the session key concatenated with the chunk URI.
fn request_key(session_key: &str, chunk: &str) -> u32 {
    let mut buf = Vec::with_capacity(session_key.len() + chunk.len());
    buf.extend_from_slice(session_key.as_bytes());
    buf.extend_from_slice(chunk.as_bytes());
    murmur3::murmur3_32(&mut Cursor::new(buf), 0).expect("hashing an in-memory buffer cannot fail")
}
