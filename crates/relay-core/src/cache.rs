use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::loader::{LoadError, PlaylistLoader};
use crate::playlist::{HlsPlaylist, PlaylistKind};

/// Per-channel playlist cache with single-flight refresh.
///
/// One entry per `(channel, kind)`. A fresh entry is served straight from the
/// read path; a stale or unborn entry funnels callers through the entry's
/// load lock so at most one upstream request is in flight per key. Entries
/// are created lazily and live for the process lifetime.
pub struct PlaylistCache {
    loader: Arc<dyn PlaylistLoader>,
    ttl: Duration,
    entries: RwLock<HashMap<(String, PlaylistKind), Arc<CacheEntry>>>,
}

impl PlaylistCache {
    pub fn new(loader: Arc<dyn PlaylistLoader>, ttl: Duration) -> Self {
        Self {
            loader,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the playlist for a channel, hitting upstream only when the
    /// cached copy is stale or missing.
    pub async fn get(
        &self,
        channel: &str,
        kind: PlaylistKind,
    ) -> Result<Arc<HlsPlaylist>, LoadError> {
        let entry = self.entry(channel, kind).await;
        entry.get(self.loader.as_ref(), self.ttl).await
    }

    pub async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }

    async fn entry(&self, channel: &str, kind: PlaylistKind) -> Arc<CacheEntry> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(&(channel.to_string(), kind)) {
                return Arc::clone(entry);
            }
        }

        let mut entries = self.entries.write().await;
        let entry = entries
            .entry((channel.to_string(), kind))
            .or_insert_with(|| Arc::new(CacheEntry::new(channel, kind)));
        Arc::clone(entry)
    }
}

struct CacheEntry {
    channel: String,
    kind: PlaylistKind,
    /// Nanoseconds since the epoch of the last publish; 0 means never loaded.
    last_modified: AtomicI64,
    load_lock: Mutex<()>,
    value: RwLock<Option<Arc<HlsPlaylist>>>,
}

impl CacheEntry {
    fn new(channel: &str, kind: PlaylistKind) -> Self {
        Self {
            channel: channel.to_string(),
            kind,
            last_modified: AtomicI64::new(0),
            load_lock: Mutex::new(()),
            value: RwLock::new(None),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        let last_modified = self.last_modified.load(Ordering::Acquire);
        last_modified != 0 && now_nanos() - last_modified < ttl.as_nanos() as i64
    }

    async fn get(
        &self,
        loader: &dyn PlaylistLoader,
        ttl: Duration,
    ) -> Result<Arc<HlsPlaylist>, LoadError> {
        // Fast path: fresh entries are served without touching the load lock,
        // so an in-flight refresh never stalls readers of the current value.
        if self.is_fresh(ttl) {
            if let Some(value) = self.value.read().await.as_ref() {
                return Ok(Arc::clone(value));
            }
        }

        let _guard = self.load_lock.lock().await;

        // Re-evaluate under the lock: another caller may have refreshed the
        // entry while we waited.
        if self.is_fresh(ttl) {
            if let Some(value) = self.value.read().await.as_ref() {
                return Ok(Arc::clone(value));
            }
        }

        // Publish freshness before the fetch. Readers arriving during the
        // refresh see a fresh timestamp and are served the previous value
        // instead of queueing behind the load lock.
        let previous = self.last_modified.swap(now_nanos(), Ordering::AcqRel);

        match loader.load(&self.channel, self.kind).await {
            Ok(playlist) => {
                let playlist = Arc::new(playlist);
                *self.value.write().await = Some(Arc::clone(&playlist));
                debug!(channel = %self.channel, kind = %self.kind, "playlist refreshed");
                Ok(playlist)
            }
            Err(e) => {
                // Restore the previous timestamp: a failed first load returns
                // the entry to unborn, a failed refresh leaves it stale with
                // its previous value so the next caller retries.
                self.last_modified.store(previous, Ordering::Release);
                Err(e)
            }
        }
    }
}

fn now_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_nanos() as i64
}
