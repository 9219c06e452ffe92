//! Zone catalog port and a read-through cache in front of it.
//!
//! The evaluator never talks to the catalog directly. The pipeline takes a
//! snapshot per ingestion call and passes it down as a plain slice.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::model::Zone;

/// Source of the current geofence zones.
///
/// Implementations may return inactive zones; the evaluator skips them.
pub trait ZoneCatalog: Send + Sync {
    fn zones(&self) -> impl Future<Output = anyhow::Result<Vec<Zone>>> + Send;
}

/// A snapshot of the inner catalog and when it was taken.
struct Snapshot {
    taken_at: Instant,
    zones: Arc<Vec<Zone>>,
}

/// Read-through TTL cache around another catalog.
///
/// Staleness is bounded by `ttl`. Writers to the underlying catalog should
/// call [`CachedZoneCatalog::invalidate`] so the next read sees their change.
/// A zero TTL disables caching, and reads then go straight to the inner
/// catalog without taking the lock.
pub struct CachedZoneCatalog<C> {
    inner: C,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
}

impl<C: ZoneCatalog> CachedZoneCatalog<C> {
    pub fn new(inner: C, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            snapshot: RwLock::new(None),
        }
    }

    /// The wrapped catalog.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Drop the cached snapshot.
    pub async fn invalidate(&self) {
        *self.snapshot.write().await = None;
        debug!("Zone catalog cache invalidated");
    }

    fn fresh(&self, snapshot: &Option<Snapshot>) -> Option<Arc<Vec<Zone>>> {
        snapshot
            .as_ref()
            .filter(|s| s.taken_at.elapsed() < self.ttl)
            .map(|s| Arc::clone(&s.zones))
    }

    async fn load(&self) -> anyhow::Result<Arc<Vec<Zone>>> {
        if self.ttl.is_zero() {
            return Ok(Arc::new(self.inner.zones().await?));
        }

        if let Some(zones) = self.fresh(&*self.snapshot.read().await) {
            return Ok(zones);
        }

        let mut guard = self.snapshot.write().await;
        // Another caller may have refreshed while we waited for the lock
        if let Some(zones) = self.fresh(&guard) {
            return Ok(zones);
        }

        let zones = Arc::new(self.inner.zones().await?);
        debug!(zone_count = zones.len(), "Zone catalog cache refreshed");

        *guard = Some(Snapshot {
            taken_at: Instant::now(),
            zones: Arc::clone(&zones),
        });

        Ok(zones)
    }
}

impl<C: ZoneCatalog> ZoneCatalog for CachedZoneCatalog<C> {
    async fn zones(&self) -> anyhow::Result<Vec<Zone>> {
        Ok(self.load().await?.as_ref().clone())
    }
}
