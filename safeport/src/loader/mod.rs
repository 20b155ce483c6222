//! Resource loader.
//!
//! Turns a region coordinate into loaded, inspectable world data.
//!
//! # Architecture
//!
//! ```text
//! caller A ─┐                                   ┌──────────────┐
//!           │   in-flight map    spawned load   │ permit pool  │
//! caller B ─┼──► (coalesce) ───────► task ──────► (Semaphore)  ├──► WorldProvider::load_region
//!           │        │                 │        └──────────────┘        (load_timeout)
//! caller C ─┘        │                 ▼
//!                    │          ticket table + loaded cache
//!                    ▼
//!        every caller receives the same LoadOutcome (broadcast)
//! ```
//!
//! A caller that is cancelled stops waiting, but the shared load keeps
//! running for the other callers. The permit is an owned guard held by the
//! load task, so it is returned on success, failure, timeout and panic.
//! Nothing in this module returns an error: every fault becomes a
//! [`LoadOutcome`].

mod ticket;

pub use ticket::ResourceTicket;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::BoundedCache;
use crate::config::LoaderConfig;
use crate::coord::RegionCoord;
use crate::world::WorldProvider;

use ticket::TicketTable;

/// Result of asking for a region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The region is available for inspection.
    Loaded,
    /// The host failed the load.
    Failed(String),
    /// No permit was available in time, or the host load exceeded its deadline.
    TimedOut,
    /// The caller's token fired while waiting.
    Cancelled,
}

impl LoadOutcome {
    /// Whether the region can now be inspected.
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded)
    }
}

/// Snapshot of loader counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoaderStats {
    /// `load()` calls.
    pub requests: u64,
    /// Calls answered without a host load.
    pub fast_path: u64,
    /// Calls that joined an in-flight load.
    pub coalesced: u64,
    /// Host loads issued.
    pub host_loads: u64,
    /// Host loads that failed or panicked.
    pub failures: u64,
    /// Permit or load timeouts.
    pub timeouts: u64,
    /// Waits abandoned through cancellation.
    pub cancellations: u64,
    /// Tickets currently held.
    pub active_tickets: usize,
    /// Tickets reclaimed by the sweep.
    pub tickets_expired: u64,
    /// Loads currently in flight.
    pub in_flight: usize,
    /// Permits not currently in use.
    pub available_permits: usize,
}

#[derive(Debug, Default)]
struct LoaderCounters {
    requests: AtomicU64,
    fast_path: AtomicU64,
    coalesced: AtomicU64,
    host_loads: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    cancellations: AtomicU64,
    tickets_expired: AtomicU64,
}

struct LoaderInner {
    world: Arc<dyn WorldProvider>,
    config: LoaderConfig,
    permits: Arc<Semaphore>,
    in_flight: DashMap<RegionCoord, broadcast::Sender<LoadOutcome>>,
    tickets: TicketTable,
    loaded: BoundedCache<RegionCoord, ()>,
    counters: LoaderCounters,
}

/// Coalescing, permit-bounded region loader.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct RegionLoader {
    inner: Arc<LoaderInner>,
}

impl std::fmt::Debug for RegionLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionLoader")
            .field("config", &self.inner.config)
            .field("in_flight", &self.inner.in_flight.len())
            .field("tickets", &self.inner.tickets.len())
            .finish()
    }
}

impl RegionLoader {
    /// Creates a loader over the host world.
    pub fn new(world: Arc<dyn WorldProvider>, config: LoaderConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent_loads.max(1)));
        let loaded = BoundedCache::new(config.loaded_cache_capacity, config.loaded_cache_ttl);

        Self {
            inner: Arc::new(LoaderInner {
                world,
                config,
                permits,
                in_flight: DashMap::new(),
                tickets: TicketTable::new(),
                loaded,
                counters: LoaderCounters::default(),
            }),
        }
    }

    /// Host world this loader serves.
    pub fn world(&self) -> &Arc<dyn WorldProvider> {
        &self.inner.world
    }

    /// Ensures a region is loaded.
    ///
    /// Concurrent calls for the same region share one host load. Returns
    /// [`LoadOutcome::Cancelled`] as soon as `cancel` fires, without aborting
    /// the shared load.
    pub async fn load(&self, region: RegionCoord, cancel: &CancellationToken) -> LoadOutcome {
        let inner = &self.inner;
        inner.counters.requests.fetch_add(1, Ordering::Relaxed);

        if cancel.is_cancelled() {
            inner.counters.cancellations.fetch_add(1, Ordering::Relaxed);
            return LoadOutcome::Cancelled;
        }

        if inner.loaded.contains(&region) || inner.world.is_region_loaded(region) {
            inner.counters.fast_path.fetch_add(1, Ordering::Relaxed);
            inner.tickets.acquire(region);
            return LoadOutcome::Loaded;
        }

        let mut rx = match inner.in_flight.entry(region) {
            Entry::Occupied(entry) => {
                inner.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(
                    region_x = region.x,
                    region_z = region.z,
                    "Joining in-flight region load"
                );
                entry.get().subscribe()
            }
            Entry::Vacant(_) if inner.loaded.contains(&region) => {
                // A load finished between the fast-path check and the entry lookup.
                inner.counters.fast_path.fetch_add(1, Ordering::Relaxed);
                inner.tickets.acquire(region);
                return LoadOutcome::Loaded;
            }
            Entry::Vacant(entry) => {
                let (tx, rx) = broadcast::channel(1);
                entry.insert(tx);
                let task_inner = Arc::clone(inner);
                tokio::spawn(async move {
                    let mut guard = InFlightGuard {
                        inner: &task_inner,
                        region,
                        armed: true,
                    };
                    let outcome = load_from_host(&task_inner, region).await;
                    guard.complete(outcome).await;
                });
                rx
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => {
                inner.counters.cancellations.fetch_add(1, Ordering::Relaxed);
                LoadOutcome::Cancelled
            }
            received = rx.recv() => match received {
                Ok(outcome) => outcome,
                Err(_) => LoadOutcome::Failed("region load task ended without a result".to_string()),
            },
        }
    }

    /// Reclaims every ticket older than the expiration window.
    ///
    /// The host is told it may release each reclaimed region. Returns the
    /// number of tickets removed.
    pub async fn sweep_expired(&self) -> usize {
        let inner = &self.inner;
        let expired = inner.tickets.drain_expired(inner.config.ticket_expiration);
        for region in &expired {
            inner.loaded.invalidate(region).await;
            inner.world.release_region(*region);
        }
        if !expired.is_empty() {
            inner
                .counters
                .tickets_expired
                .fetch_add(expired.len() as u64, Ordering::Relaxed);
            debug!(
                expired = expired.len(),
                remaining = inner.tickets.len(),
                "Swept expired resource tickets"
            );
        }
        expired.len()
    }

    /// Drops one reference to a region's ticket.
    ///
    /// When the last reference goes, the ticket is removed and the host is
    /// told it may release the region. Returns true in that case.
    pub async fn release(&self, region: RegionCoord) -> bool {
        let removed = self.inner.tickets.release(region);
        if removed {
            self.inner.loaded.invalidate(&region).await;
            self.inner.world.release_region(region);
        }
        removed
    }

    /// Whether a region can be inspected right now without a load.
    pub fn is_loaded(&self, region: RegionCoord) -> bool {
        self.inner.loaded.contains(&region) || self.inner.world.is_region_loaded(region)
    }

    /// Number of tickets currently held.
    pub fn active_tickets(&self) -> usize {
        self.inner.tickets.len()
    }

    /// Whether a ticket exists for a region.
    pub fn has_ticket(&self, region: RegionCoord) -> bool {
        self.inner.tickets.contains(&region)
    }

    /// Current ticket for a region.
    pub fn ticket(&self, region: RegionCoord) -> Option<ResourceTicket> {
        self.inner.tickets.get(&region)
    }

    /// Every ticket currently held.
    pub fn tickets(&self) -> Vec<ResourceTicket> {
        self.inner.tickets.snapshot()
    }

    /// Current counters.
    pub fn stats(&self) -> LoaderStats {
        let c = &self.inner.counters;
        LoaderStats {
            requests: c.requests.load(Ordering::Relaxed),
            fast_path: c.fast_path.load(Ordering::Relaxed),
            coalesced: c.coalesced.load(Ordering::Relaxed),
            host_loads: c.host_loads.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            cancellations: c.cancellations.load(Ordering::Relaxed),
            active_tickets: self.inner.tickets.len(),
            tickets_expired: c.tickets_expired.load(Ordering::Relaxed),
            in_flight: self.inner.in_flight.len(),
            available_permits: self.inner.permits.available_permits(),
        }
    }
}

/// Removes the in-flight entry if the load task ends without completing.
///
/// Dropping the sender closes the channel, so waiters observe a failure
/// instead of hanging.
struct InFlightGuard<'a> {
    inner: &'a LoaderInner,
    region: RegionCoord,
    armed: bool,
}

impl InFlightGuard<'_> {
    async fn complete(&mut self, outcome: LoadOutcome) {
        let inner = self.inner;
        if outcome.is_loaded() {
            inner.tickets.acquire(self.region);
            inner.loaded.insert(self.region, ()).await;
        }
        self.armed = false;
        if let Some((_, tx)) = inner.in_flight.remove(&self.region) {
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.inner.in_flight.remove(&self.region);
        }
    }
}

async fn load_from_host(inner: &LoaderInner, region: RegionCoord) -> LoadOutcome {
    let permit = match tokio::time::timeout(
        inner.config.permit_timeout,
        Arc::clone(&inner.permits).acquire_owned(),
    )
    .await
    {
        Ok(Ok(permit)) => permit,
        Ok(Err(_)) => return LoadOutcome::Failed("load permit pool closed".to_string()),
        Err(_) => {
            inner.counters.timeouts.fetch_add(1, Ordering::Relaxed);
            warn!(
                region_x = region.x,
                region_z = region.z,
                timeout_ms = inner.config.permit_timeout.as_millis() as u64,
                "Timed out waiting for a load permit"
            );
            return LoadOutcome::TimedOut;
        }
    };

    inner.counters.host_loads.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();
    let load = AssertUnwindSafe(inner.world.load_region(region)).catch_unwind();
    let outcome = match tokio::time::timeout(inner.config.load_timeout, load).await {
        Ok(Ok(Ok(()))) => LoadOutcome::Loaded,
        Ok(Ok(Err(e))) => {
            inner.counters.failures.fetch_add(1, Ordering::Relaxed);
            warn!(region_x = region.x, region_z = region.z, error = %e, "Region load failed");
            LoadOutcome::Failed(e.to_string())
        }
        Ok(Err(_)) => {
            inner.counters.failures.fetch_add(1, Ordering::Relaxed);
            warn!(region_x = region.x, region_z = region.z, "Region load panicked");
            LoadOutcome::Failed("region load panicked".to_string())
        }
        Err(_) => {
            inner.counters.timeouts.fetch_add(1, Ordering::Relaxed);
            warn!(
                region_x = region.x,
                region_z = region.z,
                timeout_ms = inner.config.load_timeout.as_millis() as u64,
                "Region load timed out"
            );
            LoadOutcome::TimedOut
        }
    };
    drop(permit);

    debug!(
        region_x = region.x,
        region_z = region.z,
        elapsed_ms = started.elapsed().as_millis() as u64,
        loaded = outcome.is_loaded(),
        "Region load finished"
    );
    outcome
}
