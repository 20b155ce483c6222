//! Resource tickets.
//!
//! A ticket records that the core recently needed a region. Tickets are
//! leases: the sweep reclaims them once they are older than the expiration
//! window, whatever their reference count. Reusing a region bumps the count
//! but never extends the lease.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::coord::RegionCoord;

/// Time-bounded claim on a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceTicket {
    /// The region held.
    pub region: RegionCoord,
    /// When the lease started.
    pub created_at: Instant,
    /// Number of successful loads sharing this lease.
    pub ref_count: u32,
}

impl ResourceTicket {
    /// Opens a new lease with one reference.
    pub fn new(region: RegionCoord) -> Self {
        Self {
            region,
            created_at: Instant::now(),
            ref_count: 1,
        }
    }

    /// Time since the lease started.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Whether the lease has run out.
    pub fn is_expired(&self, expiration: Duration) -> bool {
        self.age() >= expiration
    }
}

/// Concurrent ticket table keyed by region.
#[derive(Debug, Default)]
pub(crate) struct TicketTable {
    tickets: DashMap<RegionCoord, ResourceTicket>,
}

impl TicketTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Opens a lease or adds a reference to the existing one.
    ///
    /// Returns true when a new ticket was created.
    pub(crate) fn acquire(&self, region: RegionCoord) -> bool {
        let mut created = false;
        self.tickets
            .entry(region)
            .and_modify(|ticket| ticket.ref_count = ticket.ref_count.saturating_add(1))
            .or_insert_with(|| {
                created = true;
                ResourceTicket::new(region)
            });
        created
    }

    /// Drops one reference. Returns true when the ticket was removed.
    pub(crate) fn release(&self, region: RegionCoord) -> bool {
        let removed = self
            .tickets
            .remove_if_mut(&region, |_, ticket| {
                ticket.ref_count = ticket.ref_count.saturating_sub(1);
                ticket.ref_count == 0
            })
            .is_some();
        removed
    }

    /// Removes every ticket older than `expiration` and returns their regions.
    pub(crate) fn drain_expired(&self, expiration: Duration) -> Vec<RegionCoord> {
        let mut expired = Vec::new();
        self.tickets.retain(|region, ticket| {
            if ticket.is_expired(expiration) {
                expired.push(*region);
                false
            } else {
                true
            }
        });
        expired
    }

    pub(crate) fn get(&self, region: &RegionCoord) -> Option<ResourceTicket> {
        self.tickets.get(region).map(|entry| *entry.value())
    }

    pub(crate) fn contains(&self, region: &RegionCoord) -> bool {
        self.tickets.contains_key(region)
    }

    pub(crate) fn len(&self) -> usize {
        self.tickets.len()
    }

    pub(crate) fn snapshot(&self) -> Vec<ResourceTicket> {
        self.tickets.iter().map(|entry| *entry.value()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_creates_then_bumps() {
        let table = TicketTable::new();
        let region = RegionCoord::new(1, 1);

        assert!(table.acquire(region));
        let first = table.get(&region).unwrap();
        assert!(!table.acquire(region));
        let second = table.get(&region).unwrap();

        assert_eq!(second.ref_count, 2);
        assert_eq!(first.created_at, second.created_at);
    }

    #[test]
    fn test_release_removes_at_zero() {
        let table = TicketTable::new();
        let region = RegionCoord::new(0, 0);
        table.acquire(region);
        table.acquire(region);

        assert!(!table.release(region));
        assert!(table.contains(&region));
        assert!(table.release(region));
        assert!(!table.contains(&region));
        assert!(!table.release(region));
    }

    #[test]
    fn test_drain_expired_ignores_ref_count() {
        let table = TicketTable::new();
        let region = RegionCoord::new(3, 4);
        for _ in 0..5 {
            table.acquire(region);
        }

        assert!(table.drain_expired(Duration::from_secs(60)).is_empty());
        assert_eq!(table.drain_expired(Duration::ZERO), vec![region]);
        assert_eq!(table.len(), 0);
    }
}
