//! Same-resource exclusion within one process.
//!
//! A scenario run leases the load balancer it operates on, and the sweep
//! engine skips leased records, so the two never race on the same resource.
//! Before a record has an identifier its intended name is reserved instead.
//! Leases expire on their own so a crashed holder cannot block forever.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::ReconcileError;

/// Lease expiry duration in seconds.
pub const LEASE_EXPIRY_SECS: i64 = 300; // 5 minutes

/// Information about a lease.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaseInfo {
    /// Unique lease identifier.
    pub lease_id: String,
    /// Leased resource.
    pub resource_id: String,
    /// Who holds the lease.
    pub holder: String,
    /// When the lease was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lease expires.
    pub expires_at: DateTime<Utc>,
}

impl LeaseInfo {
    /// Creates a new lease.
    #[must_use]
    pub fn new(resource_id: &str, holder: &str) -> Self {
        let now = Utc::now();
        Self {
            lease_id: Uuid::new_v4().to_string(),
            resource_id: resource_id.to_string(),
            holder: holder.to_string(),
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(LEASE_EXPIRY_SECS),
        }
    }

    /// Checks if the lease has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Shared table of active leases, keyed by resource id.
#[derive(Debug, Clone, Default)]
pub struct LeaseTable {
    leases: Arc<Mutex<HashMap<String, LeaseInfo>>>,
}

impl LeaseTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn leases(&self) -> MutexGuard<'_, HashMap<String, LeaseInfo>> {
        self.leases.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leases a resource until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::ResourceBusy` if another unexpired lease is
    /// held on the resource.
    pub fn acquire(&self, resource_id: &str, holder: &str) -> Result<LeaseGuard, ReconcileError> {
        let mut leases = self.leases();

        if let Some(existing) = leases.get(resource_id)
            && !existing.is_expired()
        {
            return Err(ReconcileError::ResourceBusy {
                resource_id: resource_id.to_string(),
                holder: existing.holder.clone(),
                since: existing.acquired_at.to_rfc3339(),
            });
        }

        let info = LeaseInfo::new(resource_id, holder);
        debug!("Leased {resource_id} to {holder} ({})", info.lease_id);
        leases.insert(resource_id.to_string(), info.clone());

        Ok(LeaseGuard {
            table: self.clone(),
            info,
        })
    }

    /// Returns the active lease on a resource, if any.
    #[must_use]
    pub fn holder_of(&self, resource_id: &str) -> Option<LeaseInfo> {
        self.leases()
            .get(resource_id)
            .filter(|lease| !lease.is_expired())
            .cloned()
    }

    /// Returns true if the resource is under an active lease.
    #[must_use]
    pub fn is_leased(&self, resource_id: &str) -> bool {
        self.holder_of(resource_id).is_some()
    }

    /// Reserves a load balancer name for a record not yet created.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::ResourceBusy` if the name is already reserved.
    pub fn reserve_name(&self, name: &str, holder: &str) -> Result<LeaseGuard, ReconcileError> {
        self.acquire(&name_key(name), holder)
    }

    /// Returns the active reservation on a name, if any.
    #[must_use]
    pub fn holder_of_name(&self, name: &str) -> Option<LeaseInfo> {
        self.holder_of(&name_key(name))
    }

    fn release(&self, info: &LeaseInfo) {
        let mut leases = self.leases();
        if leases
            .get(&info.resource_id)
            .is_some_and(|lease| lease.lease_id == info.lease_id)
        {
            leases.remove(&info.resource_id);
            debug!("Released lease on {}", info.resource_id);
        }
    }
}

/// Active lease; released when dropped.
#[derive(Debug)]
pub struct LeaseGuard {
    table: LeaseTable,
    info: LeaseInfo,
}

impl LeaseGuard {
    /// Gets the lease info.
    #[must_use]
    pub const fn info(&self) -> &LeaseInfo {
        &self.info
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.table.release(&self.info);
    }
}

fn name_key(name: &str) -> String {
    format!("name:{name}")
}

/// Generates a unique holder identifier for the current process.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get().map_or_else(
        |_| String::from("unknown"),
        |h| h.to_string_lossy().to_string(),
    );

    let pid = std::process::id();
    let uuid = &Uuid::new_v4().to_string()[..8];

    format!("{hostname}-{pid}-{uuid}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_busy() {
        let table = LeaseTable::new();
        let guard = table.acquire("lb-1", "scenario-a").unwrap();
        assert_eq!(guard.info().holder, "scenario-a");

        match table.acquire("lb-1", "scenario-b") {
            Err(ReconcileError::ResourceBusy { holder, .. }) => assert_eq!(holder, "scenario-a"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_drop_releases_lease() {
        let table = LeaseTable::new();
        {
            let _guard = table.acquire("lb-1", "scenario-a").unwrap();
            assert!(table.is_leased("lb-1"));
        }
        assert!(!table.is_leased("lb-1"));
        assert!(table.acquire("lb-1", "scenario-b").is_ok());
    }

    #[test]
    fn test_expired_lease_can_be_taken_over() {
        let table = LeaseTable::new();
        let guard = table.acquire("lb-1", "crashed").unwrap();
        {
            let mut leases = table.leases();
            if let Some(lease) = leases.get_mut("lb-1") {
                lease.expires_at = Utc::now() - chrono::Duration::seconds(1);
            }
        }

        assert!(!table.is_leased("lb-1"));
        let takeover = table.acquire("lb-1", "scenario-b").unwrap();

        drop(guard);
        assert!(table.is_leased("lb-1"));
        assert_eq!(takeover.info().holder, "scenario-b");
    }

    #[test]
    fn test_name_reservation_is_separate_from_ids() {
        let table = LeaseTable::new();
        let reservation = table.reserve_name("tf-testAccSlb", "scenario-a").unwrap();

        assert_eq!(table.holder_of_name("tf-testAccSlb").unwrap().holder, "scenario-a");
        assert!(!table.is_leased("tf-testAccSlb"));
        assert!(table.reserve_name("tf-testAccSlb", "scenario-b").is_err());

        drop(reservation);
        assert!(table.holder_of_name("tf-testAccSlb").is_none());
    }

    #[test]
    fn test_holder_id_generation() {
        let id1 = generate_holder_id();
        let id2 = generate_holder_id();

        assert_ne!(id1, id2);
        assert!(id1.contains(&std::process::id().to_string()));
    }
}
