//! Sweep engine for orphaned load balancers.
//!
//! A sweep lists every load balancer in a region, classifies each one, and
//! deletes the records proven to be owned. A failed listing aborts the sweep;
//! a failed delete is recorded and the rest of the batch continues.

use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ReconcileError, Result, SlbError, SweepError};
use crate::lease::LeaseTable;
use crate::reconciler::Reconciler;
use crate::retry::RetryPolicy;
use crate::slb::{ClusterLookup, NetworkOracle, Paginator, SlbApi, PAGE_SIZE_LARGE};

use super::classifier::{
    OwnershipClassifier, SweepCandidate, DEFAULT_LINEAGE_TAG_PREFIX, DEFAULT_SWEEP_PREFIXES,
};

/// Default number of concurrent deletes.
pub const DEFAULT_SWEEP_CONCURRENCY: usize = 4;

/// Sweep settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOptions {
    /// Records per listing page.
    pub page_size: u32,
    /// Maximum concurrent deletes.
    pub concurrency: usize,
    /// Classify and report without deleting.
    pub dry_run: bool,
    /// Switch delete protection off before deleting owned records.
    pub disable_protection: bool,
    /// Name prefixes of records created by test runs.
    pub prefixes: Vec<String>,
    /// Tag key prefix linking records to container clusters.
    pub lineage_prefix: String,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE_LARGE,
            concurrency: DEFAULT_SWEEP_CONCURRENCY,
            dry_run: false,
            disable_protection: true,
            prefixes: DEFAULT_SWEEP_PREFIXES.iter().map(ToString::to_string).collect(),
            lineage_prefix: DEFAULT_LINEAGE_TAG_PREFIX.to_string(),
        }
    }
}

/// What happened to one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum SweepOutcome {
    /// Foreign record, left alone.
    Retained,
    /// Owned record deleted.
    Deleted,
    /// Owned record that a dry run would delete.
    WouldDelete,
    /// Owned record skipped.
    Skipped(String),
    /// Owned record whose delete failed.
    Failed(String),
}

/// One classified record and its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct SweepEntry {
    /// The classified record.
    pub candidate: SweepCandidate,
    /// What the sweep did with it.
    pub outcome: SweepOutcome,
}

/// Summary of a sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    /// Region swept.
    pub region: String,
    /// Whether deletes were suppressed.
    pub dry_run: bool,
    /// Records listed.
    pub scanned: usize,
    /// Records classified as owned.
    pub owned: usize,
    /// Records deleted.
    pub deleted: usize,
    /// Owned records skipped.
    pub skipped: usize,
    /// Owned records whose delete failed.
    pub failed: usize,
    /// List calls issued.
    pub list_calls: u32,
    /// Every record with its verdict and outcome, ordered by identifier.
    pub entries: Vec<SweepEntry>,
}

impl SweepReport {
    /// Returns true if no delete failed.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Sweeps orphaned load balancers.
pub struct SweepEngine<'a> {
    api: &'a dyn SlbApi,
    network: &'a dyn NetworkOracle,
    clusters: &'a dyn ClusterLookup,
    options: SweepOptions,
    retry: RetryPolicy,
    leases: LeaseTable,
    cancel: CancellationToken,
}

impl<'a> SweepEngine<'a> {
    /// Creates a sweep engine with default options.
    #[must_use]
    pub fn new(
        api: &'a dyn SlbApi,
        network: &'a dyn NetworkOracle,
        clusters: &'a dyn ClusterLookup,
    ) -> Self {
        Self {
            api,
            network,
            clusters,
            options: SweepOptions::default(),
            retry: RetryPolicy::default(),
            leases: LeaseTable::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the sweep options.
    #[must_use]
    pub fn with_options(mut self, options: SweepOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the retry policy for deletes.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Shares a lease table; leased records are skipped.
    #[must_use]
    pub fn with_leases(mut self, leases: LeaseTable) -> Self {
        self.leases = leases;
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sweeps one region.
    ///
    /// Cancellation is checked before every list page, every classification
    /// and every delete. Deletes already in flight are allowed to finish.
    ///
    /// # Errors
    ///
    /// Returns `SweepError::ListingFailed` if the region cannot be listed, or
    /// `ReconcileError::Cancelled` if the sweep was cancelled. Per-record
    /// delete failures are reported in the [`SweepReport`] instead.
    pub async fn sweep(&self, region: &str) -> Result<SweepReport> {
        info!(
            "Sweeping load balancers in {region}{}",
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        let mut pages = Paginator::new(self.api, region, self.options.page_size);
        let mut records = Vec::new();
        loop {
            self.check_cancelled(region)?;
            let page = pages.next_page().await.map_err(|e| {
                error!("Listing {region} failed: {e}");
                SweepError::ListingFailed {
                    region: region.to_string(),
                    source: Box::new(e),
                }
            })?;
            match page {
                Some(batch) => records.extend(batch),
                None => break,
            }
        }

        let classifier = OwnershipClassifier::new(self.network, self.clusters)
            .with_prefixes(self.options.prefixes.clone())
            .with_lineage_prefix(self.options.lineage_prefix.clone());

        let mut candidates = Vec::with_capacity(records.len());
        for record in records {
            self.check_cancelled(region)?;
            let candidate = classifier.candidate(record).await;
            debug!("{}: {}", candidate.record.display_name(), candidate.verdict);
            candidates.push(candidate);
        }

        let scanned = candidates.len();
        let owned = candidates.iter().filter(|c| c.verdict.is_owned()).count();
        info!("Found {scanned} load balancer(s) in {region}, {owned} owned");

        let reconciler = Reconciler::new(self.api)
            .with_retry(self.retry)
            .with_cancellation(self.cancel.clone());

        let mut entries: Vec<SweepEntry> = stream::iter(candidates)
            .map(|candidate| self.process(&reconciler, candidate))
            .buffer_unordered(self.options.concurrency.max(1))
            .collect()
            .await;
        entries.sort_by(|a, b| a.candidate.record.id.cmp(&b.candidate.record.id));

        if self.cancel.is_cancelled() {
            let deleted = entries
                .iter()
                .filter(|e| e.outcome == SweepOutcome::Deleted)
                .count();
            warn!("Sweep of {region} cancelled after {deleted} delete(s)");
            return Err(Self::cancelled(region));
        }

        let count = |wanted: fn(&SweepOutcome) -> bool| {
            entries.iter().filter(|e| wanted(&e.outcome)).count()
        };
        let deleted = count(|o| matches!(o, SweepOutcome::Deleted));
        let skipped = count(|o| matches!(o, SweepOutcome::Skipped(_)));
        let failed = count(|o| matches!(o, SweepOutcome::Failed(_)));

        info!("Sweep of {region} done: {deleted} deleted, {skipped} skipped, {failed} failed");

        Ok(SweepReport {
            region: region.to_string(),
            dry_run: self.options.dry_run,
            scanned,
            owned,
            deleted,
            skipped,
            failed,
            list_calls: pages.calls(),
            entries,
        })
    }

    fn cancelled(region: &str) -> SlbError {
        ReconcileError::Cancelled {
            operation: format!("sweep of {region}"),
        }
        .into()
    }

    fn check_cancelled(&self, region: &str) -> Result<()> {
        if self.cancel.is_cancelled() {
            warn!("Sweep of {region} cancelled");
            return Err(Self::cancelled(region));
        }
        Ok(())
    }

    async fn process(&self, reconciler: &Reconciler<'_>, candidate: SweepCandidate) -> SweepEntry {
        let outcome = self.dispose(reconciler, &candidate).await;
        SweepEntry { candidate, outcome }
    }

    async fn dispose(&self, reconciler: &Reconciler<'_>, candidate: &SweepCandidate) -> SweepOutcome {
        if !candidate.verdict.is_owned() {
            return SweepOutcome::Retained;
        }

        let id = &candidate.record.id;

        let lease = self
            .leases
            .holder_of(id)
            .or_else(|| self.leases.holder_of_name(&candidate.record.name));
        if let Some(lease) = lease {
            info!("Skipping {id}: leased by {}", lease.holder);
            return SweepOutcome::Skipped(format!("leased by {}", lease.holder));
        }

        if self.options.dry_run {
            info!("Would delete {} ({id})", candidate.record.display_name());
            return SweepOutcome::WouldDelete;
        }

        if self.cancel.is_cancelled() {
            return SweepOutcome::Skipped(String::from("cancelled"));
        }

        let result = if self.options.disable_protection {
            reconciler.force_delete(id).await
        } else {
            reconciler.delete(id).await
        };

        match result {
            Ok(()) => {
                info!("Deleted {} ({id})", candidate.record.display_name());
                SweepOutcome::Deleted
            }
            Err(e) => {
                error!("Failed to delete {id}: {e}");
                SweepOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::slb::{DeleteProtection, LoadBalancer, MemorySlb};
    use std::time::Duration;

    fn record(id: &str, name: &str) -> LoadBalancer {
        serde_json::from_value(serde_json::json!({
            "loadBalancerId": id,
            "loadBalancerName": name,
        }))
        .unwrap()
    }

    fn engine(api: &MemorySlb) -> SweepEngine<'_> {
        SweepEngine::new(api, api, api)
            .with_retry(RetryPolicy::new(2, Duration::from_millis(1), Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_deletes_only_owned_records() {
        let api = MemorySlb::new("cn-test");
        api.insert(record("lb-1", "tf-testAccSlb1"));
        api.insert(record("lb-2", "production"));
        api.insert(record("lb-3", "tf_testAccSlb3"));

        let report = engine(&api).sweep("cn-test").await.unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.owned, 2);
        assert_eq!(report.deleted, 2);
        assert!(report.is_clean());
        assert!(api.record("lb-2").is_some());
        assert_eq!(api.len(), 1);
    }

    #[tokio::test]
    async fn test_protected_owned_record_is_unprotected_first() {
        let api = MemorySlb::new("cn-test");
        let mut lb = record("lb-1", "tf-testAccSlb");
        lb.delete_protection = DeleteProtection::On;
        api.insert(lb);

        let report = engine(&api).sweep("cn-test").await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(api.is_empty());
    }

    #[tokio::test]
    async fn test_delete_failure_is_isolated() {
        let api = MemorySlb::new("cn-test");
        api.insert(record("lb-1", "tf-testAccA"));
        api.insert(record("lb-2", "tf-testAccB"));
        api.fail_next("delete", ApiError::PermissionDenied {
            message: String::from("denied"),
        });

        let options = SweepOptions {
            concurrency: 1,
            disable_protection: false,
            ..Default::default()
        };
        let report = engine(&api).with_options(options).sweep("cn-test").await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(api.len(), 1);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_sweep() {
        let api = MemorySlb::new("cn-test");
        api.insert(record("lb-1", "tf-testAccA"));
        api.fail_next("list", ApiError::transient("503"));

        let err = engine(&api).sweep("cn-test").await.unwrap_err();
        assert!(matches!(err, SlbError::Sweep(SweepError::ListingFailed { .. })));
        assert_eq!(api.calls("delete"), 0);
    }

    #[tokio::test]
    async fn test_dry_run_deletes_nothing() {
        let api = MemorySlb::new("cn-test");
        api.insert(record("lb-1", "tf-testAccA"));

        let options = SweepOptions {
            dry_run: true,
            ..Default::default()
        };
        let report = engine(&api).with_options(options).sweep("cn-test").await.unwrap();

        assert_eq!(report.entries[0].outcome, SweepOutcome::WouldDelete);
        assert_eq!(report.deleted, 0);
        assert_eq!(api.calls("delete"), 0);
    }

    #[tokio::test]
    async fn test_leased_record_is_skipped() {
        let api = MemorySlb::new("cn-test");
        api.insert(record("lb-1", "tf-testAccA"));
        let leases = LeaseTable::new();
        let _guard = leases.acquire("lb-1", "scenario").unwrap();

        let report = engine(&api).with_leases(leases.clone()).sweep("cn-test").await.unwrap();

        assert_eq!(report.skipped, 1);
        assert!(api.record("lb-1").is_some());
    }

    #[tokio::test]
    async fn test_record_with_reserved_name_is_skipped() {
        let api = MemorySlb::new("cn-test");
        api.insert(record("lb-1", "tf-testAccA"));
        let leases = LeaseTable::new();
        let _guard = leases.reserve_name("tf-testAccA", "scenario").unwrap();

        let report = engine(&api).with_leases(leases.clone()).sweep("cn-test").await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(api.calls("delete"), 0);
    }

    #[tokio::test]
    async fn test_cancelled_sweep_issues_no_calls() {
        let api = MemorySlb::new("cn-test");
        api.insert(record("lb-1", "tf-testAccA"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine(&api)
            .with_cancellation(cancel)
            .sweep("cn-test")
            .await
            .unwrap_err();

        assert!(matches!(err, SlbError::Reconcile(ReconcileError::Cancelled { .. })));
        assert_eq!(api.calls("list"), 0);
        assert_eq!(api.calls("delete"), 0);
        assert!(api.record("lb-1").is_some());
    }
}
