//! Ownership classification of swept records.
//!
//! A record is only deleted when one of the ownership rules proves it was
//! left behind by a previous run. Rules are evaluated in order and the first
//! match wins; a failed lookup can never make a record owned.

use serde::Serialize;
use tracing::{debug, warn};

use crate::slb::{ClusterLookup, LoadBalancer, NetworkOracle};

/// Name prefixes of resources created by test runs.
pub const DEFAULT_SWEEP_PREFIXES: [&str; 2] = ["tf-testAcc", "tf_testAcc"];

/// Tag key prefix marking records created on behalf of a container cluster.
pub const DEFAULT_LINEAGE_TAG_PREFIX: &str = "kubernetes";

/// Why a record is considered owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnedReason {
    /// The name carries a sweep prefix.
    NamePrefix,
    /// The record sits in a VPC or vswitch that is itself being swept.
    NetworkSweep,
    /// The record was created for a cluster that no longer exists.
    OrphanedDependent,
}

/// Why a record is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignReason {
    /// No ownership rule matched.
    NoMatch,
    /// The cluster the record belongs to still exists.
    DependentExists,
    /// The cluster lookup failed, so ownership cannot be proven.
    AmbiguousLookup,
}

/// Ownership verdict for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    /// Safe to delete.
    Owned(OwnedReason),
    /// Must be left alone.
    Foreign(ForeignReason),
}

impl Verdict {
    /// Returns true if the record may be deleted.
    #[must_use]
    pub const fn is_owned(&self) -> bool {
        matches!(self, Self::Owned(_))
    }
}

/// Related resources a candidate depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DependencyHints {
    /// Owning VPC.
    pub vpc_id: Option<String>,
    /// Vswitch placement.
    pub vswitch_id: Option<String>,
    /// Tag key linking the record to a higher-level resource.
    pub lineage_tag: Option<String>,
}

/// A listed record together with its verdict.
#[derive(Debug, Clone, Serialize)]
pub struct SweepCandidate {
    /// The record.
    pub record: LoadBalancer,
    /// Classification result.
    pub verdict: Verdict,
    /// Related resources.
    pub hints: DependencyHints,
}

/// Returns true if `name` starts with any prefix, ignoring case.
#[must_use]
pub fn matches_prefix<S: AsRef<str>>(name: &str, prefixes: &[S]) -> bool {
    let name = name.to_lowercase();
    prefixes
        .iter()
        .any(|prefix| name.starts_with(&prefix.as_ref().to_lowercase()))
}

/// Decides which listed records belong to previous runs.
pub struct OwnershipClassifier<'a> {
    prefixes: Vec<String>,
    lineage_prefix: String,
    network: &'a dyn NetworkOracle,
    clusters: &'a dyn ClusterLookup,
}

impl<'a> OwnershipClassifier<'a> {
    /// Creates a classifier with the default prefixes.
    #[must_use]
    pub fn new(network: &'a dyn NetworkOracle, clusters: &'a dyn ClusterLookup) -> Self {
        Self {
            prefixes: DEFAULT_SWEEP_PREFIXES.iter().map(ToString::to_string).collect(),
            lineage_prefix: DEFAULT_LINEAGE_TAG_PREFIX.to_string(),
            network,
            clusters,
        }
    }

    /// Replaces the name prefixes.
    #[must_use]
    pub fn with_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.prefixes = prefixes;
        self
    }

    /// Replaces the lineage tag prefix.
    #[must_use]
    pub fn with_lineage_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.lineage_prefix = prefix.into();
        self
    }

    fn lineage_tag(&self, record: &LoadBalancer) -> Option<String> {
        let prefix = self.lineage_prefix.to_lowercase();
        record
            .tags
            .keys()
            .find(|key| key.to_lowercase().starts_with(&prefix))
            .cloned()
    }

    /// Classifies one record.
    pub async fn classify(&self, record: &LoadBalancer) -> Verdict {
        if matches_prefix(&record.name, &self.prefixes) {
            return Verdict::Owned(OwnedReason::NamePrefix);
        }

        match self
            .network
            .needs_sweep(record.vpc_id.as_deref(), record.vswitch_id.as_deref())
            .await
        {
            Ok(true) => return Verdict::Owned(OwnedReason::NetworkSweep),
            Ok(false) => {}
            Err(e) => debug!("Network lookup for {} failed, ignoring: {e}", record.id),
        }

        if let Some(tag) = self.lineage_tag(record) {
            return match self.clusters.cluster_exists(&record.name).await {
                Ok(false) => Verdict::Owned(OwnedReason::OrphanedDependent),
                Err(e) if e.is_not_found() => Verdict::Owned(OwnedReason::OrphanedDependent),
                Ok(true) => Verdict::Foreign(ForeignReason::DependentExists),
                Err(e) => {
                    warn!(
                        "Cannot tell whether {} ({tag}) is orphaned, leaving it: {e}",
                        record.id
                    );
                    Verdict::Foreign(ForeignReason::AmbiguousLookup)
                }
            };
        }

        Verdict::Foreign(ForeignReason::NoMatch)
    }

    /// Classifies a record and attaches its dependency hints.
    pub async fn candidate(&self, record: LoadBalancer) -> SweepCandidate {
        let verdict = self.classify(&record).await;
        let hints = DependencyHints {
            vpc_id: record.vpc_id.clone(),
            vswitch_id: record.vswitch_id.clone(),
            lineage_tag: self.lineage_tag(&record),
        };

        SweepCandidate {
            record,
            verdict,
            hints,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Owned(OwnedReason::NamePrefix) => "owned (name prefix)",
            Self::Owned(OwnedReason::NetworkSweep) => "owned (network swept)",
            Self::Owned(OwnedReason::OrphanedDependent) => "owned (orphaned)",
            Self::Foreign(ForeignReason::NoMatch) => "foreign",
            Self::Foreign(ForeignReason::DependentExists) => "foreign (cluster exists)",
            Self::Foreign(ForeignReason::AmbiguousLookup) => "foreign (lookup failed)",
        };
        write!(f, "{s}")
    }
}
