//! Orphan sweeping.
//!
//! This module discovers load balancers left behind by earlier runs,
//! decides which of them are safe to delete, and deletes them in an order
//! that respects the dependencies between sweepers.

mod classifier;
mod engine;
mod network;
mod registry;

pub use classifier::{
    matches_prefix, DependencyHints, ForeignReason, OwnedReason, OwnershipClassifier,
    SweepCandidate, Verdict, DEFAULT_LINEAGE_TAG_PREFIX, DEFAULT_SWEEP_PREFIXES,
};
pub use engine::{
    SweepEngine, SweepEntry, SweepOptions, SweepOutcome, SweepReport, DEFAULT_SWEEP_CONCURRENCY,
};
pub use network::PrefixNetworkOracle;
pub use registry::{SweeperDef, SweeperRegistry, CLUSTER_SWEEPER, SLB_SWEEPER};
