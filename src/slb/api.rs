//! Capability traits for the remote control plane.
//!
//! Every operation receives its client explicitly through these traits, so
//! the reconciler, sweeper and harness work the same against the HTTP client
//! and the in-memory backend.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{CreateLoadBalancerRequest, ListQuery, LoadBalancer, UpdateLoadBalancerRequest};

/// CRUD surface of the load balancer control plane.
#[async_trait]
pub trait SlbApi: Send + Sync {
    /// Lists one page of load balancers.
    async fn list(&self, query: &ListQuery) -> Result<Vec<LoadBalancer>>;

    /// Describes a load balancer, failing with `ApiError::NotFound` if absent.
    async fn describe(&self, id: &str) -> Result<LoadBalancer>;

    /// Creates a load balancer and returns its identifier.
    async fn create(&self, request: &CreateLoadBalancerRequest) -> Result<String>;

    /// Applies an update to the mutable fields.
    async fn update(&self, id: &str, request: &UpdateLoadBalancerRequest) -> Result<()>;

    /// Deletes a load balancer.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Lookup of the higher-level resources (container clusters) that create
/// load balancers on their own behalf.
#[async_trait]
pub trait ClusterLookup: Send + Sync {
    /// Returns whether a cluster with the given name exists.
    async fn cluster_exists(&self, name: &str) -> Result<bool>;
}

/// Decides whether a network construct is itself scheduled for cleanup.
#[async_trait]
pub trait NetworkOracle: Send + Sync {
    /// Returns true if the VPC or vswitch belongs to a run being swept.
    async fn needs_sweep(&self, vpc_id: Option<&str>, vswitch_id: Option<&str>) -> Result<bool>;
}
