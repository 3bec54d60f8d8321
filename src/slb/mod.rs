//! Load balancer control plane integration.
//!
//! This module provides:
//! - The capability traits every operation is threaded through
//! - An HTTP client for the regional REST API
//! - An in-memory control plane for simulation and tests
//! - Paged enumeration of a region

mod api;
mod client;
mod memory;
mod pagination;
mod types;

pub use api::{ClusterLookup, NetworkOracle, SlbApi};
pub use client::SlbClient;
pub use memory::{MemorySlb, DEFAULT_RESOURCE_GROUP, DEFAULT_SPECIFICATION};
pub use pagination::{Paginator, MAX_PAGES};
pub use types::{
    AddressType, CreateLoadBalancerRequest, DeleteProtection, FieldUpdate, IpVersion, ListQuery,
    LoadBalancer, UpdateLoadBalancerRequest, MAX_TAGS, PAGE_SIZE_LARGE,
};
