//! In-process control plane.
//!
//! `MemorySlb` keeps load balancers in memory and enforces the same rules the
//! remote side does (placement constraints, tag limits, delete protection,
//! idempotent client tokens). It backs `--simulate` runs and the test suite,
//! and records per-operation call counts with optional fault injection.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::trace;

use crate::error::{ApiError, Result};

use super::api::{ClusterLookup, NetworkOracle, SlbApi};
use super::types::{
    AddressType, CreateLoadBalancerRequest, DeleteProtection, FieldUpdate, IpVersion, ListQuery,
    LoadBalancer, MAX_TAGS, UpdateLoadBalancerRequest,
};

/// Resource group assigned when none is requested.
pub const DEFAULT_RESOURCE_GROUP: &str = "rg-default";

/// Specification assigned when none is requested.
pub const DEFAULT_SPECIFICATION: &str = "slb.s1.small";

/// In-memory load balancer control plane for one region.
#[derive(Debug)]
pub struct MemorySlb {
    region: String,
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    records: BTreeMap<String, LoadBalancer>,
    tokens: HashMap<String, String>,
    clusters: HashSet<String>,
    swept_networks: HashSet<String>,
    calls: HashMap<String, u32>,
    faults: HashMap<String, VecDeque<ApiError>>,
    describe_lag: u32,
    next_id: u64,
}

impl MemorySlb {
    /// Creates an empty control plane for the given region.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts a call and pops an injected fault for it, if any.
    fn enter(&self, op: &str) -> Result<MutexGuard<'_, MemoryState>> {
        let mut state = self.state();
        *state.calls.entry(op.to_string()).or_insert(0) += 1;
        trace!("memory control plane: {op}");

        if let Some(fault) = state.faults.get_mut(op).and_then(VecDeque::pop_front) {
            return Err(fault.into());
        }
        Ok(state)
    }

    /// Stores a record as-is, bypassing create validation.
    pub fn insert(&self, record: LoadBalancer) {
        self.state().records.insert(record.id.clone(), record);
    }

    /// Registers a container cluster by name.
    pub fn add_cluster(&self, name: impl Into<String>) {
        self.state().clusters.insert(name.into());
    }

    /// Marks a VPC or vswitch identifier as scheduled for cleanup.
    pub fn flag_network(&self, id: impl Into<String>) {
        self.state().swept_networks.insert(id.into());
    }

    /// Makes the next call of `op` fail with `error`.
    ///
    /// Faults queue up per operation and are consumed in order.
    pub fn fail_next(&self, op: &str, error: ApiError) {
        self.state()
            .faults
            .entry(op.to_string())
            .or_default()
            .push_back(error);
    }

    /// Makes the next `reads` describe calls report not-found, as an
    /// eventually-consistent backend would right after a create.
    pub fn set_describe_lag(&self, reads: u32) {
        self.state().describe_lag = reads;
    }

    /// Number of calls made to `op` so far.
    #[must_use]
    pub fn calls(&self, op: &str) -> u32 {
        self.state().calls.get(op).copied().unwrap_or(0)
    }

    /// Returns a stored record without counting a call.
    #[must_use]
    pub fn record(&self, id: &str) -> Option<LoadBalancer> {
        self.state().records.get(id).cloned()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().records.len()
    }

    /// Returns true if no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().records.is_empty()
    }

    fn check_tags(tags: &BTreeMap<String, String>) -> Result<()> {
        if tags.len() > MAX_TAGS {
            return Err(ApiError::validation(format!(
                "at most {MAX_TAGS} tags are allowed, got {}",
                tags.len()
            ))
            .into());
        }
        Ok(())
    }

    fn address_for(address_type: AddressType, version: IpVersion, n: u64) -> String {
        match (version, address_type) {
            (IpVersion::Ipv6, _) => format!("2408:4000::{n:x}"),
            (IpVersion::Ipv4, AddressType::Internet) => format!("47.96.{}.{}", n / 250, n % 250 + 1),
            (IpVersion::Ipv4, AddressType::Intranet) => format!("10.0.{}.{}", n / 250, n % 250 + 1),
        }
    }
}

#[async_trait]
impl SlbApi for MemorySlb {
    async fn list(&self, query: &ListQuery) -> Result<Vec<LoadBalancer>> {
        let state = self.enter("list")?;

        if query.region != self.region {
            return Ok(Vec::new());
        }

        let size = usize::try_from(query.page_size.max(1)).unwrap_or(usize::MAX);
        let page = usize::try_from(query.page_number.max(1)).unwrap_or(usize::MAX);
        let skip = (page - 1).saturating_mul(size);
        Ok(state.records.values().skip(skip).take(size).cloned().collect())
    }

    async fn describe(&self, id: &str) -> Result<LoadBalancer> {
        let mut state = self.enter("describe")?;

        if state.describe_lag > 0 {
            state.describe_lag -= 1;
            return Err(ApiError::not_found(id).into());
        }

        state
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::not_found(id).into())
    }

    async fn create(&self, request: &CreateLoadBalancerRequest) -> Result<String> {
        let mut state = self.enter("create")?;

        if let Some(id) = state.tokens.get(&request.client_token) {
            if state.records.contains_key(id) {
                return Ok(id.clone());
            }
        }

        if request.address_type == AddressType::Internet && request.vswitch_id.is_some() {
            return Err(ApiError::validation("internet load balancers cannot be placed in a vswitch").into());
        }
        Self::check_tags(&request.tags)?;

        state.next_id += 1;
        let n = state.next_id;
        let id = format!("lb-{n:08}");

        let record = LoadBalancer {
            id: id.clone(),
            name: request.name.clone().unwrap_or_default(),
            address_type: request.address_type,
            vpc_id: request
                .vswitch_id
                .as_ref()
                .map(|vsw| format!("vpc-{}", vsw.trim_start_matches("vsw-"))),
            vswitch_id: request.vswitch_id.clone(),
            master_zone_id: Some(
                request
                    .master_zone_id
                    .clone()
                    .unwrap_or_else(|| format!("{}-a", self.region)),
            ),
            slave_zone_id: Some(
                request
                    .slave_zone_id
                    .clone()
                    .unwrap_or_else(|| format!("{}-b", self.region)),
            ),
            address_ip_version: request.address_ip_version,
            delete_protection: request.delete_protection,
            resource_group_id: Some(
                request
                    .resource_group_id
                    .clone()
                    .unwrap_or_else(|| DEFAULT_RESOURCE_GROUP.to_string()),
            ),
            specification: Some(
                request
                    .specification
                    .clone()
                    .unwrap_or_else(|| DEFAULT_SPECIFICATION.to_string()),
            ),
            address: Some(Self::address_for(request.address_type, request.address_ip_version, n)),
            tags: request.tags.clone(),
        };

        state.tokens.insert(request.client_token.clone(), id.clone());
        state.records.insert(id.clone(), record);
        Ok(id)
    }

    async fn update(&self, id: &str, request: &UpdateLoadBalancerRequest) -> Result<()> {
        let mut state = self.enter("update")?;

        if let Some(FieldUpdate::Set(tags)) = &request.tags {
            Self::check_tags(tags)?;
        }

        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found(id))?;

        if let Some(name) = &request.name {
            record.name = match name {
                FieldUpdate::Set(value) => value.clone(),
                FieldUpdate::Reset => String::new(),
            };
        }
        if let Some(protection) = &request.delete_protection {
            record.delete_protection = match protection {
                FieldUpdate::Set(value) => *value,
                FieldUpdate::Reset => DeleteProtection::default(),
            };
        }
        if let Some(tags) = &request.tags {
            record.tags = match tags {
                FieldUpdate::Set(value) => value.clone(),
                FieldUpdate::Reset => BTreeMap::new(),
            };
        }
        if let Some(group) = &request.resource_group_id {
            record.resource_group_id = Some(match group {
                FieldUpdate::Set(value) => value.clone(),
                FieldUpdate::Reset => DEFAULT_RESOURCE_GROUP.to_string(),
            });
        }

        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut state = self.enter("delete")?;

        let protected = state.records.get(id).map(LoadBalancer::is_delete_protected);
        match protected {
            None => Err(ApiError::not_found(id).into()),
            Some(true) => Err(ApiError::validation(format!(
                "load balancer {id} has delete protection enabled"
            ))
            .into()),
            Some(false) => {
                state.records.remove(id);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ClusterLookup for MemorySlb {
    async fn cluster_exists(&self, name: &str) -> Result<bool> {
        let state = self.enter("cluster_exists")?;
        Ok(state.clusters.contains(name))
    }
}

#[async_trait]
impl NetworkOracle for MemorySlb {
    async fn needs_sweep(&self, vpc_id: Option<&str>, vswitch_id: Option<&str>) -> Result<bool> {
        let state = self.enter("needs_sweep")?;
        Ok([vpc_id, vswitch_id]
            .into_iter()
            .flatten()
            .any(|id| state.swept_networks.contains(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(token: &str) -> CreateLoadBalancerRequest {
        CreateLoadBalancerRequest {
            client_token: token.to_string(),
            name: Some(String::from("tf-testAccSlb")),
            address_type: AddressType::Internet,
            vswitch_id: None,
            master_zone_id: None,
            slave_zone_id: None,
            address_ip_version: IpVersion::Ipv4,
            delete_protection: DeleteProtection::Off,
            resource_group_id: None,
            specification: None,
            tags: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_create_is_idempotent_per_token() {
        let api = MemorySlb::new("cn-test");
        let first = api.create(&request("t1")).await.unwrap();
        let again = api.create(&request("t1")).await.unwrap();
        let other = api.create(&request("t2")).await.unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(api.len(), 2);
    }

    #[tokio::test]
    async fn test_create_fills_computed_fields() {
        let api = MemorySlb::new("cn-test");
        let id = api.create(&request("t1")).await.unwrap();
        let record = api.describe(&id).await.unwrap();

        assert_eq!(record.master_zone_id.as_deref(), Some("cn-test-a"));
        assert_eq!(record.resource_group_id.as_deref(), Some(DEFAULT_RESOURCE_GROUP));
        assert!(record.address.is_some());
    }

    #[tokio::test]
    async fn test_internet_with_vswitch_is_rejected() {
        let api = MemorySlb::new("cn-test");
        let mut req = request("t1");
        req.vswitch_id = Some(String::from("vsw-1"));

        let err = api.create(&req).await.unwrap_err();
        assert!(matches!(err, crate::error::SlbError::Api(ApiError::Validation { .. })));
        assert!(api.is_empty());
    }

    #[tokio::test]
    async fn test_protected_record_cannot_be_deleted() {
        let api = MemorySlb::new("cn-test");
        let mut req = request("t1");
        req.delete_protection = DeleteProtection::On;
        let id = api.create(&req).await.unwrap();

        assert!(api.delete(&id).await.is_err());

        let unprotect = UpdateLoadBalancerRequest {
            delete_protection: Some(FieldUpdate::Reset),
            ..Default::default()
        };
        api.update(&id, &unprotect).await.unwrap();
        api.delete(&id).await.unwrap();
        assert!(api.describe(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_injected_fault_is_consumed_once() {
        let api = MemorySlb::new("cn-test");
        api.fail_next("list", ApiError::transient("503"));

        let query = ListQuery {
            region: String::from("cn-test"),
            page_size: 10,
            page_number: 1,
        };
        assert!(api.list(&query).await.is_err());
        assert!(api.list(&query).await.is_ok());
        assert_eq!(api.calls("list"), 2);
    }

    #[tokio::test]
    async fn test_page_far_past_the_end_is_empty() {
        let api = MemorySlb::new("cn-test");
        api.create(&request("t1")).await.unwrap();

        let query = ListQuery {
            region: String::from("cn-test"),
            page_size: u32::MAX,
            page_number: u32::MAX,
        };
        assert!(api.list(&query).await.unwrap().is_empty());
    }
}
