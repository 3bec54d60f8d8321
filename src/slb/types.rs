//! Load balancer API types and data structures.
//!
//! This module defines the records and requests exchanged with the
//! load balancer control plane.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Maximum number of tags the control plane accepts on one load balancer.
pub const MAX_TAGS: usize = 20;

/// Page size used for bulk listings.
pub const PAGE_SIZE_LARGE: u32 = 50;

/// A load balancer instance as reported by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    /// Remote-assigned identifier, immutable once created.
    #[serde(rename = "loadBalancerId")]
    pub id: String,
    /// Display name.
    #[serde(rename = "loadBalancerName", default)]
    pub name: String,
    /// Network exposure of the instance.
    #[serde(default)]
    pub address_type: AddressType,
    /// Owning VPC, only for intranet instances placed in a vswitch.
    #[serde(default)]
    pub vpc_id: Option<String>,
    /// Vswitch (subnet) placement.
    #[serde(default)]
    pub vswitch_id: Option<String>,
    /// Primary zone.
    #[serde(default)]
    pub master_zone_id: Option<String>,
    /// Standby zone.
    #[serde(default)]
    pub slave_zone_id: Option<String>,
    /// IP version of the service address.
    #[serde(default)]
    pub address_ip_version: IpVersion,
    /// Whether deletion is blocked remotely.
    #[serde(default)]
    pub delete_protection: DeleteProtection,
    /// Resource group the instance belongs to.
    #[serde(default)]
    pub resource_group_id: Option<String>,
    /// Instance specification (e.g. `slb.s1.small`).
    #[serde(rename = "loadBalancerSpec", default)]
    pub specification: Option<String>,
    /// Assigned service address.
    #[serde(default)]
    pub address: Option<String>,
    /// Labels attached to the instance.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Network exposure of a load balancer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    /// Public address.
    #[default]
    Internet,
    /// Private address, optionally placed in a vswitch.
    Intranet,
}

/// IP version of the service address.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    /// IPv4.
    #[default]
    Ipv4,
    /// IPv6.
    Ipv6,
}

/// Remote deletion guard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeleteProtection {
    /// Deletion is rejected until protection is switched off.
    On,
    /// Deletion is allowed.
    #[default]
    Off,
}

/// Query for one page of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Region to list.
    pub region: String,
    /// Records per page.
    pub page_size: u32,
    /// 1-based page number.
    pub page_number: u32,
}

/// Request to create a load balancer.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoadBalancerRequest {
    /// Idempotency token, identical across retries of one create.
    pub client_token: String,
    /// Display name.
    #[serde(rename = "loadBalancerName", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Network exposure.
    pub address_type: AddressType,
    /// Vswitch placement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vswitch_id: Option<String>,
    /// Primary zone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_zone_id: Option<String>,
    /// Standby zone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slave_zone_id: Option<String>,
    /// IP version.
    pub address_ip_version: IpVersion,
    /// Deletion guard.
    pub delete_protection: DeleteProtection,
    /// Resource group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_group_id: Option<String>,
    /// Instance specification.
    #[serde(rename = "loadBalancerSpec", skip_serializing_if = "Option::is_none")]
    pub specification: Option<String>,
    /// Labels.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// A single field in an update request.
///
/// `Reset` asks the remote side to restore the field's default, which is
/// different from leaving the field out of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldUpdate<T> {
    /// Assign a value.
    Set(T),
    /// Restore the remote default.
    Reset,
}

/// Request to update the mutable fields of a load balancer.
///
/// Fields left as `None` are not sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateLoadBalancerRequest {
    /// New display name.
    pub name: Option<FieldUpdate<String>>,
    /// New deletion guard.
    pub delete_protection: Option<FieldUpdate<DeleteProtection>>,
    /// Complete replacement label set.
    pub tags: Option<FieldUpdate<BTreeMap<String, String>>>,
    /// New resource group.
    pub resource_group_id: Option<FieldUpdate<String>>,
}

impl LoadBalancer {
    /// Returns true if deletion is currently blocked.
    #[must_use]
    pub const fn is_delete_protected(&self) -> bool {
        matches!(self.delete_protection, DeleteProtection::On)
    }

    /// Returns the name, or the identifier when the instance is unnamed.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }
}

impl UpdateLoadBalancerRequest {
    /// Returns true if the request carries no field.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.delete_protection.is_none()
            && self.tags.is_none()
            && self.resource_group_id.is_none()
    }

    /// Number of fields the request will send.
    #[must_use]
    pub fn field_count(&self) -> usize {
        [
            self.name.is_some(),
            self.delete_protection.is_some(),
            self.tags.is_some(),
            self.resource_group_id.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count()
    }
}

impl std::fmt::Display for AddressType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Internet => "internet",
            Self::Intranet => "intranet",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for IpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ipv4 => "ipv4",
            Self::Ipv6 => "ipv6",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for DeleteProtection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::On => "on",
            Self::Off => "off",
        };
        write!(f, "{s}")
    }
}

impl FromStr for AddressType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "internet" => Ok(Self::Internet),
            "intranet" => Ok(Self::Intranet),
            other => Err(format!("unknown address type '{other}'")),
        }
    }
}

impl FromStr for IpVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ipv4" => Ok(Self::Ipv4),
            "ipv6" => Ok(Self::Ipv6),
            other => Err(format!("unknown IP version '{other}'")),
        }
    }
}
