//! Declared (desired) state of a load balancer.
//!
//! Every attribute is a tri-state [`Field`]: left unmanaged, assigned a
//! value, or explicitly removed. Removal is distinct from "not mentioned" and
//! resolves to the attribute's default (see [`DeclaredState`]).

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ReconcileError;
use crate::slb::{
    AddressType, CreateLoadBalancerRequest, DeleteProtection, IpVersion, MAX_TAGS,
};

/// Maximum length of a load balancer name.
pub const MAX_NAME_LEN: usize = 80;

/// Tri-state declared attribute.
///
/// In YAML a missing key is `Unset`, an explicit `~`/`null` is `Removed`, and
/// any other value is `Set`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Field<T> {
    /// Not managed by this declaration.
    #[default]
    Unset,
    /// Managed with an explicit value.
    Set(T),
    /// Explicitly removed; resolves to the attribute's default.
    Removed,
}

impl<T> Field<T> {
    /// Returns true if the field is not managed.
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Returns the assigned value, if any.
    #[must_use]
    pub const fn as_set(&self) -> Option<&T> {
        match self {
            Self::Set(value) => Some(value),
            Self::Unset | Self::Removed => None,
        }
    }

    /// Applies a delta: `Set` and `Removed` override, `Unset` keeps the
    /// current value.
    pub fn overlay(&mut self, delta: Self) {
        if !delta.is_unset() {
            *self = delta;
        }
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Set(value) => serializer.serialize_some(value),
            Self::Unset | Self::Removed => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<T>::deserialize(deserializer)?.map_or(Self::Removed, Self::Set))
    }
}

/// Desired state of one load balancer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeclaredState {
    /// Display name. Removed means unnamed.
    #[serde(skip_serializing_if = "Field::is_unset")]
    pub name: Field<String>,
    /// Network exposure. Removed means intranet when placed in a vswitch,
    /// internet otherwise.
    #[serde(skip_serializing_if = "Field::is_unset")]
    pub address_type: Field<AddressType>,
    /// Vswitch placement. Removed means no placement.
    #[serde(skip_serializing_if = "Field::is_unset")]
    pub vswitch_id: Field<String>,
    /// Primary zone. Removed stops managing the zone.
    #[serde(skip_serializing_if = "Field::is_unset")]
    pub master_zone_id: Field<String>,
    /// Standby zone. Removed stops managing the zone.
    #[serde(skip_serializing_if = "Field::is_unset")]
    pub slave_zone_id: Field<String>,
    /// IP version. Removed means ipv4.
    #[serde(skip_serializing_if = "Field::is_unset")]
    pub address_ip_version: Field<IpVersion>,
    /// Deletion guard. Removed means off.
    #[serde(skip_serializing_if = "Field::is_unset")]
    pub delete_protection: Field<DeleteProtection>,
    /// Resource group. Removed moves the record back to the default group.
    #[serde(skip_serializing_if = "Field::is_unset")]
    pub resource_group_id: Field<String>,
    /// Instance specification. Removed stops managing the specification.
    #[serde(skip_serializing_if = "Field::is_unset")]
    pub specification: Field<String>,
    /// Labels. Removed means no labels.
    #[serde(skip_serializing_if = "Field::is_unset")]
    pub tags: Field<BTreeMap<String, String>>,
}

impl DeclaredState {
    /// Overlays a per-step delta onto this state.
    pub fn merge(&mut self, delta: &Self) {
        self.name.overlay(delta.name.clone());
        self.address_type.overlay(delta.address_type.clone());
        self.vswitch_id.overlay(delta.vswitch_id.clone());
        self.master_zone_id.overlay(delta.master_zone_id.clone());
        self.slave_zone_id.overlay(delta.slave_zone_id.clone());
        self.address_ip_version.overlay(delta.address_ip_version.clone());
        self.delete_protection.overlay(delta.delete_protection.clone());
        self.resource_group_id.overlay(delta.resource_group_id.clone());
        self.specification.overlay(delta.specification.clone());
        self.tags.overlay(delta.tags.clone());
    }

    /// Vswitch the record should be placed in, if any.
    #[must_use]
    pub fn effective_vswitch(&self) -> Option<&str> {
        self.vswitch_id
            .as_set()
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Network exposure after applying defaults.
    #[must_use]
    pub fn effective_address_type(&self) -> AddressType {
        match &self.address_type {
            Field::Set(value) => *value,
            Field::Unset | Field::Removed => {
                if self.effective_vswitch().is_some() {
                    AddressType::Intranet
                } else {
                    AddressType::Internet
                }
            }
        }
    }

    /// Name after applying defaults.
    #[must_use]
    pub fn effective_name(&self) -> &str {
        self.name.as_set().map_or("", String::as_str)
    }

    /// IP version after applying defaults.
    #[must_use]
    pub fn effective_ip_version(&self) -> IpVersion {
        self.address_ip_version.as_set().copied().unwrap_or_default()
    }

    /// Deletion guard after applying defaults.
    #[must_use]
    pub fn effective_delete_protection(&self) -> DeleteProtection {
        self.delete_protection.as_set().copied().unwrap_or_default()
    }

    /// Labels after applying defaults.
    #[must_use]
    pub fn effective_tags(&self) -> BTreeMap<String, String> {
        self.tags.as_set().cloned().unwrap_or_default()
    }

    /// Checks the joint constraints between fields.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::InvalidDeclaration` naming the first
    /// offending field.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.effective_vswitch().is_some()
            && self.effective_address_type() == AddressType::Internet
        {
            return Err(ReconcileError::invalid(
                "vswitch_id",
                "a vswitch placement requires address_type = intranet",
            ));
        }

        if self.effective_name().chars().count() > MAX_NAME_LEN {
            return Err(ReconcileError::invalid(
                "name",
                format!("must be at most {MAX_NAME_LEN} characters"),
            ));
        }

        if let Some(tags) = self.tags.as_set() {
            if tags.len() > MAX_TAGS {
                return Err(ReconcileError::invalid(
                    "tags",
                    format!("at most {MAX_TAGS} tags are allowed, got {}", tags.len()),
                ));
            }
            if tags.keys().any(|key| key.trim().is_empty()) {
                return Err(ReconcileError::invalid("tags", "tag keys cannot be empty"));
            }
        }

        Ok(())
    }

    /// Builds the create request for this declaration.
    #[must_use]
    pub fn to_create_request(&self, client_token: &str) -> CreateLoadBalancerRequest {
        let name = self.effective_name();

        CreateLoadBalancerRequest {
            client_token: client_token.to_string(),
            name: (!name.is_empty()).then(|| name.to_string()),
            address_type: self.effective_address_type(),
            vswitch_id: self.effective_vswitch().map(String::from),
            master_zone_id: self.master_zone_id.as_set().cloned(),
            slave_zone_id: self.slave_zone_id.as_set().cloned(),
            address_ip_version: self.effective_ip_version(),
            delete_protection: self.effective_delete_protection(),
            resource_group_id: self.resource_group_id.as_set().cloned(),
            specification: self.specification.as_set().cloned(),
            tags: self.effective_tags(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_distinguishes_missing_from_null() {
        let yaml = "name: tf-testAccSlb\ndelete_protection: ~\n";
        let state: DeclaredState = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(state.name, Field::Set(String::from("tf-testAccSlb")));
        assert_eq!(state.delete_protection, Field::Removed);
        assert_eq!(state.tags, Field::Unset);
    }

    #[test]
    fn test_merge_overrides_and_removes() {
        let mut state = DeclaredState {
            name: Field::Set(String::from("a")),
            delete_protection: Field::Set(DeleteProtection::On),
            ..Default::default()
        };
        let delta = DeclaredState {
            name: Field::Set(String::from("b")),
            delete_protection: Field::Removed,
            ..Default::default()
        };

        state.merge(&delta);

        assert_eq!(state.name, Field::Set(String::from("b")));
        assert_eq!(state.delete_protection, Field::Removed);
        assert_eq!(state.effective_delete_protection(), DeleteProtection::Off);
    }

    #[test]
    fn test_removed_address_type_follows_placement() {
        let mut state = DeclaredState {
            address_type: Field::Removed,
            ..Default::default()
        };
        assert_eq!(state.effective_address_type(), AddressType::Internet);

        state.vswitch_id = Field::Set(String::from("vsw-1"));
        assert_eq!(state.effective_address_type(), AddressType::Intranet);
    }

    #[test]
    fn test_internet_with_vswitch_is_invalid() {
        let state = DeclaredState {
            address_type: Field::Set(AddressType::Internet),
            vswitch_id: Field::Set(String::from("vsw-1")),
            ..Default::default()
        };
        let err = state.validate().unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidDeclaration { ref field, .. } if field == "vswitch_id"));
    }

    #[test]
    fn test_too_many_tags_is_invalid() {
        let tags = (0..=MAX_TAGS).map(|i| (format!("k{i}"), String::from("v"))).collect();
        let state = DeclaredState {
            tags: Field::Set(tags),
            ..Default::default()
        };
        assert!(state.validate().is_err());
    }

    #[test]
    fn test_create_request_applies_defaults() {
        let state = DeclaredState {
            vswitch_id: Field::Set(String::from("vsw-1")),
            ..Default::default()
        };
        let request = state.to_create_request("token");

        assert_eq!(request.address_type, AddressType::Intranet);
        assert_eq!(request.name, None);
        assert_eq!(request.address_ip_version, IpVersion::Ipv4);
        assert!(request.tags.is_empty());
    }
}
