//! Diff engine for comparing declared vs live state.
//!
//! This module computes the attribute-level difference between a
//! [`DeclaredState`] and the load balancer reported by the control plane,
//! and derives the minimal update request for the mutable subset.

use std::collections::BTreeMap;
use std::fmt::Display;

use tracing::debug;

use crate::slb::{FieldUpdate, LoadBalancer, UpdateLoadBalancerRequest, DEFAULT_RESOURCE_GROUP};

use super::declared::{DeclaredState, Field};

/// Whether a field can be changed in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    /// Changed through an update call.
    Mutable,
    /// Only changeable by destroying and recreating the resource.
    Immutable,
}

/// Difference on a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    /// Field that differs.
    pub field: &'static str,
    /// Live value.
    pub old_value: Option<String>,
    /// Declared value after defaults.
    pub new_value: Option<String>,
    /// Whether the change can be applied in place.
    pub mutability: Mutability,
}

/// Complete diff between a declaration and a live record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// Every field that differs.
    pub changes: Vec<FieldChange>,
    /// Update request covering the mutable changes.
    update: UpdateLoadBalancerRequest,
}

impl Diff {
    /// Computes the diff between the declared state and a live record.
    ///
    /// Unset fields are ignored. Removed fields compare against their
    /// default; a removed resource group resets to the default group. The
    /// remote-computed immutable fields (zones, specification) stop being
    /// managed when removed.
    #[must_use]
    pub fn compute(declared: &DeclaredState, live: &LoadBalancer) -> Self {
        let mut diff = Self::default();

        // Mutable fields
        if let Some(update) = Self::resettable(&declared.name, &live.name, String::new()) {
            diff.push_mutable("name", Some(&live.name), &update);
            diff.update.name = Some(update);
        }

        if let Some(update) = Self::resettable(
            &declared.delete_protection,
            &live.delete_protection,
            Default::default(),
        ) {
            diff.push_mutable("delete_protection", Some(live.delete_protection), &update);
            diff.update.delete_protection = Some(update);
        }

        if let Some(update) = Self::resettable(&declared.tags, &live.tags, BTreeMap::new()) {
            diff.changes.push(FieldChange {
                field: "tags",
                old_value: Some(format_tags(&live.tags)),
                new_value: Some(match &update {
                    FieldUpdate::Set(tags) => format_tags(tags),
                    FieldUpdate::Reset => String::new(),
                }),
                mutability: Mutability::Mutable,
            });
            diff.update.tags = Some(update);
        }

        let current_group = live
            .resource_group_id
            .as_deref()
            .filter(|group| !group.is_empty() && *group != DEFAULT_RESOURCE_GROUP);
        let group_update = match &declared.resource_group_id {
            Field::Unset => None,
            Field::Set(group) => (live.resource_group_id.as_ref() != Some(group))
                .then(|| FieldUpdate::Set(group.clone())),
            Field::Removed => current_group.is_some().then_some(FieldUpdate::Reset),
        };
        if let Some(update) = group_update {
            diff.push_mutable("resource_group_id", live.resource_group_id.as_deref(), &update);
            diff.update.resource_group_id = Some(update);
        }

        // Immutable fields
        if !declared.address_type.is_unset() {
            let wanted = declared.effective_address_type();
            if wanted != live.address_type {
                diff.push_immutable("address_type", Some(live.address_type), Some(wanted));
            }
        }

        if !declared.address_ip_version.is_unset() {
            let wanted = declared.effective_ip_version();
            if wanted != live.address_ip_version {
                diff.push_immutable(
                    "address_ip_version",
                    Some(live.address_ip_version),
                    Some(wanted),
                );
            }
        }

        if !declared.vswitch_id.is_unset() {
            let wanted = declared.effective_vswitch();
            let current = live.vswitch_id.as_deref().filter(|id| !id.is_empty());
            if wanted != current {
                diff.push_immutable("vswitch_id", current, wanted);
            }
        }

        for (field, wanted, current) in [
            ("master_zone_id", &declared.master_zone_id, &live.master_zone_id),
            ("slave_zone_id", &declared.slave_zone_id, &live.slave_zone_id),
            ("specification", &declared.specification, &live.specification),
        ] {
            if let Field::Set(value) = wanted
                && current.as_ref() != Some(value)
            {
                diff.push_immutable(field, current.as_deref(), Some(value.as_str()));
            }
        }

        if !diff.is_empty() {
            debug!("Load balancer {} differs on: {}", live.id, diff.fields().join(", "));
        }

        diff
    }

    /// Resolves a resettable field into the update it needs, if any.
    fn resettable<T: Clone + PartialEq>(
        declared: &Field<T>,
        live: &T,
        default: T,
    ) -> Option<FieldUpdate<T>> {
        match declared {
            Field::Unset => None,
            Field::Set(value) => (value != live).then(|| FieldUpdate::Set(value.clone())),
            Field::Removed => (*live != default).then_some(FieldUpdate::Reset),
        }
    }

    fn push_mutable<T: Display, V: Display>(
        &mut self,
        field: &'static str,
        old: Option<V>,
        update: &FieldUpdate<T>,
    ) {
        self.changes.push(FieldChange {
            field,
            old_value: old.map(|v| v.to_string()),
            new_value: Some(match update {
                FieldUpdate::Set(value) => value.to_string(),
                FieldUpdate::Reset => String::from("(default)"),
            }),
            mutability: Mutability::Mutable,
        });
    }

    fn push_immutable<V: Display>(&mut self, field: &'static str, old: Option<V>, new: Option<V>) {
        self.changes.push(FieldChange {
            field,
            old_value: old.map(|v| v.to_string()),
            new_value: new.map(|v| v.to_string()),
            mutability: Mutability::Immutable,
        });
    }

    /// Returns true if nothing differs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Names of every differing field.
    #[must_use]
    pub fn fields(&self) -> Vec<String> {
        self.changes.iter().map(|c| c.field.to_string()).collect()
    }

    /// Names of the differing fields that cannot change in place.
    #[must_use]
    pub fn immutable_fields(&self) -> Vec<String> {
        self.changes
            .iter()
            .filter(|c| c.mutability == Mutability::Immutable)
            .map(|c| c.field.to_string())
            .collect()
    }

    /// The update request covering the mutable changes.
    #[must_use]
    pub const fn update_request(&self) -> &UpdateLoadBalancerRequest {
        &self.update
    }
}

/// Renders a tag set as `k=v` pairs.
fn format_tags(tags: &BTreeMap<String, String>) -> String {
    tags.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

impl std::fmt::Display for Mutability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Mutable => "in place",
            Self::Immutable => "requires recreate",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for FieldChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} -> {} ({})",
            self.field,
            self.old_value.as_deref().unwrap_or("-"),
            self.new_value.as_deref().unwrap_or("-"),
            self.mutability
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slb::{AddressType, DeleteProtection, IpVersion};

    fn live() -> LoadBalancer {
        LoadBalancer {
            id: String::from("lb-1"),
            name: String::from("tf-testAccSlb"),
            address_type: AddressType::Internet,
            vpc_id: None,
            vswitch_id: None,
            master_zone_id: Some(String::from("cn-test-a")),
            slave_zone_id: Some(String::from("cn-test-b")),
            address_ip_version: IpVersion::Ipv4,
            delete_protection: DeleteProtection::On,
            resource_group_id: Some(String::from("rg-default")),
            specification: Some(String::from("slb.s1.small")),
            address: Some(String::from("47.96.0.1")),
            tags: [(String::from("tag_a"), String::from("1"))].into_iter().collect(),
        }
    }

    #[test]
    fn test_matching_declaration_has_empty_diff() {
        let declared = DeclaredState {
            name: Field::Set(String::from("tf-testAccSlb")),
            delete_protection: Field::Set(DeleteProtection::On),
            address_type: Field::Set(AddressType::Internet),
            ..Default::default()
        };
        let diff = Diff::compute(&declared, &live());

        assert!(diff.is_empty());
        assert!(diff.update_request().is_empty());
    }

    #[test]
    fn test_removed_fields_reset_to_default() {
        let declared = DeclaredState {
            delete_protection: Field::Removed,
            tags: Field::Removed,
            ..Default::default()
        };
        let diff = Diff::compute(&declared, &live());
        let update = diff.update_request();

        assert_eq!(update.delete_protection, Some(FieldUpdate::Reset));
        assert_eq!(update.tags, Some(FieldUpdate::Reset));
        assert_eq!(update.name, None);
        assert!(diff.immutable_fields().is_empty());
    }

    #[test]
    fn test_removed_remote_computed_field_is_unmanaged() {
        let declared = DeclaredState {
            master_zone_id: Field::Removed,
            specification: Field::Removed,
            ..Default::default()
        };
        assert!(Diff::compute(&declared, &live()).is_empty());
    }

    #[test]
    fn test_removed_resource_group_is_reset() {
        let declared = DeclaredState {
            resource_group_id: Field::Removed,
            ..Default::default()
        };
        let mut custom = live();
        custom.resource_group_id = Some(String::from("rg-custom"));

        let diff = Diff::compute(&declared, &custom);
        assert_eq!(diff.fields(), vec![String::from("resource_group_id")]);
        assert_eq!(diff.update_request().resource_group_id, Some(FieldUpdate::Reset));
        assert!(diff.immutable_fields().is_empty());

        // Already in the default group.
        assert!(Diff::compute(&declared, &live()).is_empty());
    }

    #[test]
    fn test_immutable_changes_are_all_named() {
        let declared = DeclaredState {
            address_type: Field::Set(AddressType::Intranet),
            address_ip_version: Field::Set(IpVersion::Ipv6),
            name: Field::Set(String::from("renamed")),
            ..Default::default()
        };
        let diff = Diff::compute(&declared, &live());

        assert_eq!(
            diff.immutable_fields(),
            vec![String::from("address_type"), String::from("address_ip_version")]
        );
        assert_eq!(diff.changes.len(), 3);
    }

    #[test]
    fn test_tags_send_full_desired_set() {
        let tags: BTreeMap<_, _> = [("tag_a", "1"), ("tag_b", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let declared = DeclaredState {
            tags: Field::Set(tags.clone()),
            ..Default::default()
        };
        let diff = Diff::compute(&declared, &live());

        assert_eq!(diff.update_request().tags, Some(FieldUpdate::Set(tags)));
    }

    #[test]
    fn test_removed_address_type_with_matching_default_is_unchanged() {
        let declared = DeclaredState {
            address_type: Field::Removed,
            ..Default::default()
        };
        assert!(Diff::compute(&declared, &live()).is_empty());
    }
}
