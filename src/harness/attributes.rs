//! Flattening of live records into attribute paths.

use std::collections::BTreeMap;

use crate::slb::LoadBalancer;

/// Live attributes keyed by path.
pub type AttributeMap = BTreeMap<String, String>;

/// Flattens a record into attribute paths.
///
/// Tags become `tags.%` (the count) and `tags.<key>`. Empty values are left
/// out, so an empty tag set has no `tags.%` entry.
#[must_use]
pub fn flatten(record: &LoadBalancer) -> AttributeMap {
    let mut attributes = AttributeMap::new();
    let mut put = |path: &str, value: Option<String>| {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            attributes.insert(path.to_string(), value);
        }
    };

    put("id", Some(record.id.clone()));
    put("name", Some(record.name.clone()));
    put("address_type", Some(record.address_type.to_string()));
    put("vpc_id", record.vpc_id.clone());
    put("vswitch_id", record.vswitch_id.clone());
    put("master_zone_id", record.master_zone_id.clone());
    put("slave_zone_id", record.slave_zone_id.clone());
    put("address_ip_version", Some(record.address_ip_version.to_string()));
    put("delete_protection", Some(record.delete_protection.to_string()));
    put("resource_group_id", record.resource_group_id.clone());
    put("specification", record.specification.clone());
    put("address", record.address.clone());

    if !record.tags.is_empty() {
        put("tags.%", Some(record.tags.len().to_string()));
        for (key, value) in &record.tags {
            put(&format!("tags.{key}"), Some(value.clone()));
        }
    }

    attributes
}

/// Paths that differ between two snapshots, with both values.
#[must_use]
pub fn differences(
    before: &AttributeMap,
    after: &AttributeMap,
) -> BTreeMap<String, (Option<String>, Option<String>)> {
    before
        .keys()
        .chain(after.keys())
        .filter(|path| before.get(*path) != after.get(*path))
        .map(|path| (path.clone(), (before.get(path).cloned(), after.get(path).cloned())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: serde_json::Value) -> LoadBalancer {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_tags_are_counted_and_expanded() {
        let lb = record(serde_json::json!({
            "loadBalancerId": "lb-1",
            "tags": { "a": "1", "b": "2" },
        }));
        let attributes = flatten(&lb);

        assert_eq!(attributes["tags.%"], "2");
        assert_eq!(attributes["tags.a"], "1");
        assert_eq!(attributes["tags.b"], "2");
    }

    #[test]
    fn test_empty_values_are_absent() {
        let lb = record(serde_json::json!({ "loadBalancerId": "lb-1" }));
        let attributes = flatten(&lb);

        assert!(!attributes.contains_key("name"));
        assert!(!attributes.contains_key("tags.%"));
        assert!(!attributes.contains_key("vswitch_id"));
        assert_eq!(attributes["address_type"], "internet");
        assert_eq!(attributes["delete_protection"], "off");
    }

    #[test]
    fn test_differences_cover_both_sides() {
        let before: AttributeMap = [("name", "a"), ("tags.%", "1")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let after: AttributeMap = [("name", "a"), ("address", "10.0.0.1")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let diff = differences(&before, &after);
        assert_eq!(diff.len(), 2);
        assert_eq!(diff["tags.%"], (Some(String::from("1")), None));
    }
}
