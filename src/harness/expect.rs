//! Expected attribute values and their evaluation.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::attributes::AttributeMap;

/// Expected value of one attribute path.
///
/// In YAML a plain scalar is a literal, `{set: true}` is
/// [`ExpectedValue::AnyNonEmpty`] and `{absent: true}` is
/// [`ExpectedValue::Absent`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawExpected")]
pub enum ExpectedValue {
    /// Exact string match.
    Literal(String),
    /// Present with any non-empty value.
    AnyNonEmpty,
    /// Missing or empty.
    Absent,
}

/// Expected attributes keyed by path (e.g. `tags.%`, `tags.env`).
pub type ExpectedAttributeMap = BTreeMap<String, ExpectedValue>;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawExpected {
    Text(String),
    Integer(i64),
    Boolean(bool),
    Marker(Marker),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Marker {
    #[serde(default)]
    set: bool,
    #[serde(default)]
    absent: bool,
}

impl TryFrom<RawExpected> for ExpectedValue {
    type Error = String;

    fn try_from(raw: RawExpected) -> Result<Self, Self::Error> {
        match raw {
            RawExpected::Text(s) => Ok(Self::Literal(s)),
            RawExpected::Integer(n) => Ok(Self::Literal(n.to_string())),
            RawExpected::Boolean(b) => Ok(Self::Literal(b.to_string())),
            RawExpected::Marker(Marker { set: true, absent: false }) => Ok(Self::AnyNonEmpty),
            RawExpected::Marker(Marker { set: false, absent: true }) => Ok(Self::Absent),
            RawExpected::Marker(_) => {
                Err(String::from("expected exactly one of `set: true` or `absent: true`"))
            }
        }
    }
}

impl Serialize for ExpectedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Literal(value) => serializer.serialize_str(value),
            Self::AnyNonEmpty => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("set", &true)?;
                map.end()
            }
            Self::Absent => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("absent", &true)?;
                map.end()
            }
        }
    }
}

impl ExpectedValue {
    /// Creates a literal expectation.
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Returns true if `actual` satisfies this expectation.
    ///
    /// An empty literal is satisfied by a missing value, since empty values
    /// are never reported as present.
    #[must_use]
    pub fn matches(&self, actual: Option<&str>) -> bool {
        let actual = actual.filter(|v| !v.is_empty());
        match self {
            Self::Literal(expected) if expected.is_empty() => actual.is_none(),
            Self::Literal(expected) => actual == Some(expected.as_str()),
            Self::AnyNonEmpty => actual.is_some(),
            Self::Absent => actual.is_none(),
        }
    }
}

impl std::fmt::Display for ExpectedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "\"{value}\""),
            Self::AnyNonEmpty => write!(f, "<any non-empty>"),
            Self::Absent => write!(f, "<absent>"),
        }
    }
}

/// One attribute that did not match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    /// 1-based step number.
    pub step: usize,
    /// Attribute path.
    pub path: String,
    /// Expected value.
    pub expected: ExpectedValue,
    /// Live value, if present.
    pub actual: Option<String>,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "step {}: {}: expected {}, got {}",
            self.step,
            self.path,
            self.expected,
            self.actual
                .as_deref()
                .map_or_else(|| String::from("<absent>"), |v| format!("\"{v}\""))
        )
    }
}

/// Compares every expected path against the live attributes.
///
/// All mismatches are returned, not just the first.
#[must_use]
pub fn compare(step: usize, expected: &ExpectedAttributeMap, actual: &AttributeMap) -> Vec<Mismatch> {
    expected
        .iter()
        .filter_map(|(path, want)| {
            let got = actual.get(path).map(String::as_str);
            (!want.matches(got)).then(|| Mismatch {
                step,
                path: path.clone(),
                expected: want.clone(),
                actual: got.map(String::from),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_non_empty_sentinel() {
        assert!(ExpectedValue::AnyNonEmpty.matches(Some("cn-test-a")));
        assert!(!ExpectedValue::AnyNonEmpty.matches(Some("")));
        assert!(!ExpectedValue::AnyNonEmpty.matches(None));
    }

    #[test]
    fn test_absent_sentinel() {
        assert!(ExpectedValue::Absent.matches(None));
        assert!(ExpectedValue::Absent.matches(Some("")));
        assert!(!ExpectedValue::Absent.matches(Some("1")));
    }

    #[test]
    fn test_literal_is_exact() {
        assert!(ExpectedValue::literal("internet").matches(Some("internet")));
        assert!(!ExpectedValue::literal("internet").matches(Some("Internet")));
        assert!(!ExpectedValue::literal("1").matches(None));
    }

    #[test]
    fn test_yaml_forms() {
        let yaml = "name: tf-testAccSlb\ntags.%: 1\nmaster_zone_id: {set: true}\nvswitch_id: {absent: true}\n";
        let map: ExpectedAttributeMap = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(map["name"], ExpectedValue::literal("tf-testAccSlb"));
        assert_eq!(map["tags.%"], ExpectedValue::literal("1"));
        assert_eq!(map["master_zone_id"], ExpectedValue::AnyNonEmpty);
        assert_eq!(map["vswitch_id"], ExpectedValue::Absent);
    }

    #[test]
    fn test_contradictory_marker_is_rejected() {
        let yaml = "name: {set: true, absent: true}\n";
        assert!(serde_yaml::from_str::<ExpectedAttributeMap>(yaml).is_err());
    }

    #[test]
    fn test_compare_reports_every_mismatch() {
        let expected: ExpectedAttributeMap = [
            (String::from("name"), ExpectedValue::literal("a")),
            (String::from("tags.%"), ExpectedValue::literal("2")),
            (String::from("address"), ExpectedValue::AnyNonEmpty),
        ]
        .into_iter()
        .collect();
        let actual: AttributeMap = [(String::from("name"), String::from("b"))]
            .into_iter()
            .collect();

        let mismatches = compare(3, &expected, &actual);
        assert_eq!(mismatches.len(), 3);
        assert!(mismatches.iter().all(|m| m.step == 3));
    }
}
