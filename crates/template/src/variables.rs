//! Variable mappings supplied to a render.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Key → value mapping used to fill placeholders.
///
/// Keys are unique by construction. Deserializes from any map whose values are
/// scalars, so `vlan = 120` in TOML or `"vlan": 120` in JSON both work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Variables(BTreeMap<String, String>);

/// Scalar values accepted in variable files and request bodies.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Str(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

impl<'de> Deserialize<'de> for Variables {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, Scalar>::deserialize(deserializer)?;
        Ok(Self(
            raw.into_iter()
                .map(|(key, value)| (key, value.into_string()))
                .collect(),
        ))
    }
}

impl Variables {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Look up a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Check whether a variable is set
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay another mapping; its values win on conflict
    pub fn merge(&mut self, other: Variables) {
        self.0.extend(other.0);
    }

    /// Parse a `key=value` assignment (as given on a command line)
    pub fn parse_assignment(assignment: &str) -> Result<(String, String), String> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got '{assignment}'"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("empty key in '{assignment}'"));
        }
        Ok((key.to_string(), value.to_string()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_scalars_from_json() {
        let vars: Variables =
            serde_json::from_str(r#"{"hostname": "core-1", "vlan": 120, "mtu": 9.5, "shut": false}"#)
                .unwrap();
        assert_eq!(vars.get("hostname"), Some("core-1"));
        assert_eq!(vars.get("vlan"), Some("120"));
        assert_eq!(vars.get("mtu"), Some("9.5"));
        assert_eq!(vars.get("shut"), Some("false"));
    }

    #[test]
    fn test_deserialize_from_toml() {
        let vars: Variables = toml::from_str("hostname = \"edge-2\"\nasn = 65001\n").unwrap();
        assert_eq!(vars.get("asn"), Some("65001"));
        assert_eq!(vars.len(), 2);
    }

    #[test]
    fn test_nested_values_rejected() {
        let result: Result<Variables, _> = serde_json::from_str(r#"{"a": {"b": 1}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_overrides() {
        let mut base: Variables = [("vlan", "10"), ("site", "ams")].into_iter().collect();
        base.merge([("vlan", "20")].into_iter().collect());
        assert_eq!(base.get("vlan"), Some("20"));
        assert_eq!(base.get("site"), Some("ams"));
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            Variables::parse_assignment("vlan=120").unwrap(),
            ("vlan".to_string(), "120".to_string())
        );
        assert_eq!(
            Variables::parse_assignment("motd=a=b").unwrap(),
            ("motd".to_string(), "a=b".to_string())
        );
        assert!(Variables::parse_assignment("novalue").is_err());
        assert!(Variables::parse_assignment("=x").is_err());
    }
}
