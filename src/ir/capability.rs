//! The closed capability enum and the fixed-shape record built over it.
//!
//! A `CapabilityRecord` is total over `Capability`: every instance carries a
//! flag for every key, so records compare, merge and serialize uniformly.
//! Declaration order of `Capability` is the canonical order everywhere
//! (serialization, violation lists, console output).

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TrustError};

/// A sensitive operating-system capability a package could use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Network,
    Filesystem,
    Subprocess,
    Environment,
    DynamicCodeExecution,
    NativeExtension,
}

impl Capability {
    /// Every capability, in canonical order.
    pub const ALL: [Capability; 6] = [
        Self::Network,
        Self::Filesystem,
        Self::Subprocess,
        Self::Environment,
        Self::DynamicCodeExecution,
        Self::NativeExtension,
    ];

    pub const COUNT: usize = Self::ALL.len();

    /// Canonical key used in policy files and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Filesystem => "filesystem",
            Self::Subprocess => "subprocess",
            Self::Environment => "environment",
            Self::DynamicCodeExecution => "dynamic_code_execution",
            Self::NativeExtension => "native_extension",
        }
    }

    /// Look up a capability by its canonical key. Matching is exact.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Boolean flag per capability. Built once, read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilityRecord {
    flags: [bool; Capability::COUNT],
}

impl CapabilityRecord {
    /// The all-false record; identity element of [`merge`](Self::merge).
    pub fn empty() -> Self {
        Self::default()
    }

    /// The all-true record.
    pub fn all() -> Self {
        Self {
            flags: [true; Capability::COUNT],
        }
    }

    /// A copy of this record with `cap` set.
    #[must_use]
    pub fn with(mut self, cap: Capability) -> Self {
        self.flags[cap.index()] = true;
        self
    }

    pub fn get(&self, cap: Capability) -> bool {
        self.flags[cap.index()]
    }

    /// `(capability, flag)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Capability, bool)> + '_ {
        Capability::ALL.into_iter().map(|c| (c, self.get(c)))
    }

    /// Capabilities whose flag is set, in canonical order.
    pub fn granted(&self) -> impl Iterator<Item = Capability> + '_ {
        self.iter().filter(|(_, on)| *on).map(|(c, _)| c)
    }

    pub fn is_empty(&self) -> bool {
        !self.flags.iter().any(|&f| f)
    }

    /// Per-key boolean OR. Commutative and associative, with
    /// [`empty`](Self::empty) as identity, so any fold order gives the same
    /// result.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut flags = self.flags;
        for (flag, theirs) in flags.iter_mut().zip(other.flags) {
            *flag |= theirs;
        }
        Self { flags }
    }

    /// Whether every capability set here is also set in `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.flags
            .iter()
            .zip(other.flags)
            .all(|(&mine, theirs)| !mine || theirs)
    }

    /// Canonical `name -> flag` pairs in enum order.
    pub fn as_pairs(&self) -> [(&'static str, bool); Capability::COUNT] {
        Capability::ALL.map(|c| (c.as_str(), self.get(c)))
    }

    /// Build a record from an externally parsed mapping (a policy entry).
    ///
    /// Missing keys default to `false`. Unknown keys and non-boolean values
    /// are rejected: granting a capability the auditor does not know about
    /// must never silently turn into a no-op.
    pub fn from_mapping(package: &str, mapping: &Map<String, Value>) -> Result<Self> {
        validate_mapping(mapping).map_err(|msg| TrustError::schema(package, msg))
    }

    /// Like [`from_mapping`](Self::from_mapping) but accepts any JSON value;
    /// anything other than an object is a schema error.
    pub fn from_value(package: &str, value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => Self::from_mapping(package, map),
            other => Err(TrustError::schema(
                package,
                format!(
                    "expected a table of capability flags, found {}",
                    json_kind(other)
                ),
            )),
        }
    }
}

impl FromIterator<Capability> for CapabilityRecord {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

fn validate_mapping(mapping: &Map<String, Value>) -> std::result::Result<CapabilityRecord, String> {
    let mut record = CapabilityRecord::empty();
    // Report unknown keys in a stable order regardless of map backing.
    let mut keys: Vec<&String> = mapping.keys().collect();
    keys.sort();

    for key in keys {
        let cap = Capability::from_name(key).ok_or_else(|| {
            let known: Vec<&str> = Capability::ALL.iter().map(|c| c.as_str()).collect();
            format!(
                "unknown capability '{key}' (expected one of: {})",
                known.join(", ")
            )
        })?;
        match &mapping[key.as_str()] {
            Value::Bool(true) => record = record.with(cap),
            Value::Bool(false) => {}
            other => {
                return Err(format!(
                    "capability '{key}' must be a boolean, found {}",
                    json_kind(other)
                ))
            }
        }
    }

    Ok(record)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "table",
    }
}

impl Serialize for CapabilityRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Capability::COUNT))?;
        for (name, flag) in self.as_pairs() {
            map.serialize_entry(name, &flag)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for CapabilityRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let mapping = Map::<String, Value>::deserialize(deserializer)?;
        validate_mapping(&mapping).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(caps: &[Capability]) -> CapabilityRecord {
        caps.iter().copied().collect()
    }

    #[test]
    fn key_set_is_total() {
        let r = CapabilityRecord::empty();
        assert_eq!(r.iter().count(), Capability::COUNT);
        assert!(r.is_empty());
        assert!(!CapabilityRecord::all().is_empty());
    }

    #[test]
    fn merge_is_per_key_or() {
        let a = record(&[Capability::Network]);
        let b = record(&[Capability::Subprocess]);
        let merged = a.merge(&b);
        assert!(merged.get(Capability::Network));
        assert!(merged.get(Capability::Subprocess));
        assert!(!merged.get(Capability::Filesystem));
    }

    #[test]
    fn names_round_trip() {
        for cap in Capability::ALL {
            assert_eq!(Capability::from_name(cap.as_str()), Some(cap));
        }
        assert_eq!(Capability::from_name("Network"), None);
        assert_eq!(Capability::from_name("gpu_access"), None);
    }

    #[test]
    fn missing_keys_default_to_false() {
        let value = json!({ "network": true });
        let r = CapabilityRecord::from_value("pkg", &value).unwrap();
        assert_eq!(r, record(&[Capability::Network]));
    }

    #[test]
    fn unknown_key_is_schema_error() {
        let value = json!({ "network": true, "gpu_access": true });
        let err = CapabilityRecord::from_value("pkg", &value).unwrap_err();
        match err {
            TrustError::Schema { package, message } => {
                assert_eq!(package, "pkg");
                assert!(message.contains("gpu_access"));
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn non_boolean_value_is_schema_error() {
        let value = json!({ "network": "yes" });
        assert!(matches!(
            CapabilityRecord::from_value("pkg", &value),
            Err(TrustError::Schema { .. })
        ));
    }

    #[test]
    fn non_table_record_is_schema_error() {
        assert!(matches!(
            CapabilityRecord::from_value("pkg", &json!(null)),
            Err(TrustError::Schema { .. })
        ));
        assert!(matches!(
            CapabilityRecord::from_value("pkg", &json!(["network"])),
            Err(TrustError::Schema { .. })
        ));
    }

    #[test]
    fn serializes_in_enum_order() {
        let r = record(&[Capability::NativeExtension, Capability::Network]);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(
            json,
            r#"{"network":true,"filesystem":false,"subprocess":false,"environment":false,"dynamic_code_execution":false,"native_extension":true}"#
        );

        let toml = toml::to_string(&r).unwrap();
        let lines: Vec<&str> = toml.lines().collect();
        assert_eq!(lines[0], "network = true");
        assert_eq!(lines[5], "native_extension = true");
    }

    #[test]
    fn deserialize_rejects_unknown_keys() {
        let result: std::result::Result<CapabilityRecord, _> =
            toml::from_str("network = true\ngpu_access = false\n");
        assert!(result.is_err());
    }

    mod proptests {
        use proptest::prelude::*;

        use super::super::*;

        fn arb_record() -> impl Strategy<Value = CapabilityRecord> {
            proptest::array::uniform6(any::<bool>()).prop_map(|flags| CapabilityRecord { flags })
        }

        proptest! {
            #[test]
            fn merge_commutative(a in arb_record(), b in arb_record()) {
                prop_assert_eq!(a.merge(&b), b.merge(&a));
            }

            #[test]
            fn merge_associative(a in arb_record(), b in arb_record(), c in arb_record()) {
                prop_assert_eq!(a.merge(&b).merge(&c), a.merge(&b.merge(&c)));
            }

            #[test]
            fn merge_empty_identity(a in arb_record()) {
                prop_assert_eq!(a.merge(&CapabilityRecord::empty()), a);
            }

            #[test]
            fn json_round_trip(a in arb_record()) {
                let text = serde_json::to_string(&a).unwrap();
                let back: CapabilityRecord = serde_json::from_str(&text).unwrap();
                prop_assert_eq!(back, a);
            }

            #[test]
            fn toml_round_trip(a in arb_record()) {
                let text = toml::to_string(&a).unwrap();
                let back: CapabilityRecord = toml::from_str(&text).unwrap();
                prop_assert_eq!(back, a);
            }

            #[test]
            fn merge_is_upper_bound(a in arb_record(), b in arb_record()) {
                let m = a.merge(&b);
                prop_assert!(a.is_subset_of(&m));
                prop_assert!(b.is_subset_of(&m));
            }
        }
    }
}
