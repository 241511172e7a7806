use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use super::schema::{Cardinality, PropertyKeyDef, ScalarKind};

/// A property value. The variants are the supported scalar kinds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    /// UTF-8 string.
    String(String),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Timestamp, RFC 3339 on the wire.
    #[serde(with = "time::serde::rfc3339")]
    Timestamp(OffsetDateTime),
    /// Set of strings.
    StringSet(BTreeSet<String>),
}

impl PropertyValue {
    /// Kind of this value.
    pub fn kind(&self) -> ScalarKind {
        match self {
            PropertyValue::String(_) => ScalarKind::String,
            PropertyValue::Int64(_) => ScalarKind::Int64,
            PropertyValue::Timestamp(_) => ScalarKind::Timestamp,
            PropertyValue::StringSet(_) => ScalarKind::StringSet,
        }
    }

    /// Whether this value may be stored under `key`.
    ///
    /// Kinds must match, except that a string key with set or list cardinality
    /// also takes a [`PropertyValue::StringSet`] holding all of its values.
    pub fn conforms_to(&self, key: &PropertyKeyDef) -> bool {
        if self.kind() == key.kind {
            return true;
        }
        key.cardinality != Cardinality::Single
            && key.kind == ScalarKind::String
            && matches!(self, PropertyValue::StringSet(_))
    }

    /// Whether a stored value satisfies an equality query for `wanted`.
    /// A string set matches any string it contains.
    pub fn matches(&self, wanted: &PropertyValue) -> bool {
        match (self, wanted) {
            (PropertyValue::StringSet(set), PropertyValue::String(s)) => set.contains(s),
            _ => self == wanted,
        }
    }

    /// Borrows the string payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Values this one contributes to an index: each element of a string set, else itself.
    /// Timestamps are normalized to UTC so equal instants share an entry.
    pub(crate) fn index_terms(&self) -> Vec<PropertyValue> {
        match self {
            PropertyValue::StringSet(set) => {
                set.iter().cloned().map(PropertyValue::String).collect()
            }
            PropertyValue::Timestamp(ts) => {
                vec![PropertyValue::Timestamp(ts.to_offset(UtcOffset::UTC))]
            }
            other => vec![other.clone()],
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => write!(f, "{s:?}"),
            PropertyValue::Int64(n) => write!(f, "{n}"),
            PropertyValue::Timestamp(ts) => match ts.format(&Rfc3339) {
                Ok(text) => f.write_str(&text),
                Err(_) => write!(f, "{ts}"),
            },
            PropertyValue::StringSet(set) => {
                f.write_str("{")?;
                for (i, item) in set.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item:?}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int64(value)
    }
}

impl From<OffsetDateTime> for PropertyValue {
    fn from(value: OffsetDateTime) -> Self {
        PropertyValue::Timestamp(value)
    }
}

impl From<BTreeSet<String>> for PropertyValue {
    fn from(value: BTreeSet<String>) -> Self {
        PropertyValue::StringSet(value)
    }
}
