//! Graph engine configuration.
//!
//! Options are keyed by the dotted names a graph configuration file would use.
//! Only the keys listed in [`RECOGNIZED_OPTIONS`] are accepted; anything else,
//! and any value of the wrong type, is rejected while the builder runs rather
//! than when the engine opens.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::config::ConfigError;
use crate::storage::{validate_keyspace, Endpoint, PROTOCOL};

/// Storage backend name; must be the storage node's protocol.
pub const STORAGE_BACKEND: &str = "storage.backend";
/// Storage node host.
pub const STORAGE_HOSTNAME: &str = "storage.hostname";
/// Storage node port.
pub const STORAGE_PORT: &str = "storage.port";
/// Keyspace holding the graph.
pub const STORAGE_KEYSPACE: &str = "storage.keyspace";
/// Whether committed data transactions are logged.
pub const TX_LOG: &str = "tx.log-tx";

/// Every option key the builder accepts.
pub const RECOGNIZED_OPTIONS: [&str; 5] = [
    STORAGE_BACKEND,
    STORAGE_HOSTNAME,
    STORAGE_PORT,
    STORAGE_KEYSPACE,
    TX_LOG,
];

const DEFAULT_LIFECYCLE_INTERVAL: Duration = Duration::from_millis(50);

/// A raw option value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionValue {
    /// Text.
    Str(String),
    /// Integer.
    Int(i64),
    /// Flag.
    Bool(bool),
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Str(s) => f.write_str(s),
            OptionValue::Int(n) => write!(f, "{n}"),
            OptionValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::Str(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        OptionValue::Str(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        OptionValue::Int(value)
    }
}

impl From<u16> for OptionValue {
    fn from(value: u16) -> Self {
        OptionValue::Int(i64::from(value))
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        OptionValue::Bool(value)
    }
}

/// Validated graph engine configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphConfig {
    hostname: String,
    port: u16,
    keyspace: String,
    tx_log: bool,
    lifecycle_interval: Duration,
}

impl GraphConfig {
    /// Starts an empty builder.
    pub fn builder() -> GraphConfigBuilder {
        GraphConfigBuilder::default()
    }

    /// Builder preset for `keyspace` on the node at `endpoint`.
    pub fn for_endpoint(endpoint: &Endpoint, keyspace: &str, tx_log: bool) -> GraphConfigBuilder {
        let mut builder = GraphConfigBuilder::default();
        builder.values.insert(STORAGE_BACKEND, OptionValue::from(PROTOCOL));
        builder
            .values
            .insert(STORAGE_HOSTNAME, OptionValue::from(endpoint.host.as_str()));
        builder.values.insert(STORAGE_PORT, OptionValue::from(endpoint.port));
        builder.values.insert(STORAGE_KEYSPACE, OptionValue::from(keyspace));
        builder.values.insert(TX_LOG, OptionValue::Bool(tx_log));
        builder
    }

    /// Storage node the engine connects to.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.hostname.clone(), self.port)
    }

    /// Keyspace holding the graph.
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// Whether committed data transactions are logged.
    pub fn tx_log(&self) -> bool {
        self.tx_log
    }

    /// How often the index lifecycle worker runs without being woken.
    pub fn lifecycle_interval(&self) -> Duration {
        self.lifecycle_interval
    }
}

/// Collects and type-checks options for a [`GraphConfig`].
#[derive(Clone, Debug)]
pub struct GraphConfigBuilder {
    values: BTreeMap<&'static str, OptionValue>,
    lifecycle_interval: Duration,
}

impl Default for GraphConfigBuilder {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
            lifecycle_interval: DEFAULT_LIFECYCLE_INTERVAL,
        }
    }
}

impl GraphConfigBuilder {
    /// Sets one option, replacing an earlier value.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownOption`] for keys outside [`RECOGNIZED_OPTIONS`],
    /// [`ConfigError::InvalidOption`] for values of the wrong type.
    pub fn set(mut self, key: &str, value: impl Into<OptionValue>) -> Result<Self, ConfigError> {
        let key = RECOGNIZED_OPTIONS
            .iter()
            .copied()
            .find(|known| *known == key)
            .ok_or_else(|| ConfigError::UnknownOption {
                key: key.to_string(),
            })?;
        let value = value.into();
        let well_typed = match key {
            STORAGE_BACKEND | STORAGE_HOSTNAME | STORAGE_KEYSPACE => {
                matches!(value, OptionValue::Str(_))
            }
            STORAGE_PORT => matches!(value, OptionValue::Int(_)),
            _ => matches!(value, OptionValue::Bool(_)),
        };
        if !well_typed {
            return Err(ConfigError::InvalidOption {
                key: key.to_string(),
                expected: expected_type(key),
            });
        }
        self.values.insert(key, value);
        Ok(self)
    }

    /// Applies options in order, stopping at the first rejected one.
    pub fn set_all<'a, I>(self, options: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = &'a (String, OptionValue)>,
    {
        options
            .into_iter()
            .try_fold(self, |builder, (key, value)| builder.set(key, value.clone()))
    }

    /// Overrides the idle interval of the index lifecycle worker.
    pub fn lifecycle_interval(mut self, interval: Duration) -> Self {
        self.lifecycle_interval = interval;
        self
    }

    /// Validates ranges and required options.
    pub fn build(self) -> Result<GraphConfig, ConfigError> {
        let backend = self.string(STORAGE_BACKEND)?;
        if backend != PROTOCOL {
            return Err(ConfigError::InvalidOption {
                key: STORAGE_BACKEND.to_string(),
                expected: "the storage node protocol name",
            });
        }
        let hostname = self.string(STORAGE_HOSTNAME)?;
        if hostname.is_empty() {
            return Err(ConfigError::InvalidOption {
                key: STORAGE_HOSTNAME.to_string(),
                expected: "a non-empty host name",
            });
        }
        let port = match self.values.get(STORAGE_PORT) {
            Some(OptionValue::Int(raw)) => {
                u16::try_from(*raw)
                    .ok()
                    .filter(|port| *port != 0)
                    .ok_or_else(|| ConfigError::InvalidOption {
                        key: STORAGE_PORT.to_string(),
                        expected: expected_type(STORAGE_PORT),
                    })?
            }
            _ => return Err(ConfigError::MissingOption { key: STORAGE_PORT }),
        };
        let keyspace = self.string(STORAGE_KEYSPACE)?;
        if validate_keyspace(&keyspace).is_err() {
            return Err(ConfigError::InvalidOption {
                key: STORAGE_KEYSPACE.to_string(),
                expected: expected_type(STORAGE_KEYSPACE),
            });
        }
        let tx_log = matches!(self.values.get(TX_LOG), Some(OptionValue::Bool(true)));
        if self.lifecycle_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "index lifecycle interval must be positive".into(),
            ));
        }
        Ok(GraphConfig {
            hostname,
            port,
            keyspace,
            tx_log,
            lifecycle_interval: self.lifecycle_interval,
        })
    }

    fn string(&self, key: &'static str) -> Result<String, ConfigError> {
        match self.values.get(key) {
            Some(OptionValue::Str(value)) => Ok(value.clone()),
            _ => Err(ConfigError::MissingOption { key }),
        }
    }
}

fn expected_type(key: &str) -> &'static str {
    match key {
        STORAGE_PORT => "a port number between 1 and 65535",
        STORAGE_KEYSPACE => "a keyspace name of letters, digits and underscores",
        TX_LOG => "a boolean",
        _ => "a string",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::new("127.0.0.1", 19042)
    }

    #[test]
    fn preset_builds() {
        let config = GraphConfig::for_endpoint(&endpoint(), "jgex", true)
            .build()
            .unwrap();
        assert_eq!(config.endpoint(), endpoint());
        assert_eq!(config.keyspace(), "jgex");
        assert!(config.tx_log());
    }

    #[test]
    fn unknown_option_is_rejected_at_construction() {
        let err = GraphConfig::for_endpoint(&endpoint(), "jgex", true)
            .set("storage.replication-factor", 3i64)
            .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption { key } if key == "storage.replication-factor"));
    }

    #[test]
    fn mistyped_option_is_rejected() {
        let err = GraphConfig::builder().set(TX_LOG, "yes").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { .. }));
        let err = GraphConfig::builder().set(STORAGE_PORT, true).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { .. }));
    }

    #[test]
    fn backend_must_match_protocol() {
        let err = GraphConfig::for_endpoint(&endpoint(), "jgex", false)
            .set(STORAGE_BACKEND, "cql")
            .unwrap()
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { key, .. } if key == STORAGE_BACKEND));
    }

    #[test]
    fn missing_options_are_reported() {
        let err = GraphConfig::builder()
            .set(STORAGE_BACKEND, PROTOCOL)
            .unwrap()
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingOption { key: STORAGE_HOSTNAME }));
    }

    #[test]
    fn port_range_is_checked() {
        let err = GraphConfig::for_endpoint(&endpoint(), "jgex", false)
            .set(STORAGE_PORT, 70_000i64)
            .unwrap()
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { key, .. } if key == STORAGE_PORT));
    }

    #[test]
    fn later_options_override_preset() {
        let extra = vec![(TX_LOG.to_string(), OptionValue::Bool(false))];
        let config = GraphConfig::for_endpoint(&endpoint(), "jgex", true)
            .set_all(&extra)
            .unwrap()
            .build()
            .unwrap();
        assert!(!config.tx_log());
    }
}
