//! Configuration loading from environment variables.
//!
//! # Environment Variables
//!
//! - `LEAFCHAIN_ORDER`: branching factor of the tree (default: `4`, minimum `3`)
//! - `LEAFCHAIN_KEY_COUNT`: keys bulk-loaded by the demo binary (default: `32`)
//! - `LEAFCHAIN_SEED`: seed for the demo's key shuffle (default: unseeded)

use crate::btree::{DEFAULT_ORDER, MIN_ORDER};
use crate::error::IndexError;
use serde::{Deserialize, Serialize};

pub const ORDER_VAR: &str = "LEAFCHAIN_ORDER";
pub const KEY_COUNT_VAR: &str = "LEAFCHAIN_KEY_COUNT";
pub const SEED_VAR: &str = "LEAFCHAIN_SEED";

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has a value that does not parse or is out of range.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Shape of a tree, fixed at construction.
///
/// # Post-conditions
///
/// - `order >= MIN_ORDER` for any value built through [`TreeConfig::new`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    pub order: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
        }
    }
}

impl TreeConfig {
    pub fn new(order: usize) -> Result<Self, IndexError> {
        if order < MIN_ORDER {
            return Err(IndexError::InvalidConfiguration { order });
        }
        Ok(Self { order })
    }

    /// Load the tree shape from `LEAFCHAIN_ORDER`, falling back to the default order.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name: &str| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let order = parse_var(&lookup, ORDER_VAR)?.unwrap_or(DEFAULT_ORDER);
        Self::new(order).map_err(|e| ConfigError::InvalidValue {
            name: ORDER_VAR.to_string(),
            message: e.to_string(),
        })
    }
}

/// Settings for the `tree` demo binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    pub tree: TreeConfig,
    pub key_count: usize,
    /// Shuffle seed. `None` seeds the generator from OS entropy.
    pub seed: Option<u64>,
}

impl DemoConfig {
    pub const DEFAULT_KEY_COUNT: usize = 32;

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name: &str| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            tree: TreeConfig::from_lookup(&lookup)?,
            key_count: parse_var(&lookup, KEY_COUNT_VAR)?.unwrap_or(Self::DEFAULT_KEY_COUNT),
            seed: parse_var(&lookup, SEED_VAR)?,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = DemoConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.tree.order, DEFAULT_ORDER);
        assert_eq!(config.key_count, DemoConfig::DEFAULT_KEY_COUNT);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_reads_all_values() {
        let config = DemoConfig::from_lookup(lookup_from(&[
            (ORDER_VAR, "7"),
            (KEY_COUNT_VAR, " 500 "),
            (SEED_VAR, "42"),
        ]))
        .unwrap();

        assert_eq!(config.tree, TreeConfig { order: 7 });
        assert_eq!(config.key_count, 500);
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_rejects_small_order() {
        let err = TreeConfig::from_lookup(lookup_from(&[(ORDER_VAR, "2")])).unwrap_err();

        assert_eq!(
            err,
            ConfigError::InvalidValue {
                name: ORDER_VAR.to_string(),
                message: "invalid order 2: must be at least 3".to_string(),
            }
        );
        assert_eq!(TreeConfig::new(2), Err(IndexError::InvalidConfiguration { order: 2 }));
    }

    #[test]
    fn test_rejects_garbage() {
        let err = DemoConfig::from_lookup(lookup_from(&[(KEY_COUNT_VAR, "lots")])).unwrap_err();

        assert!(matches!(err, ConfigError::InvalidValue { name, .. } if name == KEY_COUNT_VAR));
    }
}
