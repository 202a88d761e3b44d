//! State configuration.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, StateResult, ValidationError};

/// What to do when two parameters (or two trees) share a name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateNamePolicy {
    /// Keep both; name lookups resolve to the first one added.
    #[default]
    FirstMatch,
    /// Refuse the second component with [`ConfigError::DuplicateName`].
    Reject,
}

/// Behaviour switches for a [`State`](crate::State).
///
/// # Examples
///
/// ```
/// use chainstate::{DuplicateNamePolicy, StateConfig};
///
/// let config = StateConfig::from_json(r#"{"duplicate_names":"reject"}"#).unwrap();
/// assert_eq!(config.duplicate_names, DuplicateNamePolicy::Reject);
/// assert!(!config.validate_on_copy);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// How repeated component names are handled on append.
    pub duplicate_names: DuplicateNamePolicy,
    /// Run tree validation on every checkpoint copy. For diagnostic builds.
    pub validate_on_copy: bool,
}

impl StateConfig {
    /// Parses a JSON document; missing fields take their defaults.
    /// The parsed config is validated before it is returned.
    pub fn from_json(json: &str) -> StateResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::Malformed {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the switches against each other.
    ///
    /// Both switches are independent, so every combination the type can
    /// hold is accepted. [`State::initialize`](crate::State::initialize)
    /// calls this before building anything.
    pub fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}
