//! Error types for chainstate.
//!
//! All errors are strongly typed using thiserror. Name lookups that miss
//! are not errors: they return `None`. Indexing out of range is a caller
//! bug and panics like slice indexing.

use thiserror::Error;

/// Structural inconsistencies reported by validation.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A component was given an empty name.
    #[error("Name cannot be empty")]
    EmptyName,

    /// A parameter holds no values.
    #[error("Parameter '{name}' has no values")]
    ZeroDimension {
        /// Component name.
        name: String,
    },

    /// A parameter's lower bound exceeds its upper bound.
    #[error("Parameter '{name}' has lower bound {lower} above upper bound {upper}")]
    InvalidBounds {
        /// Component name.
        name: String,
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },

    /// A parameter value falls outside its bounds.
    #[error("Parameter '{name}' value {value} at dimension {dim} is outside [{lower}, {upper}]")]
    OutOfBounds {
        /// Component name.
        name: String,
        /// Dimension index.
        dim: usize,
        /// Offending value.
        value: f64,
        /// Lower bound.
        lower: f64,
        /// Upper bound.
        upper: f64,
    },

    /// A tree does not have exactly one root.
    #[error("Tree '{tree}' has {count} roots, expected exactly one")]
    RootCount {
        /// Tree name.
        tree: String,
        /// Number of roots found.
        count: usize,
    },

    /// A parent or child index points past the node arena.
    #[error("Tree '{tree}' node {node} refers to missing node {target}")]
    DanglingLink {
        /// Tree name.
        tree: String,
        /// Node index.
        node: usize,
        /// Missing target index.
        target: usize,
    },

    /// A child's parent link and the parent's child list disagree.
    #[error("Tree '{tree}' node {child} is not listed as a child of its parent {parent}")]
    BrokenLink {
        /// Tree name.
        tree: String,
        /// Parent node index.
        parent: usize,
        /// Child node index.
        child: usize,
    },

    /// A node cannot be reached by walking down from the root.
    #[error("Tree '{tree}' node {node} is not reachable from the root")]
    Unreachable {
        /// Tree name.
        tree: String,
        /// Node index.
        node: usize,
    },

    /// A child sits higher than its parent.
    #[error("Tree '{tree}' node {child} (height {child_height}) sits above its parent {parent} (height {parent_height})")]
    NegativeBranch {
        /// Tree name.
        tree: String,
        /// Parent node index.
        parent: usize,
        /// Child node index.
        child: usize,
        /// Height of the parent.
        parent_height: f64,
        /// Height of the child.
        child_height: f64,
    },

    /// A structural edit or node layout the tree cannot represent.
    #[error("Tree '{tree}' has an invalid shape: {reason}")]
    InvalidTreeShape {
        /// Tree name.
        tree: String,
        /// What went wrong.
        reason: String,
    },

    /// A numeric dirtiness code outside 0..=2.
    #[error("Dirtiness code {code} is not one of 0 (clean), 1 (dirty), 2 (gored)")]
    UnknownDirtiness {
        /// The rejected code.
        code: i32,
    },
}

/// Deep-copy failures.
#[derive(Debug, Error)]
pub enum CopyError {
    /// A parameter refused to copy itself.
    #[error("Failed to copy parameter '{name}': {reason}")]
    Parameter {
        /// Component name.
        name: String,
        /// What went wrong.
        reason: String,
    },

    /// A tree refused to copy itself.
    #[error("Failed to copy tree '{name}': {reason}")]
    Tree {
        /// Component name.
        name: String,
        /// What went wrong.
        reason: String,
    },
}

/// Wiring errors that make a run unusable.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A parameter name did not resolve to a registered position.
    #[error("Parameter '{name}' could not be resolved by name during initialization")]
    UnresolvedParameter {
        /// Component name.
        name: String,
    },

    /// A name was registered twice under the reject policy.
    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName {
        /// Either "parameter" or "tree".
        kind: &'static str,
        /// Component name.
        name: String,
    },

    /// Configuration text could not be parsed.
    #[error("Malformed configuration: {message}")]
    Malformed {
        /// Parser message.
        message: String,
    },
}

/// Top-level error type for chainstate.
#[derive(Debug, Error)]
pub enum StateError {
    /// Structural validation failed.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A deep copy failed.
    #[error("Copy error: {0}")]
    Copy(#[from] CopyError),

    /// Wiring or configuration failed.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// `reject` was called with nothing saved.
    #[error("No checkpoint has been saved")]
    NoCheckpoint,
}

impl StateError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is a copy error.
    #[must_use]
    pub const fn is_copy(&self) -> bool {
        matches!(self, Self::Copy(_))
    }

    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

/// Result type alias for chainstate operations.
pub type StateResult<T> = Result<T, StateError>;
