//! # chainstate - checkpointable state for MCMC samplers
//!
//! A sampler proposes a perturbation to part of its state, scores it and
//! either keeps it or throws it away. This crate holds that state and
//! tracks what changed so likelihood code can skip unaffected parts.
//!
//! ## Core Concepts
//!
//! - **Parameter**: a named numeric vector with a change marker
//! - **Tree**: a named tree-shaped latent variable with per-node markers
//! - **Dirtiness**: `Clean < Dirty < Gored`, the change marker itself
//! - **State**: ordered, name-addressable parameters and trees with deep copy
//! - **Checkpoint**: keep-copy-if-accept, restore-if-reject around a state
//!
//! ## Usage
//!
//! ```rust
//! use chainstate::{Checkpoint, Dirtiness, PhyloTree, RealParameter, State, StateConfig};
//!
//! let tree = PhyloTree::from_parents("tree", vec![Some(2), Some(2), None], vec![0.0, 0.0, 1.0])?;
//! let state = State::initialize(
//!     vec![Box::new(RealParameter::scalar("clock.rate", 1.0).with_bounds(0.0, 10.0))],
//!     vec![Box::new(tree)],
//!     StateConfig::default(),
//! )?;
//!
//! let mut chain = Checkpoint::new(state);
//! chain.save()?;
//! let rate = chain.state().parameter_index("clock.rate").expect("wired above");
//! chain.state_mut().mul_value(1.1, rate);
//! assert_eq!(chain.state().dirty_parameters(), vec![rate]);
//!
//! chain.reject()?;
//! assert_eq!(chain.state().dirtiness(rate), Dirtiness::Clean);
//! # Ok::<(), chainstate::StateError>(())
//! ```
//!
//! A state is not synchronized. Parallel chains each take their own
//! [`State::copy`] and never share a component.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod checkpoint;
pub mod config;
pub mod dirty;
pub mod error;
pub mod fingerprint;
pub mod parameter;
pub mod state;
pub mod tree;

// Re-export primary types at crate root for convenience
pub use checkpoint::Checkpoint;
pub use config::{DuplicateNamePolicy, StateConfig};
pub use dirty::Dirtiness;
pub use error::{ConfigError, CopyError, StateError, StateResult, ValidationError};
pub use fingerprint::Fingerprint;
pub use parameter::{Parameter, RealParameter};
pub use state::{State, StateId};
pub use tree::{Node, PhyloTree, Tree};
