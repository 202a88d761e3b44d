//! The composite MCMC state: parameters, trees and their change markers.
//!
//! Key invariants:
//! - Components are addressed by insertion position; positions never move.
//! - Name lookups resolve to the first component added under that name.
//! - [`State::copy`] shares no component with the source.
//! - In-place scaling through the state never leaves a parameter clean.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::{DuplicateNamePolicy, StateConfig};
use crate::dirty::Dirtiness;
use crate::error::{ConfigError, StateResult};
use crate::parameter::Parameter;
use crate::tree::Tree;

/// Identity of one state instance.
///
/// Every copy gets a fresh id so that replicas can be told apart in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(Uuid);

impl StateId {
    /// Create a new random state ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The current point in the state space.
///
/// Owns an ordered sequence of parameters and an ordered sequence of
/// trees. Integer accessors panic on out-of-range positions; resolve
/// names first with [`parameter_index`](State::parameter_index) or
/// [`tree_index`](State::tree_index).
///
/// # Examples
///
/// ```
/// use chainstate::{Dirtiness, RealParameter, State, StateConfig};
///
/// let mut state = State::initialize(
///     vec![
///         Box::new(RealParameter::scalar("rate", 1.0)),
///         Box::new(RealParameter::scalar("freq", 0.25)),
///     ],
///     Vec::new(),
///     StateConfig::default(),
/// )
/// .unwrap();
///
/// let freq = state.parameter_index("freq").unwrap();
/// state.mul_value(2.0, freq);
/// assert_eq!(state.value(freq), 0.5);
/// assert_eq!(state.dirtiness(freq), Dirtiness::Dirty);
///
/// let checkpoint = state.copy().unwrap();
/// state.mul_value(10.0, freq);
/// assert_eq!(checkpoint.value(freq), 0.5);
/// ```
#[derive(Debug, Default)]
pub struct State {
    id: StateId,
    config: StateConfig,
    parameters: Vec<Box<dyn Parameter>>,
    trees: Vec<Box<dyn Tree>>,
    parameter_lookup: HashMap<String, usize>,
    tree_lookup: HashMap<String, usize>,
}

impl State {
    /// Creates an empty state with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty state.
    #[must_use]
    pub fn with_config(config: StateConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Builds a state from ordered inputs and assigns run-indices.
    ///
    /// Each parameter's run-index is re-derived by looking its name up in
    /// the finished sequence rather than taken from its input position.
    /// A name that cannot be resolved is a fatal wiring error.
    pub fn initialize(
        parameters: Vec<Box<dyn Parameter>>,
        trees: Vec<Box<dyn Tree>>,
        config: StateConfig,
    ) -> StateResult<Self> {
        config.validate()?;
        let mut state = Self::with_config(config);
        for parameter in parameters {
            state.add_parameter(parameter)?;
        }
        for tree in trees {
            state.add_tree(tree)?;
        }

        for i in 0..state.parameters.len() {
            let Some(index) = state.parameter_index(state.parameters[i].name()) else {
                let name = state.parameters[i].name().to_string();
                error!(state = %state.id, parameter = %name, "parameter name did not resolve");
                return Err(ConfigError::UnresolvedParameter { name }.into());
            };
            state.parameters[i].set_run_index(Some(index));
        }

        debug!(
            state = %state.id,
            parameters = state.parameters.len(),
            trees = state.trees.len(),
            "state initialized"
        );
        Ok(state)
    }

    /// Identity of this instance; copies get a fresh one.
    #[must_use]
    pub const fn id(&self) -> StateId {
        self.id
    }

    /// Configuration the state was built with.
    #[must_use]
    pub const fn config(&self) -> &StateConfig {
        &self.config
    }

    /// Appends a parameter and returns its position.
    ///
    /// Existing positions are unchanged and the new parameter's run-index
    /// is left as it was.
    pub fn add_parameter(&mut self, parameter: Box<dyn Parameter>) -> StateResult<usize> {
        let position = self.parameters.len();
        register(
            &mut self.parameter_lookup,
            self.config.duplicate_names,
            "parameter",
            parameter.name(),
            position,
        )?;
        self.parameters.push(parameter);
        Ok(position)
    }

    /// Appends a tree and returns its position.
    pub fn add_tree(&mut self, tree: Box<dyn Tree>) -> StateResult<usize> {
        let position = self.trees.len();
        register(
            &mut self.tree_lookup,
            self.config.duplicate_names,
            "tree",
            tree.name(),
            position,
        )?;
        self.trees.push(tree);
        Ok(position)
    }

    /// Position of the first parameter with this name.
    #[must_use]
    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameter_lookup.get(name).copied()
    }

    /// Position of the first tree with this name.
    #[must_use]
    pub fn tree_index(&self, name: &str) -> Option<usize> {
        self.tree_lookup.get(name).copied()
    }

    /// Number of parameters.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.parameters.len()
    }

    /// Number of trees.
    #[must_use]
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    /// Parameter at `index`.
    #[must_use]
    pub fn parameter(&self, index: usize) -> &dyn Parameter {
        &*self.parameters[index]
    }

    /// Mutable parameter at `index`. Changes made here are not marked.
    pub fn parameter_mut(&mut self, index: usize) -> &mut dyn Parameter {
        &mut *self.parameters[index]
    }

    /// First parameter registered under `name`.
    #[must_use]
    pub fn parameter_by_name(&self, name: &str) -> Option<&dyn Parameter> {
        self.parameter_index(name).map(|i| self.parameter(i))
    }

    /// Mutable form of [`parameter_by_name`](State::parameter_by_name).
    pub fn parameter_by_name_mut(&mut self, name: &str) -> Option<&mut dyn Parameter> {
        let index = self.parameter_index(name)?;
        Some(self.parameter_mut(index))
    }

    /// Tree at `index`.
    #[must_use]
    pub fn tree(&self, index: usize) -> &dyn Tree {
        &*self.trees[index]
    }

    /// Mutable tree at `index`.
    pub fn tree_mut(&mut self, index: usize) -> &mut dyn Tree {
        &mut *self.trees[index]
    }

    /// First tree registered under `name`.
    #[must_use]
    pub fn tree_by_name(&self, name: &str) -> Option<&dyn Tree> {
        self.tree_index(name).map(|i| self.tree(i))
    }

    /// Mutable form of [`tree_by_name`](State::tree_by_name).
    pub fn tree_by_name_mut(&mut self, name: &str) -> Option<&mut dyn Tree> {
        let index = self.tree_index(name)?;
        Some(self.tree_mut(index))
    }

    /// The tree at `index` as its concrete type, if it is a `T`.
    #[must_use]
    pub fn tree_as<T: Tree + 'static>(&self, index: usize) -> Option<&T> {
        self.trees[index].as_any().downcast_ref()
    }

    /// Mutable form of [`tree_as`](State::tree_as).
    pub fn tree_as_mut<T: Tree + 'static>(&mut self, index: usize) -> Option<&mut T> {
        self.trees[index].as_any_mut().downcast_mut()
    }

    /// Parameters in position order.
    pub fn parameters(&self) -> impl Iterator<Item = &dyn Parameter> + '_ {
        self.parameters.iter().map(|p| &**p)
    }

    /// Trees in position order.
    pub fn trees(&self) -> impl Iterator<Item = &dyn Tree> + '_ {
        self.trees.iter().map(|t| &**t)
    }

    /// First component of the parameter at `index`.
    #[must_use]
    pub fn value(&self, index: usize) -> f64 {
        self.parameters[index].value()
    }

    /// Component `dim` of the parameter at `index`.
    #[must_use]
    pub fn value_at(&self, index: usize, dim: usize) -> f64 {
        self.parameters[index].value_at(dim)
    }

    /// Current marker of the parameter at `index`. Reading never changes it.
    #[must_use]
    pub fn dirtiness(&self, index: usize) -> Dirtiness {
        self.parameters[index].dirtiness()
    }

    /// First component of `parameter`, resolved through its run-index.
    ///
    /// Returns `None` when the parameter has no run-index.
    #[must_use]
    pub fn value_of(&self, parameter: &dyn Parameter) -> Option<f64> {
        parameter.run_index().map(|i| self.value(i))
    }

    /// Marker of `parameter`, resolved through its run-index.
    #[must_use]
    pub fn dirtiness_of(&self, parameter: &dyn Parameter) -> Option<Dirtiness> {
        parameter.run_index().map(|i| self.dirtiness(i))
    }

    /// Multiplies the first component of the parameter at `index`.
    pub fn mul_value(&mut self, factor: f64, index: usize) {
        Self::mul_value_at(&mut *self.parameters[index], 0, factor);
    }

    /// Multiplies one component of a parameter the caller already holds.
    pub fn mul_value_at(parameter: &mut dyn Parameter, dim: usize, factor: f64) {
        parameter.scale_at(dim, factor);
        mark_changed(parameter);
    }

    /// Multiplies every component of a parameter the caller already holds.
    pub fn mul_values(parameter: &mut dyn Parameter, factor: f64) {
        parameter.scale_all(factor);
        mark_changed(parameter);
    }

    /// Sets `flag` on every parameter and every tree.
    ///
    /// This overwrites: `make_dirty(Dirtiness::Clean)` also clears gored
    /// components.
    pub fn make_dirty(&mut self, flag: Dirtiness) {
        for parameter in &mut self.parameters {
            parameter.set_dirtiness(flag);
        }
        for tree in &mut self.trees {
            tree.make_dirty(flag);
        }
        debug!(state = %self.id, %flag, "all components marked");
    }

    /// Positions of parameters that are not clean.
    #[must_use]
    pub fn dirty_parameters(&self) -> Vec<usize> {
        self.parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.dirtiness().is_clean())
            .map(|(i, _)| i)
            .collect()
    }

    /// Positions of trees that are not clean.
    #[must_use]
    pub fn dirty_trees(&self) -> Vec<usize> {
        self.trees
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.dirtiness().is_clean())
            .map(|(i, _)| i)
            .collect()
    }

    /// True when any parameter or tree is not clean.
    #[must_use]
    pub fn is_any_dirty(&self) -> bool {
        self.parameters.iter().any(|p| !p.dirtiness().is_clean())
            || self.trees.iter().any(|t| !t.dirtiness().is_clean())
    }

    /// Deep copy for checkpointing.
    ///
    /// Every parameter and tree is copied through its own `copy_boxed`; the
    /// first failure aborts the whole copy. The copy gets a new [`StateId`].
    pub fn copy(&self) -> StateResult<Self> {
        let parameters = self
            .parameters
            .iter()
            .map(|p| p.copy_boxed())
            .collect::<StateResult<Vec<_>>>()?;
        let trees = self
            .trees
            .iter()
            .map(|t| t.copy_boxed())
            .collect::<StateResult<Vec<_>>>()?;

        let copy = Self {
            id: StateId::new(),
            config: self.config,
            parameters,
            trees,
            parameter_lookup: self.parameter_lookup.clone(),
            tree_lookup: self.tree_lookup.clone(),
        };
        if self.config.validate_on_copy {
            copy.validate()?;
        }

        debug!(source = %self.id, copy = %copy.id, "state copied");
        Ok(copy)
    }

    /// Runs every tree's structural validation. Diagnostic only.
    pub fn validate(&self) -> StateResult<()> {
        for tree in &self.trees {
            tree.validate()?;
        }
        Ok(())
    }

    /// Runs every parameter's prepare hook before a run starts.
    pub fn prepare(&mut self) -> StateResult<()> {
        for parameter in &mut self.parameters {
            parameter.prepare()?;
        }
        Ok(())
    }

    /// Like the `Display` output, with each tree followed by its Newick
    /// form using `labels` for leaf names.
    #[must_use]
    pub fn render_with_labels(&self, labels: &[String]) -> String {
        Rendering {
            state: self,
            labels: Some(labels),
        }
        .to_string()
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(
            &Rendering {
                state: self,
                labels: None,
            },
            f,
        )
    }
}

/// Text dump of a state, with Newick lines when labels are given.
struct Rendering<'a> {
    state: &'a State,
    labels: Option<&'a [String]>,
}

impl fmt::Display for Rendering<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tree in &self.state.trees {
            writeln!(f, "{}", tree.render_root())?;
            if let Some(labels) = self.labels {
                writeln!(f, "{}", tree.to_newick(labels))?;
            }
        }
        for parameter in &self.state.parameters {
            writeln!(f, "{parameter}")?;
        }
        Ok(())
    }
}

fn mark_changed(parameter: &mut dyn Parameter) {
    let flag = parameter.dirtiness().escalate(Dirtiness::Dirty);
    parameter.set_dirtiness(flag);
}

fn register(
    lookup: &mut HashMap<String, usize>,
    policy: DuplicateNamePolicy,
    kind: &'static str,
    name: &str,
    position: usize,
) -> StateResult<()> {
    if let Some(&first) = lookup.get(name) {
        match policy {
            DuplicateNamePolicy::Reject => {
                error!(kind, component = name, "duplicate name rejected");
                return Err(ConfigError::DuplicateName {
                    kind,
                    name: name.to_string(),
                }
                .into());
            }
            DuplicateNamePolicy::FirstMatch => {
                warn!(
                    kind,
                    component = name,
                    first,
                    position,
                    "duplicate name; lookups resolve to the first"
                );
                return Ok(());
            }
        }
    }
    lookup.insert(name.to_string(), position);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::RealParameter;
    use crate::tree::PhyloTree;

    const EPS: f64 = 1e-12;

    fn rate_and_freq() -> State {
        State::initialize(
            vec![
                Box::new(RealParameter::scalar("rate", 1.0)),
                Box::new(RealParameter::scalar("freq", 0.25)),
            ],
            Vec::new(),
            StateConfig::default(),
        )
        .unwrap()
    }

    fn cherry(name: &str) -> Box<dyn Tree> {
        Box::new(PhyloTree::from_parents(name, vec![Some(2), Some(2), None], vec![0.0, 0.0, 1.0]).unwrap())
    }

    #[test]
    fn test_add_parameter_returns_position_and_keeps_identity() {
        let mut state = State::new();
        let first = Box::new(RealParameter::scalar("a", 1.0));
        let first_ptr: *const RealParameter = &*first;
        assert_eq!(state.add_parameter(first).unwrap(), 0);
        assert_eq!(state.add_parameter(Box::new(RealParameter::scalar("b", 2.0))).unwrap(), 1);

        assert_eq!(state.parameter_index("a"), Some(0));
        assert_eq!(state.parameter_index("b"), Some(1));
        let stored = state.parameter(0) as *const dyn Parameter as *const RealParameter;
        assert!(std::ptr::eq(stored, first_ptr));
        assert_eq!(state.parameter(1).run_index(), None);
    }

    #[test]
    fn test_lookup_miss_is_none() {
        let state = rate_and_freq();
        assert_eq!(state.parameter_index("nonexistent"), None);
        assert_eq!(state.tree_index("nonexistent"), None);
        assert!(state.parameter_by_name("nonexistent").is_none());
    }

    #[test]
    #[should_panic]
    fn test_out_of_range_index_panics() {
        let state = rate_and_freq();
        let _ = state.value(2);
    }

    #[test]
    fn test_initialize_assigns_run_indices_by_name() {
        let state = rate_and_freq();
        assert_eq!(state.parameter(0).run_index(), Some(0));
        assert_eq!(state.parameter(1).run_index(), Some(1));
    }

    #[test]
    fn test_initialize_duplicate_gets_first_index() {
        let state = State::initialize(
            vec![
                Box::new(RealParameter::scalar("rate", 1.0)),
                Box::new(RealParameter::scalar("rate", 2.0)),
            ],
            Vec::new(),
            StateConfig::default(),
        )
        .unwrap();
        assert_eq!(state.parameter_count(), 2);
        assert_eq!(state.parameter(1).run_index(), Some(0));
        assert_eq!(state.parameter_by_name("rate").unwrap().value(), 1.0);
    }

    #[test]
    fn test_reject_policy_refuses_duplicates() {
        let config = StateConfig {
            duplicate_names: DuplicateNamePolicy::Reject,
            ..StateConfig::default()
        };
        let mut state = State::with_config(config);
        state.add_tree(cherry("t")).unwrap();
        let err = state.add_tree(cherry("t")).unwrap_err();
        assert!(err.is_config());
        assert_eq!(state.tree_count(), 1);
    }

    #[test]
    fn test_mul_value_marks_dirty() {
        let mut state = rate_and_freq();
        state.mul_value(2.0, 1);
        assert!((state.value(1) - 0.5).abs() < EPS);
        assert_eq!(state.dirtiness(1), Dirtiness::Dirty);
        assert_eq!(state.dirtiness(0), Dirtiness::Clean);
        assert_eq!(state.dirty_parameters(), vec![1]);
    }

    #[test]
    fn test_mul_value_keeps_gored() {
        let mut state = rate_and_freq();
        state.parameter_mut(0).set_dirtiness(Dirtiness::Gored);
        state.mul_value(3.0, 0);
        assert_eq!(state.dirtiness(0), Dirtiness::Gored);
        assert!((state.value(0) - 3.0).abs() < EPS);
    }

    #[test]
    fn test_mul_values_on_held_parameter() {
        let mut p = RealParameter::new("freqs", vec![0.1, 0.2, 0.7]);
        State::mul_values(&mut p, 0.5);
        assert_eq!(p.values(), &[0.05, 0.1, 0.35]);
        assert_eq!(p.dirtiness(), Dirtiness::Dirty);

        let mut q = RealParameter::new("freqs", vec![0.1, 0.2]);
        State::mul_value_at(&mut q, 1, 2.0);
        assert_eq!(q.values(), &[0.1, 0.4]);
        assert_eq!(q.dirtiness(), Dirtiness::Dirty);
    }

    #[test]
    fn test_make_dirty_overwrites_everything() {
        let mut state = rate_and_freq();
        state.add_tree(cherry("t")).unwrap();

        state.make_dirty(Dirtiness::Gored);
        assert_eq!(state.dirty_parameters(), vec![0, 1]);
        assert_eq!(state.dirty_trees(), vec![0]);

        state.make_dirty(Dirtiness::Clean);
        assert!(!state.is_any_dirty());
        assert_eq!(state.dirtiness(0), Dirtiness::Clean);
        assert_eq!(state.tree(0).dirtiness(), Dirtiness::Clean);
    }

    #[test]
    fn test_value_of_uses_run_index() {
        let state = rate_and_freq();
        let mut outsider = RealParameter::scalar("freq", 99.0);
        assert_eq!(state.value_of(&outsider), None);
        outsider.set_run_index(Some(1));
        assert_eq!(state.value_of(&outsider), Some(0.25));
        assert_eq!(state.dirtiness_of(&outsider), Some(Dirtiness::Clean));
    }

    #[test]
    fn test_copy_gets_new_id_and_same_lookups() {
        let mut state = rate_and_freq();
        state.add_tree(cherry("t")).unwrap();
        let copy = state.copy().unwrap();
        assert_ne!(copy.id(), state.id());
        assert_eq!(copy.parameter_index("freq"), Some(1));
        assert_eq!(copy.tree_index("t"), Some(0));
        assert_eq!(copy.to_string(), state.to_string());
    }

    #[test]
    fn test_tree_as_downcasts() {
        let mut state = State::new();
        state.add_tree(cherry("t")).unwrap();
        assert_eq!(state.tree_as::<PhyloTree>(0).unwrap().leaf_count(), 2);

        state.tree_as_mut::<PhyloTree>(0).unwrap().set_node_height(2, 2.0);
        assert_eq!(state.dirty_trees(), vec![0]);
    }

    #[test]
    fn test_prepare_propagates_failure() {
        let mut state = rate_and_freq();
        state.prepare().unwrap();
        state
            .add_parameter(Box::new(RealParameter::new("empty", Vec::new())))
            .unwrap();
        assert!(state.prepare().unwrap_err().is_validation());
    }

    #[test]
    fn test_display_lists_trees_then_parameters() {
        let mut state = rate_and_freq();
        state.add_tree(cherry("t")).unwrap();
        assert_eq!(
            state.to_string(),
            "(0[0],1[0])2[1]\nrate[clean]: 1\nfreq[clean]: 0.25\n"
        );

        let labels = vec!["A".to_string(), "B".to_string()];
        assert_eq!(
            state.render_with_labels(&labels),
            "(0[0],1[0])2[1]\n(A:1,B:1);\nrate[clean]: 1\nfreq[clean]: 0.25\n"
        );
    }

    #[test]
    fn test_render_with_labels_matches_display_without_trees() {
        let state = rate_and_freq();
        assert_eq!(state.render_with_labels(&[]), state.to_string());
        assert_eq!(state.render_with_labels(&[]).lines().count(), 2);
    }

    #[test]
    fn test_id_is_read_only_and_stable() {
        let mut state = rate_and_freq();
        let id = state.id();
        state.mul_value(2.0, 0);
        state.make_dirty(Dirtiness::Clean);
        assert_eq!(state.id(), id);
        assert_eq!(state.id().to_string().len(), 36);
    }
}
