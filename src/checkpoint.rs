//! Save / accept / reject bookkeeping around a working state.
//!
//! Rejection never undoes anything: the mutated working state is dropped
//! and the saved deep copy takes its place.

use tracing::debug;

use crate::dirty::Dirtiness;
use crate::error::{StateError, StateResult};
use crate::state::State;

/// A working state plus at most one saved copy of it.
///
/// # Examples
///
/// ```
/// use chainstate::{Checkpoint, RealParameter, State};
///
/// let mut state = State::new();
/// state.add_parameter(Box::new(RealParameter::scalar("rate", 1.0))).unwrap();
///
/// let mut chain = Checkpoint::new(state);
/// chain.save().unwrap();
/// chain.state_mut().mul_value(4.0, 0);
/// chain.reject().unwrap();
/// assert_eq!(chain.state().value(0), 1.0);
/// ```
#[derive(Debug)]
pub struct Checkpoint {
    working: State,
    saved: Option<State>,
}

impl Checkpoint {
    /// Wraps a working state with nothing saved.
    #[must_use]
    pub fn new(state: State) -> Self {
        Self {
            working: state,
            saved: None,
        }
    }

    /// The working state.
    #[must_use]
    pub const fn state(&self) -> &State {
        &self.working
    }

    /// The working state, for proposals.
    pub fn state_mut(&mut self) -> &mut State {
        &mut self.working
    }

    /// True when a saved copy is held.
    #[must_use]
    pub const fn has_saved(&self) -> bool {
        self.saved.is_some()
    }

    /// The saved copy, if any.
    #[must_use]
    pub const fn saved(&self) -> Option<&State> {
        self.saved.as_ref()
    }

    /// Deep-copies the working state and keeps the copy.
    ///
    /// On failure any previously saved copy is dropped as well, so a stale
    /// copy can never be restored by a later [`reject`](Checkpoint::reject).
    pub fn save(&mut self) -> StateResult<()> {
        self.saved = None;
        let copy = self.working.copy()?;
        debug!(working = %self.working.id(), saved = %copy.id(), "checkpoint saved");
        self.saved = Some(copy);
        Ok(())
    }

    /// Keeps the working state, drops the saved copy and marks every
    /// component clean for the next proposal.
    pub fn accept(&mut self) {
        self.saved = None;
        self.working.make_dirty(Dirtiness::Clean);
        debug!(working = %self.working.id(), "proposal accepted");
    }

    /// Replaces the working state with the saved copy.
    pub fn reject(&mut self) -> StateResult<()> {
        let saved = self.saved.take().ok_or(StateError::NoCheckpoint)?;
        debug!(discarded = %self.working.id(), restored = %saved.id(), "proposal rejected");
        self.working = saved;
        Ok(())
    }

    /// Gives up the working state, dropping any saved copy.
    #[must_use]
    pub fn into_state(self) -> State {
        self.working
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{RealParameter, StateConfig};

    fn chain() -> Checkpoint {
        let state = State::initialize(
            vec![Box::new(RealParameter::scalar("rate", 1.0))],
            Vec::new(),
            StateConfig::default(),
        )
        .unwrap();
        Checkpoint::new(state)
    }

    #[test]
    fn test_reject_without_save_fails() {
        let mut chain = chain();
        assert!(matches!(chain.reject(), Err(StateError::NoCheckpoint)));
    }

    #[test]
    fn test_reject_restores_saved_values_and_markers() {
        let mut chain = chain();
        let before = chain.state().fingerprint();
        chain.save().unwrap();

        chain.state_mut().mul_value(3.0, 0);
        assert_eq!(chain.state().dirtiness(0), Dirtiness::Dirty);

        chain.reject().unwrap();
        assert!(!chain.has_saved());
        assert_eq!(chain.state().value(0), 1.0);
        assert_eq!(chain.state().dirtiness(0), Dirtiness::Clean);
        assert_eq!(chain.state().fingerprint(), before);
    }

    #[test]
    fn test_accept_keeps_values_and_cleans() {
        let mut chain = chain();
        chain.save().unwrap();
        chain.state_mut().mul_value(3.0, 0);

        chain.accept();
        assert!(!chain.has_saved());
        assert_eq!(chain.state().value(0), 3.0);
        assert!(!chain.state().is_any_dirty());
        assert!(chain.reject().is_err());
    }

    #[test]
    fn test_saved_copy_is_isolated() {
        let mut chain = chain();
        chain.save().unwrap();
        chain.state_mut().mul_value(5.0, 0);
        assert_eq!(chain.saved().unwrap().value(0), 1.0);
        assert_eq!(chain.into_state().value(0), 5.0);
    }
}
