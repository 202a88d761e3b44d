//! Content fingerprints for states.
//!
//! Two states with equal fingerprints hold the same parameter values,
//! the same tree shapes and the same markers. The state id is not part
//! of the digest, so a copy fingerprints equal to its source.

use std::fmt;

use crate::dirty::Dirtiness;
use crate::state::State;

/// blake3 digest of a state's observable content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(blake3::Hash);

impl Fingerprint {
    /// Raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.to_hex().as_str())
    }
}

impl State {
    /// Digest over every parameter's name, values and marker and every
    /// tree's name, rendering and per-node markers.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.parameter_count() as u64).to_le_bytes());
        for parameter in self.parameters() {
            hash_str(&mut hasher, parameter.name());
            hasher.update(&(parameter.dimension() as u64).to_le_bytes());
            for dim in 0..parameter.dimension() {
                hasher.update(&parameter.value_at(dim).to_bits().to_le_bytes());
            }
            hasher.update(&[parameter.dirtiness().as_u8()]);
        }

        hasher.update(&(self.tree_count() as u64).to_le_bytes());
        for tree in self.trees() {
            hash_str(&mut hasher, tree.name());
            hash_str(&mut hasher, &tree.render_root());
            let markers = tree.node_markers();
            hasher.update(&(markers.len() as u64).to_le_bytes());
            hasher.update(&markers.iter().copied().map(Dirtiness::as_u8).collect::<Vec<_>>());
        }
        Fingerprint(hasher.finalize())
    }
}

/// Length-prefixed so that adjacent strings cannot run together.
fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}
