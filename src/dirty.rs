//! The tri-state change marker shared by parameters and trees.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// How much a component changed since it was last marked clean.
///
/// The variants are ordered `Clean < Dirty < Gored`. `Gored` marks a
/// structural change (a topology move on a tree, say) and is only
/// meaningful to downstream consumers; this crate just carries it.
///
/// # Examples
///
/// ```
/// use chainstate::Dirtiness;
///
/// assert!(Dirtiness::Clean < Dirtiness::Dirty);
/// assert_eq!(Dirtiness::Gored.escalate(Dirtiness::Dirty), Dirtiness::Gored);
/// assert_eq!(Dirtiness::try_from(1).unwrap(), Dirtiness::Dirty);
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Dirtiness {
    /// No change since the last clean.
    #[default]
    Clean = 0,
    /// Values changed; recomputation required.
    Dirty = 1,
    /// Structure changed.
    Gored = 2,
}

impl Dirtiness {
    /// Numeric code: 0, 1 or 2.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Numeric code as a single byte, for digests and compact encodings.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// True only for [`Dirtiness::Clean`].
    #[must_use]
    pub const fn is_clean(self) -> bool {
        matches!(self, Self::Clean)
    }

    /// Returns the stronger of the two markers.
    #[must_use]
    pub fn escalate(self, other: Self) -> Self {
        self.max(other)
    }

    /// Human-readable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Clean => "clean",
            Self::Dirty => "dirty",
            Self::Gored => "gored",
        }
    }
}

impl fmt::Display for Dirtiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i32> for Dirtiness {
    type Error = ValidationError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Clean),
            1 => Ok(Self::Dirty),
            2 => Ok(Self::Gored),
            _ => Err(ValidationError::UnknownDirtiness { code }),
        }
    }
}

impl From<Dirtiness> for i32 {
    fn from(d: Dirtiness) -> Self {
        d.as_i32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Dirtiness::Clean < Dirtiness::Dirty);
        assert!(Dirtiness::Dirty < Dirtiness::Gored);
        assert_eq!(Dirtiness::default(), Dirtiness::Clean);
    }

    #[test]
    fn test_escalate_never_downgrades() {
        assert_eq!(Dirtiness::Clean.escalate(Dirtiness::Dirty), Dirtiness::Dirty);
        assert_eq!(Dirtiness::Gored.escalate(Dirtiness::Dirty), Dirtiness::Gored);
        assert_eq!(Dirtiness::Dirty.escalate(Dirtiness::Clean), Dirtiness::Dirty);
    }

    #[test]
    fn test_numeric_codes() {
        assert_eq!(Dirtiness::Clean.as_i32(), 0);
        assert_eq!(Dirtiness::Gored.as_u8(), 2);
        assert_eq!(i32::from(Dirtiness::Dirty.as_u8()), Dirtiness::Dirty.as_i32());
        assert_eq!(i32::from(Dirtiness::Gored), 2);
        assert_eq!(Dirtiness::try_from(2).unwrap(), Dirtiness::Gored);
        assert_eq!(
            Dirtiness::try_from(3),
            Err(ValidationError::UnknownDirtiness { code: 3 })
        );
        assert!(Dirtiness::try_from(-1).is_err());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&Dirtiness::Gored).unwrap();
        assert_eq!(json, "\"gored\"");
        let back: Dirtiness = serde_json::from_str("\"dirty\"").unwrap();
        assert_eq!(back, Dirtiness::Dirty);
    }

    #[test]
    fn test_display() {
        assert_eq!(Dirtiness::Clean.to_string(), "clean");
    }
}
