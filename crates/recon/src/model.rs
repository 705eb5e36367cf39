use serde::{Deserialize, Serialize};

/// Opaque token naming one logical record (usually a UUID).
pub type Identifier = String;

// ---------------------------------------------------------------------------
// Store side
// ---------------------------------------------------------------------------

/// Which of the two compared stores an operation ran against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreSide {
    A,
    B,
}

impl Default for StoreSide {
    fn default() -> Self {
        Self::B
    }
}

impl std::fmt::Display for StoreSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "a"),
            Self::B => write!(f, "b"),
        }
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Both object counts for one identifier. Only ever built when both counts
/// succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comparison {
    pub identifier: Identifier,
    pub count_a: u64,
    pub count_b: u64,
}

impl Comparison {
    /// Signed `count_a - count_b`.
    pub fn difference(&self) -> i64 {
        let a = i64::try_from(self.count_a).unwrap_or(i64::MAX);
        let b = i64::try_from(self.count_b).unwrap_or(i64::MAX);
        a.saturating_sub(b)
    }
}
