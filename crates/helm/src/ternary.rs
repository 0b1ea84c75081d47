//! Three-valued decision signal used throughout the routing layer.
//!
//! Complexity assessment, decision-tree branch conditions, and circuit
//! health all collapse to one of three values: low/left (−1), neutral/center
//! (0), or high/right (+1).

use serde::{Deserialize, Serialize};

/// A strictly three-valued signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ternary {
    /// −1 — low complexity / left branch / failing circuit.
    Minus,
    /// 0 — neutral / center branch / degraded circuit.
    Zero,
    /// +1 — high complexity / right branch / healthy circuit.
    Plus,
}

impl Ternary {
    /// Numeric form, for averaging and serde-adjacent arithmetic.
    pub fn as_i8(self) -> i8 {
        match self {
            Self::Minus => -1,
            Self::Zero => 0,
            Self::Plus => 1,
        }
    }

    /// Whether this is the center (0) value.
    pub fn is_center(self) -> bool {
        self == Self::Zero
    }
}

impl std::fmt::Display for Ternary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i8())
    }
}
