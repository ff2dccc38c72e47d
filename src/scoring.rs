//! Weight policy for terminal instances and successful joins.
//!
//! Weights are plain integers so every complex weight can be recomputed
//! exactly from its children. The bonus policy is a tuned heuristic:
//! - structural joins earn `success_bonus`
//! - plain sequencing earns nothing
//! - a sequencing join across a group marker earns the marker's weight
//!   plus `group_bonus`

use crate::grammar::Operator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scoring {
    /// Bonus for any join other than plain sequencing.
    pub success_bonus: i32,
    /// Extra bonus for a sequencing join spanning a group marker.
    pub group_bonus: i32,
    /// Exponent applied to the coverage of dense terminals.
    pub dense_exponent: u32,
    /// Multiplier per verification level.
    pub verification_bonus: i32,
}

impl Default for Scoring {
    fn default() -> Self {
        Scoring {
            success_bonus: 5,
            group_bonus: 5,
            dense_exponent: 3,
            verification_bonus: 2,
        }
    }
}

impl Scoring {
    /// Weight of a freshly instantiated terminal.
    pub fn terminal_weight(&self, coverage: usize, sparse: bool, verification_level: u32) -> i32 {
        let coverage = i32::try_from(coverage).unwrap_or(i32::MAX);
        let mut weight = if sparse {
            coverage
        } else {
            coverage.saturating_pow(self.dense_exponent)
        };
        if verification_level > 0 {
            let level = i32::try_from(verification_level).unwrap_or(i32::MAX);
            weight = weight.saturating_mul(level.saturating_mul(self.verification_bonus));
        }
        weight
    }

    #[inline]
    pub fn join_bonus(&self, op: Operator) -> i32 {
        if op.is_sequencing() {
            0
        } else {
            self.success_bonus
        }
    }

    /// Bonus for a sequencing join across a marker of `marker_weight`.
    #[inline]
    pub fn group_weight(&self, marker_weight: i32) -> i32 {
        marker_weight.saturating_add(self.group_bonus)
    }
}
