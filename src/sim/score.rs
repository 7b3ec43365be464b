//! Score accumulator and point curve

use serde::{Deserialize, Serialize};

use super::processor::DeletionReason;
use crate::tuning::ScoreTuning;

/// Session score. Only ever goes up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    total: u64,
}

impl Score {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add points and return the new total
    pub fn increase(&mut self, points: u64) -> u64 {
        self.total = self.total.saturating_add(points);
        self.total
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

/// Points awarded per event
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreCurve {
    tuning: ScoreTuning,
}

impl ScoreCurve {
    pub fn new(tuning: ScoreTuning) -> Self {
        Self { tuning }
    }

    /// Points for producing a body of `level` by merging
    ///
    /// `base * growth^(level - 1)`, never below the previous level's value
    /// and never zero.
    pub fn merge_points(&self, level: u8) -> u64 {
        let exp = level.max(1) as i32 - 1;
        let raw = self.tuning.merge_base as f64 * self.tuning.merge_growth.max(1.0).powi(exp);
        if raw.is_finite() && raw < u64::MAX as f64 {
            (raw.round() as u64).max(1)
        } else {
            u64::MAX
        }
    }

    /// Points for merging two bodies that are already at the top tier
    pub fn ceiling_points(&self, max_level: u8) -> u64 {
        self.tuning
            .ceiling_bonus
            .max(self.merge_points(max_level).saturating_mul(2))
    }

    /// Points for a destroyed body, by cause
    pub fn deletion_points(&self, reason: DeletionReason) -> u64 {
        match reason {
            DeletionReason::AreaKill | DeletionReason::RowKill => self.tuning.special_kill_bonus,
            DeletionReason::Merge | DeletionReason::SelfKill | DeletionReason::OutOfBounds => 0,
        }
    }
}
