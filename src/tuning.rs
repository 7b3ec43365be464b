//! Data-driven game balance
//!
//! Every gameplay constant that is a matter of feel rather than contract
//! lives here. Missing keys in a JSON document fall back to the defaults, so
//! a minimal override only names what it changes:
//!
//! ```json
//! { "gravity": -900.0, "timing": { "grace_period_ms": 250 } }
//! ```

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::EngineError;
use crate::ms_to_ticks;

/// Durations in milliseconds (converted to ticks at use)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingTuning {
    /// Post-spawn window in which a body cannot merge or accrue dwell
    pub grace_period_ms: u32,
    /// How long a resolved contact pair stays suppressed
    pub dedup_window_ms: u32,
    /// Minimum gap between two accepted merges, game-wide
    pub merge_delay_ms: u32,
    /// Minimum gap between two launches
    pub launch_cooldown_ms: u32,
    /// Time above the danger line before the run ends
    pub game_over_dwell_ms: u32,
}

impl Default for TimingTuning {
    fn default() -> Self {
        Self {
            grace_period_ms: 400,
            dedup_window_ms: 250,
            merge_delay_ms: 30,
            launch_cooldown_ms: 500,
            game_over_dwell_ms: 2000,
        }
    }
}

/// Score curve and bonuses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreTuning {
    /// Points for producing a level 1 body; scaled by `merge_growth` per level
    pub merge_base: u64,
    /// Multiplier per level (>= 1 keeps the curve monotonic)
    pub merge_growth: f64,
    /// Points per body destroyed by an ability
    pub special_kill_bonus: u64,
    /// Points for merging two top-tier bodies
    pub ceiling_bonus: u64,
}

impl Default for ScoreTuning {
    fn default() -> Self {
        Self {
            merge_base: 1,
            merge_growth: 2.0,
            special_kill_bonus: 5,
            ceiling_bonus: 5000,
        }
    }
}

/// Ability costs and effect parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityTuning {
    /// Cost as a fraction of container capacity
    pub area_cost_fraction: f32,
    pub row_cost_fraction: f32,
    pub disturbance_cost_fraction: f32,
    /// Area destroyer blast radius
    pub blast_radius: f32,
    /// Full height of the row-clear band
    pub row_band_height: f32,
    /// How long the disturbance lasts
    pub disturbance_ms: u32,
    /// Gravity multiplier while disturbed
    pub disturbance_gravity_scale: f32,
    /// Upward kick applied to every body when the disturbance starts
    pub disturbance_impulse: f32,
}

impl Default for AbilityTuning {
    fn default() -> Self {
        Self {
            area_cost_fraction: 0.3,
            row_cost_fraction: 0.25,
            disturbance_cost_fraction: 0.15,
            blast_radius: 90.0,
            row_band_height: 60.0,
            disturbance_ms: 1500,
            disturbance_gravity_scale: 0.35,
            disturbance_impulse: 320.0,
        }
    }
}

/// Largest accepted gravity magnitude
const MAX_GRAVITY: f32 = 100_000.0;

/// Complete balance sheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    // Field
    pub field_width: f32,
    pub field_height: f32,
    /// Height of the dispenser (where the preview body is held)
    pub dispenser_height: f32,
    /// Bodies whose centre stays above this line accumulate dwell
    pub danger_line: f32,
    /// How far past the walls/floor a body may be before it is culled
    pub out_of_bounds_margin: f32,

    // Physics
    /// Vertical acceleration (negative pulls toward the floor)
    pub gravity: f32,
    pub restitution: f32,
    pub friction: f32,
    pub linear_damping: f32,
    pub max_speed: f32,
    pub solver_substeps: u32,

    // Bodies
    /// Radius per level, index 0 = level 1
    pub level_radii: Vec<f32>,
    /// Highest level the dispenser can roll
    pub max_spawn_level: u8,
    /// Radius of thrown special tokens
    pub special_radius: f32,

    pub timing: TimingTuning,
    pub score: ScoreTuning,
    pub abilities: AbilityTuning,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            field_width: FIELD_WIDTH,
            field_height: FIELD_HEIGHT,
            dispenser_height: FIELD_HEIGHT - 40.0,
            danger_line: FIELD_HEIGHT - 120.0,
            out_of_bounds_margin: 60.0,

            gravity: -1200.0,
            restitution: 0.15,
            friction: 0.3,
            linear_damping: 0.4,
            max_speed: 2000.0,
            solver_substeps: 4,

            // Level 1 is deliberately smaller than the curve would give
            level_radii: vec![
                11.0, 20.0, 26.0, 32.0, 39.0, 46.0, 54.0, 62.0, 71.0, 81.0, 92.0, 104.0,
            ],
            max_spawn_level: 5,
            special_radius: 18.0,

            timing: TimingTuning::default(),
            score: ScoreTuning::default(),
            abilities: AbilityTuning::default(),
        }
    }
}

impl Tuning {
    /// Parse and validate a (possibly partial) JSON tuning document
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let tuning: Tuning =
            serde_json::from_str(json).map_err(|e| EngineError::InvalidTuning(e.to_string()))?;
        tuning.validate()?;
        Ok(tuning)
    }

    /// Serialize back to pretty JSON (for dumping the effective balance)
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Check the constraints the engine relies on
    pub fn validate(&self) -> Result<(), EngineError> {
        let bad = |msg: &str| Err(EngineError::InvalidTuning(msg.to_string()));

        if !(self.field_width > 0.0 && self.field_height > 0.0) {
            return bad("field dimensions must be positive");
        }
        if !(self.danger_line > 0.0 && self.danger_line < self.field_height) {
            return bad("danger line must lie inside the field");
        }
        if !(self.dispenser_height > 0.0 && self.dispenser_height <= self.field_height) {
            return bad("dispenser must lie inside the field");
        }
        if self.level_radii.is_empty() || self.level_radii.len() > u8::MAX as usize {
            return bad("radius table must have 1..=255 entries");
        }
        if self.level_radii.iter().any(|r| !r.is_finite() || *r <= 0.0) {
            return bad("radii must be finite and positive");
        }
        if self.level_radii.windows(2).any(|w| w[1] <= w[0]) {
            return bad("radii must strictly increase with level");
        }
        if self.max_spawn_level == 0 || self.max_spawn_level > self.max_level() {
            return bad("max spawn level must be within the radius table");
        }
        if !(self.out_of_bounds_margin.is_finite() && self.out_of_bounds_margin >= 0.0) {
            return bad("out-of-bounds margin must be finite and non-negative");
        }
        if !(self.gravity.is_finite() && self.gravity.abs() <= MAX_GRAVITY) {
            return bad("gravity must be finite and within range");
        }
        if !(0.0..=1.0).contains(&self.restitution) || !(0.0..=1.0).contains(&self.friction) {
            return bad("restitution and friction must be in [0, 1]");
        }
        if !(self.linear_damping.is_finite() && self.linear_damping >= 0.0) {
            return bad("linear damping must be finite and non-negative");
        }
        if !(self.max_speed.is_finite() && self.max_speed > 0.0) {
            return bad("max speed must be finite and positive");
        }
        if !(self.special_radius.is_finite() && self.special_radius > 0.0) {
            return bad("special radius must be finite and positive");
        }
        if self.solver_substeps == 0 {
            return bad("solver substeps must be at least 1");
        }
        if self.score.merge_base == 0 || !(self.score.merge_growth >= 1.0) {
            return bad("merge score must be non-zero and non-decreasing");
        }
        let fractions = [
            self.abilities.area_cost_fraction,
            self.abilities.row_cost_fraction,
            self.abilities.disturbance_cost_fraction,
        ];
        if fractions.iter().any(|f| !(*f > 0.0 && *f <= 1.0)) {
            return bad("ability cost fractions must be in (0, 1]");
        }
        let a = &self.abilities;
        if [a.blast_radius, a.row_band_height].iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            return bad("ability reach must be finite and positive");
        }
        if !(a.disturbance_gravity_scale.is_finite() && a.disturbance_impulse.is_finite()) {
            return bad("disturbance parameters must be finite");
        }
        Ok(())
    }

    /// Number of distinct tiers
    pub fn max_level(&self) -> u8 {
        self.level_radii.len() as u8
    }

    /// Radius for a level, clamped into the table
    pub fn radius_for_level(&self, level: u8) -> f32 {
        let idx = (level.max(1) as usize - 1).min(self.level_radii.len().saturating_sub(1));
        self.level_radii.get(idx).copied().unwrap_or(self.special_radius)
    }

    pub fn grace_ticks(&self) -> u64 {
        ms_to_ticks(self.timing.grace_period_ms)
    }

    pub fn dedup_ticks(&self) -> u64 {
        ms_to_ticks(self.timing.dedup_window_ms)
    }

    pub fn merge_delay_ticks(&self) -> u64 {
        ms_to_ticks(self.timing.merge_delay_ms)
    }

    pub fn launch_cooldown_ticks(&self) -> u64 {
        ms_to_ticks(self.timing.launch_cooldown_ms)
    }

    pub fn dwell_ticks(&self) -> u64 {
        ms_to_ticks(self.timing.game_over_dwell_ms)
    }

    pub fn disturbance_ticks(&self) -> u64 {
        ms_to_ticks(self.abilities.disturbance_ms)
    }
}
