//! Body types
//!
//! A body is a circular token with a tier ("level"). Position and velocity
//! are owned by the physics world; everything else refers to bodies by id.

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Stable body identifier (monotonic, never reused within a run)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BodyId(pub u32);

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Special token payloads
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpecialKind {
    /// Destroys everything within `blast_radius` of the impact point
    AreaDestroyer { blast_radius: f32 },
    /// Destroys everything in a horizontal band of `band_height`
    RowClearer { band_height: f32 },
    /// Shakes the whole field for `duration_ticks`
    DisturbanceSource { duration_ticks: u64 },
}

impl SpecialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpecialKind::AreaDestroyer { .. } => "area_destroyer",
            SpecialKind::RowClearer { .. } => "row_clearer",
            SpecialKind::DisturbanceSource { .. } => "disturbance_source",
        }
    }
}

/// Normal tokens merge; special tokens trigger an effect on contact
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BodyKind {
    #[default]
    Normal,
    Special(SpecialKind),
}

impl BodyKind {
    pub fn is_normal(&self) -> bool {
        matches!(self, BodyKind::Normal)
    }

    pub fn special(&self) -> Option<SpecialKind> {
        match self {
            BodyKind::Special(s) => Some(*s),
            BodyKind::Normal => None,
        }
    }
}

/// A simulated token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Body {
    pub id: BodyId,
    pub level: u8,
    pub radius: f32,
    pub kind: BodyKind,
    pub pos: Vec2,
    pub vel: Vec2,
    /// Rotation in radians (visual only)
    pub rotation: f32,
    pub angular_vel: f32,
    /// Tick at which the body entered the world
    pub spawn_tick: u64,
    /// Held at the dispenser: not integrated, immovable, never merges
    pub held: bool,
    /// Queued for removal; ignored by contact resolution from now on
    pub marked_for_deletion: bool,
}

impl Body {
    pub fn new(id: BodyId, pos: Vec2, radius: f32, level: u8, kind: BodyKind, spawn_tick: u64) -> Self {
        Self {
            id,
            level,
            radius,
            kind,
            pos,
            vel: Vec2::ZERO,
            rotation: 0.0,
            angular_vel: 0.0,
            spawn_tick,
            held: false,
            marked_for_deletion: false,
        }
    }

    /// Still inside the post-spawn grace window at `now`
    #[inline]
    pub fn in_grace(&self, now: u64, grace_ticks: u64) -> bool {
        now.saturating_sub(self.spawn_tick) < grace_ticks
    }

    /// Inverse mass (mass grows with area); held bodies are immovable
    #[inline]
    pub fn inverse_mass(&self) -> f32 {
        if self.held {
            0.0
        } else {
            1.0 / (self.radius * self.radius)
        }
    }

    /// Can take part in gameplay (merges, triggers, targeting, dwell)
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.held && !self.marked_for_deletion
    }

    pub fn is_finite(&self) -> bool {
        self.pos.is_finite() && self.vel.is_finite() && self.rotation.is_finite()
    }

    pub fn snapshot(&self) -> BodySnapshot {
        BodySnapshot {
            id: self.id,
            position: self.pos,
            rotation: self.rotation,
            radius: self.radius,
            level: self.level,
            kind: self.kind,
            held: self.held,
        }
    }
}

/// What the renderer needs to draw a body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodySnapshot {
    pub id: BodyId,
    pub position: Vec2,
    pub rotation: f32,
    pub radius: f32,
    pub level: u8,
    pub kind: BodyKind,
    pub held: bool,
}
