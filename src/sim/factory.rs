//! Ball factory
//!
//! Creates level-tagged bodies with the right radius, and manages the held
//! preview body at the dispenser. A launch releases the preview and
//! immediately spawns the next one.

use glam::Vec2;
use rand::Rng;
use rand_pcg::Pcg32;
use serde::Serialize;

use super::body::{BodyId, BodyKind, SpecialKind};
use super::events::{GameEvent, SpawnCause};
use super::world::PhysicsWorld;
use crate::error::EngineError;
use crate::tuning::Tuning;

/// Launch request from the input layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaunchRequest {
    /// Where the body is released
    pub position: Vec2,
    /// Initial velocity
    pub velocity: Vec2,
}

impl LaunchRequest {
    /// Straight drop from the dispenser height at `x`
    pub fn drop_at(x: f32, tuning: &Tuning) -> Self {
        Self {
            position: Vec2::new(x, tuning.dispenser_height),
            velocity: Vec2::ZERO,
        }
    }
}

/// What the dispenser will release next
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Preview {
    pub id: Option<BodyId>,
    pub level: u8,
    pub kind: BodyKind,
}

#[derive(Debug, Clone)]
pub struct BallFactory {
    preview_id: Option<BodyId>,
    preview_level: u8,
    preview_kind: BodyKind,
    last_launch_tick: Option<u64>,
}

impl BallFactory {
    pub fn new(rng: &mut Pcg32, tuning: &Tuning) -> Self {
        Self {
            preview_id: None,
            preview_level: roll_level(rng, tuning),
            preview_kind: BodyKind::Normal,
            last_launch_tick: None,
        }
    }

    pub fn preview(&self) -> Preview {
        Preview {
            id: self.preview_id,
            level: self.preview_level,
            kind: self.preview_kind,
        }
    }

    /// Radius a body of this level/kind gets
    pub fn radius_for(kind: BodyKind, level: u8, tuning: &Tuning) -> f32 {
        match kind {
            BodyKind::Normal => tuning.radius_for_level(level),
            BodyKind::Special(_) => tuning.special_radius,
        }
    }

    /// Create a free body and announce it
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        world: &mut PhysicsWorld,
        tuning: &Tuning,
        pos: Vec2,
        level: u8,
        kind: BodyKind,
        now: u64,
        cause: SpawnCause,
        events: &mut Vec<GameEvent>,
    ) -> Result<BodyId, EngineError> {
        let level = level.clamp(1, tuning.max_level());
        let radius = Self::radius_for(kind, level, tuning);
        let id = world.create_body(pos, radius, level, kind, now)?;
        events.push(GameEvent::BodyCreated {
            id,
            level,
            kind,
            position: pos,
            cause,
        });
        Ok(id)
    }

    /// Make sure a held preview body exists at the dispenser
    pub fn spawn_preview(
        &mut self,
        world: &mut PhysicsWorld,
        tuning: &Tuning,
        now: u64,
        events: &mut Vec<GameEvent>,
    ) -> Result<BodyId, EngineError> {
        if let Some(id) = self.preview_id.filter(|id| world.contains(*id)) {
            return Ok(id);
        }
        let pos = Vec2::new(tuning.field_width / 2.0, tuning.dispenser_height);
        let id = self.create(
            world,
            tuning,
            pos,
            self.preview_level,
            self.preview_kind,
            now,
            SpawnCause::Preview,
            events,
        )?;
        if let Some(body) = world.body_mut(id) {
            body.held = true;
        }
        self.preview_id = Some(id);
        Ok(id)
    }

    /// Replace the preview with a special token (arming) or back to normal
    pub fn set_preview_kind(
        &mut self,
        world: &mut PhysicsWorld,
        tuning: &Tuning,
        kind: BodyKind,
        now: u64,
        events: &mut Vec<GameEvent>,
    ) -> Result<BodyId, EngineError> {
        if let Some(old) = self.preview_id.take() {
            world.remove_body(old);
        }
        self.preview_kind = kind;
        self.spawn_preview(world, tuning, now, events)
    }

    /// Ticks until another launch is allowed (0 = ready)
    pub fn cooldown_remaining(&self, tuning: &Tuning, now: u64) -> u64 {
        match self.last_launch_tick {
            Some(last) => (last + tuning.launch_cooldown_ticks()).saturating_sub(now),
            None => 0,
        }
    }

    /// Release the preview body and queue up the next one
    ///
    /// Returns the launched body. Geometry is validated before anything
    /// changes, so a rejected launch leaves the world untouched.
    pub fn launch(
        &mut self,
        world: &mut PhysicsWorld,
        rng: &mut Pcg32,
        tuning: &Tuning,
        request: LaunchRequest,
        now: u64,
        events: &mut Vec<GameEvent>,
    ) -> Result<BodyId, EngineError> {
        if self.cooldown_remaining(tuning, now) > 0 {
            return Err(EngineError::LaunchCooldown);
        }
        if !request.position.is_finite() || !request.velocity.is_finite() {
            return Err(EngineError::InvalidGeometry("launch is not finite"));
        }

        let id = self.spawn_preview(world, tuning, now, events)?;
        let radius = world.body(id).map(|b| b.radius).unwrap_or(0.0);
        let pos = request.position;
        if pos.x < radius
            || pos.x > tuning.field_width - radius
            || pos.y < radius
            || pos.y > tuning.field_height
        {
            return Err(EngineError::InvalidGeometry("launch point outside the field"));
        }

        world.set_transform(id, pos, request.velocity)?;
        let (level, kind) = match world.body_mut(id) {
            Some(body) => {
                body.held = false;
                // Grace is measured from release, not from when it was queued
                body.spawn_tick = now;
                (body.level, body.kind)
            }
            None => return Err(EngineError::StaleReference(id)),
        };
        events.push(GameEvent::BodyLaunched { id, level, kind });
        log::debug!("Launched {} (level {}) at {:?}", id, level, pos);

        self.last_launch_tick = Some(now);
        self.preview_id = None;
        self.preview_kind = BodyKind::Normal;
        self.preview_level = roll_level(rng, tuning);
        self.spawn_preview(world, tuning, now, events)?;

        Ok(id)
    }
}

/// Level for the next dispensed body
fn roll_level(rng: &mut Pcg32, tuning: &Tuning) -> u8 {
    let top = tuning.max_spawn_level.clamp(1, tuning.max_level());
    rng.random_range(1..=top)
}

/// Build the special token for an ability
pub fn special_for(ability: super::ability::AbilityKind, tuning: &Tuning) -> SpecialKind {
    use super::ability::AbilityKind;
    match ability {
        AbilityKind::AreaDestroyer => SpecialKind::AreaDestroyer {
            blast_radius: tuning.abilities.blast_radius,
        },
        AbilityKind::RowClearer => SpecialKind::RowClearer {
            band_height: tuning.abilities.row_band_height,
        },
        AbilityKind::Disturbance => SpecialKind::DisturbanceSource {
            duration_ticks: tuning.disturbance_ticks(),
        },
    }
}
