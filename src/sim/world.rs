//! Physics world
//!
//! Owns every body and static boundary, advances them with a fixed
//! timestep, and logs raw contacts. It never interprets a contact: that is
//! the job of contact resolution, which runs after the step has finished.

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::body::{Body, BodyId, BodyKind};
use super::collision::{bounce_velocity, circle_circle_collision, circle_segment_collision};
use crate::error::EngineError;
use crate::tuning::Tuning;

/// Fraction of overlap removed per solver pass
const POSITION_CORRECTION: f32 = 0.8;
/// Speeds below this are snapped to zero to let stacks settle
const REST_SPEED: f32 = 0.5;

/// Boundary identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BoundaryId(pub u32);

/// What a boundary represents in the play-field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryTag {
    Floor,
    Wall,
}

/// A static, immovable line segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Boundary {
    pub id: BoundaryId,
    pub a: Vec2,
    pub b: Vec2,
    pub tag: Option<BoundaryTag>,
}

/// One side of a raw contact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Contactant {
    Body(BodyId),
    Boundary(BoundaryId, Option<BoundaryTag>),
}

impl Contactant {
    pub fn body(&self) -> Option<BodyId> {
        match self {
            Contactant::Body(id) => Some(*id),
            Contactant::Boundary(..) => None,
        }
    }
}

/// A contact observed during a solver pass. The same touch is usually
/// reported once per substep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawContact {
    pub a: Contactant,
    pub b: Contactant,
    pub point: Vec2,
}

impl RawContact {
    pub fn bodies(a: BodyId, b: BodyId, point: Vec2) -> Self {
        Self {
            a: Contactant::Body(a),
            b: Contactant::Body(b),
            point,
        }
    }
}

/// Integrator and solver parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicsParams {
    pub gravity: Vec2,
    pub restitution: f32,
    pub friction: f32,
    pub linear_damping: f32,
    pub max_speed: f32,
    pub substeps: u32,
}

impl PhysicsParams {
    pub fn from_tuning(tuning: &Tuning) -> Self {
        Self {
            gravity: Vec2::new(0.0, tuning.gravity),
            restitution: tuning.restitution,
            friction: tuning.friction,
            linear_damping: tuning.linear_damping,
            max_speed: tuning.max_speed,
            substeps: tuning.solver_substeps.max(1),
        }
    }
}

/// Rigid-body world of circles and segments
#[derive(Debug, Clone)]
pub struct PhysicsWorld {
    /// Bodies in id order (iteration order is part of determinism)
    bodies: BTreeMap<BodyId, Body>,
    boundaries: Vec<Boundary>,
    params: PhysicsParams,
    /// Multiplier on gravity (perturbed by the disturbance ability)
    gravity_scale: f32,
    /// Contacts logged by the most recent `step`
    contacts: Vec<RawContact>,
    next_body_id: u32,
    next_boundary_id: u32,
}

impl PhysicsWorld {
    pub fn new(params: PhysicsParams) -> Self {
        Self {
            bodies: BTreeMap::new(),
            boundaries: Vec::new(),
            params,
            gravity_scale: 1.0,
            contacts: Vec::new(),
            next_body_id: 1,
            next_boundary_id: 1,
        }
    }

    pub fn params(&self) -> &PhysicsParams {
        &self.params
    }

    /// Allocate a new circular body and return its id
    pub fn create_body(
        &mut self,
        pos: Vec2,
        radius: f32,
        level: u8,
        kind: BodyKind,
        spawn_tick: u64,
    ) -> Result<BodyId, EngineError> {
        if !pos.is_finite() {
            return Err(EngineError::InvalidGeometry("body position is not finite"));
        }
        if !(radius.is_finite() && radius > 0.0) {
            return Err(EngineError::InvalidGeometry("body radius must be positive"));
        }
        let id = BodyId(self.next_body_id);
        self.next_body_id += 1;
        self.bodies
            .insert(id, Body::new(id, pos, radius, level, kind, spawn_tick));
        Ok(id)
    }

    /// Remove a body. Removing an absent id is a no-op.
    pub fn remove_body(&mut self, id: BodyId) -> Option<Body> {
        self.bodies.remove(&id)
    }

    /// Add a static segment (walls, floor)
    pub fn create_boundary(
        &mut self,
        a: Vec2,
        b: Vec2,
        tag: Option<BoundaryTag>,
    ) -> Result<BoundaryId, EngineError> {
        if !a.is_finite() || !b.is_finite() {
            return Err(EngineError::InvalidGeometry("boundary endpoints are not finite"));
        }
        let id = BoundaryId(self.next_boundary_id);
        self.next_boundary_id += 1;
        self.boundaries.push(Boundary { id, a, b, tag });
        Ok(id)
    }

    pub fn body(&self, id: BodyId) -> Option<&Body> {
        self.bodies.get(&id)
    }

    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut Body> {
        self.bodies.get_mut(&id)
    }

    pub fn contains(&self, id: BodyId) -> bool {
        self.bodies.contains_key(&id)
    }

    /// Bodies in id order
    pub fn bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.values()
    }

    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }

    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }

    /// Contacts logged by the last step
    pub fn contacts(&self) -> &[RawContact] {
        &self.contacts
    }

    pub fn gravity_scale(&self) -> f32 {
        self.gravity_scale
    }

    pub fn set_gravity_scale(&mut self, scale: f32) {
        self.gravity_scale = scale;
    }

    /// Apply an instantaneous velocity change; held bodies ignore it
    pub fn apply_impulse(&mut self, id: BodyId, impulse: Vec2) {
        if let Some(body) = self.bodies.get_mut(&id) {
            if !body.held {
                body.vel += impulse;
            }
        }
    }

    /// Place a body (dispenser moves, launches)
    pub fn set_transform(&mut self, id: BodyId, pos: Vec2, vel: Vec2) -> Result<(), EngineError> {
        if !pos.is_finite() || !vel.is_finite() {
            return Err(EngineError::InvalidGeometry("transform is not finite"));
        }
        let body = self
            .bodies
            .get_mut(&id)
            .ok_or(EngineError::StaleReference(id))?;
        body.pos = pos;
        body.vel = vel;
        Ok(())
    }

    /// First body with a non-finite position or velocity, if any
    pub fn find_corrupt_body(&self) -> Option<BodyId> {
        self.bodies.values().find(|b| !b.is_finite()).map(|b| b.id)
    }

    /// Advance the world by one fixed timestep
    pub fn step(&mut self, dt: f32) {
        self.contacts.clear();

        let substeps = self.params.substeps.max(1);
        let h = dt / substeps as f32;
        let ids: Vec<BodyId> = self.bodies.keys().copied().collect();

        for _ in 0..substeps {
            self.integrate(h);
            self.solve_body_pairs(&ids);
            self.solve_boundaries(&ids);
        }

        for body in self.bodies.values_mut() {
            if body.vel.length_squared() < REST_SPEED * REST_SPEED {
                body.vel = Vec2::ZERO;
            }
        }
    }

    fn integrate(&mut self, h: f32) {
        let gravity = self.params.gravity * self.gravity_scale;
        let damping = (1.0 - self.params.linear_damping * h).clamp(0.0, 1.0);
        let max_speed = self.params.max_speed;

        for body in self.bodies.values_mut() {
            if body.held {
                continue;
            }
            body.vel += gravity * h;
            body.vel *= damping;
            if body.vel.length() > max_speed {
                body.vel = body.vel.normalize_or_zero() * max_speed;
            }
            body.pos += body.vel * h;
            body.rotation += body.angular_vel * h;
            body.angular_vel *= damping;
        }
    }

    fn solve_body_pairs(&mut self, ids: &[BodyId]) {
        let restitution = self.params.restitution;
        let friction = self.params.friction;

        for (i, &id_a) in ids.iter().enumerate() {
            for &id_b in &ids[i + 1..] {
                let (Some(a), Some(b)) = (self.bodies.get(&id_a), self.bodies.get(&id_b)) else {
                    continue;
                };

                let result = circle_circle_collision(a.pos, a.radius, b.pos, b.radius);
                if !result.hit {
                    continue;
                }
                self.contacts.push(RawContact::bodies(id_a, id_b, result.point));

                // Held bodies are sensors: reported, never pushed against
                if a.held || b.held {
                    continue;
                }
                let inv_a = a.inverse_mass();
                let inv_b = b.inverse_mass();
                let inv_sum = inv_a + inv_b;
                let (ra, rb) = (a.radius, b.radius);

                // Normal points from b toward a
                let n = result.normal;
                let mut dpos_a = Vec2::ZERO;
                let mut dpos_b = Vec2::ZERO;
                if result.penetration > 0.0 {
                    let correction = n * (result.penetration * POSITION_CORRECTION / inv_sum);
                    dpos_a = correction * inv_a;
                    dpos_b = -correction * inv_b;
                }

                let rel = a.vel - b.vel;
                let vn = rel.dot(n);
                let mut dvel_a = Vec2::ZERO;
                let mut dvel_b = Vec2::ZERO;
                let mut spin = 0.0;
                if vn < 0.0 {
                    let j = -(1.0 + restitution) * vn / inv_sum;
                    let tangent_rel = rel - n * vn;
                    let jt = tangent_rel * (friction / inv_sum);
                    dvel_a = n * (j * inv_a) - jt * inv_a;
                    dvel_b = -n * (j * inv_b) + jt * inv_b;
                    spin = tangent_rel.perp_dot(n);
                }

                if let Some(a) = self.bodies.get_mut(&id_a) {
                    a.pos += dpos_a;
                    a.vel += dvel_a;
                    a.angular_vel += spin * friction / ra;
                }
                if let Some(b) = self.bodies.get_mut(&id_b) {
                    b.pos += dpos_b;
                    b.vel += dvel_b;
                    b.angular_vel += spin * friction / rb;
                }
            }
        }
    }

    fn solve_boundaries(&mut self, ids: &[BodyId]) {
        let restitution = self.params.restitution;
        let friction = self.params.friction;

        for &id in ids {
            for boundary in &self.boundaries {
                let Some(body) = self.bodies.get_mut(&id) else {
                    continue;
                };
                let result = circle_segment_collision(body.pos, body.radius, boundary.a, boundary.b);
                if !result.hit {
                    continue;
                }
                self.contacts.push(RawContact {
                    a: Contactant::Body(id),
                    b: Contactant::Boundary(boundary.id, boundary.tag),
                    point: result.point,
                });

                if body.held {
                    continue;
                }
                if result.penetration > 0.0 {
                    body.pos += result.normal * result.penetration;
                }
                body.vel = bounce_velocity(body.vel, result.normal, restitution, friction);
                // Rolling contact: spin follows the tangential speed
                let tangent = result.normal.perp();
                body.angular_vel = -body.vel.dot(tangent) / body.radius;
            }
        }
    }
}
