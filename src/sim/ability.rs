//! Player abilities
//!
//! Each ability cycles `available -> armed -> consumed -> available`. Costs
//! are a fraction of the container capacity, which belongs to the
//! progression layer and is only queried here. Destructive effects never
//! remove bodies directly: they mark targets and queue deletions for the
//! processor.

use std::collections::BTreeMap;

use glam::Vec2;
use rand::Rng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::body::{BodyId, SpecialKind};
use super::processor::{DeletionReason, WorkQueues};
use super::world::PhysicsWorld;
use crate::error::EngineError;
use crate::tuning::Tuning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityKind {
    AreaDestroyer,
    RowClearer,
    Disturbance,
}

impl AbilityKind {
    pub const ALL: [AbilityKind; 3] = [
        AbilityKind::AreaDestroyer,
        AbilityKind::RowClearer,
        AbilityKind::Disturbance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AbilityKind::AreaDestroyer => "area_destroyer",
            AbilityKind::RowClearer => "row_clearer",
            AbilityKind::Disturbance => "disturbance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "area_destroyer" | "area" | "bomb" => Some(AbilityKind::AreaDestroyer),
            "row_clearer" | "row" => Some(AbilityKind::RowClearer),
            "disturbance" | "shake" => Some(AbilityKind::Disturbance),
            _ => None,
        }
    }

    /// Ability a thrown token belongs to
    pub fn from_special(special: &SpecialKind) -> Self {
        match special {
            SpecialKind::AreaDestroyer { .. } => AbilityKind::AreaDestroyer,
            SpecialKind::RowClearer { .. } => AbilityKind::RowClearer,
            SpecialKind::DisturbanceSource { .. } => AbilityKind::Disturbance,
        }
    }

    /// Cost as a fraction of container capacity
    pub fn cost_fraction(&self, tuning: &Tuning) -> f32 {
        match self {
            AbilityKind::AreaDestroyer => tuning.abilities.area_cost_fraction,
            AbilityKind::RowClearer => tuning.abilities.row_cost_fraction,
            AbilityKind::Disturbance => tuning.abilities.disturbance_cost_fraction,
        }
    }

    /// Whether a direct activation needs a target point
    pub fn needs_target(&self) -> bool {
        !matches!(self, AbilityKind::Disturbance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityState {
    #[default]
    Available,
    /// Selected; the next launch throws its token
    Armed,
    /// Effect in progress
    Consumed,
}

/// Progression layer: owns the resource the abilities spend
pub trait ResourceProvider {
    /// Current container capacity (cost basis)
    fn container_capacity(&self) -> f32;
    /// Resource the player can spend right now
    fn available(&self) -> f32;
    fn spend(&mut self, amount: f32);
}

/// Plain in-memory resource pool
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourcePool {
    pub capacity: f32,
    pub available: f32,
}

impl ResourcePool {
    pub fn new(capacity: f32, available: f32) -> Self {
        Self {
            capacity,
            available,
        }
    }

    /// Full pool
    pub fn full(capacity: f32) -> Self {
        Self::new(capacity, capacity)
    }
}

impl ResourceProvider for ResourcePool {
    fn container_capacity(&self) -> f32 {
        self.capacity
    }

    fn available(&self) -> f32 {
        self.available
    }

    fn spend(&mut self, amount: f32) {
        self.available = (self.available - amount).max(0.0);
    }
}

/// What keeps a consumed ability busy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    /// Finishes at the end of the current tick
    Immediate,
    /// Thrown token still in the world
    Token(BodyId),
    /// Countdown ends at this tick
    Until(u64),
}

/// Result of a successful activation
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AbilityOutcome {
    pub ability: AbilityKind,
    pub cost: f32,
    pub targets: usize,
}

/// Per-ability state machines plus the running disturbance
#[derive(Debug, Clone, Default)]
pub struct Abilities {
    states: BTreeMap<AbilityKind, AbilityState>,
    pending: BTreeMap<AbilityKind, Pending>,
    /// Tick at which normal gravity is restored
    disturbance_until: Option<u64>,
}

impl Abilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, kind: AbilityKind) -> AbilityState {
        self.states.get(&kind).copied().unwrap_or_default()
    }

    pub fn armed(&self) -> Option<AbilityKind> {
        AbilityKind::ALL
            .into_iter()
            .find(|k| self.state(*k) == AbilityState::Armed)
    }

    pub fn disturbance_active(&self) -> bool {
        self.disturbance_until.is_some()
    }

    /// Price of an ability right now
    pub fn cost(kind: AbilityKind, tuning: &Tuning, provider: &dyn ResourceProvider) -> f32 {
        kind.cost_fraction(tuning) * provider.container_capacity().max(0.0)
    }

    /// Reject if the player cannot pay
    pub fn check_affordable(
        kind: AbilityKind,
        tuning: &Tuning,
        provider: &dyn ResourceProvider,
    ) -> Result<f32, EngineError> {
        let cost = Self::cost(kind, tuning, provider);
        let available = provider.available();
        if cost > available {
            return Err(EngineError::InsufficientResources { cost, available });
        }
        Ok(cost)
    }

    /// `available -> armed` (only one ability can be armed at a time)
    pub fn arm(
        &mut self,
        kind: AbilityKind,
        tuning: &Tuning,
        provider: &dyn ResourceProvider,
    ) -> Result<(), EngineError> {
        if self.state(kind) != AbilityState::Available || self.armed().is_some() {
            return Err(EngineError::AbilityUnavailable(kind));
        }
        Self::check_affordable(kind, tuning, provider)?;
        self.states.insert(kind, AbilityState::Armed);
        Ok(())
    }

    /// `armed -> available` without spending anything
    pub fn disarm(&mut self, kind: AbilityKind) -> bool {
        if self.state(kind) == AbilityState::Armed {
            self.states.insert(kind, AbilityState::Available);
            true
        } else {
            false
        }
    }

    /// Direct activations are only allowed from `available`
    pub fn ensure_available(&self, kind: AbilityKind) -> Result<(), EngineError> {
        if self.state(kind) == AbilityState::Available {
            Ok(())
        } else {
            Err(EngineError::AbilityUnavailable(kind))
        }
    }

    /// Direct effect applied this tick
    pub fn consume_now(&mut self, kind: AbilityKind) {
        self.states.insert(kind, AbilityState::Consumed);
        self.pending.insert(kind, Pending::Immediate);
    }

    /// Armed token was thrown
    pub fn consume_token(&mut self, kind: AbilityKind, token: BodyId) {
        self.states.insert(kind, AbilityState::Consumed);
        self.pending.insert(kind, Pending::Token(token));
    }

    /// Effect runs until `until`
    pub fn consume_until(&mut self, kind: AbilityKind, until: u64) {
        self.states.insert(kind, AbilityState::Consumed);
        self.pending.insert(kind, Pending::Until(until));
    }

    /// Start (or extend) the global disturbance
    pub fn start_disturbance(
        &mut self,
        world: &mut PhysicsWorld,
        rng: &mut Pcg32,
        tuning: &Tuning,
        now: u64,
        duration_ticks: u64,
    ) -> usize {
        let until = now + duration_ticks.max(1);
        self.disturbance_until = Some(self.disturbance_until.map_or(until, |u| u.max(until)));
        world.set_gravity_scale(tuning.abilities.disturbance_gravity_scale);

        let kick = tuning.abilities.disturbance_impulse;
        let targets: Vec<BodyId> = world.bodies().filter(|b| b.is_active()).map(|b| b.id).collect();
        for &id in &targets {
            let sideways = rng.random_range(-0.5f32..=0.5);
            world.apply_impulse(id, Vec2::new(sideways, 1.0) * kick);
        }
        log::debug!("Disturbance on {} bodies until tick {}", targets.len(), until);
        targets.len()
    }

    /// Once per tick: end expired effects and free finished abilities.
    /// Returns the abilities that became available again.
    pub fn update(&mut self, world: &mut PhysicsWorld, now: u64) -> Vec<AbilityKind> {
        if let Some(until) = self.disturbance_until {
            if now >= until {
                world.set_gravity_scale(1.0);
                self.disturbance_until = None;
            }
        }

        let mut finished = Vec::new();
        for (&kind, &pending) in &self.pending {
            let done = match pending {
                Pending::Immediate => true,
                Pending::Token(id) => !world.contains(id),
                Pending::Until(until) => now >= until,
            };
            if done {
                finished.push(kind);
            }
        }
        for kind in &finished {
            self.pending.remove(kind);
            self.states.insert(*kind, AbilityState::Available);
        }
        finished
    }

    /// Thrown token fired: the ability now waits on its effect instead
    pub fn token_fired(&mut self, token: BodyId, until: Option<u64>) {
        for pending in self.pending.values_mut() {
            if *pending == Pending::Token(token) {
                *pending = match until {
                    Some(t) => Pending::Until(t),
                    None => Pending::Immediate,
                };
            }
        }
    }
}

/// Live bodies whose circle overlaps the blast circle
pub fn select_in_radius(world: &PhysicsWorld, center: Vec2, radius: f32, exclude: Option<BodyId>) -> Vec<BodyId> {
    world
        .bodies()
        .filter(|b| b.is_active() && Some(b.id) != exclude)
        .filter(|b| b.pos.distance(center) <= radius + b.radius)
        .map(|b| b.id)
        .collect()
}

/// Live bodies intersecting the horizontal band centred on `center_y`
pub fn select_in_band(world: &PhysicsWorld, center_y: f32, height: f32, exclude: Option<BodyId>) -> Vec<BodyId> {
    let half = height / 2.0;
    world
        .bodies()
        .filter(|b| b.is_active() && Some(b.id) != exclude)
        .filter(|b| (b.pos.y - center_y).abs() <= half + b.radius)
        .map(|b| b.id)
        .collect()
}

/// Mark targets and queue them for the processor
pub fn condemn(world: &mut PhysicsWorld, queues: &mut WorkQueues, targets: &[BodyId], reason: DeletionReason) {
    for &id in targets {
        if let Some(body) = world.body_mut(id) {
            body.marked_for_deletion = true;
            queues.push_deletion(id, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::body::BodyKind;
    use crate::sim::world::PhysicsParams;
    use rand::SeedableRng;

    fn world_with(points: &[(f32, f32)]) -> (PhysicsWorld, Vec<BodyId>) {
        let tuning = Tuning::default();
        let mut world = PhysicsWorld::new(PhysicsParams::from_tuning(&tuning));
        let ids = points
            .iter()
            .map(|&(x, y)| world.create_body(Vec2::new(x, y), 10.0, 1, BodyKind::Normal, 0).unwrap())
            .collect();
        (world, ids)
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(AbilityKind::parse("bomb"), Some(AbilityKind::AreaDestroyer));
        assert_eq!(AbilityKind::parse("ROW_CLEARER"), Some(AbilityKind::RowClearer));
        assert_eq!(AbilityKind::parse("shake"), Some(AbilityKind::Disturbance));
        assert_eq!(AbilityKind::parse("laser"), None);
        for kind in AbilityKind::ALL {
            assert_eq!(AbilityKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_cost_is_fraction_of_capacity() {
        let tuning = Tuning::default();
        let pool = ResourcePool::full(200.0);
        let cost = Abilities::cost(AbilityKind::AreaDestroyer, &tuning, &pool);
        assert!((cost - 60.0).abs() < 1e-4);
    }

    #[test]
    fn test_unaffordable_is_rejected() {
        let tuning = Tuning::default();
        let pool = ResourcePool::new(100.0, 10.0);
        let err = Abilities::check_affordable(AbilityKind::RowClearer, &tuning, &pool).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientResources { .. }));
    }

    #[test]
    fn test_state_machine_cycle() {
        let tuning = Tuning::default();
        let pool = ResourcePool::full(100.0);
        let (mut world, _) = world_with(&[]);
        let mut abilities = Abilities::new();
        let kind = AbilityKind::AreaDestroyer;

        assert_eq!(abilities.state(kind), AbilityState::Available);
        abilities.arm(kind, &tuning, &pool).unwrap();
        assert_eq!(abilities.state(kind), AbilityState::Armed);
        assert_eq!(abilities.armed(), Some(kind));

        // Not reusable while armed
        assert_eq!(abilities.arm(kind, &tuning, &pool), Err(EngineError::AbilityUnavailable(kind)));
        assert!(abilities.ensure_available(kind).is_err());
        // Only one armed at a time
        assert!(abilities.arm(AbilityKind::RowClearer, &tuning, &pool).is_err());

        let token = world.create_body(Vec2::new(50.0, 50.0), 10.0, 1, BodyKind::Normal, 0).unwrap();
        abilities.consume_token(kind, token);
        assert_eq!(abilities.state(kind), AbilityState::Consumed);
        assert!(abilities.update(&mut world, 1).is_empty());

        world.remove_body(token);
        assert_eq!(abilities.update(&mut world, 2), vec![kind]);
        assert_eq!(abilities.state(kind), AbilityState::Available);
    }

    #[test]
    fn test_disarm_restores_available() {
        let tuning = Tuning::default();
        let pool = ResourcePool::full(100.0);
        let mut abilities = Abilities::new();
        abilities.arm(AbilityKind::RowClearer, &tuning, &pool).unwrap();
        assert!(abilities.disarm(AbilityKind::RowClearer));
        assert!(!abilities.disarm(AbilityKind::RowClearer));
        assert_eq!(abilities.state(AbilityKind::RowClearer), AbilityState::Available);
    }

    #[test]
    fn test_disturbance_lifts_then_restores() {
        let tuning = Tuning::default();
        let (mut world, ids) = world_with(&[(100.0, 100.0), (200.0, 100.0)]);
        let mut rng = Pcg32::seed_from_u64(3);
        let mut abilities = Abilities::new();

        let hit = abilities.start_disturbance(&mut world, &mut rng, &tuning, 10, 30);
        abilities.consume_until(AbilityKind::Disturbance, 40);
        assert_eq!(hit, 2);
        assert!(abilities.disturbance_active());
        assert_eq!(world.gravity_scale(), tuning.abilities.disturbance_gravity_scale);
        for id in ids {
            assert!(world.body(id).unwrap().vel.y > 0.0);
        }

        assert!(abilities.update(&mut world, 39).is_empty());
        assert_eq!(abilities.update(&mut world, 40), vec![AbilityKind::Disturbance]);
        assert!(!abilities.disturbance_active());
        assert_eq!(world.gravity_scale(), 1.0);
    }

    #[test]
    fn test_select_in_radius_uses_body_extent() {
        let (world, ids) = world_with(&[(100.0, 100.0), (125.0, 100.0), (200.0, 100.0)]);
        let hit = select_in_radius(&world, Vec2::new(100.0, 100.0), 20.0, None);
        // Second body centre is 25 away but its edge is within 20
        assert_eq!(hit, vec![ids[0], ids[1]]);

        let hit = select_in_radius(&world, Vec2::new(100.0, 100.0), 20.0, Some(ids[0]));
        assert_eq!(hit, vec![ids[1]]);
    }

    #[test]
    fn test_select_in_band() {
        let (mut world, ids) = world_with(&[(50.0, 100.0), (300.0, 135.0), (200.0, 200.0)]);
        world.body_mut(ids[1]).unwrap().held = true;
        let hit = select_in_band(&world, 110.0, 20.0, None);
        // Held preview is never a target
        assert_eq!(hit, vec![ids[0]]);
    }

    #[test]
    fn test_condemn_marks_and_queues() {
        let (mut world, ids) = world_with(&[(50.0, 100.0), (80.0, 100.0)]);
        let mut queues = WorkQueues::new();
        condemn(&mut world, &mut queues, &ids, DeletionReason::AreaKill);
        assert_eq!(queues.deletions.len(), 2);
        assert!(world.bodies().all(|b| b.marked_for_deletion));
        // Nothing removed yet
        assert_eq!(world.body_count(), 2);
    }
}
