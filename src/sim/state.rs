//! Game state and the host-facing API
//!
//! `GameState` is the one object that owns every registry: physics world,
//! contact ledger, work queues, abilities, detector and score. Nothing is
//! global, so a test can build as many independent games as it likes.

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::ability::{
    Abilities, AbilityKind, AbilityOutcome, ResourceProvider, condemn, select_in_band,
    select_in_radius,
};
use super::body::{BodyId, BodyKind, BodySnapshot, SpecialKind};
use super::contact::{ContactLedger, ContactRules, SpecialTrigger};
use super::events::{EffectsSink, GameEvent, SpawnCause};
use super::factory::{BallFactory, LaunchRequest, Preview, special_for};
use super::game_over::GameOverDetector;
use super::processor::{DeletionReason, WorkQueues};
use super::score::{Score, ScoreCurve};
use super::tick::TickStats;
use super::world::{BoundaryTag, PhysicsParams, PhysicsWorld};
use crate::error::EngineError;
use crate::tuning::Tuning;

/// Current phase of play
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    #[default]
    Running,
    /// Clock stopped; nothing advances
    Paused,
    /// Run ended; the world may still settle but accepts no gameplay
    Over,
}

impl GamePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GamePhase::Running => "running",
            GamePhase::Paused => "paused",
            GamePhase::Over => "over",
        }
    }
}

/// Complete game state (deterministic for a given seed and input stream)
#[derive(Debug, Clone)]
pub struct GameState {
    /// Run seed for reproducibility
    pub seed: u64,
    pub tuning: Tuning,
    pub rules: ContactRules,
    /// Simulation tick counter (the only clock)
    pub time_ticks: u64,
    pub phase: GamePhase,
    pub world: PhysicsWorld,
    pub factory: BallFactory,
    pub ledger: ContactLedger,
    pub queues: WorkQueues,
    pub abilities: Abilities,
    pub detector: GameOverDetector,
    pub score: Score,
    pub curve: ScoreCurve,
    pub rng: Pcg32,
    /// Buffered notifications for the render/audio layer
    pub events: Vec<GameEvent>,
    pub stats: TickStats,
}

impl GameState {
    /// New game with default tuning
    pub fn new(seed: u64) -> Self {
        Self::build(seed, Tuning::default())
    }

    /// New game with custom tuning
    pub fn with_tuning(seed: u64, tuning: Tuning) -> Result<Self, EngineError> {
        tuning.validate()?;
        Ok(Self::build(seed, tuning))
    }

    fn build(seed: u64, tuning: Tuning) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let factory = BallFactory::new(&mut rng, &tuning);
        let mut state = Self {
            seed,
            rules: ContactRules::from_tuning(&tuning),
            time_ticks: 0,
            phase: GamePhase::Running,
            world: PhysicsWorld::new(PhysicsParams::from_tuning(&tuning)),
            factory,
            ledger: ContactLedger::new(),
            queues: WorkQueues::new(),
            abilities: Abilities::new(),
            detector: GameOverDetector::new(
                tuning.danger_line,
                tuning.dwell_ticks(),
                tuning.grace_ticks(),
            ),
            score: Score::new(),
            curve: ScoreCurve::new(tuning.score.clone()),
            rng,
            events: Vec::new(),
            stats: TickStats::default(),
            tuning,
        };
        state.setup_field();
        state
    }

    /// Floor, walls and the first preview
    fn setup_field(&mut self) {
        let w = self.tuning.field_width;
        let h = self.tuning.field_height;
        let segments = [
            (Vec2::ZERO, Vec2::new(w, 0.0), BoundaryTag::Floor),
            (Vec2::ZERO, Vec2::new(0.0, h), BoundaryTag::Wall),
            (Vec2::new(w, 0.0), Vec2::new(w, h), BoundaryTag::Wall),
        ];
        for (a, b, tag) in segments {
            if let Err(err) = self.world.create_boundary(a, b, Some(tag)) {
                log::warn!("Skipped boundary: {}", err);
            }
        }
        if let Err(err) =
            self.factory
                .spawn_preview(&mut self.world, &self.tuning, self.time_ticks, &mut self.events)
        {
            log::warn!("No preview body: {}", err);
        }
    }

    /// Reset everything and start over with the same seed
    pub fn restart(&mut self) {
        self.reset("restart", self.seed);
    }

    /// Reset everything with a fresh seed
    pub fn restart_with_seed(&mut self, seed: u64) {
        self.reset("restart", seed);
    }

    pub(crate) fn reset(&mut self, reason: &'static str, seed: u64) {
        let stats = self.stats;
        // Undelivered notices survive so the host still sees them
        let mut undelivered = std::mem::take(&mut self.events);
        *self = Self::build(seed, self.tuning.clone());
        undelivered.push(GameEvent::Restarted { reason });
        undelivered.append(&mut self.events);
        self.events = undelivered;
        self.stats = TickStats {
            restarts: stats.restarts + 1,
            ..TickStats::default()
        };
        log::info!("Game restarted ({}) with seed {}", reason, seed);
    }

    pub fn score(&self) -> u64 {
        self.score.total()
    }

    pub fn is_game_over(&self) -> bool {
        self.phase == GamePhase::Over
    }

    pub fn is_paused(&self) -> bool {
        self.phase == GamePhase::Paused
    }

    /// Everything the renderer needs, in id order
    pub fn body_snapshot(&self) -> Vec<BodySnapshot> {
        self.world.bodies().map(|b| b.snapshot()).collect()
    }

    /// What the dispenser releases next
    pub fn preview(&self) -> Preview {
        self.factory.preview()
    }

    fn ensure_running(&self) -> Result<(), EngineError> {
        match self.phase {
            GamePhase::Running => Ok(()),
            GamePhase::Paused => Err(EngineError::Paused),
            GamePhase::Over => Err(EngineError::GameOver),
        }
    }

    /// Place a free body directly (tutorials, tests, replays)
    pub fn spawn_body(&mut self, pos: Vec2, level: u8, kind: BodyKind) -> Result<BodyId, EngineError> {
        self.ensure_running()?;
        if !pos.is_finite() {
            return Err(EngineError::InvalidGeometry("spawn point is not finite"));
        }
        if pos.x < 0.0 || pos.x > self.tuning.field_width || pos.y < 0.0 || pos.y > self.tuning.field_height {
            return Err(EngineError::InvalidGeometry("spawn point outside the field"));
        }
        self.factory.create(
            &mut self.world,
            &self.tuning,
            pos,
            level,
            kind,
            self.time_ticks,
            SpawnCause::Direct,
            &mut self.events,
        )
    }

    /// Release the preview body.
    ///
    /// If an ability is armed the preview is its token: the cost is charged
    /// here and the ability stays consumed until the token is gone.
    pub fn launch(
        &mut self,
        request: LaunchRequest,
        provider: &mut dyn ResourceProvider,
    ) -> Result<BodyId, EngineError> {
        self.ensure_running()?;
        let armed = match self.abilities.armed() {
            Some(kind) => Some((kind, Abilities::check_affordable(kind, &self.tuning, provider)?)),
            None => None,
        };

        let id = self.factory.launch(
            &mut self.world,
            &mut self.rng,
            &self.tuning,
            request,
            self.time_ticks,
            &mut self.events,
        )?;

        if let Some((kind, cost)) = armed {
            provider.spend(cost);
            self.abilities.consume_token(kind, id);
            log::debug!("Threw {} token {} for {:.1}", kind.as_str(), id, cost);
        }
        Ok(id)
    }

    /// Arm an ability: the preview becomes its token
    pub fn arm_ability(&mut self, kind: AbilityKind, provider: &dyn ResourceProvider) -> Result<(), EngineError> {
        self.ensure_running()?;
        self.abilities.arm(kind, &self.tuning, provider)?;
        let token = BodyKind::Special(special_for(kind, &self.tuning));
        if let Err(err) = self.factory.set_preview_kind(
            &mut self.world,
            &self.tuning,
            token,
            self.time_ticks,
            &mut self.events,
        ) {
            self.abilities.disarm(kind);
            return Err(err);
        }
        Ok(())
    }

    /// Put an armed ability back; returns false if it was not armed
    pub fn disarm_ability(&mut self, kind: AbilityKind) -> Result<bool, EngineError> {
        self.ensure_running()?;
        if !self.abilities.disarm(kind) {
            return Ok(false);
        }
        if let Err(err) = self.factory.set_preview_kind(
            &mut self.world,
            &self.tuning,
            BodyKind::Normal,
            self.time_ticks,
            &mut self.events,
        ) {
            log::warn!("Could not restore preview: {}", err);
        }
        Ok(true)
    }

    /// Apply an ability immediately at `target`.
    ///
    /// Area and row effects only mark and queue their targets; the bodies
    /// disappear at the next drain. Finding nothing to hit is an error and
    /// costs nothing.
    pub fn activate_ability(
        &mut self,
        kind: AbilityKind,
        target: Option<Vec2>,
        provider: &mut dyn ResourceProvider,
    ) -> Result<AbilityOutcome, EngineError> {
        self.ensure_running()?;
        self.abilities.ensure_available(kind)?;
        let cost = Abilities::check_affordable(kind, &self.tuning, provider)?;
        let now = self.time_ticks;

        let point = match (kind.needs_target(), target) {
            (true, None) => return Err(EngineError::InvalidGeometry("ability needs a target point")),
            (_, Some(p)) if !p.is_finite() => {
                return Err(EngineError::InvalidGeometry("target point is not finite"));
            }
            (_, p) => p,
        };

        let targets = match kind {
            AbilityKind::AreaDestroyer | AbilityKind::RowClearer => {
                let center = point.unwrap_or(Vec2::ZERO);
                let (hits, reason) = if kind == AbilityKind::AreaDestroyer {
                    let radius = self.tuning.abilities.blast_radius;
                    (select_in_radius(&self.world, center, radius, None), DeletionReason::AreaKill)
                } else {
                    let band = self.tuning.abilities.row_band_height;
                    (select_in_band(&self.world, center.y, band, None), DeletionReason::RowKill)
                };
                if hits.is_empty() {
                    return Err(EngineError::NoValidTargets);
                }
                condemn(&mut self.world, &mut self.queues, &hits, reason);
                self.abilities.consume_now(kind);
                hits.len()
            }
            AbilityKind::Disturbance => {
                if !self.world.bodies().any(|b| b.is_active()) {
                    return Err(EngineError::NoValidTargets);
                }
                let duration = self.tuning.disturbance_ticks();
                let hit = self.abilities.start_disturbance(
                    &mut self.world,
                    &mut self.rng,
                    &self.tuning,
                    now,
                    duration,
                );
                self.abilities.consume_until(kind, now + duration.max(1));
                hit
            }
        };

        provider.spend(cost);
        self.events.push(GameEvent::AbilityActivated {
            ability: kind,
            position: point,
            targets,
        });
        log::info!("Activated {} on {} bodies for {:.1}", kind.as_str(), targets, cost);
        Ok(AbilityOutcome {
            ability: kind,
            cost,
            targets,
        })
    }

    /// A thrown token touched something: apply its effect and queue its
    /// own removal. Returns the number of bodies affected.
    pub fn fire_special(&mut self, trigger: &SpecialTrigger) -> usize {
        let Some(source) = self.world.body_mut(trigger.source) else {
            return 0;
        };
        // Source goes first so it never targets itself
        source.marked_for_deletion = true;
        self.queues.push_deletion(trigger.source, DeletionReason::SelfKill);

        let now = self.time_ticks;
        let exclude = Some(trigger.source);
        let (targets, until) = match trigger.special {
            SpecialKind::AreaDestroyer { blast_radius } => {
                let hits = select_in_radius(&self.world, trigger.position, blast_radius, exclude);
                condemn(&mut self.world, &mut self.queues, &hits, DeletionReason::AreaKill);
                (hits.len(), None)
            }
            SpecialKind::RowClearer { band_height } => {
                let hits = select_in_band(&self.world, trigger.position.y, band_height, exclude);
                condemn(&mut self.world, &mut self.queues, &hits, DeletionReason::RowKill);
                (hits.len(), None)
            }
            SpecialKind::DisturbanceSource { duration_ticks } => {
                let hit = self.abilities.start_disturbance(
                    &mut self.world,
                    &mut self.rng,
                    &self.tuning,
                    now,
                    duration_ticks,
                );
                (hit, Some(now + duration_ticks.max(1)))
            }
        };

        let ability = AbilityKind::from_special(&trigger.special);
        self.abilities.token_fired(trigger.source, until);
        self.events.push(GameEvent::AbilityActivated {
            ability,
            position: Some(trigger.position),
            targets,
        });
        log::debug!("{} token {} fired on {} bodies", ability.as_str(), trigger.source, targets);
        targets
    }

    /// Take buffered events
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    /// Deliver buffered events to a sink
    pub fn flush_events<S: EffectsSink + ?Sized>(&mut self, sink: &mut S) {
        for event in self.events.drain(..) {
            sink.on_event(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ability::{AbilityState, ResourcePool};

    fn quiet_state() -> GameState {
        let mut tuning = Tuning::default();
        tuning.gravity = 0.0;
        GameState::with_tuning(1, tuning).unwrap()
    }

    #[test]
    fn test_new_state_has_field_and_preview() {
        let state = GameState::new(42);
        assert_eq!(state.phase, GamePhase::Running);
        assert_eq!(state.world.boundaries().len(), 3);
        assert_eq!(state.world.body_count(), 1);
        let preview = state.preview();
        let body = state.world.body(preview.id.unwrap()).unwrap();
        assert!(body.held);
        assert_eq!(state.score(), 0);
    }

    #[test]
    fn test_invalid_tuning_is_rejected() {
        let mut tuning = Tuning::default();
        tuning.level_radii.clear();
        assert!(matches!(
            GameState::with_tuning(1, tuning),
            Err(EngineError::InvalidTuning(_))
        ));
    }

    #[test]
    fn test_spawn_body_rejects_bad_points() {
        let mut state = quiet_state();
        assert!(matches!(
            state.spawn_body(Vec2::new(f32::INFINITY, 10.0), 1, BodyKind::Normal),
            Err(EngineError::InvalidGeometry(_))
        ));
        assert!(matches!(
            state.spawn_body(Vec2::new(-10.0, 10.0), 1, BodyKind::Normal),
            Err(EngineError::InvalidGeometry(_))
        ));
        assert_eq!(state.world.body_count(), 1);
    }

    #[test]
    fn test_arm_swaps_preview_and_disarm_restores() {
        let mut state = quiet_state();
        let pool = ResourcePool::full(100.0);

        state.arm_ability(AbilityKind::AreaDestroyer, &pool).unwrap();
        assert_eq!(state.abilities.state(AbilityKind::AreaDestroyer), AbilityState::Armed);
        assert!(matches!(state.preview().kind, BodyKind::Special(SpecialKind::AreaDestroyer { .. })));

        assert!(state.disarm_ability(AbilityKind::AreaDestroyer).unwrap());
        assert_eq!(state.preview().kind, BodyKind::Normal);
        assert_eq!(state.world.body_count(), 1);
    }

    #[test]
    fn test_armed_launch_charges_cost() {
        let mut state = quiet_state();
        let mut pool = ResourcePool::full(100.0);
        state.arm_ability(AbilityKind::RowClearer, &pool).unwrap();

        let token = state
            .launch(LaunchRequest::drop_at(100.0, &state.tuning), &mut pool)
            .unwrap();
        assert!((pool.available - 75.0).abs() < 1e-3);
        assert_eq!(state.abilities.state(AbilityKind::RowClearer), AbilityState::Consumed);
        assert!(state.world.body(token).unwrap().kind.special().is_some());
        assert_eq!(state.preview().kind, BodyKind::Normal);
    }

    #[test]
    fn test_activate_without_targets_costs_nothing() {
        let mut state = quiet_state();
        let mut pool = ResourcePool::full(100.0);
        let err = state
            .activate_ability(AbilityKind::AreaDestroyer, Some(Vec2::new(50.0, 50.0)), &mut pool)
            .unwrap_err();
        assert_eq!(err, EngineError::NoValidTargets);
        assert_eq!(pool.available, 100.0);
        assert_eq!(state.abilities.state(AbilityKind::AreaDestroyer), AbilityState::Available);
    }

    #[test]
    fn test_activate_requires_target_point() {
        let mut state = quiet_state();
        let mut pool = ResourcePool::full(100.0);
        assert!(matches!(
            state.activate_ability(AbilityKind::RowClearer, None, &mut pool),
            Err(EngineError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_fire_special_queues_self_kill() {
        let mut state = quiet_state();
        let special = special_for(AbilityKind::AreaDestroyer, &state.tuning);
        let token = state
            .spawn_body(Vec2::new(100.0, 100.0), 1, BodyKind::Special(special))
            .unwrap();
        let victim = state.spawn_body(Vec2::new(120.0, 100.0), 2, BodyKind::Normal).unwrap();

        let hit = state.fire_special(&SpecialTrigger {
            source: token,
            special,
            position: Vec2::new(100.0, 100.0),
        });
        assert_eq!(hit, 1);
        let reasons: Vec<_> = state.queues.deletions.iter().map(|d| (d.id, d.reason)).collect();
        assert_eq!(
            reasons,
            vec![(token, DeletionReason::SelfKill), (victim, DeletionReason::AreaKill)]
        );
        // Still present until the drain
        assert!(state.world.contains(token) && state.world.contains(victim));
    }

    #[test]
    fn test_restart_resets_everything() {
        let mut state = quiet_state();
        state.spawn_body(Vec2::new(100.0, 100.0), 3, BodyKind::Normal).unwrap();
        state.score.increase(50);
        state.time_ticks = 99;
        state.phase = GamePhase::Over;

        state.restart();
        assert_eq!(state.phase, GamePhase::Running);
        assert_eq!(state.score(), 0);
        assert_eq!(state.time_ticks, 0);
        assert_eq!(state.world.body_count(), 1);
        assert!(state.queues.is_empty());
        assert_eq!(state.stats.restarts, 1);
        assert!(state.events.iter().any(|e| matches!(e, GameEvent::Restarted { .. })));
    }

    #[test]
    fn test_game_over_blocks_actions() {
        let mut state = quiet_state();
        let mut pool = ResourcePool::full(100.0);
        state.phase = GamePhase::Over;
        let req = LaunchRequest::drop_at(100.0, &state.tuning);
        assert_eq!(state.launch(req, &mut pool), Err(EngineError::GameOver));
        assert_eq!(
            state.spawn_body(Vec2::new(100.0, 100.0), 1, BodyKind::Normal),
            Err(EngineError::GameOver)
        );
    }

    #[test]
    fn test_flush_events_empties_buffer() {
        let mut state = quiet_state();
        let mut sink: Vec<GameEvent> = Vec::new();
        state.flush_events(&mut sink);
        assert!(!sink.is_empty());
        assert!(state.events.is_empty());
    }
}
