//! Fixed timestep simulation tick
//!
//! One tick runs, in order: inputs, physics step, contact resolution,
//! out-of-bounds sweep, queue drain, ability bookkeeping, game-over check.
//! Bodies are only created or removed in the input and drain phases, never
//! while contacts are being read.

use glam::Vec2;
use serde::Serialize;

use super::ability::{AbilityKind, ResourceProvider};
use super::contact::{SpecialTrigger, resolve_contacts};
use super::events::GameEvent;
use super::factory::LaunchRequest;
use super::processor::{DeletionReason, DrainContext, DrainReport, drain};
use super::state::{GamePhase, GameState};
use crate::consts::*;

/// Input commands for a single tick (deterministic)
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Release the preview body
    pub launch: Option<LaunchRequest>,
    /// Arm an ability for the next launch
    pub arm: Option<AbilityKind>,
    /// Put back whatever is armed
    pub disarm: bool,
    /// Fire an ability directly, at an optional target point
    pub ability: Option<(AbilityKind, Option<Vec2>)>,
    /// Pause toggle
    pub pause: bool,
}

/// Running counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickStats {
    pub ticks: u64,
    pub merges: u64,
    pub ceiling_merges: u64,
    pub deletions: u64,
    /// Queue entries whose body was already gone
    pub stale_drops: u64,
    pub rejected_contacts: u64,
    pub specials_fired: u64,
    pub rejected_inputs: u64,
    pub restarts: u64,
}

/// Advance the game state by one fixed timestep
pub fn tick(state: &mut GameState, input: &TickInput, provider: &mut dyn ResourceProvider) {
    // Handle pause toggle
    if input.pause {
        match state.phase {
            GamePhase::Running => {
                state.phase = GamePhase::Paused;
                return;
            }
            GamePhase::Paused => state.phase = GamePhase::Running,
            GamePhase::Over => {}
        }
    }
    if state.phase == GamePhase::Paused {
        return;
    }

    apply_input(state, input, provider);

    state.time_ticks += 1;
    state.stats.ticks += 1;

    if !step_physics(state) {
        return;
    }

    // After game over the world keeps settling but nothing else happens
    if state.phase == GamePhase::Over {
        return;
    }

    let triggers = resolve_phase(state);
    fire_triggers(state, &triggers);
    sweep_out_of_bounds(state);
    drain_phase(state);
    settle_abilities(state);
    check_game_over(state);
}

/// Apply player commands; failures become `Rejected` notices
pub fn apply_input(state: &mut GameState, input: &TickInput, provider: &mut dyn ResourceProvider) {
    if input.disarm {
        if let Some(kind) = state.abilities.armed() {
            let result = state.disarm_ability(kind);
            note_rejection(state, "disarm", result.err());
        }
    }
    if let Some(kind) = input.arm {
        let result = state.arm_ability(kind, &*provider);
        note_rejection(state, "arm", result.err());
    }
    if let Some((kind, target)) = input.ability {
        let result = state.activate_ability(kind, target, provider);
        note_rejection(state, "ability", result.err());
    }
    if let Some(request) = input.launch {
        let result = state.launch(request, provider);
        note_rejection(state, "launch", result.err());
    }
}

fn note_rejection(state: &mut GameState, action: &'static str, err: Option<crate::EngineError>) {
    let Some(err) = err else {
        return;
    };
    log::debug!("Rejected {}: {}", action, err);
    state.stats.rejected_inputs += 1;
    state.events.push(GameEvent::Rejected {
        action,
        reason: err.to_string(),
    });
}

/// Step physics and guard against numeric blow-ups.
///
/// Returns false if the world was corrupt and the game restarted.
pub fn step_physics(state: &mut GameState) -> bool {
    state.world.step(SIM_DT);
    if let Some(id) = state.world.find_corrupt_body() {
        log::error!("Body {} has non-finite state at tick {}; restarting", id, state.time_ticks);
        state.reset("corruption", state.seed);
        return false;
    }
    true
}

/// Turn this step's contacts into queued merges and special triggers
pub fn resolve_phase(state: &mut GameState) -> Vec<SpecialTrigger> {
    let now = state.time_ticks;
    state.ledger.prune(now);
    let resolution = resolve_contacts(state.world.contacts(), &state.world, &state.ledger, &state.rules, now);
    state.ledger.commit(&resolution);

    let rejected = resolution.rejected();
    if rejected > 0 {
        log::trace!("Tick {}: {} contacts rejected", now, rejected);
    }
    state.stats.rejected_contacts += rejected as u64;

    for merge in &resolution.merges {
        state.events.push(GameEvent::MergeScheduled {
            a: merge.id_a,
            b: merge.id_b,
            level: merge.level,
            position: merge.contact_midpoint(),
        });
        state.queues.push_merge(*merge);
    }
    resolution.triggers
}

/// Apply special-token effects (queues deletions, never removes)
pub fn fire_triggers(state: &mut GameState, triggers: &[SpecialTrigger]) {
    for trigger in triggers {
        state.fire_special(trigger);
        state.stats.specials_fired += 1;
    }
}

/// Queue bodies that escaped the field
pub fn sweep_out_of_bounds(state: &mut GameState) -> usize {
    let margin = state.tuning.out_of_bounds_margin;
    let w = state.tuning.field_width;
    let h = state.tuning.field_height;
    let escaped: Vec<_> = state
        .world
        .bodies()
        .filter(|b| b.is_active())
        .filter(|b| b.pos.x < -margin || b.pos.x > w + margin || b.pos.y < -margin || b.pos.y > h + margin)
        .map(|b| b.id)
        .collect();

    for &id in &escaped {
        if let Some(body) = state.world.body_mut(id) {
            body.marked_for_deletion = true;
        }
        state.queues.push_deletion(id, DeletionReason::OutOfBounds);
    }
    if !escaped.is_empty() {
        log::debug!("{} bodies left the field", escaped.len());
    }
    escaped.len()
}

/// Drain the merge and deletion queues
pub fn drain_phase(state: &mut GameState) -> DrainReport {
    let mut ctx = DrainContext {
        world: &mut state.world,
        factory: &state.factory,
        score: &mut state.score,
        curve: &state.curve,
        tuning: &state.tuning,
        events: &mut state.events,
        now: state.time_ticks,
    };
    let report = drain(&mut state.queues, &mut ctx);

    state.stats.merges += report.merged as u64;
    state.stats.ceiling_merges += report.ceiling_merges as u64;
    state.stats.deletions += report.deleted as u64;
    state.stats.stale_drops += report.stale as u64;
    report
}

/// End expired effects and free finished abilities
pub fn settle_abilities(state: &mut GameState) {
    let finished = state.abilities.update(&mut state.world, state.time_ticks);
    for ability in finished {
        state.events.push(GameEvent::AbilityFinished { ability });
    }
}

/// Flip to game over when a body has dwelt too long above the line
pub fn check_game_over(state: &mut GameState) -> bool {
    let Some(trigger) = state.detector.check(&state.world, state.time_ticks) else {
        return false;
    };
    state.phase = GamePhase::Over;
    // Abilities are frozen; armed tokens stay where they are
    state.queues.clear();
    let score = state.score();
    state.events.push(GameEvent::GameOver { trigger, score });
    log::info!("Game over at tick {} (body {}), score {}", state.time_ticks, trigger, score);
    true
}

/// Converts variable frame time into whole fixed ticks
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedStepper {
    accumulator: f32,
}

impl FixedStepper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leftover time as a fraction of a tick (for render interpolation)
    pub fn alpha(&self) -> f32 {
        self.accumulator / SIM_DT
    }

    /// Add a frame's elapsed seconds and run as many ticks as are owed,
    /// at most `MAX_SUBSTEPS`. Returns the number of ticks run.
    pub fn advance(&mut self, frame_dt: f32, mut step: impl FnMut()) -> u32 {
        let dt = if frame_dt.is_finite() { frame_dt.clamp(0.0, 0.25) } else { 0.0 };
        self.accumulator += dt;

        let mut substeps = 0;
        while self.accumulator >= SIM_DT && substeps < MAX_SUBSTEPS {
            step();
            self.accumulator -= SIM_DT;
            substeps += 1;
        }
        // Drop backlog we could not catch up on
        if substeps == MAX_SUBSTEPS && self.accumulator >= SIM_DT {
            self.accumulator = 0.0;
        }
        substeps
    }

    pub fn reset(&mut self) {
        self.accumulator = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::ability::ResourcePool;
    use crate::sim::body::BodyKind;
    use crate::tuning::Tuning;

    fn pool() -> ResourcePool {
        ResourcePool::full(100.0)
    }

    #[test]
    fn test_tick_advances_clock() {
        let mut state = GameState::new(12345);
        let mut pool = pool();
        tick(&mut state, &TickInput::default(), &mut pool);
        assert_eq!(state.time_ticks, 1);
        assert_eq!(state.stats.ticks, 1);
    }

    #[test]
    fn test_tick_pause() {
        let mut state = GameState::new(12345);
        let mut pool = pool();

        let input = TickInput {
            pause: true,
            ..Default::default()
        };
        tick(&mut state, &input, &mut pool);
        assert_eq!(state.phase, GamePhase::Paused);

        // Paused ticks do not advance the clock
        tick(&mut state, &TickInput::default(), &mut pool);
        assert_eq!(state.time_ticks, 0);

        // Unpause
        tick(&mut state, &input, &mut pool);
        assert_eq!(state.phase, GamePhase::Running);
        assert_eq!(state.time_ticks, 1);
    }

    #[test]
    fn test_launch_through_input() {
        let mut state = GameState::new(12345);
        let mut pool = pool();
        let preview = state.preview().id.unwrap();

        let input = TickInput {
            launch: Some(LaunchRequest::drop_at(120.0, &state.tuning)),
            ..Default::default()
        };
        tick(&mut state, &input, &mut pool);

        let body = state.world.body(preview).unwrap();
        assert!(!body.held);
        assert!(body.pos.y < state.tuning.dispenser_height);
        assert_ne!(state.preview().id, Some(preview));
    }

    #[test]
    fn test_rejected_input_becomes_event() {
        let mut state = GameState::new(12345);
        let mut pool = ResourcePool::new(100.0, 0.0);
        let input = TickInput {
            arm: Some(AbilityKind::AreaDestroyer),
            ..Default::default()
        };
        tick(&mut state, &input, &mut pool);

        assert_eq!(state.stats.rejected_inputs, 1);
        assert!(
            state
                .events
                .iter()
                .any(|e| matches!(e, GameEvent::Rejected { action: "arm", .. }))
        );
    }

    #[test]
    fn test_disarm_after_game_over_changes_nothing() {
        let mut state = GameState::new(12345);
        let mut pool = pool();
        state.arm_ability(AbilityKind::AreaDestroyer, &pool).unwrap();
        let preview = state.preview().id;
        state.phase = GamePhase::Over;

        let input = TickInput {
            disarm: true,
            ..Default::default()
        };
        tick(&mut state, &input, &mut pool);

        assert_eq!(
            state.abilities.state(AbilityKind::AreaDestroyer),
            crate::sim::ability::AbilityState::Armed
        );
        assert_eq!(state.preview().id, preview);
        assert!(
            state
                .events
                .iter()
                .any(|e| matches!(e, GameEvent::Rejected { action: "disarm", .. }))
        );
    }

    #[test]
    fn test_direct_ability_rejected_while_paused() {
        let mut tuning = Tuning::default();
        tuning.gravity = 0.0;
        let mut state = GameState::with_tuning(7, tuning).unwrap();
        let mut pool = pool();
        let target = Vec2::new(150.0, 150.0);
        state.spawn_body(target, 1, BodyKind::Normal).unwrap();
        let bodies = state.world.body_count();

        let pause = TickInput {
            pause: true,
            ..Default::default()
        };
        tick(&mut state, &pause, &mut pool);
        assert!(state.is_paused());

        let result = state.activate_ability(AbilityKind::AreaDestroyer, Some(target), &mut pool);
        assert_eq!(result, Err(crate::EngineError::Paused));
        assert_eq!(pool.available, 100.0);
        assert_eq!(state.world.body_count(), bodies);
        assert!(state.queues.is_empty());
    }

    #[test]
    fn test_out_of_bounds_is_swept() {
        let mut tuning = Tuning::default();
        tuning.gravity = 0.0;
        let mut state = GameState::with_tuning(1, tuning).unwrap();
        let mut pool = pool();
        let id = state.spawn_body(Vec2::new(100.0, 100.0), 1, BodyKind::Normal).unwrap();
        state.world.set_transform(id, Vec2::new(100.0, -500.0), Vec2::ZERO).unwrap();

        tick(&mut state, &TickInput::default(), &mut pool);
        assert!(!state.world.contains(id));
        assert!(state.events.iter().any(|e| matches!(
            e,
            GameEvent::BodyDestroyed {
                reason: DeletionReason::OutOfBounds,
                ..
            }
        )));
    }

    #[test]
    fn test_corruption_restarts() {
        let mut state = GameState::new(5);
        let mut pool = pool();
        let id = state.spawn_body(Vec2::new(100.0, 100.0), 1, BodyKind::Normal).unwrap();
        state.score.increase(10);
        if let Some(body) = state.world.body_mut(id) {
            body.vel = Vec2::new(f32::NAN, 0.0);
        }

        tick(&mut state, &TickInput::default(), &mut pool);
        assert_eq!(state.score(), 0);
        assert_eq!(state.stats.restarts, 1);
        // Only the fresh preview remains
        assert_eq!(state.world.body_count(), 1);
    }

    #[test]
    fn test_determinism() {
        let mut state1 = GameState::new(99999);
        let mut state2 = GameState::new(99999);
        let mut pool1 = pool();
        let mut pool2 = pool();

        let tuning = Tuning::default();
        let inputs = [
            TickInput {
                launch: Some(LaunchRequest::drop_at(150.0, &tuning)),
                ..Default::default()
            },
            TickInput::default(),
            TickInput {
                launch: Some(LaunchRequest::drop_at(260.0, &tuning)),
                ..Default::default()
            },
            TickInput::default(),
        ];

        for _ in 0..60 {
            for input in &inputs {
                tick(&mut state1, input, &mut pool1);
                tick(&mut state2, input, &mut pool2);
            }
        }

        assert_eq!(state1.time_ticks, state2.time_ticks);
        assert_eq!(state1.score(), state2.score());
        assert_eq!(state1.body_snapshot(), state2.body_snapshot());
    }

    #[test]
    fn test_stepper_caps_substeps() {
        let mut stepper = FixedStepper::new();
        let mut ran = 0;
        assert_eq!(stepper.advance(SIM_DT * 2.5, || ran += 1), 2);
        assert_eq!(ran, 2);
        assert!(stepper.alpha() > 0.4 && stepper.alpha() < 0.6);

        let ran = stepper.advance(1.0, || {});
        assert_eq!(ran, MAX_SUBSTEPS);
        assert_eq!(stepper.alpha(), 0.0);
    }
}
