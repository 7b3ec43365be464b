//! Merge/deletion processor
//!
//! The only place bodies are destroyed (and merge products created) during a
//! tick. Runs once per frame after the physics step and contact resolution.
//! Work queued while a drain is in progress lands in fresh queues and waits
//! for the next frame.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::body::BodyId;
use super::contact::PendingMerge;
use super::events::{GameEvent, SpawnCause};
use super::factory::BallFactory;
use super::score::{Score, ScoreCurve};
use super::world::PhysicsWorld;
use crate::error::EngineError;
use crate::tuning::Tuning;

/// Destruction cause, used by the renderer to pick an animation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionReason {
    Merge,
    AreaKill,
    RowKill,
    /// The special token that caused the effect
    SelfKill,
    OutOfBounds,
}

impl DeletionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeletionReason::Merge => "merge",
            DeletionReason::AreaKill => "area_kill",
            DeletionReason::RowKill => "row_kill",
            DeletionReason::SelfKill => "self_kill",
            DeletionReason::OutOfBounds => "out_of_bounds",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingDeletion {
    pub id: BodyId,
    pub reason: DeletionReason,
}

/// Work scheduled for the next drain
#[derive(Debug, Clone, Default)]
pub struct WorkQueues {
    pub merges: Vec<PendingMerge>,
    pub deletions: Vec<PendingDeletion>,
}

impl WorkQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_merge(&mut self, merge: PendingMerge) {
        self.merges.push(merge);
    }

    /// Queue a deletion; a body is queued at most once
    pub fn push_deletion(&mut self, id: BodyId, reason: DeletionReason) {
        if !self.deletions.iter().any(|d| d.id == id) {
            self.deletions.push(PendingDeletion { id, reason });
        }
    }

    pub fn is_empty(&self) -> bool {
        self.merges.is_empty() && self.deletions.is_empty()
    }

    pub fn clear(&mut self) {
        self.merges.clear();
        self.deletions.clear();
    }
}

/// Outcome of one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub merged: u32,
    /// Top-tier merges that vanished instead of producing a body
    pub ceiling_merges: u32,
    pub deleted: u32,
    /// Queue entries dropped because a body was already gone
    pub stale: u32,
    pub points: u64,
}

/// Everything a drain mutates
pub struct DrainContext<'a> {
    pub world: &'a mut PhysicsWorld,
    pub factory: &'a BallFactory,
    pub score: &'a mut Score,
    pub curve: &'a ScoreCurve,
    pub tuning: &'a Tuning,
    pub events: &'a mut Vec<GameEvent>,
    pub now: u64,
}

/// Empty both queues and apply their work
pub fn drain(queues: &mut WorkQueues, ctx: &mut DrainContext<'_>) -> DrainReport {
    let merges = std::mem::take(&mut queues.merges);
    let deletions = std::mem::take(&mut queues.deletions);
    let mut report = DrainReport::default();

    for merge in merges {
        match apply_merge(&merge, ctx) {
            Ok(MergeOutcome::Created { points, .. }) => {
                report.merged += 1;
                report.points += points;
            }
            Ok(MergeOutcome::Ceiling { points }) => {
                report.ceiling_merges += 1;
                report.points += points;
            }
            Err(err) => {
                log::debug!("Dropped merge {}+{}: {}", merge.id_a, merge.id_b, err);
                report.stale += 1;
            }
        }
    }

    for deletion in deletions {
        match apply_deletion(&deletion, ctx) {
            Ok(points) => {
                report.deleted += 1;
                report.points += points;
            }
            Err(err) => {
                log::debug!("Dropped {} deletion: {}", deletion.reason.as_str(), err);
                report.stale += 1;
            }
        }
    }

    report
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeOutcome {
    Created { id: BodyId, points: u64 },
    Ceiling { points: u64 },
}

fn apply_merge(merge: &PendingMerge, ctx: &mut DrainContext<'_>) -> Result<MergeOutcome, EngineError> {
    // Both must still exist and not be claimed by an ability in between
    let a = live_body(ctx.world, merge.id_a)?;
    let b = live_body(ctx.world, merge.id_b)?;
    let midpoint = (a.pos + b.pos) * 0.5;
    let velocity = (a.vel + b.vel) * 0.5;
    let level = a.level;

    for id in [merge.id_a, merge.id_b] {
        if let Some(body) = ctx.world.remove_body(id) {
            ctx.events.push(GameEvent::BodyDestroyed {
                id,
                level: body.level,
                position: body.pos,
                reason: DeletionReason::Merge,
            });
        }
    }

    let max_level = ctx.tuning.max_level();
    if level >= max_level {
        let points = ctx.curve.ceiling_points(max_level);
        ctx.score.increase(points);
        ctx.events.push(GameEvent::CeilingMerge {
            level,
            position: midpoint,
            points,
        });
        log::info!("Ceiling merge at level {} (+{})", level, points);
        return Ok(MergeOutcome::Ceiling { points });
    }

    let new_level = level + 1;
    let id = ctx.factory.create(
        ctx.world,
        ctx.tuning,
        midpoint,
        new_level,
        super::body::BodyKind::Normal,
        ctx.now,
        SpawnCause::Merge,
        ctx.events,
    )?;
    if let Some(body) = ctx.world.body_mut(id) {
        body.vel = velocity;
    }

    let points = ctx.curve.merge_points(new_level);
    ctx.score.increase(points);
    ctx.events.push(GameEvent::Merged {
        into: id,
        level: new_level,
        position: midpoint,
        points,
    });
    Ok(MergeOutcome::Created { id, points })
}

fn live_body(world: &PhysicsWorld, id: BodyId) -> Result<LiveBody, EngineError> {
    match world.body(id) {
        Some(body) if !body.marked_for_deletion => Ok(LiveBody {
            pos: body.pos,
            vel: body.vel,
            level: body.level,
        }),
        _ => Err(EngineError::StaleReference(id)),
    }
}

struct LiveBody {
    pos: Vec2,
    vel: Vec2,
    level: u8,
}

fn apply_deletion(deletion: &PendingDeletion, ctx: &mut DrainContext<'_>) -> Result<u64, EngineError> {
    let body = ctx
        .world
        .remove_body(deletion.id)
        .ok_or(EngineError::StaleReference(deletion.id))?;

    let points = ctx.curve.deletion_points(deletion.reason);
    ctx.score.increase(points);
    ctx.events.push(GameEvent::BodyDestroyed {
        id: body.id,
        level: body.level,
        position: body.pos,
        reason: deletion.reason,
    });
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::body::BodyKind;
    use crate::sim::world::PhysicsParams;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    struct Fixture {
        world: PhysicsWorld,
        factory: BallFactory,
        score: Score,
        curve: ScoreCurve,
        tuning: Tuning,
        events: Vec<GameEvent>,
    }

    impl Fixture {
        fn new() -> Self {
            let tuning = Tuning::default();
            let mut rng = Pcg32::seed_from_u64(1);
            Self {
                world: PhysicsWorld::new(PhysicsParams::from_tuning(&tuning)),
                factory: BallFactory::new(&mut rng, &tuning),
                score: Score::new(),
                curve: ScoreCurve::new(tuning.score.clone()),
                tuning,
                events: Vec::new(),
            }
        }

        fn body(&mut self, x: f32, level: u8) -> BodyId {
            let r = self.tuning.radius_for_level(level);
            self.world
                .create_body(Vec2::new(x, 100.0), r, level, BodyKind::Normal, 0)
                .unwrap()
        }

        fn drain(&mut self, queues: &mut WorkQueues) -> DrainReport {
            let mut ctx = DrainContext {
                world: &mut self.world,
                factory: &self.factory,
                score: &mut self.score,
                curve: &self.curve,
                tuning: &self.tuning,
                events: &mut self.events,
                now: 50,
            };
            drain(queues, &mut ctx)
        }
    }

    fn merge_of(f: &Fixture, a: BodyId, b: BodyId) -> PendingMerge {
        let ba = f.world.body(a).unwrap();
        let bb = f.world.body(b).unwrap();
        PendingMerge {
            id_a: a,
            id_b: b,
            level: ba.level,
            position_a: ba.pos,
            position_b: bb.pos,
        }
    }

    #[test]
    fn test_merge_creates_next_level_at_midpoint() {
        let mut f = Fixture::new();
        let a = f.body(100.0, 3);
        let b = f.body(150.0, 3);
        let mut queues = WorkQueues::new();
        queues.push_merge(merge_of(&f, a, b));

        let report = f.drain(&mut queues);

        assert_eq!(report.merged, 1);
        assert!(!f.world.contains(a) && !f.world.contains(b));
        assert_eq!(f.world.body_count(), 1);
        let product = f.world.bodies().next().unwrap();
        assert_eq!(product.level, 4);
        assert_eq!(product.pos, Vec2::new(125.0, 100.0));
        assert_eq!(product.radius, f.tuning.radius_for_level(4));
        assert_eq!(product.spawn_tick, 50);
        assert_eq!(f.score.total(), f.curve.merge_points(4));
        assert!(queues.is_empty());
    }

    #[test]
    fn test_stale_merge_is_dropped_silently() {
        let mut f = Fixture::new();
        let a = f.body(100.0, 2);
        let b = f.body(150.0, 2);
        let mut queues = WorkQueues::new();
        queues.push_merge(merge_of(&f, a, b));
        f.world.remove_body(b);

        let report = f.drain(&mut queues);

        assert_eq!(report.merged, 0);
        assert_eq!(report.stale, 1);
        assert!(f.world.contains(a));
        assert_eq!(f.score.total(), 0);
    }

    #[test]
    fn test_marked_body_wins_over_merge() {
        let mut f = Fixture::new();
        let a = f.body(100.0, 2);
        let b = f.body(150.0, 2);
        let mut queues = WorkQueues::new();
        queues.push_merge(merge_of(&f, a, b));
        f.world.body_mut(a).unwrap().marked_for_deletion = true;
        queues.push_deletion(a, DeletionReason::AreaKill);

        let report = f.drain(&mut queues);

        assert_eq!(report.merged, 0);
        assert_eq!(report.deleted, 1);
        assert!(!f.world.contains(a));
        assert!(f.world.contains(b));
        assert_eq!(f.score.total(), f.tuning.score.special_kill_bonus);
    }

    #[test]
    fn test_ceiling_merge_vanishes_with_bonus() {
        let mut f = Fixture::new();
        let top = f.tuning.max_level();
        let a = f.body(100.0, top);
        let b = f.body(300.0, top);
        let mut queues = WorkQueues::new();
        queues.push_merge(merge_of(&f, a, b));

        let report = f.drain(&mut queues);

        assert_eq!(report.ceiling_merges, 1);
        assert_eq!(f.world.body_count(), 0);
        assert_eq!(f.score.total(), f.curve.ceiling_points(top));
        assert!(f.score.total() > f.curve.merge_points(top));
        assert!(f
            .events
            .iter()
            .any(|e| matches!(e, GameEvent::CeilingMerge { level, .. } if *level == top)));
    }

    #[test]
    fn test_deletions_classify_and_score() {
        let mut f = Fixture::new();
        let a = f.body(100.0, 1);
        let b = f.body(150.0, 1);
        let c = f.body(200.0, 1);
        let mut queues = WorkQueues::new();
        queues.push_deletion(a, DeletionReason::RowKill);
        queues.push_deletion(b, DeletionReason::SelfKill);
        queues.push_deletion(c, DeletionReason::OutOfBounds);
        // Duplicate requests collapse
        queues.push_deletion(a, DeletionReason::AreaKill);

        let report = f.drain(&mut queues);

        assert_eq!(report.deleted, 3);
        assert_eq!(f.world.body_count(), 0);
        assert_eq!(f.score.total(), f.tuning.score.special_kill_bonus);
        let reasons: Vec<_> = f
            .events
            .iter()
            .filter_map(|e| match e {
                GameEvent::BodyDestroyed { reason, .. } => Some(*reason),
                _ => None,
            })
            .collect();
        assert_eq!(
            reasons,
            vec![
                DeletionReason::RowKill,
                DeletionReason::SelfKill,
                DeletionReason::OutOfBounds
            ]
        );
    }

    #[test]
    fn test_double_deletion_is_stale_not_error() {
        let mut f = Fixture::new();
        let a = f.body(100.0, 1);
        let mut queues = WorkQueues::new();
        queues.push_deletion(a, DeletionReason::AreaKill);
        f.world.remove_body(a);

        let report = f.drain(&mut queues);
        assert_eq!(report.deleted, 0);
        assert_eq!(report.stale, 1);
    }
}
