//! Danger-line dwell accounting
//!
//! A body only ends the run after it has stayed above the line for longer
//! than the threshold. Held previews and bodies still in their grace
//! period never accumulate dwell.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::body::BodyId;
use super::world::PhysicsWorld;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorState {
    #[default]
    Running,
    /// Terminal
    Over { trigger: BodyId, at_tick: u64 },
}

#[derive(Debug, Clone)]
pub struct GameOverDetector {
    danger_line: f32,
    threshold_ticks: u64,
    grace_ticks: u64,
    dwell: BTreeMap<BodyId, u64>,
    state: DetectorState,
}

impl GameOverDetector {
    pub fn new(danger_line: f32, threshold_ticks: u64, grace_ticks: u64) -> Self {
        Self {
            danger_line,
            threshold_ticks,
            grace_ticks,
            dwell: BTreeMap::new(),
            state: DetectorState::Running,
        }
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn is_over(&self) -> bool {
        matches!(self.state, DetectorState::Over { .. })
    }

    pub fn danger_line(&self) -> f32 {
        self.danger_line
    }

    /// Ticks a body has spent above the line (0 if unknown)
    pub fn dwell_of(&self, id: BodyId) -> u64 {
        self.dwell.get(&id).copied().unwrap_or(0)
    }

    /// Run once per tick after the drain.
    ///
    /// Returns the triggering body on the tick the detector flips to over;
    /// later calls return `None`.
    pub fn check(&mut self, world: &PhysicsWorld, now: u64) -> Option<BodyId> {
        if self.is_over() {
            return None;
        }

        // Forget bodies that left the world
        self.dwell.retain(|id, _| world.contains(*id));

        let mut trigger = None;
        for body in world.bodies() {
            let exempt = !body.is_active() || body.in_grace(now, self.grace_ticks);
            if exempt || body.pos.y <= self.danger_line {
                self.dwell.remove(&body.id);
                continue;
            }
            let ticks = self.dwell.entry(body.id).or_insert(0);
            *ticks += 1;
            if *ticks > self.threshold_ticks && trigger.is_none() {
                trigger = Some(body.id);
            }
        }

        if let Some(id) = trigger {
            self.state = DetectorState::Over {
                trigger: id,
                at_tick: now,
            };
        }
        trigger
    }
}
