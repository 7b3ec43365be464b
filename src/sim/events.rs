//! Notifications for the render/effects collaborator
//!
//! The core never draws or plays sounds. It classifies what happened and
//! buffers it here; the shell flushes the buffer once per frame.

use glam::Vec2;
use serde::Serialize;

use super::ability::AbilityKind;
use super::body::{BodyId, BodyKind};
use super::processor::DeletionReason;

/// Why a body appeared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnCause {
    /// New preview at the dispenser
    Preview,
    /// Product of a merge
    Merge,
    /// Placed directly by the host (tests, tutorials)
    Direct,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    BodyCreated {
        id: BodyId,
        level: u8,
        kind: BodyKind,
        position: Vec2,
        cause: SpawnCause,
    },
    BodyLaunched {
        id: BodyId,
        level: u8,
        kind: BodyKind,
    },
    BodyDestroyed {
        id: BodyId,
        level: u8,
        position: Vec2,
        reason: DeletionReason,
    },
    /// A merge was accepted this tick (one-shot audio cue)
    MergeScheduled {
        a: BodyId,
        b: BodyId,
        level: u8,
        position: Vec2,
    },
    Merged {
        into: BodyId,
        level: u8,
        position: Vec2,
        points: u64,
    },
    /// Two top-tier bodies merged and vanished
    CeilingMerge { level: u8, position: Vec2, points: u64 },
    AbilityActivated {
        ability: AbilityKind,
        position: Option<Vec2>,
        targets: usize,
    },
    AbilityFinished { ability: AbilityKind },
    /// A player action was refused (non-blocking notice)
    Rejected { action: &'static str, reason: String },
    GameOver { trigger: BodyId, score: u64 },
    Restarted { reason: &'static str },
}

/// Receives buffered events
pub trait EffectsSink {
    fn on_event(&mut self, event: &GameEvent);
}

impl EffectsSink for Vec<GameEvent> {
    fn on_event(&mut self, event: &GameEvent) {
        self.push(event.clone());
    }
}

/// Discards everything (headless runs)
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EffectsSink for NullSink {
    fn on_event(&mut self, _event: &GameEvent) {}
}
