//! Recoverable engine errors
//!
//! Nothing in here is fatal. Callers either surface the error to the UI as a
//! notice (`InsufficientResources`, `NoValidTargets`) or drop it after logging
//! (`InvalidGeometry`, `StaleReference`).

use thiserror::Error;

use crate::sim::{AbilityKind, BodyId};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Non-finite or out-of-field coordinates
    #[error("invalid geometry: {0}")]
    InvalidGeometry(&'static str),

    #[error("ability costs {cost:.1} but only {available:.1} is available")]
    InsufficientResources { cost: f32, available: f32 },

    /// An area/row/disturbance effect found nothing to act on
    #[error("no valid targets for ability")]
    NoValidTargets,

    /// A queued merge or deletion referenced a body that is already gone
    #[error("body {0} no longer exists")]
    StaleReference(BodyId),

    /// Ability is armed or still consumed
    #[error("ability {} is not available", .0.as_str())]
    AbilityUnavailable(AbilityKind),

    #[error("launch is on cooldown")]
    LaunchCooldown,

    #[error("game is over")]
    GameOver,

    #[error("game is paused")]
    Paused,

    #[error("invalid tuning: {0}")]
    InvalidTuning(String),
}

impl EngineError {
    /// Whether the UI should show this to the player as a notice
    pub fn is_player_visible(&self) -> bool {
        matches!(
            self,
            EngineError::InsufficientResources { .. }
                | EngineError::NoValidTargets
                | EngineError::AbilityUnavailable(_)
        )
    }
}
