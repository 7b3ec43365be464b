//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by body ID)
//! - Bodies created or removed only outside contact resolution
//! - No rendering or platform dependencies

pub mod ability;
pub mod body;
pub mod collision;
pub mod contact;
pub mod events;
pub mod factory;
pub mod game_over;
pub mod processor;
pub mod score;
pub mod state;
pub mod tick;
pub mod world;

pub use ability::{
    Abilities, AbilityKind, AbilityOutcome, AbilityState, ResourcePool, ResourceProvider,
};
pub use body::{Body, BodyId, BodyKind, BodySnapshot, SpecialKind};
pub use collision::{CollisionResult, circle_circle_collision, circle_segment_collision};
pub use contact::{
    BodyLookup, ContactLedger, ContactResolution, ContactRules, PairKey, PendingMerge, Rejection,
    SpecialTrigger, resolve_contacts,
};
pub use events::{EffectsSink, GameEvent, NullSink, SpawnCause};
pub use factory::{BallFactory, LaunchRequest, Preview};
pub use game_over::{DetectorState, GameOverDetector};
pub use processor::{DeletionReason, DrainReport, PendingDeletion, WorkQueues};
pub use score::{Score, ScoreCurve};
pub use state::{GamePhase, GameState};
pub use tick::{FixedStepper, TickInput, TickStats, tick};
pub use world::{Boundary, BoundaryId, BoundaryTag, Contactant, PhysicsParams, PhysicsWorld, RawContact};
