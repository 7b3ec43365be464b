//! Merge Drop - a drop-and-merge puzzle core
//!
//! Core modules:
//! - `sim`: Deterministic simulation (physics world, contacts, merges, abilities)
//! - `tuning`: Data-driven game balance
//! - `error`: Recoverable engine errors
//! - `web`: Browser bindings (wasm32 only)

pub mod error;
pub mod sim;
pub mod tuning;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use error::EngineError;
pub use tuning::Tuning;

/// Game configuration constants
pub mod consts {
    /// Fixed simulation timestep (60 Hz)
    pub const SIM_DT: f32 = 1.0 / 60.0;
    /// Simulation ticks per second, matching `SIM_DT`
    pub const TICKS_PER_SECOND: u32 = 60;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Play-field dimensions (y grows upward, floor at y = 0)
    pub const FIELD_WIDTH: f32 = 420.0;
    pub const FIELD_HEIGHT: f32 = 700.0;

    /// Distance at which two surfaces count as touching
    pub const CONTACT_SLOP: f32 = 0.5;
}

/// Convert a duration in milliseconds to whole simulation ticks (rounded up)
#[inline]
pub fn ms_to_ticks(ms: u32) -> u64 {
    let ticks_per_sec = consts::TICKS_PER_SECOND as u64;
    (ms as u64 * ticks_per_sec).div_ceil(1000)
}

/// Convert a tick count back to milliseconds (rounded down)
#[inline]
pub fn ticks_to_ms(ticks: u64) -> u64 {
    ticks * 1000 / consts::TICKS_PER_SECOND as u64
}
