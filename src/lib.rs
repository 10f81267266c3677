//! Brick Breaker - A Breakout-style arcade simulation core
//!
//! Core modules:
//! - `sim`: Deterministic simulation (entities, collisions, systems, session)
//! - `config`: Data-driven game balance and quality presets
//! - `math`: Geometry helpers shared by collision and the entities
//! - `render`: Read-only drawing contract for an external renderer

pub mod config;
pub mod error;
pub mod math;
pub mod render;
pub mod sim;

pub use config::{Config, QualityPreset};
pub use error::ConfigError;

/// Game configuration constants
pub mod consts {
    /// Milliseconds per frame at the 60fps baseline
    pub const FRAME_MS: f64 = 16.67;
    /// Largest frame delta the session will integrate in one step
    pub const MAX_FRAME_MS: f64 = 100.0;

    /// Maximum paddle deflection either side of vertical (degrees)
    pub const MAX_BOUNCE_ANGLE_DEG: f32 = 60.0;
    /// Smallest upward speed a ball may leave the paddle with
    pub const MIN_UPWARD_SPEED: f32 = 2.0;

    /// Minimum time between two collisions resolved for the same pair (ms)
    pub const PAIR_COOLDOWN_MS: f64 = 50.0;
    /// Cooldown entries older than this are evicted (ms)
    pub const PAIR_EVICT_AGE_MS: f64 = 1000.0;
    /// Ball-level reflection gate (ms)
    pub const BALL_COLLISION_GATE_MS: f64 = 50.0;

    /// Ball trail window (ms) and sample cap
    pub const TRAIL_WINDOW_MS: f64 = 200.0;
    pub const TRAIL_LENGTH: usize = 10;

    /// Number of performance snapshots the assistance system keeps
    pub const PERFORMANCE_HISTORY: usize = 10;
}

/// Scale factor that converts a per-frame rate into one for `dt_ms`
#[inline]
pub fn frame_scale(dt_ms: f64) -> f32 {
    (dt_ms / consts::FRAME_MS) as f32
}
