//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Caller-supplied frame deltas, clamped before use
//! - Seeded RNG streams only (gameplay and visuals kept apart)
//! - Stable iteration order (by entity ID)
//! - No rendering or platform dependencies

pub mod achievements;
pub mod assist;
pub mod ball;
pub mod brick;
pub mod collision;
pub mod combo;
pub mod effects;
pub mod entity;
pub mod events;
pub mod manager;
pub mod paddle;
pub mod particle;
pub mod powerup;
pub mod session;

pub use achievements::{Achievement, AchievementSystem, Rarity, SessionStats};
pub use assist::{AssistanceLevel, AssistanceSystem, PerformanceSnapshot, Trend};
pub use ball::Ball;
pub use brick::{Brick, BrickKind, MysteryBonus};
pub use collision::CollisionSystem;
pub use combo::ComboSystem;
pub use effects::EffectsSystem;
pub use entity::{Body, Entity, EntityId, EntityKind, EntityType, Tags, UpdateCtx};
pub use events::{EventBus, EventKind, GameEvent};
pub use manager::EntityManager;
pub use paddle::Paddle;
pub use particle::{Particle, ParticleStyle};
pub use powerup::{PowerUp, PowerUpKind};
pub use session::{FrameInput, GamePhase, Session, SessionSummary};
