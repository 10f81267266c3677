//! Falling power-up capsules
//!
//! Spawned at a destroyed brick, they fall with a slight bob until the
//! paddle catches them or they leave the playfield.

use std::f32::consts::TAU;
use std::str::FromStr;

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::entity::{Body, EntityId, Oscillator, SimTime, UpdateCtx, UpdateStatus, positive_or};
use super::events::{EventBus, GameEvent};
use super::paddle::Paddle;
use crate::config::{Color, Config, PowerUpSpec};
use crate::error::ConfigError;
use crate::frame_scale;
use crate::math::{Rect, random};
use crate::render::{DrawContext, Shape};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerUpKind {
    WidePaddle,
    MultiBall,
}

impl FromStr for PowerUpKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [PowerUpKind::WidePaddle, PowerUpKind::MultiBall]
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownName {
                kind: "power-up type",
                name: s.to_string(),
            })
    }
}

impl PowerUpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerUpKind::WidePaddle => "widePaddle",
            PowerUpKind::MultiBall => "multiBall",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PowerUpKind::WidePaddle => "Increases paddle width for 15 seconds",
            PowerUpKind::MultiBall => "Creates 2 additional balls",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PowerUp {
    pub kind: PowerUpKind,
    pub name: String,
    pub color: Color,
    pub width: f32,
    pub height: f32,
    pub fall_speed: f32,
    pub glow: Oscillator,
    pub pulse: Oscillator,
    pub rotation: f32,
    pub rotation_speed: f32,
    bob_phase: f32,
    bob_amplitude: f32,
    bob_speed: f32,
}

impl PowerUp {
    pub fn new<R: Rng>(config: &Config, spec: &PowerUpSpec, rng: &mut R) -> Self {
        Self {
            kind: spec.kind,
            name: spec.name.clone(),
            color: spec.color,
            width: positive_or(config.powerups.width, 1.0),
            height: positive_or(config.powerups.height, 1.0),
            fall_speed: config.powerups.fall_speed,
            glow: Oscillator::new(0.0, 0.0, 1.0),
            pulse: Oscillator::new(1.0, 0.8, 1.2),
            rotation: 0.0,
            rotation_speed: random(rng, 1.0, 3.0),
            bob_phase: random(rng, 0.0, TAU),
            bob_amplitude: 2.0,
            bob_speed: 3.0,
        }
    }

    /// Roll the drop chance at `center`; on success pick a random kind.
    ///
    /// Returns the falling body (top-left anchored) and the payload.
    pub fn create_at_position<R: Rng>(
        rng: &mut R,
        config: &Config,
        center: Vec2,
    ) -> Option<(Body, PowerUp)> {
        if rng.random::<f64>() >= config.powerups.drop_chance {
            return None;
        }
        let types = &config.powerups.types;
        if types.is_empty() {
            return None;
        }
        let spec = &types[rng.random_range(0..types.len())];
        Some(PowerUp::spawn(rng, config, center, spec))
    }

    /// Create a specific kind; `None` (with a warning) if it isn't configured
    pub fn create_of_type<R: Rng>(
        rng: &mut R,
        config: &Config,
        center: Vec2,
        kind: PowerUpKind,
    ) -> Option<(Body, PowerUp)> {
        let Some(spec) = config.powerups.spec(kind) else {
            log::warn!("Power-up type '{}' not found", kind.as_str());
            return None;
        };
        Some(PowerUp::spawn(rng, config, center, spec))
    }

    fn spawn<R: Rng>(rng: &mut R, config: &Config, center: Vec2, spec: &PowerUpSpec) -> (Body, PowerUp) {
        let powerup = PowerUp::new(config, spec, rng);
        let body = Body {
            pos: center - Vec2::new(powerup.width, powerup.height) / 2.0,
            vel: Vec2::new(0.0, powerup.fall_speed),
        };
        (body, powerup)
    }

    pub fn update(&mut self, body: &mut Body, dt: f64, ctx: &mut UpdateCtx) -> UpdateStatus {
        let scale = frame_scale(dt);

        body.pos.y += body.vel.y * scale;
        let t = (ctx.now / 1000.0) as f32;
        let bob = (t * self.bob_speed + self.bob_phase).sin() * self.bob_amplitude;
        body.pos.x += bob * scale * 0.1;

        self.glow.step(scale * 0.05);
        self.pulse.step(scale * 0.02);
        self.rotation = (self.rotation + self.rotation_speed * scale * 0.1) % TAU;

        if body.pos.y > ctx.config.canvas.height + self.height {
            UpdateStatus::Expired
        } else {
            UpdateStatus::Alive
        }
    }

    /// Caught by the paddle: announce, apply the effect once, announce the
    /// activation. The caller destroys the entity.
    pub fn collect(
        &self,
        id: EntityId,
        body: &Body,
        paddle: &mut Paddle,
        config: &Config,
        now: SimTime,
        bus: &EventBus,
    ) {
        bus.publish(GameEvent::PowerUpCollected {
            powerup: id,
            kind: self.kind,
            pos: body.pos,
        });

        let duration_ms = match self.kind {
            PowerUpKind::WidePaddle => {
                paddle.activate_wide(now, config.paddle.wide_duration, config.paddle.wide_width);
                config.paddle.wide_duration
            }
            PowerUpKind::MultiBall => {
                bus.publish(GameEvent::MultiBallCreate { pos: body.pos });
                0.0
            }
        };

        bus.publish(GameEvent::PowerUpActivated {
            kind: self.kind,
            duration_ms,
        });
    }

    pub fn render(&self, bounds: Rect, draw: &mut dyn DrawContext) {
        let scale = Vec2::splat(self.pulse.value);
        draw.draw(Shape::Rect {
            rect: bounds,
            color: self.color,
            alpha: 1.0,
            scale,
            rotation: self.rotation,
        });
        draw.draw(Shape::Rect {
            rect: Rect::new(bounds.x + 2.0, bounds.y + 2.0, bounds.width - 4.0, bounds.height - 4.0),
            color: Color::WHITE,
            alpha: (0.3 + self.glow.value * 0.4) * 0.5,
            scale,
            rotation: self.rotation,
        });
    }
}
