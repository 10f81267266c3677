//! Player paddle
//!
//! Driven by an input snapshot (keys or pointer), clamped to the playfield
//! after every move, and optionally widened by the wide power-up.

use glam::Vec2;

use super::entity::{Body, Oscillator, SimTime, UpdateCtx, UpdateStatus, positive_or};
use super::events::{EventBus, GameEvent};
use super::powerup::PowerUpKind;
use crate::config::{Color, Config};
use crate::consts::MAX_BOUNCE_ANGLE_DEG;
use crate::frame_scale;
use crate::math::Rect;
use crate::render::{DrawContext, Shape};

/// Latest input intents for the paddle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PaddleInput {
    pub left: bool,
    pub right: bool,
    /// Absolute pointer x in playfield coordinates
    pub pointer_x: f32,
    /// Pointer control instead of keys
    pub use_pointer: bool,
}

/// Wide power-up timer
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WideState {
    pub active: bool,
    pub end_time: SimTime,
}

#[derive(Debug, Clone)]
pub struct Paddle {
    pub width: f32,
    pub height: f32,
    /// Key-control speed (units per 60fps frame)
    pub speed: f32,
    pub color: Color,
    pub original_width: f32,
    pub input: PaddleInput,
    pub wide: WideState,
    pub glow: Oscillator,
}

impl Paddle {
    pub fn new(config: &Config) -> Self {
        let width = positive_or(config.paddle.width, 1.0);
        Self {
            width,
            height: positive_or(config.paddle.height, 1.0),
            speed: config.paddle.speed,
            color: config.paddle.color,
            original_width: width,
            input: PaddleInput::default(),
            wide: WideState::default(),
            glow: Oscillator::new(0.0, 0.0, 1.0),
        }
    }

    /// Starting position: horizontally centered on the configured row
    pub fn spawn_position(config: &Config) -> Vec2 {
        Vec2::new(
            (config.canvas.width - config.paddle.width) / 2.0,
            config.paddle.y_position,
        )
    }

    pub fn set_input(&mut self, input: PaddleInput) {
        self.input = input;
    }

    pub fn update(&mut self, body: &mut Body, dt: f64, ctx: &mut UpdateCtx) -> UpdateStatus {
        let scale = frame_scale(dt);

        if self.input.use_pointer {
            let target = self.input.pointer_x - self.width / 2.0;
            let diff = target - body.pos.x;
            if diff.abs() > 1.0 {
                body.pos.x += diff * ctx.config.paddle.pointer_easing;
            }
        } else {
            let step = self.speed * scale;
            if self.input.left {
                body.pos.x -= step;
            }
            if self.input.right {
                body.pos.x += step;
            }
        }

        if self.wide.active && ctx.now >= self.wide.end_time {
            self.deactivate_wide(ctx.bus);
        }

        self.glow.step((dt / 1000.0 * 2.0) as f32);
        self.constrain(body, ctx.config.canvas.width);
        UpdateStatus::Alive
    }

    /// Clamp into `[0, field_width - width]`
    pub fn constrain(&self, body: &mut Body, field_width: f32) {
        body.pos.x = body.pos.x.clamp(0.0, (field_width - self.width).max(0.0));
    }

    /// Collision rectangle widened symmetrically by `bonus`
    pub fn collision_rect(&self, pos: Vec2, bonus: f32) -> Rect {
        Rect::new(pos.x, pos.y, self.width, self.height).widened(bonus)
    }

    /// Deflection angle from vertical for a ball at `ball_x`.
    ///
    /// Left edge maps to -60°, right edge to +60°, linear in between.
    pub fn bounce_angle(&self, paddle_x: f32, ball_x: f32) -> f32 {
        let hit = ((ball_x - paddle_x) / self.width).clamp(0.0, 1.0);
        (hit - 0.5) * 2.0 * MAX_BOUNCE_ANGLE_DEG.to_radians()
    }

    /// Widen the paddle, or extend the timer if already wide.
    ///
    /// Returns `true` on a fresh activation.
    pub fn activate_wide(&mut self, now: SimTime, duration: f64, wide_width: f32) -> bool {
        self.wide.end_time = now + duration;
        if self.wide.active {
            return false;
        }
        self.width = positive_or(wide_width, self.original_width);
        self.wide.active = true;
        true
    }

    pub fn deactivate_wide(&mut self, bus: &EventBus) {
        self.width = self.original_width;
        self.wide = WideState::default();
        bus.publish(GameEvent::PowerUpExpired {
            kind: PowerUpKind::WidePaddle,
        });
    }

    /// Remaining wide time (ms), if active
    pub fn wide_time_left(&self, now: SimTime) -> Option<f64> {
        self.wide
            .active
            .then(|| (self.wide.end_time - now).max(0.0))
    }

    /// Back to spawn with no power-ups and no held input
    pub fn reset(&mut self, body: &mut Body, config: &Config) {
        body.pos = Paddle::spawn_position(config);
        body.vel = Vec2::ZERO;
        self.width = self.original_width;
        self.wide = WideState::default();
        self.input = PaddleInput::default();
    }

    pub fn render(&self, bounds: Rect, draw: &mut dyn DrawContext) {
        draw.draw(Shape::Rect {
            rect: bounds,
            color: self.color,
            alpha: 1.0,
            scale: Vec2::ONE,
            rotation: 0.0,
        });
        if self.wide.active {
            draw.draw(Shape::Rect {
                rect: bounds,
                color: Color::rgb(0x00, 0xFF, 0xFF),
                alpha: 0.3 + self.glow.value * 0.4,
                scale: Vec2::ONE,
                rotation: 0.0,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::FRAME_MS;
    use crate::sim::events::{EventKind, record};
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_bounce_angle_range() {
        let paddle = Paddle::new(&Config::default());
        let max = 60f32.to_radians();
        assert!((paddle.bounce_angle(300.0, 300.0) + max).abs() < 1e-5);
        assert!((paddle.bounce_angle(300.0, 400.0) - max).abs() < 1e-5);
        assert!(paddle.bounce_angle(300.0, 350.0).abs() < 1e-6);
        // Right of center deflects right
        assert!(paddle.bounce_angle(300.0, 375.0) > 0.0);
        // Off-paddle hits clamp to the edges
        assert!((paddle.bounce_angle(300.0, 1000.0) - max).abs() < 1e-5);
    }

    #[test]
    fn test_key_movement_is_clamped() {
        let config = Config::default();
        let bus = EventBus::new();
        let mut rng = Pcg32::seed_from_u64(1);
        let mut paddle = Paddle::new(&config);
        let mut body = Body::at(Vec2::new(3.0, 550.0));
        paddle.set_input(PaddleInput {
            left: true,
            ..Default::default()
        });
        let mut ctx = UpdateCtx {
            bus: &bus,
            config: &config,
            now: 0.0,
            rng: &mut rng,
        };
        paddle.update(&mut body, FRAME_MS, &mut ctx);
        assert_eq!(body.pos.x, 0.0);

        paddle.set_input(PaddleInput {
            pointer_x: 10_000.0,
            use_pointer: true,
            ..Default::default()
        });
        for _ in 0..200 {
            paddle.update(&mut body, FRAME_MS, &mut ctx);
        }
        assert_eq!(body.pos.x, config.canvas.width - paddle.width);
    }

    #[test]
    fn test_wide_activation_extends_then_expires() {
        let config = Config::default();
        let bus = EventBus::new();
        let log = record(&bus, &[EventKind::PowerUpExpired]);
        let mut rng = Pcg32::seed_from_u64(1);
        let mut paddle = Paddle::new(&config);
        let mut body = Body::at(Paddle::spawn_position(&config));

        assert!(paddle.activate_wide(0.0, 1000.0, 150.0));
        assert_eq!(paddle.width, 150.0);
        assert!(!paddle.activate_wide(500.0, 1000.0, 150.0));
        assert_eq!(paddle.wide_time_left(500.0), Some(1000.0));

        let mut ctx = UpdateCtx {
            bus: &bus,
            config: &config,
            now: 1200.0,
            rng: &mut rng,
        };
        paddle.update(&mut body, FRAME_MS, &mut ctx);
        assert!(paddle.wide.active);

        ctx.now = 1500.0;
        paddle.update(&mut body, FRAME_MS, &mut ctx);
        assert!(!paddle.wide.active);
        assert_eq!(paddle.width, 100.0);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_collision_rect_bonus_is_symmetric() {
        let paddle = Paddle::new(&Config::default());
        let rect = paddle.collision_rect(Vec2::new(300.0, 550.0), 20.0);
        assert_eq!(rect, Rect::new(290.0, 550.0, 120.0, 15.0));
    }
}
