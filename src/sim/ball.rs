//! Ball entity
//!
//! A ball is either docked on the paddle (zero velocity, snapped to the
//! paddle every tick by the manager) or in flight at a renormalized speed.

use std::collections::VecDeque;

use glam::Vec2;
use rand::Rng;

use super::entity::{Body, EntityId, Oscillator, SimTime, UpdateCtx, UpdateStatus, positive_or};
use super::events::{EventBus, GameEvent, Wall};
use crate::config::{Color, Config};
use crate::consts::*;
use crate::frame_scale;
use crate::math::{Circle, Rect, random};
use crate::render::{DrawContext, Shape};

/// Trail sample for rendering
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailPoint {
    pub pos: Vec2,
    pub time: SimTime,
}

#[derive(Debug, Clone)]
pub struct Ball {
    pub radius: f32,
    /// Target speed (units per 60fps frame)
    pub speed: f32,
    pub on_paddle: bool,
    pub launched: bool,
    /// Oldest first
    pub trail: VecDeque<TrailPoint>,
    pub bounce_count: u32,
    /// Last wall/paddle/brick reflection, gates repeated reflections
    pub last_collision: Option<SimTime>,
    pub color: Color,
    pub glow: Oscillator,
    /// Already reported as having slipped past the paddle
    pub missed: bool,
}

impl Ball {
    /// A ball docked on the paddle
    pub fn new(config: &Config) -> Self {
        Self {
            radius: positive_or(config.ball.radius, 1.0),
            speed: config.ball.speed,
            on_paddle: true,
            launched: false,
            trail: VecDeque::with_capacity(TRAIL_LENGTH + 1),
            bounce_count: 0,
            last_collision: None,
            color: config.ball.color,
            glow: Oscillator::new(0.0, 0.0, 1.0),
            missed: false,
        }
    }

    /// An in-flight ball spawned by the multi-ball power-up
    pub fn multi_ball(config: &Config) -> Self {
        Self {
            on_paddle: false,
            launched: true,
            color: config.ball.multi_ball_color,
            ..Self::new(config)
        }
    }

    pub fn in_flight(&self) -> bool {
        !self.on_paddle
    }

    /// Whether the ball-level reflection gate is open at `now`
    pub fn can_collide(&self, now: SimTime) -> bool {
        self.last_collision
            .is_none_or(|t| now - t >= BALL_COLLISION_GATE_MS)
    }

    pub fn circle(&self, body: &Body) -> Circle {
        Circle::new(body.pos, self.radius)
    }

    pub fn update(
        &mut self,
        id: EntityId,
        body: &mut Body,
        dt: f64,
        ctx: &mut UpdateCtx,
    ) -> UpdateStatus {
        self.glow.step((dt / 1000.0 * 3.0) as f32);

        if self.on_paddle {
            body.vel = Vec2::ZERO;
            return UpdateStatus::Alive;
        }

        body.pos += body.vel * frame_scale(dt);
        body.vel = maintain_speed(
            body.vel,
            self.speed,
            ctx.config.ball.min_speed,
            ctx.config.ball.max_speed,
        );
        self.record_trail(body.pos, ctx.now);
        self.check_bounds(id, body, ctx)
    }

    fn record_trail(&mut self, pos: Vec2, now: SimTime) {
        self.trail.push_back(TrailPoint { pos, time: now });
        while self
            .trail
            .front()
            .is_some_and(|p| now - p.time >= TRAIL_WINDOW_MS)
        {
            self.trail.pop_front();
        }
        while self.trail.len() > TRAIL_LENGTH {
            self.trail.pop_front();
        }
    }

    /// Wall reflections and the bottom-edge loss check
    fn check_bounds(&mut self, id: EntityId, body: &mut Body, ctx: &mut UpdateCtx) -> UpdateStatus {
        let width = ctx.config.canvas.width;
        let height = ctx.config.canvas.height;

        if body.pos.y - self.radius > height {
            ctx.bus.publish(GameEvent::BallLost { ball: id, pos: body.pos });
            return UpdateStatus::Expired;
        }

        if !self.can_collide(ctx.now) {
            return UpdateStatus::Alive;
        }

        let mut wall = None;
        if body.pos.x - self.radius <= 0.0 {
            body.pos.x = self.radius;
            body.vel.x = body.vel.x.abs();
            wall = Some(Wall::Left);
        }
        if body.pos.x + self.radius >= width {
            body.pos.x = width - self.radius;
            body.vel.x = -body.vel.x.abs();
            wall = Some(Wall::Right);
        }
        if body.pos.y - self.radius <= 0.0 {
            body.pos.y = self.radius;
            body.vel.y = body.vel.y.abs();
            wall = Some(Wall::Top);
        }

        if let Some(wall) = wall {
            self.last_collision = Some(ctx.now);
            self.bounce_count += 1;
            ctx.bus.publish(GameEvent::BallWallHit {
                ball: id,
                wall,
                pos: body.pos,
            });
        }
        UpdateStatus::Alive
    }

    /// Leave the paddle. `angle` is measured from vertical; `None` picks a
    /// small random angle.
    pub fn launch<R: Rng>(
        &mut self,
        id: EntityId,
        body: &mut Body,
        angle: Option<f32>,
        rng: &mut R,
        bus: &EventBus,
    ) {
        if !self.on_paddle {
            return;
        }
        self.on_paddle = false;
        self.launched = true;

        let angle = angle.unwrap_or_else(|| random(rng, -0.2, 0.2));
        body.vel = Vec2::new(angle.sin() * self.speed, -angle.cos() * self.speed);
        if body.vel.y > -MIN_UPWARD_SPEED {
            body.vel.y = -MIN_UPWARD_SPEED;
        }

        bus.publish(GameEvent::BallPaddleHit {
            ball: id,
            paddle: None,
            pos: body.pos,
        });
    }

    /// Redirect off the paddle at `angle` from vertical, keeping the
    /// current speed, and sit the ball flush on `paddle_top`
    pub fn deflect_from_paddle(&mut self, body: &mut Body, angle: f32, paddle_top: f32, now: SimTime) {
        let speed = body.vel.length();
        body.vel = Vec2::new(angle.sin() * speed, -angle.cos() * speed);
        if body.vel.y > -MIN_UPWARD_SPEED {
            body.vel.y = -MIN_UPWARD_SPEED;
        }
        body.pos.y = paddle_top - self.radius;
        self.last_collision = Some(now);
        self.bounce_count += 1;
        self.missed = false;
    }

    /// Reflect off a brick along the axis of least penetration.
    ///
    /// Returns `false` when the ball-level gate suppressed the reflection.
    pub fn reflect_off_rect(&mut self, body: &mut Body, rect: &Rect, now: SimTime) -> bool {
        if !self.can_collide(now) {
            return false;
        }

        let center = rect.center();
        let dx = body.pos.x - center.x;
        let dy = body.pos.y - center.y;
        let overlap_x = (rect.width / 2.0 + self.radius) - dx.abs();
        let overlap_y = (rect.height / 2.0 + self.radius) - dy.abs();

        if overlap_x < overlap_y {
            body.vel.x = -body.vel.x;
            body.pos.x = if dx > 0.0 {
                rect.right() + self.radius
            } else {
                rect.x - self.radius
            };
        } else {
            body.vel.y = -body.vel.y;
            body.pos.y = if dy > 0.0 {
                rect.bottom() + self.radius
            } else {
                rect.y - self.radius
            };
        }

        self.last_collision = Some(now);
        self.bounce_count += 1;
        true
    }

    /// Push horizontal velocity toward `target_x` when more than
    /// `min_distance` away
    pub fn apply_nudge(&self, body: &mut Body, target_x: f32, force: f32, min_distance: f32) {
        if self.on_paddle {
            return;
        }
        let dx = target_x - body.pos.x;
        if dx.abs() > min_distance {
            body.vel.x += force.copysign(dx);
        }
    }

    /// Damp velocity when the ball runs faster than `threshold`
    pub fn apply_speed_reduction(&self, body: &mut Body, factor: f32, threshold: f32) {
        if self.on_paddle {
            return;
        }
        if body.vel.length() > threshold {
            body.vel *= factor;
        }
    }

    /// Snap above the paddle's center
    pub fn position_on_paddle(&self, body: &mut Body, paddle: &Rect) {
        body.pos = Vec2::new(paddle.center().x, paddle.y - self.radius);
        body.vel = Vec2::ZERO;
    }

    /// Return to the docked state
    pub fn dock(&mut self, body: &mut Body, paddle: &Rect) {
        self.on_paddle = true;
        self.launched = false;
        self.trail.clear();
        self.last_collision = None;
        self.missed = false;
        self.position_on_paddle(body, paddle);
    }

    pub fn render(&self, body: &Body, draw: &mut dyn DrawContext) {
        let Some(newest) = self.trail.back() else {
            return self.render_core(body, draw);
        };
        for point in self.trail.iter().take(self.trail.len().saturating_sub(1)) {
            let age = newest.time - point.time;
            let alpha = (1.0 - (age / TRAIL_WINDOW_MS) as f32).max(0.0);
            if alpha > 0.0 {
                draw.draw(Shape::Circle {
                    center: point.pos,
                    radius: self.radius * alpha * 0.5,
                    color: self.color,
                    alpha: alpha * 0.3,
                });
            }
        }
        self.render_core(body, draw);
    }

    fn render_core(&self, body: &Body, draw: &mut dyn DrawContext) {
        draw.draw(Shape::Circle {
            center: body.pos,
            radius: self.radius,
            color: self.color,
            alpha: 1.0,
        });
        draw.draw(Shape::Circle {
            center: body.pos,
            radius: self.radius,
            color: self.color,
            alpha: 0.3 + self.glow.value * 0.4,
        });
    }
}

/// Rescale `vel` to `clamp(speed, min, max)`; a zero velocity stays zero
pub fn maintain_speed(vel: Vec2, speed: f32, min: f32, max: f32) -> Vec2 {
    if vel.length_squared() == 0.0 {
        return vel;
    }
    vel.normalize_or_zero() * speed.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::events::{EventKind, record};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn in_flight(config: &Config, pos: Vec2, vel: Vec2) -> (Ball, Body) {
        let ball = Ball::multi_ball(config);
        (ball, Body { pos, vel })
    }

    proptest! {
        #[test]
        fn prop_maintain_speed_hits_clamped_target(
            vx in -50.0f32..50.0,
            vy in -50.0f32..50.0,
            speed in 0.0f32..20.0,
            rounds in 1usize..8,
        ) {
            prop_assume!(vx.abs() > 1e-3 || vy.abs() > 1e-3);
            let mut vel = Vec2::new(vx, vy);
            for _ in 0..rounds {
                vel = maintain_speed(vel, speed, 2.0, 8.0);
            }
            let target = speed.clamp(2.0, 8.0);
            prop_assert!((vel.length() - target).abs() < 1e-3);
        }
    }

    #[test]
    fn test_maintain_speed_zero_stays_zero() {
        assert_eq!(maintain_speed(Vec2::ZERO, 4.0, 2.0, 8.0), Vec2::ZERO);
    }

    #[test]
    fn test_launch_enforces_upward_speed() {
        let config = Config::default();
        let bus = EventBus::new();
        let log = record(&bus, &[EventKind::BallPaddleHit]);
        let mut rng = Pcg32::seed_from_u64(1);
        let mut ball = Ball::new(&config);
        let mut body = Body::at(Vec2::new(400.0, 540.0));

        // Nearly horizontal launch gets its vertical component floored
        ball.launch(1, &mut body, Some(1.5), &mut rng, &bus);
        assert!(!ball.on_paddle && ball.launched);
        assert!(body.vel.y <= -MIN_UPWARD_SPEED);
        assert_eq!(log.borrow().len(), 1);

        // Launching again is a no-op
        ball.launch(1, &mut body, None, &mut rng, &bus);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_wall_bounce_and_gate() {
        let config = Config::default();
        let bus = EventBus::new();
        let log = record(&bus, &[EventKind::BallWallHit]);
        let mut rng = Pcg32::seed_from_u64(1);
        let (mut ball, mut body) = in_flight(&config, Vec2::new(5.0, 300.0), Vec2::new(-4.0, 0.0));
        let mut ctx = UpdateCtx {
            bus: &bus,
            config: &config,
            now: 1000.0,
            rng: &mut rng,
        };

        assert_eq!(ball.update(1, &mut body, FRAME_MS, &mut ctx), UpdateStatus::Alive);
        assert!(body.vel.x > 0.0);
        assert_eq!(body.pos.x, ball.radius);
        assert_eq!(ball.bounce_count, 1);
        assert_eq!(log.borrow().len(), 1);

        // Inside the gate a second contact is ignored
        body.vel.x = -4.0;
        body.pos.x = 1.0;
        ctx.now = 1010.0;
        ball.update(1, &mut body, FRAME_MS, &mut ctx);
        assert_eq!(ball.bounce_count, 1);
    }

    #[test]
    fn test_ball_lost_below_bottom() {
        let config = Config::default();
        let bus = EventBus::new();
        let log = record(&bus, &[EventKind::BallLost]);
        let mut rng = Pcg32::seed_from_u64(1);
        let (mut ball, mut body) = in_flight(&config, Vec2::new(400.0, 612.0), Vec2::new(0.0, 4.0));
        let mut ctx = UpdateCtx {
            bus: &bus,
            config: &config,
            now: 0.0,
            rng: &mut rng,
        };
        assert_eq!(ball.update(7, &mut body, FRAME_MS, &mut ctx), UpdateStatus::Expired);
        assert!(matches!(log.borrow()[0], GameEvent::BallLost { ball: 7, .. }));
    }

    #[test]
    fn test_reflect_off_rect_picks_min_overlap_axis() {
        let config = Config::default();
        let rect = Rect::new(100.0, 100.0, 75.0, 20.0);

        // Coming up into the bottom face
        let (mut ball, mut body) = in_flight(&config, Vec2::new(137.0, 125.0), Vec2::new(1.0, -4.0));
        assert!(ball.reflect_off_rect(&mut body, &rect, 0.0));
        assert!(body.vel.y > 0.0);
        assert_eq!(body.pos.y, rect.bottom() + ball.radius);

        // Gate blocks an immediate second reflection
        assert!(!ball.reflect_off_rect(&mut body, &rect, 10.0));

        // Side hit
        let (mut ball, mut body) = in_flight(&config, Vec2::new(95.0, 110.0), Vec2::new(4.0, 1.0));
        assert!(ball.reflect_off_rect(&mut body, &rect, 0.0));
        assert!(body.vel.x < 0.0);
        assert_eq!(body.pos.x, rect.x - ball.radius);
    }

    #[test]
    fn test_nudge_and_damping() {
        let config = Config::default();
        let (ball, mut body) = in_flight(&config, Vec2::new(100.0, 300.0), Vec2::new(0.0, -7.0));
        let assistance = &config.ai.assistance;
        ball.apply_nudge(&mut body, 400.0, 0.1, assistance.nudge_distance);
        assert!((body.vel.x - 0.1).abs() < 1e-6);
        ball.apply_nudge(&mut body, 120.0, 0.1, assistance.nudge_distance);
        assert!((body.vel.x - 0.1).abs() < 1e-6);
        // A wider dead zone swallows the same gap
        ball.apply_nudge(&mut body, 400.0, 0.1, 350.0);
        assert!((body.vel.x - 0.1).abs() < 1e-6);

        let before = body.vel.length();
        ball.apply_speed_reduction(&mut body, 0.95, assistance.speed_control_threshold);
        assert!((body.vel.length() - before * 0.95).abs() < 1e-4);
        let before = body.vel.length();
        ball.apply_speed_reduction(&mut body, 0.95, 10.0);
        assert_eq!(body.vel.length(), before);
    }

    #[test]
    fn test_trail_is_windowed_and_capped() {
        let mut ball = Ball::new(&Config::default());
        for i in 0..20 {
            ball.record_trail(Vec2::splat(i as f32), i as f64 * 10.0);
        }
        assert_eq!(ball.trail.len(), TRAIL_LENGTH);
        for i in 0..5 {
            ball.record_trail(Vec2::ZERO, 1000.0 + i as f64);
        }
        assert!(ball.trail.iter().all(|p| p.time >= 1000.0));
    }
}
