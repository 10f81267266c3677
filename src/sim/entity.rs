//! Entity model
//!
//! Every simulated object is an [`Entity`]: shared id, motion and lifecycle
//! flags plus a closed [`EntityKind`] payload. Behaviour is dispatched by
//! matching on the kind; there is no trait-object hierarchy.

use bitflags::bitflags;
use glam::Vec2;
use rand_pcg::Pcg32;

use super::ball::Ball;
use super::brick::Brick;
use super::events::EventBus;
use super::paddle::Paddle;
use super::particle::Particle;
use super::powerup::PowerUp;
use crate::config::Config;
use crate::math::{Rect, rect_intersect};
use crate::render::DrawContext;

/// Unique, never-reused entity identifier
pub type EntityId = u32;

/// Simulation clock (ms since session start)
pub type SimTime = f64;

bitflags! {
    /// Non-exclusive classification labels, indexed by the manager
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Tags: u32 {
        const BALL = 1 << 0;
        const COLLIDABLE = 1 << 1;
        const PLAYER = 1 << 2;
        const BRICK = 1 << 3;
        const DESTRUCTIBLE = 1 << 4;
        const SPECIAL = 1 << 5;
        const STEEL = 1 << 6;
        const DURABLE = 1 << 7;
        const EXPLOSIVE = 1 << 8;
        const CHAIN = 1 << 9;
        const ELECTRIC = 1 << 10;
        const MYSTERY = 1 << 11;
        const BONUS = 1 << 12;
        const POWERUP = 1 << 13;
        const COLLECTIBLE = 1 << 14;
        const PARTICLE = 1 << 15;
        const EFFECT = 1 << 16;
    }
}

/// Variant discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityType {
    Ball,
    Paddle,
    Brick,
    PowerUp,
    Particle,
}

impl EntityType {
    /// Back-to-front draw order
    pub const RENDER_ORDER: [EntityType; 5] = [
        EntityType::Brick,
        EntityType::PowerUp,
        EntityType::Paddle,
        EntityType::Ball,
        EntityType::Particle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Ball => "Ball",
            EntityType::Paddle => "Paddle",
            EntityType::Brick => "Brick",
            EntityType::PowerUp => "PowerUp",
            EntityType::Particle => "Particle",
        }
    }
}

/// Position and velocity shared by every variant
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Body {
    pub pos: Vec2,
    pub vel: Vec2,
}

impl Body {
    pub fn at(pos: Vec2) -> Self {
        Self {
            pos: finite_or_zero(pos),
            vel: Vec2::ZERO,
        }
    }
}

/// Outcome of one entity update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Alive,
    /// The entity destroyed itself and should be removed
    Expired,
}

/// Everything an entity may touch while updating
pub struct UpdateCtx<'a> {
    pub bus: &'a EventBus,
    pub config: &'a Config,
    pub now: SimTime,
    pub rng: &'a mut Pcg32,
}

/// Variant payloads
#[derive(Debug, Clone)]
pub enum EntityKind {
    Ball(Ball),
    Paddle(Paddle),
    Brick(Brick),
    PowerUp(PowerUp),
    Particle(Particle),
}

/// A simulated object
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: EntityId,
    pub body: Body,
    /// Participates in simulation
    pub active: bool,
    /// Participates in rendering
    pub visible: bool,
    pub tags: Tags,
    pub kind: EntityKind,
}

impl Entity {
    pub fn new(id: EntityId, pos: Vec2, kind: EntityKind) -> Self {
        let tags = match &kind {
            EntityKind::Ball(_) => Tags::BALL | Tags::COLLIDABLE,
            EntityKind::Paddle(_) => Tags::PLAYER | Tags::COLLIDABLE,
            EntityKind::Brick(brick) => brick.tags(),
            EntityKind::PowerUp(_) => Tags::POWERUP | Tags::COLLECTIBLE,
            EntityKind::Particle(_) => Tags::PARTICLE | Tags::EFFECT,
        };
        Self {
            id,
            body: Body::at(pos),
            active: true,
            visible: true,
            tags,
            kind,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self.kind {
            EntityKind::Ball(_) => EntityType::Ball,
            EntityKind::Paddle(_) => EntityType::Paddle,
            EntityKind::Brick(_) => EntityType::Brick,
            EntityKind::PowerUp(_) => EntityType::PowerUp,
            EntityKind::Particle(_) => EntityType::Particle,
        }
    }

    #[inline]
    pub fn pos(&self) -> Vec2 {
        self.body.pos
    }

    #[inline]
    pub fn vel(&self) -> Vec2 {
        self.body.vel
    }

    pub fn has_tag(&self, tag: Tags) -> bool {
        self.tags.contains(tag)
    }

    /// Axis-aligned bounds. Balls and particles are anchored at their
    /// center, everything else at its top-left corner.
    pub fn bounds(&self) -> Rect {
        let p = self.body.pos;
        match &self.kind {
            EntityKind::Ball(ball) => {
                Rect::new(p.x - ball.radius, p.y - ball.radius, ball.radius * 2.0, ball.radius * 2.0)
            }
            EntityKind::Paddle(paddle) => Rect::new(p.x, p.y, paddle.width, paddle.height),
            EntityKind::Brick(brick) => Rect::new(p.x, p.y, brick.width, brick.height),
            EntityKind::PowerUp(powerup) => Rect::new(p.x, p.y, powerup.width, powerup.height),
            EntityKind::Particle(particle) => Rect::new(
                p.x - particle.size,
                p.y - particle.size,
                particle.size * 2.0,
                particle.size * 2.0,
            ),
        }
    }

    pub fn center(&self) -> Vec2 {
        self.bounds().center()
    }

    /// Move so that the bounds are centered on `center`
    pub fn set_center(&mut self, center: Vec2) {
        let offset = center - self.center();
        self.body.pos += offset;
    }

    /// Strict AABB overlap with another entity
    pub fn intersects(&self, other: &Entity) -> bool {
        rect_intersect(&self.bounds(), &other.bounds())
    }

    pub fn is_within_bounds(&self, area: &Rect) -> bool {
        area.contains_rect(&self.bounds())
    }

    pub fn distance_to(&self, other: &Entity) -> f32 {
        self.center().distance(other.center())
    }

    /// Flag as gone; the manager purges it on its next update
    pub fn destroy(&mut self) {
        self.active = false;
        self.visible = false;
    }

    pub fn is_destroyed(&self) -> bool {
        !self.active && !self.visible
    }

    /// Advance one frame. Inactive entities are skipped.
    pub fn update(&mut self, dt: f64, ctx: &mut UpdateCtx) -> UpdateStatus {
        if !self.active {
            return UpdateStatus::Alive;
        }
        let id = self.id;
        let status = match &mut self.kind {
            EntityKind::Ball(ball) => ball.update(id, &mut self.body, dt, ctx),
            EntityKind::Paddle(paddle) => paddle.update(&mut self.body, dt, ctx),
            EntityKind::Brick(brick) => brick.update(id, &self.body, dt, ctx),
            EntityKind::PowerUp(powerup) => powerup.update(&mut self.body, dt, ctx),
            EntityKind::Particle(particle) => particle.update(&mut self.body, dt, ctx),
        };
        if status == UpdateStatus::Expired {
            self.destroy();
        }
        status
    }

    /// Emit this entity's visual state; never mutates the simulation
    pub fn render(&self, draw: &mut dyn DrawContext) {
        if !self.visible {
            return;
        }
        match &self.kind {
            EntityKind::Ball(ball) => ball.render(&self.body, draw),
            EntityKind::Paddle(paddle) => paddle.render(self.bounds(), draw),
            EntityKind::Brick(brick) => brick.render(self.bounds(), draw),
            EntityKind::PowerUp(powerup) => powerup.render(self.bounds(), draw),
            EntityKind::Particle(particle) => particle.render(&self.body, draw),
        }
    }

    /// Called by the manager right before the entity is dropped
    pub fn on_destroy(&mut self) {
        self.destroy();
        match &mut self.kind {
            EntityKind::Ball(ball) => ball.trail.clear(),
            EntityKind::Brick(brick) => brick.clear_links(),
            _ => {}
        }
    }

    pub fn as_ball(&self) -> Option<&Ball> {
        match &self.kind {
            EntityKind::Ball(ball) => Some(ball),
            _ => None,
        }
    }

    pub fn as_ball_mut(&mut self) -> Option<&mut Ball> {
        match &mut self.kind {
            EntityKind::Ball(ball) => Some(ball),
            _ => None,
        }
    }

    pub fn as_paddle(&self) -> Option<&Paddle> {
        match &self.kind {
            EntityKind::Paddle(paddle) => Some(paddle),
            _ => None,
        }
    }

    pub fn as_paddle_mut(&mut self) -> Option<&mut Paddle> {
        match &mut self.kind {
            EntityKind::Paddle(paddle) => Some(paddle),
            _ => None,
        }
    }

    pub fn as_brick(&self) -> Option<&Brick> {
        match &self.kind {
            EntityKind::Brick(brick) => Some(brick),
            _ => None,
        }
    }

    pub fn as_brick_mut(&mut self) -> Option<&mut Brick> {
        match &mut self.kind {
            EntityKind::Brick(brick) => Some(brick),
            _ => None,
        }
    }

    pub fn as_powerup(&self) -> Option<&PowerUp> {
        match &self.kind {
            EntityKind::PowerUp(powerup) => Some(powerup),
            _ => None,
        }
    }

    pub fn as_particle(&self) -> Option<&Particle> {
        match &self.kind {
            EntityKind::Particle(particle) => Some(particle),
            _ => None,
        }
    }
}

/// Triangle-wave value bouncing between two bounds (glow, pulse)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Oscillator {
    pub value: f32,
    rising: bool,
    min: f32,
    max: f32,
}

impl Oscillator {
    pub fn new(value: f32, min: f32, max: f32) -> Self {
        Self {
            value: value.clamp(min, max),
            rising: true,
            min,
            max,
        }
    }

    pub fn step(&mut self, amount: f32) {
        if self.rising {
            self.value += amount;
            if self.value >= self.max {
                self.value = self.max;
                self.rising = false;
            }
        } else {
            self.value -= amount;
            if self.value <= self.min {
                self.value = self.min;
                self.rising = true;
            }
        }
    }
}

/// Replace non-finite components with zero
pub(crate) fn finite_or_zero(v: Vec2) -> Vec2 {
    Vec2::new(
        if v.x.is_finite() { v.x } else { 0.0 },
        if v.y.is_finite() { v.y } else { 0.0 },
    )
}

/// Clamp a dimension to a small positive value
pub(crate) fn positive_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_non_finite_position_is_zeroed() {
        let config = Config::default();
        let paddle = Paddle::new(&config);
        let e = Entity::new(1, Vec2::new(f32::NAN, 10.0), EntityKind::Paddle(paddle));
        assert_eq!(e.pos(), Vec2::new(0.0, 10.0));
    }

    #[test]
    fn test_bounds_and_center() {
        let config = Config::default();
        let ball = Entity::new(1, Vec2::new(100.0, 100.0), EntityKind::Ball(Ball::new(&config)));
        let b = ball.bounds();
        assert_eq!(b, Rect::new(92.0, 92.0, 16.0, 16.0));
        assert_eq!(ball.center(), Vec2::new(100.0, 100.0));

        let mut paddle = Entity::new(2, Vec2::new(300.0, 550.0), EntityKind::Paddle(Paddle::new(&config)));
        assert_eq!(paddle.center(), Vec2::new(350.0, 557.5));
        paddle.set_center(Vec2::new(400.0, 557.5));
        assert_eq!(paddle.pos(), Vec2::new(350.0, 550.0));
        assert!(!ball.intersects(&paddle));
    }

    #[test]
    fn test_destroy_flags() {
        let config = Config::default();
        let mut e = Entity::new(1, Vec2::ZERO, EntityKind::Ball(Ball::new(&config)));
        assert!(e.has_tag(Tags::BALL | Tags::COLLIDABLE));
        e.destroy();
        assert!(e.is_destroyed());
    }

    #[test]
    fn test_oscillator_bounces() {
        let mut osc = Oscillator::new(0.0, 0.0, 1.0);
        osc.step(0.6);
        osc.step(0.6);
        assert_eq!(osc.value, 1.0);
        osc.step(0.5);
        assert_eq!(osc.value, 0.5);
    }
}
