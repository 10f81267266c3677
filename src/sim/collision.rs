//! Collision detection and response
//!
//! Runs once per frame after the entity pass: ball/paddle, ball/brick and
//! power-up/paddle, in that order. Each (a, b) pair is rate limited by a
//! cooldown on the simulation clock.

use std::collections::BTreeMap;

use glam::Vec2;

use super::assist::AssistanceLevel;
use super::entity::{EntityId, EntityKind, EntityType, SimTime, UpdateCtx};
use super::events::GameEvent;
use super::manager::EntityManager;
use crate::consts::{PAIR_COOLDOWN_MS, PAIR_EVICT_AGE_MS};
use crate::math::{circle_rect_intersect, ray_rect_intersect, rect_intersect};

/// Nearest entity along a ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub entity: EntityId,
    pub distance: f32,
    pub point: Vec2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollisionDebugInfo {
    pub active_pairs: usize,
    pub cooldown_ms: f64,
    pub assistance_level: AssistanceLevel,
}

#[derive(Debug, Default)]
pub struct CollisionSystem {
    /// Pair key (lower id first) to last resolution time
    last_collision: BTreeMap<(EntityId, EntityId), SimTime>,
    assistance_level: AssistanceLevel,
}

fn pair_key(a: EntityId, b: EntityId) -> (EntityId, EntityId) {
    if a < b { (a, b) } else { (b, a) }
}

impl CollisionSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assistance_level(&self) -> AssistanceLevel {
        self.assistance_level
    }

    pub fn set_assistance_level(&mut self, level: AssistanceLevel) {
        self.assistance_level = level;
    }

    fn can_collide(&self, a: EntityId, b: EntityId, now: SimTime) -> bool {
        self.last_collision
            .get(&pair_key(a, b))
            .is_none_or(|t| now - t >= PAIR_COOLDOWN_MS)
    }

    fn record(&mut self, a: EntityId, b: EntityId, now: SimTime) {
        self.last_collision.insert(pair_key(a, b), now);
    }

    pub fn update(&mut self, manager: &mut EntityManager, ctx: &mut UpdateCtx) {
        self.check_ball_paddle(manager, ctx);
        self.check_ball_brick(manager, ctx);
        self.check_powerup_paddle(manager, ctx);
        self.cleanup(ctx.now);
    }

    fn check_ball_paddle(&mut self, manager: &mut EntityManager, ctx: &mut UpdateCtx) {
        let bonus = ctx
            .config
            .ai
            .assistance
            .paddle_bonus(self.assistance_level);
        let paddles = manager.ids_by_type(EntityType::Paddle);

        for ball_id in manager.ids_by_type(EntityType::Ball) {
            for &paddle_id in &paddles {
                let Some((ball_entity, paddle_entity)) = manager.get_pair_mut(ball_id, paddle_id) else {
                    continue;
                };
                if !ball_entity.active {
                    continue;
                }
                let (EntityKind::Ball(ball), EntityKind::Paddle(paddle)) =
                    (&mut ball_entity.kind, &paddle_entity.kind)
                else {
                    continue;
                };
                if ball.on_paddle {
                    continue;
                }

                let paddle_pos = paddle_entity.body.pos;
                let paddle_rect = paddle.collision_rect(paddle_pos, bonus);
                let ball_rect = ball.circle(&ball_entity.body).bounds();

                if ball_entity.body.vel.y > 0.0
                    && ball.can_collide(ctx.now)
                    && self.can_collide(ball_id, paddle_id, ctx.now)
                    && rect_intersect(&ball_rect, &paddle_rect)
                {
                    let angle = paddle.bounce_angle(paddle_pos.x, ball_entity.body.pos.x);
                    ball.deflect_from_paddle(&mut ball_entity.body, angle, paddle_pos.y, ctx.now);
                    self.record(ball_id, paddle_id, ctx.now);
                    ctx.bus.publish(GameEvent::BallPaddleHit {
                        ball: ball_id,
                        paddle: Some(paddle_id),
                        pos: ball_entity.body.pos,
                    });
                } else if !ball.missed && ball_rect.y > paddle_pos.y + paddle.height {
                    ball.missed = true;
                    ctx.bus.publish(GameEvent::PaddleMissed { ball: ball_id });
                }
            }
        }
    }

    fn check_ball_brick(&mut self, manager: &mut EntityManager, ctx: &mut UpdateCtx) {
        let bricks = manager.ids_by_type(EntityType::Brick);

        for ball_id in manager.ids_by_type(EntityType::Ball) {
            for &brick_id in &bricks {
                let Some((ball_entity, brick_entity)) = manager.get_pair_mut(ball_id, brick_id) else {
                    continue;
                };
                if !ball_entity.active || !brick_entity.visible {
                    continue;
                }
                let EntityKind::Ball(ball) = &mut ball_entity.kind else {
                    continue;
                };
                if ball.on_paddle || !self.can_collide(ball_id, brick_id, ctx.now) {
                    continue;
                }
                let brick_rect = brick_entity.bounds();
                if !circle_rect_intersect(&ball.circle(&ball_entity.body), &brick_rect) {
                    continue;
                }

                // A gated reflection still counts as a hit on the brick
                ball.reflect_off_rect(&mut ball_entity.body, &brick_rect, ctx.now);
                self.record(ball_id, brick_id, ctx.now);
                ctx.bus.publish(GameEvent::CollisionDetected {
                    ball: ball_id,
                    other: brick_id,
                    other_type: EntityType::Brick,
                    pos: ball_entity.body.pos,
                });

                if brick_entity.hit_brick(ctx) {
                    manager.queue_remove(brick_id);
                }
            }
        }
    }

    fn check_powerup_paddle(&mut self, manager: &mut EntityManager, ctx: &mut UpdateCtx) {
        let paddles = manager.ids_by_type(EntityType::Paddle);

        for powerup_id in manager.ids_by_type(EntityType::PowerUp) {
            for &paddle_id in &paddles {
                let Some((powerup_entity, paddle_entity)) = manager.get_pair_mut(powerup_id, paddle_id)
                else {
                    continue;
                };
                if !powerup_entity.active || !rect_intersect(&powerup_entity.bounds(), &paddle_entity.bounds()) {
                    continue;
                }
                let (EntityKind::PowerUp(powerup), EntityKind::Paddle(paddle)) =
                    (&powerup_entity.kind, &mut paddle_entity.kind)
                else {
                    continue;
                };
                powerup.collect(powerup_id, &powerup_entity.body, paddle, ctx.config, ctx.now, ctx.bus);
                powerup_entity.destroy();
                manager.queue_remove(powerup_id);
                break;
            }
        }
    }

    fn cleanup(&mut self, now: SimTime) {
        self.last_collision
            .retain(|_, t| now - *t <= PAIR_EVICT_AGE_MS);
    }

    /// Nearest active entity hit by a ray within `max_distance`
    pub fn raycast(
        &self,
        manager: &EntityManager,
        origin: Vec2,
        dir: Vec2,
        max_distance: f32,
        entity_type: Option<EntityType>,
    ) -> Option<RaycastHit> {
        manager
            .all_entities()
            .filter(|e| e.active && entity_type.is_none_or(|t| e.entity_type() == t))
            .filter_map(|e| {
                ray_rect_intersect(origin, dir, &e.bounds()).map(|hit| RaycastHit {
                    entity: e.id,
                    distance: hit.distance,
                    point: hit.point,
                })
            })
            .filter(|hit| hit.distance < max_distance)
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    /// First active entity of `entity_type` containing `point`
    pub fn entity_at_point(
        &self,
        manager: &EntityManager,
        point: Vec2,
        entity_type: EntityType,
    ) -> Option<EntityId> {
        manager
            .entities_by_type(entity_type)
            .find(|e| e.active && e.bounds().contains_point(point))
            .map(|e| e.id)
    }

    pub fn debug_info(&self) -> CollisionDebugInfo {
        CollisionDebugInfo {
            active_pairs: self.last_collision.len(),
            cooldown_ms: PAIR_COOLDOWN_MS,
            assistance_level: self.assistance_level,
        }
    }

    pub fn reset(&mut self) {
        self.last_collision.clear();
        self.assistance_level = AssistanceLevel::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sim::ball::Ball;
    use crate::sim::brick::Brick;
    use crate::sim::events::{EventBus, EventKind, record};
    use crate::sim::paddle::Paddle;
    use crate::sim::powerup::{PowerUp, PowerUpKind};
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    struct World {
        config: Config,
        bus: EventBus,
        rng: Pcg32,
        manager: EntityManager,
        collision: CollisionSystem,
    }

    impl World {
        fn new() -> Self {
            Self {
                config: Config::default(),
                bus: EventBus::new(),
                rng: Pcg32::seed_from_u64(2),
                manager: EntityManager::new(),
                collision: CollisionSystem::new(),
            }
        }

        fn paddle(&mut self, x: f32) -> EntityId {
            let paddle = Paddle::new(&self.config);
            self.manager.spawn(Vec2::new(x, 550.0), EntityKind::Paddle(paddle))
        }

        fn ball(&mut self, pos: Vec2, vel: Vec2) -> EntityId {
            let id = self.manager.spawn(pos, EntityKind::Ball(Ball::multi_ball(&self.config)));
            self.manager.flush(&self.bus);
            if let Some(e) = self.manager.get_mut(id) {
                e.body.vel = vel;
            }
            id
        }

        fn step(&mut self, now: SimTime) {
            self.manager.flush(&self.bus);
            let mut ctx = UpdateCtx {
                bus: &self.bus,
                config: &self.config,
                now,
                rng: &mut self.rng,
            };
            self.collision.update(&mut self.manager, &mut ctx);
        }

        fn vel(&self, id: EntityId) -> Vec2 {
            self.manager.get(id).map(|e| e.vel()).unwrap_or_default()
        }
    }

    #[test]
    fn test_paddle_right_side_deflects_right() {
        let mut w = World::new();
        let log = record(&w.bus, &[EventKind::BallPaddleHit]);
        w.paddle(300.0);
        let ball = w.ball(Vec2::new(375.0, 545.0), Vec2::new(0.0, 5.0));
        w.step(100.0);

        let vel = w.vel(ball);
        assert!(vel.x > 0.0);
        assert!(vel.y <= -2.0);
        assert_eq!(w.manager.get(ball).unwrap().pos().y, 550.0 - 8.0);
        assert!(matches!(
            log.borrow()[0],
            GameEvent::BallPaddleHit { paddle: Some(_), .. }
        ));
    }

    #[test]
    fn test_paddle_pair_cooldown_and_direction() {
        let mut w = World::new();
        let log = record(&w.bus, &[EventKind::BallPaddleHit]);
        w.paddle(300.0);
        let ball = w.ball(Vec2::new(350.0, 545.0), Vec2::new(0.0, 5.0));
        w.step(100.0);
        assert_eq!(log.borrow().len(), 1);

        let reset = |w: &mut World, vy: f32| {
            let body = &mut w.manager.get_mut(ball).unwrap().body;
            body.pos = Vec2::new(350.0, 545.0);
            body.vel = Vec2::new(0.0, vy);
        };

        // Pushed back down inside the cooldown window: ignored
        reset(&mut w, 5.0);
        w.step(120.0);
        assert_eq!(log.borrow().len(), 1);

        // Moving up never collides with the paddle
        reset(&mut w, -5.0);
        w.step(300.0);
        assert_eq!(log.borrow().len(), 1);

        reset(&mut w, 5.0);
        w.step(400.0);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_paddle_respects_ball_gate() {
        let mut w = World::new();
        let log = record(&w.bus, &[EventKind::BallPaddleHit]);
        w.paddle(300.0);
        let ball = w.ball(Vec2::new(350.0, 545.0), Vec2::new(0.0, 5.0));
        if let Some(EntityKind::Ball(b)) = w.manager.get_mut(ball).map(|e| &mut e.kind) {
            // Reflected off a wall 30 ms earlier
            b.last_collision = Some(70.0);
        }
        w.step(100.0);
        assert!(log.borrow().is_empty());
        assert_eq!(w.vel(ball), Vec2::new(0.0, 5.0));

        w.step(120.0);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_assistance_widens_paddle() {
        let mut w = World::new();
        let log = record(&w.bus, &[EventKind::BallPaddleHit]);
        w.paddle(300.0);
        // Just past the right edge of the base rect
        w.ball(Vec2::new(415.0, 545.0), Vec2::new(0.0, 5.0));
        w.step(100.0);
        assert!(log.borrow().is_empty());

        w.collision.set_assistance_level(AssistanceLevel::Active);
        w.step(200.0);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_paddle_missed_published_once() {
        let mut w = World::new();
        let log = record(&w.bus, &[EventKind::PaddleMissed]);
        w.paddle(300.0);
        w.ball(Vec2::new(100.0, 580.0), Vec2::new(0.0, 5.0));
        w.step(100.0);
        w.step(200.0);
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_brick_hit_and_removal() {
        let mut w = World::new();
        let log = record(&w.bus, &[EventKind::CollisionDetected, EventKind::BrickDestroyed]);
        let brick = w
            .manager
            .spawn(Vec2::new(100.0, 100.0), EntityKind::Brick(Brick::standard(&w.config, 0)));
        let ball = w.ball(Vec2::new(137.0, 125.0), Vec2::new(1.0, -4.0));
        w.step(100.0);

        assert!(w.vel(ball).y > 0.0);
        assert!(w.manager.get(brick).unwrap().is_destroyed());
        assert_eq!(log.borrow().len(), 2);
        w.manager.flush(&w.bus);
        assert!(w.manager.get(brick).is_none());
    }

    #[test]
    fn test_same_tick_multi_brick_hits() {
        let mut w = World::new();
        let log = record(&w.bus, &[EventKind::BrickHit]);
        w.manager
            .spawn(Vec2::new(100.0, 100.0), EntityKind::Brick(Brick::standard(&w.config, 0)));
        w.manager
            .spawn(Vec2::new(180.0, 100.0), EntityKind::Brick(Brick::standard(&w.config, 0)));
        // In the gap between the two bricks
        let ball = w.ball(Vec2::new(177.5, 118.0), Vec2::new(1.0, -4.0));
        w.step(100.0);

        assert_eq!(log.borrow().len(), 2);
        // Only the first contact reflected the ball
        let vel = w.vel(ball);
        assert!(vel.x < 0.0 && vel.y < 0.0);
    }

    #[test]
    fn test_powerup_collected_once() {
        let mut w = World::new();
        let log = record(&w.bus, &[EventKind::PowerUpCollected, EventKind::PowerUpActivated]);
        let paddle = w.paddle(300.0);
        let (body, powerup) = PowerUp::create_of_type(
            &mut w.rng,
            &w.config,
            Vec2::new(350.0, 552.0),
            PowerUpKind::WidePaddle,
        )
        .unwrap();
        let id = w.manager.spawn(body.pos, EntityKind::PowerUp(powerup));
        w.step(100.0);
        w.step(120.0);

        assert_eq!(log.borrow().len(), 2);
        assert!(w.manager.get(id).is_none());
        assert!(w.manager.get(paddle).unwrap().as_paddle().unwrap().wide.active);
    }

    #[test]
    fn test_cooldowns_are_evicted() {
        let mut w = World::new();
        w.paddle(300.0);
        w.ball(Vec2::new(350.0, 545.0), Vec2::new(0.0, 5.0));
        w.step(100.0);
        assert_eq!(w.collision.debug_info().active_pairs, 1);
        w.step(1200.0);
        assert_eq!(w.collision.debug_info().active_pairs, 0);
    }

    #[test]
    fn test_raycast_nearest() {
        let mut w = World::new();
        let near = w
            .manager
            .spawn(Vec2::new(100.0, 100.0), EntityKind::Brick(Brick::standard(&w.config, 0)));
        w.manager
            .spawn(Vec2::new(100.0, 300.0), EntityKind::Brick(Brick::standard(&w.config, 0)));
        w.manager.flush(&w.bus);

        let hit = w
            .collision
            .raycast(&w.manager, Vec2::new(130.0, 500.0), Vec2::new(0.0, -1.0), 1000.0, None)
            .unwrap();
        assert_ne!(hit.entity, near);
        assert!((hit.distance - 180.0).abs() < 1e-3);
        assert!(w
            .collision
            .raycast(&w.manager, Vec2::new(130.0, 500.0), Vec2::new(0.0, -1.0), 100.0, None)
            .is_none());
        assert_eq!(
            w.collision
                .entity_at_point(&w.manager, Vec2::new(110.0, 110.0), EntityType::Brick),
            Some(near)
        );
    }
}
