//! Adaptive difficulty
//!
//! Watches gameplay telemetry on the bus and, every analysis interval of
//! simulation time, picks an assistance tier. The tier widens the paddle's
//! collision rectangle (read by the collision system) and, at the top tier,
//! steers and damps balls in flight.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::collision::CollisionSystem;
use super::entity::{EntityId, EntityKind, EntityType, SimTime};
use super::events::{ContextId, EventBus, EventKind, GameEvent, handler};
use super::manager::EntityManager;
use crate::config::{AiConfig, AiThresholds};
use crate::consts::PERFORMANCE_HISTORY;

/// Assistance tier, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum AssistanceLevel {
    #[default]
    None,
    Subtle,
    Active,
}

impl AssistanceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistanceLevel::None => "None",
            AssistanceLevel::Subtle => "Subtle",
            AssistanceLevel::Active => "Active",
        }
    }
}

/// Direction of the last few analyses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Improving => "improving",
            Trend::Declining => "declining",
            Trend::Stable => "stable",
            Trend::InsufficientData => "insufficient_data",
        }
    }
}

/// Raw counters since the last reset
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerformanceMetrics {
    pub balls_lost: u32,
    pub bricks_hit: u32,
    pub total_bounces: u32,
    pub paddle_hits: u32,
    pub paddle_misses: u32,
    /// Time spent on the current level (ms)
    pub time_on_level: f64,
    pub consecutive_deaths: u32,
}

/// Derived ratios at one analysis
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSnapshot {
    pub timestamp: SimTime,
    /// Paddle hits over paddle hits plus misses
    pub accuracy: f64,
    /// Bricks hit per ball bounce
    pub brick_hit_rate: f64,
    /// Balls lost per second on the level
    pub ball_loss_rate: f64,
    pub consecutive_deaths: u32,
    pub total_bounces: u32,
    pub bricks_hit: u32,
    pub balls_lost: u32,
    pub time_spent_s: f64,
    pub level: AssistanceLevel,
}

impl PerformanceMetrics {
    pub fn snapshot(&self, timestamp: SimTime) -> PerformanceSnapshot {
        let attempts = self.paddle_hits + self.paddle_misses;
        let accuracy = if attempts > 0 {
            self.paddle_hits as f64 / attempts as f64
        } else {
            0.0
        };
        let brick_hit_rate = if self.total_bounces > 0 {
            self.bricks_hit as f64 / self.total_bounces as f64
        } else {
            0.0
        };
        let seconds = self.time_on_level / 1000.0;
        let ball_loss_rate = if seconds > 0.0 {
            self.balls_lost as f64 / seconds
        } else {
            0.0
        };
        PerformanceSnapshot {
            timestamp,
            accuracy,
            brick_hit_rate,
            ball_loss_rate,
            consecutive_deaths: self.consecutive_deaths,
            total_bounces: self.total_bounces,
            bricks_hit: self.bricks_hit,
            balls_lost: self.balls_lost,
            time_spent_s: seconds,
            level: AssistanceLevel::None,
        }
    }
}

/// Tier for a snapshot. ACTIVE wins over SUBTLE.
pub fn determine_level(snapshot: &PerformanceSnapshot, thresholds: &AiThresholds) -> AssistanceLevel {
    if snapshot.accuracy < thresholds.poor_accuracy
        || snapshot.consecutive_deaths > thresholds.max_consecutive_deaths
    {
        return AssistanceLevel::Active;
    }
    if snapshot.accuracy < thresholds.fair_accuracy
        || snapshot.brick_hit_rate < thresholds.poor_brick_hit_rate
        || snapshot.ball_loss_rate > thresholds.max_ball_loss_rate
    {
        return AssistanceLevel::Subtle;
    }
    AssistanceLevel::None
}

#[derive(Debug, Default)]
struct AssistState {
    metrics: PerformanceMetrics,
    level: AssistanceLevel,
    history: VecDeque<PerformanceSnapshot>,
    last_analysis: SimTime,
    now: SimTime,
}

impl AssistState {
    fn reset_metrics(&mut self) {
        self.metrics = PerformanceMetrics::default();
        self.last_analysis = self.now;
    }

    fn trend(&self) -> Trend {
        if self.history.len() < 3 {
            return Trend::InsufficientData;
        }
        let first = &self.history[self.history.len() - 3];
        let last = &self.history[self.history.len() - 1];
        let accuracy = last.accuracy - first.accuracy;
        let bricks = last.brick_hit_rate - first.brick_hit_rate;
        if accuracy > 0.1 && bricks > 0.1 {
            Trend::Improving
        } else if accuracy < -0.1 && bricks < -0.1 {
            Trend::Declining
        } else {
            Trend::Stable
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssistDebugInfo {
    pub active: bool,
    pub level: AssistanceLevel,
    pub metrics: PerformanceMetrics,
    pub history_len: usize,
    pub trend: Trend,
    pub last_analysis: SimTime,
    pub next_analysis: SimTime,
}

/// Telemetry observer and tier controller
#[derive(Debug)]
pub struct AssistanceSystem {
    state: Rc<RefCell<AssistState>>,
    context: ContextId,
    config: AiConfig,
    active: bool,
}

impl AssistanceSystem {
    pub fn new(config: &AiConfig, bus: &EventBus) -> Self {
        let state = Rc::new(RefCell::new(AssistState::default()));
        let context = bus.new_context();
        Self::subscribe(&state, context, bus);
        Self {
            state,
            context,
            config: config.clone(),
            active: true,
        }
    }

    fn subscribe(state: &Rc<RefCell<AssistState>>, context: ContextId, bus: &EventBus) {
        let on = |kind: EventKind, f: fn(&mut AssistState)| {
            let state = Rc::clone(state);
            bus.subscribe(
                kind,
                handler(move |bus, _| {
                    let changed = {
                        let mut s = state.borrow_mut();
                        let before = s.level;
                        f(&mut s);
                        (before != s.level).then_some((before, s.level))
                    };
                    if let Some((from, to)) = changed {
                        bus.publish(GameEvent::AssistanceChanged { from, to });
                    }
                }),
                Some(context),
                false,
            );
        };

        on(EventKind::BallLost, |s| {
            s.metrics.balls_lost += 1;
            s.metrics.paddle_misses += 1;
        });
        on(EventKind::BallPaddleHit, |s| {
            s.metrics.paddle_hits += 1;
            s.metrics.total_bounces += 1;
            s.metrics.consecutive_deaths = 0;
        });
        on(EventKind::BallWallHit, |s| s.metrics.total_bounces += 1);
        on(EventKind::BrickHit, |s| s.metrics.bricks_hit += 1);
        on(EventKind::PlayerLifeLost, |s| s.metrics.consecutive_deaths += 1);
        on(EventKind::LevelStart, |s| {
            s.metrics.time_on_level = 0.0;
            s.metrics.consecutive_deaths = 0;
        });
        on(EventKind::GameStart, |s| s.reset_metrics());
        on(EventKind::GameRestart, |s| {
            s.reset_metrics();
            s.history.clear();
            s.level = AssistanceLevel::None;
        });
    }

    pub fn level(&self) -> AssistanceLevel {
        self.state.borrow().level
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.state.borrow().metrics
    }

    pub fn history(&self) -> Vec<PerformanceSnapshot> {
        self.state.borrow().history.iter().cloned().collect()
    }

    pub fn trend(&self) -> Trend {
        self.state.borrow().trend()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Turning assistance off drops straight back to NONE
    pub fn set_active(&mut self, active: bool, collision: &mut CollisionSystem, bus: &EventBus) {
        self.active = active;
        if !active {
            self.set_level(AssistanceLevel::None, bus);
            collision.set_assistance_level(AssistanceLevel::None);
        }
    }

    fn set_level(&self, level: AssistanceLevel, bus: &EventBus) {
        let from = std::mem::replace(&mut self.state.borrow_mut().level, level);
        if from != level {
            log::debug!("Assistance {} -> {}", from.as_str(), level.as_str());
            bus.publish(GameEvent::AssistanceChanged { from, to: level });
        }
    }

    pub fn update(
        &mut self,
        dt: f64,
        now: SimTime,
        manager: &mut EntityManager,
        collision: &mut CollisionSystem,
        bus: &EventBus,
    ) {
        let due = {
            let mut s = self.state.borrow_mut();
            s.now = now;
            if !self.active {
                return;
            }
            s.metrics.time_on_level += dt;
            now - s.last_analysis >= self.config.analysis_interval
        };
        if due {
            self.force_analysis(bus);
        }

        let level = self.level();
        collision.set_assistance_level(level);
        if level == AssistanceLevel::Active {
            self.steer_balls(manager);
        }
    }

    /// Analyze now regardless of the interval
    pub fn force_analysis(&mut self, bus: &EventBus) {
        let (snapshot, trend) = {
            let mut s = self.state.borrow_mut();
            let now = s.now;
            let mut snapshot = s.metrics.snapshot(now);
            snapshot.level = determine_level(&snapshot, &self.config.thresholds);
            s.history.push_back(snapshot.clone());
            while s.history.len() > PERFORMANCE_HISTORY {
                s.history.pop_front();
            }
            s.last_analysis = now;
            (snapshot, s.trend())
        };

        self.set_level(snapshot.level, bus);
        bus.publish(GameEvent::PerformanceAnalyzed { snapshot, trend });
    }

    fn steer_balls(&self, manager: &mut EntityManager) {
        let targets: Vec<Vec2> = manager
            .entities_by_type(EntityType::Brick)
            .filter(|e| e.visible)
            .map(|e| e.center())
            .collect();
        if targets.is_empty() {
            return;
        }

        let assistance = &self.config.assistance;
        let balls: Vec<EntityId> = manager.ids_by_type(EntityType::Ball);
        for id in balls {
            let Some(entity) = manager.get_mut(id) else {
                continue;
            };
            let pos = entity.body.pos;
            let Some(target) = targets
                .iter()
                .min_by(|a, b| a.distance(pos).total_cmp(&b.distance(pos)))
            else {
                continue;
            };
            let body = &mut entity.body;
            if let EntityKind::Ball(ball) = &entity.kind {
                if !ball.in_flight() {
                    continue;
                }
                ball.apply_nudge(body, target.x, assistance.ball_nudge_force, assistance.nudge_distance);
                ball.apply_speed_reduction(
                    body,
                    assistance.speed_reduction,
                    assistance.speed_control_threshold,
                );
            }
        }
    }

    pub fn debug_info(&self) -> AssistDebugInfo {
        let s = self.state.borrow();
        AssistDebugInfo {
            active: self.active,
            level: s.level,
            metrics: s.metrics,
            history_len: s.history.len(),
            trend: s.trend(),
            last_analysis: s.last_analysis,
            next_analysis: s.last_analysis + self.config.analysis_interval,
        }
    }

    /// Drop every subscription this system registered
    pub fn detach(&self, bus: &EventBus) {
        bus.remove_context(self.context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sim::ball::Ball;
    use crate::sim::brick::Brick;
    use crate::sim::events::record;
    use proptest::prelude::*;

    fn snapshot(accuracy: f64, brick_hit_rate: f64, ball_loss_rate: f64, deaths: u32) -> PerformanceSnapshot {
        PerformanceSnapshot {
            timestamp: 0.0,
            accuracy,
            brick_hit_rate,
            ball_loss_rate,
            consecutive_deaths: deaths,
            total_bounces: 0,
            bricks_hit: 0,
            balls_lost: 0,
            time_spent_s: 0.0,
            level: AssistanceLevel::None,
        }
    }

    #[test]
    fn test_tier_priority() {
        let t = AiThresholds::default();
        assert_eq!(determine_level(&snapshot(0.9, 0.5, 0.0, 3), &t), AssistanceLevel::Active);
        assert_eq!(determine_level(&snapshot(0.5, 0.5, 0.0, 0), &t), AssistanceLevel::Subtle);
        assert_eq!(determine_level(&snapshot(0.9, 0.05, 0.0, 0), &t), AssistanceLevel::Subtle);
        assert_eq!(determine_level(&snapshot(0.9, 0.5, 0.6, 0), &t), AssistanceLevel::Subtle);
        assert_eq!(determine_level(&snapshot(0.9, 0.5, 0.5, 2), &t), AssistanceLevel::None);
    }

    proptest! {
        #[test]
        fn prop_poor_accuracy_is_active(
            accuracy in 0.0f64..0.3,
            rate in 0.0f64..1.0,
            loss in 0.0f64..2.0,
            deaths in 0u32..10,
        ) {
            let t = AiThresholds::default();
            prop_assert_eq!(determine_level(&snapshot(accuracy, rate, loss, deaths), &t), AssistanceLevel::Active);
        }

        #[test]
        fn prop_good_play_is_none(
            accuracy in 0.6f64..=1.0,
            rate in 0.1f64..1.0,
            loss in 0.0f64..=0.5,
            deaths in 0u32..=2,
        ) {
            let t = AiThresholds::default();
            prop_assert_eq!(determine_level(&snapshot(accuracy, rate, loss, deaths), &t), AssistanceLevel::None);
        }
    }

    #[test]
    fn test_analysis_from_telemetry() {
        let config = Config::default();
        let bus = EventBus::new();
        let log = record(&bus, &[EventKind::AssistanceChanged, EventKind::PerformanceAnalyzed]);
        let mut assist = AssistanceSystem::new(&config.ai, &bus);
        let mut manager = EntityManager::new();
        let mut collision = CollisionSystem::new();

        // One paddle hit, three losses: accuracy 0.25
        bus.publish(GameEvent::BallPaddleHit { ball: 1, paddle: Some(2), pos: Vec2::ZERO });
        for _ in 0..3 {
            bus.publish(GameEvent::BallLost { ball: 1, pos: Vec2::ZERO });
        }
        assert_eq!(assist.metrics().paddle_misses, 3);

        assist.update(4_000.0, 4_000.0, &mut manager, &mut collision, &bus);
        assert!(log.borrow().is_empty());

        assist.update(1_000.0, 5_000.0, &mut manager, &mut collision, &bus);
        assert_eq!(assist.level(), AssistanceLevel::Active);
        assert_eq!(collision.assistance_level(), AssistanceLevel::Active);
        let events = log.borrow();
        assert_eq!(
            events[0],
            GameEvent::AssistanceChanged { from: AssistanceLevel::None, to: AssistanceLevel::Active }
        );
        match &events[1] {
            GameEvent::PerformanceAnalyzed { snapshot, trend } => {
                assert_eq!(snapshot.accuracy, 0.25);
                assert_eq!(snapshot.ball_loss_rate, 3.0 / 5.0);
                assert_eq!(*trend, Trend::InsufficientData);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_history_is_bounded_and_restart_clears() {
        let config = Config::default();
        let bus = EventBus::new();
        let mut assist = AssistanceSystem::new(&config.ai, &bus);
        for _ in 0..15 {
            assist.force_analysis(&bus);
        }
        assert_eq!(assist.history().len(), PERFORMANCE_HISTORY);
        assert_eq!(assist.trend(), Trend::Stable);
        assert_eq!(assist.level(), AssistanceLevel::Active);

        bus.publish(GameEvent::GameRestart);
        assert!(assist.history().is_empty());
        assert_eq!(assist.level(), AssistanceLevel::None);
    }

    #[test]
    fn test_deaths_reset_by_paddle_hit() {
        let config = Config::default();
        let bus = EventBus::new();
        let assist = AssistanceSystem::new(&config.ai, &bus);
        bus.publish(GameEvent::PlayerLifeLost { lives: 2 });
        bus.publish(GameEvent::PlayerLifeLost { lives: 1 });
        assert_eq!(assist.metrics().consecutive_deaths, 2);
        bus.publish(GameEvent::BallPaddleHit { ball: 1, paddle: None, pos: Vec2::ZERO });
        assert_eq!(assist.metrics().consecutive_deaths, 0);
    }

    #[test]
    fn test_disabled_forces_none() {
        let config = Config::default();
        let bus = EventBus::new();
        let mut assist = AssistanceSystem::new(&config.ai, &bus);
        let mut collision = CollisionSystem::new();
        assist.force_analysis(&bus);
        assert_eq!(assist.level(), AssistanceLevel::Active);

        assist.set_active(false, &mut collision, &bus);
        assert_eq!(assist.level(), AssistanceLevel::None);
        let mut manager = EntityManager::new();
        assist.update(10_000.0, 10_000.0, &mut manager, &mut collision, &bus);
        assert_eq!(assist.level(), AssistanceLevel::None);
        assert_eq!(assist.history().len(), 1);
    }

    #[test]
    fn test_active_nudges_toward_closest_brick() {
        let config = Config::default();
        let bus = EventBus::new();
        let mut assist = AssistanceSystem::new(&config.ai, &bus);
        let mut manager = EntityManager::new();
        let mut collision = CollisionSystem::new();
        let ball_id = manager.spawn(Vec2::new(400.0, 300.0), EntityKind::Ball(Ball::multi_ball(&config)));
        let (pos, brick) = Brick::from_grid(&config, 0, 0);
        manager.spawn(pos, EntityKind::Brick(brick));
        manager.flush(&bus);
        manager.get_mut(ball_id).unwrap().body.vel = Vec2::new(0.0, -4.0);

        assist.force_analysis(&bus);
        assist.update(16.0, 16.0, &mut manager, &mut collision, &bus);
        let vel = manager.get(ball_id).unwrap().vel();
        assert!(vel.x < 0.0);
    }

    #[test]
    fn test_nudge_distance_is_configurable() {
        let mut config = Config::default();
        // Wider than the gap between the ball and the brick
        config.ai.assistance.nudge_distance = 400.0;
        let bus = EventBus::new();
        let mut assist = AssistanceSystem::new(&config.ai, &bus);
        let mut manager = EntityManager::new();
        let mut collision = CollisionSystem::new();
        let ball_id = manager.spawn(Vec2::new(400.0, 300.0), EntityKind::Ball(Ball::multi_ball(&config)));
        let (pos, brick) = Brick::from_grid(&config, 0, 0);
        manager.spawn(pos, EntityKind::Brick(brick));
        manager.flush(&bus);
        manager.get_mut(ball_id).unwrap().body.vel = Vec2::new(0.0, -4.0);

        assist.force_analysis(&bus);
        assert_eq!(assist.level(), AssistanceLevel::Active);
        assist.update(16.0, 16.0, &mut manager, &mut collision, &bus);
        assert_eq!(manager.get(ball_id).unwrap().vel().x, 0.0);
    }
}
