//! Achievement tracking
//!
//! Listens to scoring, combo, chain and level events and keeps per-level and
//! per-session statistics. An achievement unlocks once per session; the
//! unlocked set survives a restart while the statistics start over.

use std::cell::RefCell;
use std::f32::consts::TAU;
use std::rc::Rc;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::events::{ContextId, EventBus, EventKind, GameEvent, handler};
use super::powerup::PowerUpKind;
use crate::config::{AchievementsConfig, Color};

/// Where the fanfare ring is centered
const FANFARE_ORIGIN: Vec2 = Vec2::new(400.0, 300.0);
const FANFARE_PARTICLES: u32 = 16;
const UNLOCK_SHAKE: f32 = 6.0;
const UNLOCK_FLASH: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Achievement {
    Perfectionist,
    Speedrun,
    ComboMaster,
    ChainMaster,
    PowerCollector,
}

impl Achievement {
    pub const ALL: [Achievement; 5] = [
        Achievement::Perfectionist,
        Achievement::Speedrun,
        Achievement::ComboMaster,
        Achievement::ChainMaster,
        Achievement::PowerCollector,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Achievement::Perfectionist => "perfectionist",
            Achievement::Speedrun => "speedrun",
            Achievement::ComboMaster => "combo_master",
            Achievement::ChainMaster => "chain_master",
            Achievement::PowerCollector => "power_collector",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Achievement::Perfectionist => "Perfectionist",
            Achievement::Speedrun => "Speed Demon",
            Achievement::ComboMaster => "Combo Master",
            Achievement::ChainMaster => "Chain Master",
            Achievement::PowerCollector => "Power Collector",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Achievement::Perfectionist => "Clear a level without losing a ball",
            Achievement::Speedrun => "Clear a level in record time",
            Achievement::ComboMaster => "Build a long combo streak",
            Achievement::ChainMaster => "Set off many chain reactions",
            Achievement::PowerCollector => "Use every kind of power-up in one level",
        }
    }

    pub fn rarity(self) -> Rarity {
        match self {
            Achievement::PowerCollector => Rarity::Common,
            Achievement::Speedrun | Achievement::ChainMaster => Rarity::Rare,
            Achievement::ComboMaster => Rarity::Epic,
            Achievement::Perfectionist => Rarity::Legendary,
        }
    }

    /// Celebration colour
    pub fn color(self) -> Color {
        match self {
            Achievement::Perfectionist => Color::rgb(0xFF, 0xD7, 0x00),
            Achievement::Speedrun => Color::rgb(0x00, 0xFF, 0xFF),
            Achievement::ComboMaster => Color::rgb(0xFF, 0x44, 0x00),
            Achievement::ChainMaster => Color::rgb(0x00, 0xAA, 0xFF),
            Achievement::PowerCollector => Color::rgb(0xAA, 0x00, 0xFF),
        }
    }
}

/// Running totals since the last restart
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub levels_completed: u32,
    pub total_score: u64,
    pub max_combo: u32,
    pub chain_reactions: u32,
    pub power_ups_collected: u32,
    pub perfect_levels: u32,
    pub lives_lost: u32,
    /// Quickest level clear (ms)
    pub fastest_level: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct LevelStats {
    running: bool,
    elapsed: f64,
    balls_lost: u32,
    bricks_destroyed: u32,
    chain_reactions: u32,
    max_combo: u32,
    power_kinds: Vec<PowerUpKind>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Notification {
    pub achievement: Achievement,
    /// Time left on screen (ms)
    pub remaining: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AchievementDebugInfo {
    pub unlocked: usize,
    pub pending_notifications: usize,
    pub level_running: bool,
    pub level_elapsed: f64,
    pub level_bricks: u32,
    pub level_chains: u32,
    pub level_max_combo: u32,
    pub stats: SessionStats,
}

#[derive(Debug)]
struct AchievementState {
    config: AchievementsConfig,
    unlocked: Vec<Achievement>,
    notifications: Vec<Notification>,
    session: SessionStats,
    level: LevelStats,
}

impl AchievementState {
    fn new(config: AchievementsConfig) -> Self {
        Self {
            config,
            unlocked: Vec::new(),
            notifications: Vec::new(),
            session: SessionStats::default(),
            level: LevelStats::default(),
        }
    }

    /// Record an unlock; `None` if it was already held
    fn unlock(&mut self, achievement: Achievement) -> Option<u32> {
        if self.unlocked.contains(&achievement) {
            return None;
        }
        self.unlocked.push(achievement);
        self.notifications.push(Notification {
            achievement,
            remaining: self.config.notification_time,
        });
        Some(self.unlocked.len() as u32)
    }

    fn on_level_complete(&mut self) -> Vec<(Achievement, u32)> {
        let level = std::mem::take(&mut self.level);
        self.session.levels_completed += 1;
        self.session.fastest_level = Some(
            self.session
                .fastest_level
                .map_or(level.elapsed, |best| best.min(level.elapsed)),
        );

        let mut earned = Vec::new();
        if level.balls_lost == 0 {
            self.session.perfect_levels += 1;
            earned.push(Achievement::Perfectionist);
        }
        if level.elapsed < self.config.speedrun_time {
            earned.push(Achievement::Speedrun);
        }
        if level.power_kinds.len() as u32 >= self.config.power_target {
            earned.push(Achievement::PowerCollector);
        }
        earned
            .into_iter()
            .filter_map(|a| self.unlock(a).map(|total| (a, total)))
            .collect()
    }
}

fn celebrate(bus: &EventBus, achievement: Achievement, total_unlocked: u32) {
    log::info!("Achievement unlocked: {} ({total_unlocked} total)", achievement.name());
    let color = achievement.color();
    bus.publish(GameEvent::ScreenShake { intensity: UNLOCK_SHAKE });
    bus.publish(GameEvent::ColorFlash {
        color,
        intensity: UNLOCK_FLASH,
    });
    for i in 0..FANFARE_PARTICLES {
        let angle = TAU * i as f32 / FANFARE_PARTICLES as f32;
        bus.publish(GameEvent::ParticleCreate {
            pos: FANFARE_ORIGIN,
            vel: Vec2::from_angle(angle) * 0.25,
            color,
            size: 3.0,
            life_ms: 1_500.0,
        });
    }
    bus.publish(GameEvent::AchievementUnlocked {
        achievement,
        total_unlocked,
    });
}

/// Subscribe a handler that updates the state and returns any unlocks
fn track<F>(bus: &EventBus, context: ContextId, state: &Rc<RefCell<AchievementState>>, kind: EventKind, f: F)
where
    F: Fn(&mut AchievementState, &GameEvent) -> Vec<(Achievement, u32)> + 'static,
{
    let s = Rc::clone(state);
    bus.subscribe(
        kind,
        handler(move |bus, event| {
            let earned = f(&mut s.borrow_mut(), event);
            for (achievement, total) in earned {
                celebrate(bus, achievement, total);
            }
        }),
        Some(context),
        false,
    );
}

/// Unlocks achievements from bus traffic
#[derive(Debug)]
pub struct AchievementSystem {
    state: Rc<RefCell<AchievementState>>,
    context: ContextId,
}

impl AchievementSystem {
    pub fn new(config: &AchievementsConfig, bus: &EventBus) -> Self {
        let state = Rc::new(RefCell::new(AchievementState::new(config.clone())));
        let context = bus.new_context();

        track(bus, context, &state, EventKind::LevelStart, |s, _| {
            s.level = LevelStats {
                running: true,
                ..Default::default()
            };
            Vec::new()
        });
        track(bus, context, &state, EventKind::LevelComplete, |s, _| {
            s.on_level_complete()
        });
        track(bus, context, &state, EventKind::BallLost, |s, _| {
            s.level.balls_lost += 1;
            Vec::new()
        });
        track(bus, context, &state, EventKind::PlayerLifeLost, |s, _| {
            s.session.lives_lost += 1;
            Vec::new()
        });
        track(bus, context, &state, EventKind::BrickDestroyed, |s, _| {
            s.level.bricks_destroyed += 1;
            Vec::new()
        });
        track(bus, context, &state, EventKind::PlayerScoreChanged, |s, event| {
            if let GameEvent::PlayerScoreChanged { score, .. } = event {
                s.session.total_score = *score;
            }
            Vec::new()
        });
        track(bus, context, &state, EventKind::ComboHit, |s, event| {
            let GameEvent::ComboHit { combo, .. } = event else {
                return Vec::new();
            };
            s.level.max_combo = s.level.max_combo.max(*combo);
            s.session.max_combo = s.session.max_combo.max(*combo);
            if *combo >= s.config.combo_target {
                s.unlock(Achievement::ComboMaster)
                    .map(|total| (Achievement::ComboMaster, total))
                    .into_iter()
                    .collect()
            } else {
                Vec::new()
            }
        });
        track(bus, context, &state, EventKind::ChainReaction, |s, _| {
            s.level.chain_reactions += 1;
            s.session.chain_reactions += 1;
            if s.session.chain_reactions >= s.config.chain_target {
                s.unlock(Achievement::ChainMaster)
                    .map(|total| (Achievement::ChainMaster, total))
                    .into_iter()
                    .collect()
            } else {
                Vec::new()
            }
        });
        track(bus, context, &state, EventKind::PowerUpCollected, |s, _| {
            s.session.power_ups_collected += 1;
            Vec::new()
        });
        track(bus, context, &state, EventKind::PowerUpActivated, |s, event| {
            if let GameEvent::PowerUpActivated { kind, .. } = event {
                if !s.level.power_kinds.contains(kind) {
                    s.level.power_kinds.push(*kind);
                }
            }
            Vec::new()
        });
        track(bus, context, &state, EventKind::GameRestart, |s, _| {
            s.session = SessionStats::default();
            s.level = LevelStats::default();
            s.notifications.clear();
            Vec::new()
        });

        Self { state, context }
    }

    /// Run the level clock and age notifications
    pub fn update(&mut self, dt: f64) {
        let mut s = self.state.borrow_mut();
        if s.level.running {
            s.level.elapsed += dt;
        }
        for n in &mut s.notifications {
            n.remaining -= dt;
        }
        s.notifications.retain(|n| n.remaining > 0.0);
    }

    pub fn is_unlocked(&self, achievement: Achievement) -> bool {
        self.state.borrow().unlocked.contains(&achievement)
    }

    /// Unlocked achievements in unlock order
    pub fn unlocked(&self) -> Vec<Achievement> {
        self.state.borrow().unlocked.clone()
    }

    /// `(current, target)` for counted achievements
    pub fn progress(&self, achievement: Achievement) -> Option<(u32, u32)> {
        let s = self.state.borrow();
        match achievement {
            Achievement::ComboMaster => Some((s.session.max_combo, s.config.combo_target)),
            Achievement::ChainMaster => Some((s.session.chain_reactions, s.config.chain_target)),
            Achievement::PowerCollector => Some((s.level.power_kinds.len() as u32, s.config.power_target)),
            Achievement::Perfectionist | Achievement::Speedrun => None,
        }
    }

    /// Notifications still on screen, oldest first
    pub fn notifications(&self) -> Vec<Notification> {
        self.state.borrow().notifications.clone()
    }

    pub fn stats(&self) -> SessionStats {
        self.state.borrow().session.clone()
    }

    pub fn debug_info(&self) -> AchievementDebugInfo {
        let s = self.state.borrow();
        AchievementDebugInfo {
            unlocked: s.unlocked.len(),
            pending_notifications: s.notifications.len(),
            level_running: s.level.running,
            level_elapsed: s.level.elapsed,
            level_bricks: s.level.bricks_destroyed,
            level_chains: s.level.chain_reactions,
            level_max_combo: s.level.max_combo,
            stats: s.session.clone(),
        }
    }

    pub fn detach(&self, bus: &EventBus) {
        bus.remove_context(self.context);
    }
}
