//! Combo streaks
//!
//! Every destroyed brick extends the streak. The streak maps to a score
//! multiplier through the configured threshold table; it breaks on a lost
//! ball, a missed paddle, or after the break timeout without a hit.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;

use super::events::{BonusSource, ContextId, EventBus, EventKind, GameEvent, handler};
use crate::config::{Color, ComboConfig};

/// Where combo particle bursts are centered
const COMBO_PARTICLE_ORIGIN: Vec2 = Vec2::new(400.0, 300.0);

const TIER_FLASH_INTENSITY: f32 = 0.3;

/// Multiplier for a streak length: the value after the highest threshold
/// reached, or the first value below every threshold
pub fn multiplier_for(combo: u32, config: &ComboConfig) -> u32 {
    let values = &config.multiplier_values;
    let fallback = values.last().copied().unwrap_or(1);
    match config.multiplier_thresholds.iter().rposition(|&t| combo >= t) {
        Some(i) => values.get(i + 1).copied().unwrap_or(fallback),
        None => values.first().copied().unwrap_or(1),
    }
}

/// Flash colour for a multiplier tier
pub fn tier_color(multiplier: u32) -> Color {
    match multiplier {
        20.. => Color::rgb(0xFF, 0x00, 0x80),
        10.. => Color::rgb(0xFF, 0x44, 0x00),
        5.. => Color::rgb(0xFF, 0x88, 0x00),
        3.. => Color::rgb(0xFF, 0xAA, 0x00),
        _ => Color::rgb(0x00, 0xAA, 0x00),
    }
}

fn table_entry(table: &[f32], index: u32) -> f32 {
    match table.len() {
        0 => 0.0,
        len => table[(index as usize).min(len - 1)],
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComboDebugInfo {
    pub combo: u32,
    pub max_combo: u32,
    pub multiplier: u32,
    pub active: bool,
    pub time_until_break: f64,
    pub shake_intensity: f32,
    pub flash_intensity: f32,
}

#[derive(Debug)]
struct ComboState {
    config: ComboConfig,
    combo: u32,
    max_combo: u32,
    multiplier: u32,
    /// Time since the last hit (ms)
    break_timer: f64,
    active: bool,
    shake_intensity: f32,
    flash_color: Option<Color>,
    flash_intensity: f32,
}

impl ComboState {
    fn new(config: ComboConfig) -> Self {
        Self {
            config,
            combo: 0,
            max_combo: 0,
            multiplier: 1,
            break_timer: 0.0,
            active: false,
            shake_intensity: 0.0,
            flash_color: None,
            flash_intensity: 0.0,
        }
    }

    fn extend(&mut self, amount: u32) -> bool {
        self.combo += amount;
        self.max_combo = self.max_combo.max(self.combo);
        self.break_timer = 0.0;
        self.active = true;
        let previous = self.multiplier;
        self.multiplier = multiplier_for(self.combo, &self.config);
        previous != self.multiplier
    }

    /// Clears the streak, returning what it was if there was one
    fn break_streak(&mut self) -> Option<(u32, u32)> {
        let broken = (self.combo > 0).then_some((self.combo, self.multiplier));
        self.combo = 0;
        self.multiplier = 1;
        self.break_timer = 0.0;
        self.active = false;
        self.shake_intensity = 0.0;
        self.flash_intensity = 0.0;
        broken
    }

    fn reset(&mut self) {
        self.break_streak();
        self.max_combo = 0;
        self.flash_color = None;
    }
}

fn publish_broken(bus: &EventBus, broken: Option<(u32, u32)>) {
    if let Some((final_combo, final_multiplier)) = broken {
        log::debug!("Combo broken at {final_combo} (x{final_multiplier})");
        bus.publish(GameEvent::ComboBroken {
            final_combo,
            final_multiplier,
        });
    }
}

/// Streak counter driven by bus events
#[derive(Debug)]
pub struct ComboSystem {
    state: Rc<RefCell<ComboState>>,
    context: ContextId,
}

impl ComboSystem {
    pub fn new(config: &ComboConfig, bus: &EventBus) -> Self {
        let state = Rc::new(RefCell::new(ComboState::new(config.clone())));
        let context = bus.new_context();

        let s = Rc::clone(&state);
        bus.subscribe(
            EventKind::BrickDestroyed,
            handler(move |bus, event| {
                if let GameEvent::BrickDestroyed { points, .. } = event {
                    on_brick_destroyed(&s, bus, *points);
                }
            }),
            Some(context),
            false,
        );

        for kind in [EventKind::BallLost, EventKind::PaddleMissed] {
            let s = Rc::clone(&state);
            bus.subscribe(
                kind,
                handler(move |bus, _| {
                    let broken = s.borrow_mut().break_streak();
                    publish_broken(bus, broken);
                }),
                Some(context),
                false,
            );
        }

        let s = Rc::clone(&state);
        bus.subscribe(
            EventKind::ComboBonus,
            handler(move |_, event| {
                if let GameEvent::ComboBonus { amount } = event {
                    s.borrow_mut().extend(*amount);
                }
            }),
            Some(context),
            false,
        );

        let s = Rc::clone(&state);
        bus.subscribe(
            EventKind::GameRestart,
            handler(move |_, _| s.borrow_mut().reset()),
            Some(context),
            false,
        );

        Self { state, context }
    }

    /// Advance the break timer and fade the HUD intensities
    pub fn update(&mut self, dt: f64, bus: &EventBus) {
        let broken = {
            let mut s = self.state.borrow_mut();
            s.shake_intensity = (s.shake_intensity - dt as f32 * 0.01).max(0.0);
            s.flash_intensity = (s.flash_intensity - dt as f32 * 0.005).max(0.0);
            if s.active && s.combo > 0 {
                s.break_timer += dt;
                if s.break_timer >= s.config.break_timeout {
                    s.break_streak()
                } else {
                    None
                }
            } else {
                None
            }
        };
        publish_broken(bus, broken);
    }

    pub fn combo(&self) -> u32 {
        self.state.borrow().combo
    }

    pub fn max_combo(&self) -> u32 {
        self.state.borrow().max_combo
    }

    pub fn multiplier(&self) -> u32 {
        self.state.borrow().multiplier
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().active
    }

    /// Current tier flash for a HUD
    pub fn flash(&self) -> Option<(Color, f32)> {
        let s = self.state.borrow();
        s.flash_color
            .filter(|_| s.flash_intensity > 0.0)
            .map(|c| (c, s.flash_intensity))
    }

    pub fn reset(&mut self) {
        self.state.borrow_mut().reset();
    }

    pub fn debug_info(&self) -> ComboDebugInfo {
        let s = self.state.borrow();
        ComboDebugInfo {
            combo: s.combo,
            max_combo: s.max_combo,
            multiplier: s.multiplier,
            active: s.active,
            time_until_break: (s.config.break_timeout - s.break_timer).max(0.0),
            shake_intensity: s.shake_intensity,
            flash_intensity: s.flash_intensity,
        }
    }

    pub fn detach(&self, bus: &EventBus) {
        bus.remove_context(self.context);
    }
}

fn on_brick_destroyed(state: &RefCell<ComboState>, bus: &EventBus, points: u32) {
    let (combo, multiplier, new_tier, shake, flash, particles) = {
        let mut s = state.borrow_mut();
        let new_tier = s.extend(1);
        let shake = table_entry(&s.config.screen_shake_intensity, s.combo / 5);
        s.shake_intensity = shake;
        let flash = if new_tier {
            let color = tier_color(s.multiplier);
            s.flash_color = Some(color);
            s.flash_intensity = TIER_FLASH_INTENSITY;
            Some(color)
        } else {
            None
        };
        let particles = table_entry(&s.config.particle_multiplier, s.combo / 3);
        (s.combo, s.multiplier, new_tier, shake, flash, particles)
    };

    bus.publish(GameEvent::ScreenShake { intensity: shake });
    if let Some(color) = flash {
        bus.publish(GameEvent::ColorFlash {
            color,
            intensity: TIER_FLASH_INTENSITY,
        });
    }
    bus.publish(GameEvent::ComboParticles {
        combo,
        multiplier: particles,
        pos: COMBO_PARTICLE_ORIGIN,
    });
    bus.publish(GameEvent::ComboHit {
        combo,
        multiplier,
        new_tier,
    });

    let bonus = points as u64 * (multiplier as u64).saturating_sub(1);
    if bonus > 0 {
        bus.publish(GameEvent::ScoreBonus {
            points: bonus,
            source: BonusSource::Combo,
            multiplier,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sim::events::{DestroySource, record};
    use proptest::prelude::*;

    fn destroyed(points: u32) -> GameEvent {
        GameEvent::BrickDestroyed {
            brick: 1,
            pos: Vec2::ZERO,
            points,
            color: Color::WHITE,
            source: DestroySource::Ball,
        }
    }

    #[test]
    fn test_multiplier_table() {
        let config = ComboConfig::default();
        let expected = [(0, 1), (2, 1), (3, 2), (5, 2), (6, 3), (10, 5), (15, 10), (24, 10), (25, 20), (99, 20)];
        for (combo, mult) in expected {
            assert_eq!(multiplier_for(combo, &config), mult, "combo {combo}");
        }
    }

    #[test]
    fn test_bonus_points_and_tier_flash() {
        let config = Config::default();
        let bus = EventBus::new();
        let combo = ComboSystem::new(&config.combo, &bus);
        let log = record(&bus, &[EventKind::ScoreBonus, EventKind::ColorFlash, EventKind::ComboHit]);

        for _ in 0..3 {
            bus.publish(destroyed(10));
        }
        assert_eq!(combo.combo(), 3);
        assert_eq!(combo.multiplier(), 2);

        let events = log.borrow();
        let bonuses: Vec<_> = events
            .iter()
            .filter(|e| e.kind() == EventKind::ScoreBonus)
            .collect();
        assert_eq!(
            bonuses,
            vec![&GameEvent::ScoreBonus {
                points: 10,
                source: BonusSource::Combo,
                multiplier: 2
            }]
        );
        assert!(events.contains(&GameEvent::ColorFlash {
            color: tier_color(2),
            intensity: TIER_FLASH_INTENSITY
        }));
        assert!(events.contains(&GameEvent::ComboHit {
            combo: 3,
            multiplier: 2,
            new_tier: true
        }));
    }

    #[test]
    fn test_break_on_miss_and_timeout() {
        let config = Config::default();
        let bus = EventBus::new();
        let mut combo = ComboSystem::new(&config.combo, &bus);
        let log = record(&bus, &[EventKind::ComboBroken]);

        // Nothing to break yet
        bus.publish(GameEvent::PaddleMissed { ball: 1 });
        assert!(log.borrow().is_empty());

        bus.publish(destroyed(10));
        bus.publish(destroyed(10));
        bus.publish(GameEvent::PaddleMissed { ball: 1 });
        assert_eq!(combo.combo(), 0);
        assert_eq!(
            log.borrow()[0],
            GameEvent::ComboBroken {
                final_combo: 2,
                final_multiplier: 1
            }
        );

        bus.publish(destroyed(10));
        combo.update(2_999.0, &bus);
        assert_eq!(combo.combo(), 1);
        combo.update(1.0, &bus);
        assert_eq!(combo.combo(), 0);
        assert_eq!(log.borrow().len(), 2);
        assert_eq!(combo.max_combo(), 2);
    }

    #[test]
    fn test_bonus_extends_and_restart_resets() {
        let config = Config::default();
        let bus = EventBus::new();
        let combo = ComboSystem::new(&config.combo, &bus);
        bus.publish(destroyed(10));
        bus.publish(GameEvent::ComboBonus { amount: 5 });
        assert_eq!(combo.combo(), 6);
        assert_eq!(combo.multiplier(), 3);

        bus.publish(GameEvent::GameRestart);
        assert_eq!(combo.combo(), 0);
        assert_eq!(combo.max_combo(), 0);
        assert_eq!(combo.multiplier(), 1);
    }

    proptest! {
        #[test]
        fn prop_streak_is_monotonic(n in 1usize..60) {
            let config = Config::default();
            let bus = EventBus::new();
            let combo = ComboSystem::new(&config.combo, &bus);
            let mut last = 1;
            for i in 1..=n {
                bus.publish(destroyed(10));
                prop_assert_eq!(combo.combo() as usize, i);
                prop_assert!(combo.multiplier() >= last);
                last = combo.multiplier();
            }
        }

        #[test]
        fn prop_ball_lost_resets(n in 1usize..40) {
            let config = Config::default();
            let bus = EventBus::new();
            let combo = ComboSystem::new(&config.combo, &bus);
            for _ in 0..n {
                bus.publish(destroyed(10));
            }
            bus.publish(GameEvent::BallLost { ball: 1, pos: Vec2::ZERO });
            prop_assert_eq!(combo.combo(), 0);
            prop_assert_eq!(combo.multiplier(), 1);
        }
    }
}
