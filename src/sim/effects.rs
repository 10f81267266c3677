//! Screen effects and the pooled overlay particles
//!
//! Overlay particles live in a fixed-capacity pool sized by the quality
//! preset; a burst that finds the pool empty is cut short. Shake and flash
//! requests keep the larger of the current and requested intensity and
//! decay exponentially per 60fps frame down to a snap-to-zero floor.

use std::cell::RefCell;
use std::f32::consts::TAU;
use std::rc::Rc;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::events::{ContextId, EventBus, EventKind, GameEvent, handler};
use super::powerup::PowerUpKind;
use crate::config::{Color, EffectsConfig};
use crate::frame_scale;
use crate::math::random;
use crate::render::{DrawContext, Overlay, Shape};

/// Alpha below which a pooled particle is recycled
const ALPHA_FLOOR: f32 = 0.01;

/// One pool slot. Velocity is in units per millisecond.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PooledParticle {
    pub pos: Vec2,
    pub vel: Vec2,
    /// Remaining life (ms)
    pub life: f32,
    pub max_life: f32,
    pub size: f32,
    pub color: Color,
    pub alpha: f32,
    /// Alpha multiplier per 60fps frame
    pub decay: f32,
    pub gravity: f32,
}

impl Default for PooledParticle {
    fn default() -> Self {
        Self {
            pos: Vec2::ZERO,
            vel: Vec2::ZERO,
            life: 0.0,
            max_life: 1000.0,
            size: 2.0,
            color: Color::WHITE,
            alpha: 1.0,
            decay: 0.98,
            gravity: 0.0,
        }
    }
}

/// Fixed-capacity particle storage with a free list
#[derive(Debug)]
pub struct ParticlePool {
    slots: Vec<PooledParticle>,
    free: Vec<usize>,
    active: Vec<usize>,
    warned: bool,
}

impl ParticlePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![PooledParticle::default(); capacity],
            free: (0..capacity).rev().collect(),
            active: Vec::with_capacity(capacity),
            warned: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }

    /// Borrow a slot; `false` when the pool is exhausted
    pub fn spawn(&mut self, particle: PooledParticle) -> bool {
        let Some(slot) = self.free.pop() else {
            if !self.warned {
                log::warn!("Particle pool exhausted ({} slots)", self.slots.len());
                self.warned = true;
            }
            return false;
        };
        self.slots[slot] = particle;
        self.active.push(slot);
        true
    }

    pub fn update(&mut self, dt: f64) {
        let dt_ms = dt as f32;
        let scale = frame_scale(dt);
        let slots = &mut self.slots;
        let free = &mut self.free;
        self.active.retain(|&slot| {
            let p = &mut slots[slot];
            p.pos += p.vel * dt_ms;
            p.life -= dt_ms;
            p.alpha *= p.decay.powf(scale);
            p.vel.y += p.gravity * dt_ms;
            let alive = p.life > 0.0 && p.alpha >= ALPHA_FLOOR;
            if !alive {
                free.push(slot);
            }
            alive
        });
        if !self.free.is_empty() {
            self.warned = false;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PooledParticle> {
        self.active.iter().map(|&slot| &self.slots[slot])
    }

    pub fn clear(&mut self) {
        self.free.extend(self.active.drain(..));
    }
}

fn combo_color(combo: u32) -> Color {
    match combo {
        25.. => Color::rgb(0xFF, 0x00, 0x80),
        15.. => Color::rgb(0xFF, 0x44, 0x00),
        10.. => Color::rgb(0xFF, 0x88, 0x00),
        5.. => Color::rgb(0xFF, 0xAA, 0x00),
        _ => Color::rgb(0x00, 0xAA, 0x00),
    }
}

fn powerup_color(kind: PowerUpKind) -> Color {
    match kind {
        PowerUpKind::WidePaddle => Color::rgb(0x00, 0xFF, 0xFF),
        PowerUpKind::MultiBall => Color::rgb(0xFF, 0x00, 0xFF),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectsDebugInfo {
    pub active_particles: usize,
    pub pool_available: usize,
    pub capacity: usize,
    pub shake_intensity: f32,
    pub flash_intensity: f32,
}

#[derive(Debug)]
struct EffectsState {
    config: EffectsConfig,
    pool: ParticlePool,
    rng: Pcg32,
    shake_intensity: f32,
    shake_offset: Vec2,
    flash_color: Option<Color>,
    flash_intensity: f32,
    pulse_phase: f32,
    background_intensity: f32,
}

impl EffectsState {
    fn add_shake(&mut self, intensity: f32) {
        if self.config.reduced_motion {
            return;
        }
        self.shake_intensity = self.shake_intensity.max(intensity);
    }

    fn add_flash(&mut self, color: Color, intensity: f32) {
        if self.config.reduced_motion {
            return;
        }
        self.flash_color = Some(color);
        self.flash_intensity = self.flash_intensity.max(intensity);
    }

    fn brick_burst(&mut self, pos: Vec2, color: Color, points: u32) {
        let count = (points as f32 / 2.0).ceil().min(20.0) as u32;
        for _ in 0..count {
            let rng = &mut self.rng;
            let angle = random(rng, 0.0, TAU);
            let speed = random(rng, 0.05, 0.2);
            let life = random(rng, 800.0, 1200.0);
            let particle = PooledParticle {
                pos: pos + Vec2::new(random(rng, -20.0, 20.0), random(rng, -10.0, 10.0)),
                vel: Vec2::from_angle(angle) * speed - Vec2::new(0.0, 0.1),
                life,
                max_life: life,
                size: random(rng, 1.0, 3.0),
                color,
                alpha: 1.0,
                decay: 0.99,
                gravity: 0.0002,
            };
            if !self.pool.spawn(particle) {
                break;
            }
        }
    }

    fn combo_burst(&mut self, combo: u32, multiplier: f32, pos: Vec2) {
        let count = (combo * 2).min(50);
        let life = 1000.0 + combo as f32 * 100.0;
        for i in 0..count {
            let angle = TAU * i as f32 / count as f32;
            let speed = random(&mut self.rng, 0.1, 0.3);
            let particle = PooledParticle {
                pos,
                vel: Vec2::from_angle(angle) * speed * multiplier,
                life,
                max_life: life,
                size: 2.0 + multiplier * 0.5,
                color: combo_color(combo),
                alpha: 1.0,
                decay: 0.995,
                gravity: 0.0,
            };
            if !self.pool.spawn(particle) {
                break;
            }
        }
    }

    fn powerup_burst(&mut self, pos: Vec2, kind: PowerUpKind) {
        const COUNT: u32 = 30;
        for i in 0..COUNT {
            let angle = TAU * i as f32 / COUNT as f32;
            let speed = random(&mut self.rng, 0.08, 0.2);
            let particle = PooledParticle {
                pos,
                vel: Vec2::from_angle(angle) * speed,
                life: 1200.0,
                max_life: 1200.0,
                size: 3.0,
                color: powerup_color(kind),
                alpha: 1.0,
                decay: 0.995,
                gravity: 0.0,
            };
            if !self.pool.spawn(particle) {
                break;
            }
        }
    }

    fn reset(&mut self) {
        self.pool.clear();
        self.shake_intensity = 0.0;
        self.shake_offset = Vec2::ZERO;
        self.flash_color = None;
        self.flash_intensity = 0.0;
    }
}

/// Pooled particles plus screen shake and colour flash
#[derive(Debug)]
pub struct EffectsSystem {
    state: Rc<RefCell<EffectsState>>,
    context: ContextId,
}

impl EffectsSystem {
    pub fn new(config: &EffectsConfig, seed: u64, bus: &EventBus) -> Self {
        let state = Rc::new(RefCell::new(EffectsState {
            config: config.clone(),
            pool: ParticlePool::new(config.quality.max_particles()),
            rng: Pcg32::seed_from_u64(seed),
            shake_intensity: 0.0,
            shake_offset: Vec2::ZERO,
            flash_color: None,
            flash_intensity: 0.0,
            pulse_phase: 0.0,
            background_intensity: 0.0,
        }));
        let context = bus.new_context();

        let on = |kind: EventKind, f: fn(&mut EffectsState, &GameEvent)| {
            let state = Rc::clone(&state);
            bus.subscribe(
                kind,
                handler(move |_, event| f(&mut state.borrow_mut(), event)),
                Some(context),
                false,
            );
        };

        on(EventKind::ScreenShake, |s, e| {
            if let GameEvent::ScreenShake { intensity } = e {
                s.add_shake(*intensity);
            }
        });
        on(EventKind::ColorFlash, |s, e| {
            if let GameEvent::ColorFlash { color, intensity } = e {
                s.add_flash(*color, *intensity);
            }
        });
        on(EventKind::ParticleCreate, |s, e| {
            if let &GameEvent::ParticleCreate { pos, vel, color, size, life_ms } = e {
                s.pool.spawn(PooledParticle {
                    pos,
                    vel,
                    life: life_ms,
                    max_life: life_ms,
                    size,
                    color,
                    ..Default::default()
                });
            }
        });
        on(EventKind::BrickDestroyed, |s, e| {
            if let &GameEvent::BrickDestroyed { pos, color, points, .. } = e {
                s.brick_burst(pos, color, points);
            }
        });
        on(EventKind::ComboParticles, |s, e| {
            if let &GameEvent::ComboParticles { combo, multiplier, pos } = e {
                s.combo_burst(combo, multiplier, pos);
            }
        });
        on(EventKind::PowerUpCollected, |s, e| {
            if let &GameEvent::PowerUpCollected { kind, pos, .. } = e {
                s.powerup_burst(pos, kind);
            }
        });
        on(EventKind::GameRestart, |s, _| s.reset());

        Self { state, context }
    }

    pub fn update(&mut self, dt: f64) {
        let mut guard = self.state.borrow_mut();
        let s = &mut *guard;
        let scale = frame_scale(dt);

        if s.shake_intensity > 0.0 {
            let angle = s.rng.random::<f32>() * TAU;
            s.shake_offset = Vec2::from_angle(angle) * s.shake_intensity;
            s.shake_intensity *= s.config.shake_decay.powf(scale);
            if s.shake_intensity < s.config.shake_floor {
                s.shake_intensity = 0.0;
                s.shake_offset = Vec2::ZERO;
            }
        }

        if s.flash_intensity > 0.0 {
            s.flash_intensity *= s.config.flash_decay.powf(scale);
            if s.flash_intensity < s.config.flash_floor {
                s.flash_intensity = 0.0;
                s.flash_color = None;
            }
        }

        s.pulse_phase += dt as f32 * 0.002;
        s.background_intensity = 0.1 + s.pulse_phase.sin() * 0.05;

        s.pool.update(dt);
    }

    pub fn shake_intensity(&self) -> f32 {
        self.state.borrow().shake_intensity
    }

    pub fn flash_intensity(&self) -> f32 {
        self.state.borrow().flash_intensity
    }

    pub fn background_intensity(&self) -> f32 {
        self.state.borrow().background_intensity
    }

    pub fn particle_count(&self) -> usize {
        self.state.borrow().pool.active_count()
    }

    pub fn overlay(&self) -> Overlay {
        let s = self.state.borrow();
        Overlay {
            shake_offset: s.shake_offset,
            flash: s
                .flash_color
                .filter(|_| s.flash_intensity > 0.0)
                .map(|c| (c, s.flash_intensity)),
        }
    }

    /// Draw the pooled particles on top of the scene
    pub fn render(&self, draw: &mut dyn DrawContext) {
        let s = self.state.borrow();
        for p in s.pool.iter() {
            draw.draw(Shape::Circle {
                center: p.pos,
                radius: p.size,
                color: p.color,
                alpha: p.alpha,
            });
        }
    }

    pub fn reset(&mut self) {
        self.state.borrow_mut().reset();
    }

    pub fn debug_info(&self) -> EffectsDebugInfo {
        let s = self.state.borrow();
        EffectsDebugInfo {
            active_particles: s.pool.active_count(),
            pool_available: s.pool.available(),
            capacity: s.pool.capacity(),
            shake_intensity: s.shake_intensity,
            flash_intensity: s.flash_intensity,
        }
    }

    pub fn detach(&self, bus: &EventBus) {
        bus.remove_context(self.context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, QualityPreset};
    use crate::consts::FRAME_MS;
    use crate::sim::events::DestroySource;

    fn system(config: &EffectsConfig) -> (EventBus, EffectsSystem) {
        let bus = EventBus::new();
        let effects = EffectsSystem::new(config, 7, &bus);
        (bus, effects)
    }

    #[test]
    fn test_shake_takes_max_and_snaps_to_zero() {
        let config = Config::default();
        let (bus, mut effects) = system(&config.effects);
        bus.publish(GameEvent::ScreenShake { intensity: 5.0 });
        bus.publish(GameEvent::ScreenShake { intensity: 3.0 });
        assert_eq!(effects.shake_intensity(), 5.0);

        effects.update(FRAME_MS);
        assert!((effects.shake_intensity() - 4.5).abs() < 1e-4);
        assert!(effects.overlay().shake_offset.length() > 0.0);

        for _ in 0..60 {
            effects.update(FRAME_MS);
        }
        assert_eq!(effects.shake_intensity(), 0.0);
        assert_eq!(effects.overlay().shake_offset, Vec2::ZERO);
    }

    #[test]
    fn test_decay_is_frame_rate_independent() {
        let config = Config::default();
        let (bus, mut a) = system(&config.effects);
        bus.publish(GameEvent::ColorFlash { color: Color::WHITE, intensity: 1.0 });
        let (bus, mut b) = system(&config.effects);
        bus.publish(GameEvent::ColorFlash { color: Color::WHITE, intensity: 1.0 });

        a.update(FRAME_MS * 2.0);
        b.update(FRAME_MS);
        b.update(FRAME_MS);
        assert!((a.flash_intensity() - b.flash_intensity()).abs() < 1e-5);
    }

    #[test]
    fn test_reduced_motion_ignores_requests() {
        let mut config = Config::default();
        config.effects.reduced_motion = true;
        let (bus, effects) = system(&config.effects);
        bus.publish(GameEvent::ScreenShake { intensity: 5.0 });
        bus.publish(GameEvent::ColorFlash { color: Color::WHITE, intensity: 1.0 });
        assert_eq!(effects.overlay(), Overlay::default());
    }

    #[test]
    fn test_pool_is_bounded() {
        let mut config = Config::default();
        config.effects.quality = QualityPreset::Low;
        let (bus, mut effects) = system(&config.effects);
        for _ in 0..3 {
            bus.publish(GameEvent::ComboParticles {
                combo: 30,
                multiplier: 3.0,
                pos: Vec2::new(400.0, 300.0),
            });
        }
        assert_eq!(effects.particle_count(), 100);
        assert_eq!(effects.debug_info().pool_available, 0);

        // Combo particles live 4 seconds at combo 30
        for _ in 0..300 {
            effects.update(FRAME_MS);
        }
        assert_eq!(effects.particle_count(), 0);
        assert_eq!(effects.debug_info().pool_available, 100);
    }

    #[test]
    fn test_burst_sizes() {
        let config = Config::default();
        let (bus, effects) = system(&config.effects);
        bus.publish(GameEvent::BrickDestroyed {
            brick: 1,
            pos: Vec2::new(100.0, 100.0),
            points: 15,
            color: Color::WHITE,
            source: DestroySource::Ball,
        });
        assert_eq!(effects.particle_count(), 8);

        bus.publish(GameEvent::PowerUpCollected {
            powerup: 2,
            kind: PowerUpKind::MultiBall,
            pos: Vec2::ZERO,
        });
        assert_eq!(effects.particle_count(), 38);

        bus.publish(GameEvent::ComboParticles { combo: 4, multiplier: 1.0, pos: Vec2::ZERO });
        assert_eq!(effects.particle_count(), 46);

        bus.publish(GameEvent::GameRestart);
        assert_eq!(effects.particle_count(), 0);
    }
}
