//! Short-lived visual particle entities
//!
//! Life is counted in 60fps frames and decremented by `dt/16.67`. The
//! particle style picks the aging curve for alpha and size.

use std::f32::consts::TAU;

use glam::Vec2;
use rand::Rng;

use super::entity::{Body, UpdateCtx, UpdateStatus, positive_or};
use crate::config::{Color, Config};
use crate::frame_scale;
use crate::math::{Rect, random};
use crate::render::{DrawContext, Shape};

/// Aging curve family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParticleStyle {
    Spark,
    Smoke,
    Explosion,
    #[default]
    Default,
}

impl ParticleStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticleStyle::Spark => "spark",
            ParticleStyle::Smoke => "smoke",
            ParticleStyle::Explosion => "explosion",
            ParticleStyle::Default => "default",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Particle {
    /// Remaining life (frames)
    pub life: f32,
    pub max_life: f32,
    pub color: Color,
    pub size: f32,
    pub original_size: f32,
    pub gravity: f32,
    pub friction: f32,
    pub alpha: f32,
    pub rotation: f32,
    pub rotation_speed: f32,
    pub style: ParticleStyle,
}

/// Construction parameters; unset physics fields get the usual defaults
#[derive(Debug, Clone, Copy)]
pub struct ParticleParams {
    pub life: f32,
    pub color: Color,
    pub size: f32,
    pub gravity: f32,
    pub friction: f32,
    pub rotation_speed: f32,
    pub style: ParticleStyle,
}

impl Default for ParticleParams {
    fn default() -> Self {
        Self {
            life: 30.0,
            color: Color::WHITE,
            size: 2.0,
            gravity: 0.1,
            friction: 0.98,
            rotation_speed: 0.0,
            style: ParticleStyle::Default,
        }
    }
}

/// Burst shape for [`Particle::burst`]
#[derive(Debug, Clone, Copy)]
pub struct BurstOptions {
    pub count: u32,
    pub color: Color,
    pub style: ParticleStyle,
    /// Peak launch speed (units per 60fps frame)
    pub speed: f32,
}

impl Particle {
    pub fn new(params: ParticleParams) -> Self {
        let life = positive_or(params.life, 1.0);
        let size = positive_or(params.size, 0.5);
        Self {
            life,
            max_life: life,
            color: params.color,
            size,
            original_size: size,
            gravity: if params.gravity.is_finite() { params.gravity } else { 0.0 },
            friction: params.friction.clamp(0.0, 1.0),
            alpha: 1.0,
            rotation: 0.0,
            rotation_speed: params.rotation_speed,
            style: params.style,
        }
    }

    /// `count` particles spread evenly around a circle with some jitter
    pub fn burst<R: Rng>(rng: &mut R, pos: Vec2, options: BurstOptions) -> Vec<(Body, Particle)> {
        let count = options.count.max(1);
        (0..count)
            .map(|i| {
                let angle = TAU * i as f32 / count as f32 + random(rng, -0.5, 0.5);
                let speed = random(rng, options.speed * 0.5, options.speed);
                let body = Body {
                    pos,
                    vel: Vec2::from_angle(angle) * speed,
                };
                let particle = Particle::new(ParticleParams {
                    life: random(rng, 20.0, 40.0),
                    color: options.color,
                    size: random(rng, 1.0, 4.0),
                    rotation_speed: random(rng, -0.2, 0.2),
                    style: options.style,
                    ..Default::default()
                });
                (body, particle)
            })
            .collect()
    }

    /// Burst sized by the particle config
    pub fn brick_burst<R: Rng>(
        rng: &mut R,
        config: &Config,
        pos: Vec2,
        color: Color,
        count: u32,
        style: ParticleStyle,
    ) -> Vec<(Body, Particle)> {
        let speed = match style {
            ParticleStyle::Explosion => 6.0,
            ParticleStyle::Spark => 4.0,
            _ => config.particles.speed_range,
        };
        Particle::burst(
            rng,
            pos,
            BurstOptions {
                count,
                color,
                style,
                speed,
            },
        )
    }

    pub fn explosion<R: Rng>(rng: &mut R, pos: Vec2, color: Color) -> Vec<(Body, Particle)> {
        Particle::burst(
            rng,
            pos,
            BurstOptions {
                count: 12,
                color,
                style: ParticleStyle::Explosion,
                speed: 6.0,
            },
        )
    }

    pub fn sparks<R: Rng>(rng: &mut R, pos: Vec2, color: Color) -> Vec<(Body, Particle)> {
        Particle::burst(
            rng,
            pos,
            BurstOptions {
                count: 8,
                color,
                style: ParticleStyle::Spark,
                speed: 4.0,
            },
        )
    }

    /// Five rising puffs
    pub fn smoke<R: Rng>(rng: &mut R, pos: Vec2, color: Color) -> Vec<(Body, Particle)> {
        (0..5)
            .map(|_| {
                let body = Body {
                    pos: Vec2::new(pos.x + random(rng, -5.0, 5.0), pos.y),
                    vel: Vec2::new(random(rng, -1.0, 1.0), random(rng, -3.0, -1.0)),
                };
                let particle = Particle::new(ParticleParams {
                    life: random(rng, 40.0, 80.0),
                    color,
                    size: random(rng, 2.0, 5.0),
                    gravity: -0.05,
                    rotation_speed: random(rng, -0.2, 0.2),
                    style: ParticleStyle::Smoke,
                    ..Default::default()
                });
                (body, particle)
            })
            .collect()
    }

    /// A single weightless particle left behind a moving object
    pub fn trail<R: Rng>(rng: &mut R, pos: Vec2, color: Color) -> (Body, Particle) {
        let body = Body {
            pos: pos + Vec2::new(random(rng, -2.0, 2.0), random(rng, -2.0, 2.0)),
            vel: Vec2::new(random(rng, -0.5, 0.5), random(rng, -0.5, 0.5)),
        };
        let particle = Particle::new(ParticleParams {
            life: random(rng, 10.0, 20.0),
            color,
            size: random(rng, 0.5, 2.0),
            gravity: 0.0,
            friction: 0.95,
            ..Default::default()
        });
        (body, particle)
    }

    /// Fraction of life left, 1 when fresh
    pub fn life_ratio(&self) -> f32 {
        (self.life / self.max_life).max(0.0)
    }

    pub fn is_alive(&self) -> bool {
        self.life > 0.0 && self.alpha > 0.0
    }

    pub fn update(&mut self, body: &mut Body, dt: f64, ctx: &mut UpdateCtx) -> UpdateStatus {
        let scale = frame_scale(dt);

        body.vel.y += self.gravity * scale;
        body.vel *= self.friction.powf(scale);
        body.pos += body.vel * scale;
        self.rotation += self.rotation_speed * scale;

        self.life -= scale;
        let ratio = self.life_ratio();
        match self.style {
            ParticleStyle::Spark => {
                self.alpha = ratio * ratio;
                self.size = self.original_size * (0.8 + ratio * 0.2);
                if ctx.rng.random::<f32>() < 0.1 {
                    self.alpha *= 0.5;
                }
            }
            ParticleStyle::Smoke => {
                self.alpha = ratio * 0.6;
                self.size = self.original_size * (1.0 + (1.0 - ratio) * 2.0);
                body.vel.y *= 0.99;
            }
            ParticleStyle::Explosion => {
                self.alpha = if ratio > 0.7 {
                    1.0
                } else {
                    (ratio / 0.7) * (ratio / 0.7)
                };
                self.size = self.original_size * (0.5 + ratio * 0.5);
            }
            ParticleStyle::Default => {
                self.alpha = ratio;
                self.size = self.original_size * (0.3 + ratio * 0.7);
            }
        }

        if self.life <= 0.0 {
            UpdateStatus::Expired
        } else {
            UpdateStatus::Alive
        }
    }

    pub fn render(&self, body: &Body, draw: &mut dyn DrawContext) {
        if self.alpha <= 0.0 || self.size <= 0.0 {
            return;
        }
        match self.style {
            ParticleStyle::Explosion => draw.draw(Shape::Rect {
                rect: Rect::new(
                    body.pos.x - self.size / 2.0,
                    body.pos.y - self.size / 2.0,
                    self.size,
                    self.size,
                ),
                color: self.color,
                alpha: self.alpha,
                scale: Vec2::ONE,
                rotation: self.rotation,
            }),
            _ => draw.draw(Shape::Circle {
                center: body.pos,
                radius: self.size,
                color: self.color,
                alpha: self.alpha,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::FRAME_MS;
    use crate::sim::events::EventBus;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn tick(particle: &mut Particle, body: &mut Body, frames: usize) -> UpdateStatus {
        let config = Config::default();
        let bus = EventBus::new();
        let mut rng = Pcg32::seed_from_u64(3);
        let mut ctx = UpdateCtx {
            bus: &bus,
            config: &config,
            now: 0.0,
            rng: &mut rng,
        };
        let mut status = UpdateStatus::Alive;
        for _ in 0..frames {
            status = particle.update(body, FRAME_MS, &mut ctx);
        }
        status
    }

    #[test]
    fn test_expires_when_life_runs_out() {
        let mut particle = Particle::new(ParticleParams {
            life: 10.0,
            ..Default::default()
        });
        let mut body = Body::at(Vec2::ZERO);
        assert_eq!(tick(&mut particle, &mut body, 5), UpdateStatus::Alive);
        assert!(particle.alpha < 1.0 && particle.size < particle.original_size);
        assert_eq!(tick(&mut particle, &mut body, 6), UpdateStatus::Expired);
    }

    #[test]
    fn test_smoke_grows_and_rises() {
        let mut rng = Pcg32::seed_from_u64(9);
        let puffs = Particle::smoke(&mut rng, Vec2::new(100.0, 100.0), Color::rgb(0x88, 0x88, 0x88));
        assert_eq!(puffs.len(), 5);
        let (mut body, mut puff) = puffs[0].clone();
        tick(&mut puff, &mut body, 10);
        assert!(puff.size > puff.original_size);
        assert!(body.pos.y < 100.0);
        assert!(puff.alpha <= 0.6);
    }

    #[test]
    fn test_burst_counts_and_speeds() {
        let mut rng = Pcg32::seed_from_u64(4);
        let sparks = Particle::sparks(&mut rng, Vec2::ZERO, Color::WHITE);
        assert_eq!(sparks.len(), 8);
        assert!(sparks.iter().all(|(b, p)| {
            let speed = b.vel.length();
            p.style == ParticleStyle::Spark && (2.0..=4.0 + 1e-4).contains(&speed)
        }));
        assert_eq!(Particle::explosion(&mut rng, Vec2::ZERO, Color::WHITE).len(), 12);
    }

    #[test]
    fn test_explosion_stays_bright_early() {
        let mut particle = Particle::new(ParticleParams {
            life: 100.0,
            style: ParticleStyle::Explosion,
            ..Default::default()
        });
        let mut body = Body::at(Vec2::ZERO);
        tick(&mut particle, &mut body, 10);
        assert_eq!(particle.alpha, 1.0);
    }
}
