//! Bricks and their special kinds
//!
//! All bricks share the hit/destroy flow; the kind layers extra effects on
//! top of it (steel sparks, explosions, chain lightning, mystery bonuses).
//! Anything that has to touch other entities is published as an event and
//! resolved by the session after collision.

use std::f32::consts::TAU;

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::entity::{Body, Entity, EntityId, EntityKind, Tags, UpdateCtx, UpdateStatus, positive_or};
use super::events::{BonusSource, DestroySource, EventBus, GameEvent};
use super::particle::ParticleStyle;
use crate::config::{BrickTier, Color, Config};
use crate::frame_scale;
use crate::math::{Rect, lerp, random};
use crate::render::{DrawContext, Shape};

/// Reward rolled when a mystery brick is hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MysteryBonus {
    Points,
    PowerUp,
    ExtraBall,
    Combo,
}

impl MysteryBonus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MysteryBonus::Points => "points",
            MysteryBonus::PowerUp => "powerup",
            MysteryBonus::ExtraBall => "extraball",
            MysteryBonus::Combo => "combo",
        }
    }
}

/// Chain brick link state. Targets are ids resolved through the manager
/// and may be stale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainLinks {
    pub targets: Vec<EntityId>,
    pub is_chaining: bool,
    pub radius: f32,
    since_relink: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BrickKind {
    /// Index into the configured row tiers
    Standard { tier: usize },
    Steel,
    Explosive { radius: f32 },
    Chain(ChainLinks),
    Mystery { hue: f32 },
}

impl BrickKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrickKind::Standard { .. } => "standard",
            BrickKind::Steel => "steel",
            BrickKind::Explosive { .. } => "explosive",
            BrickKind::Chain(_) => "chain",
            BrickKind::Mystery { .. } => "mystery",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Brick {
    pub width: f32,
    pub height: f32,
    pub hits: u32,
    pub max_hits: u32,
    pub color: Color,
    pub original_color: Color,
    pub points: u32,
    /// White overlay, 1 right after a hit, fades over 200ms
    pub flash: f32,
    /// Squash/stretch, relaxes back to 1
    pub scale: Vec2,
    pub damage_alpha: f32,
    /// Free-running animation phase (glint, pulse, lightning)
    pub phase: f32,
    pub kind: BrickKind,
}

impl Brick {
    fn base(config: &Config, hits: u32, color: Color, points: u32, kind: BrickKind) -> Self {
        let hits = hits.max(1);
        Self {
            width: positive_or(config.bricks.width, 1.0),
            height: positive_or(config.bricks.height, 1.0),
            hits,
            max_hits: hits,
            color,
            original_color: color,
            points,
            flash: 0.0,
            scale: Vec2::ONE,
            damage_alpha: 0.0,
            phase: 0.0,
            kind,
        }
    }

    pub fn from_tier(config: &Config, tier: usize, spec: &BrickTier) -> Self {
        Brick::base(config, spec.hits, spec.color, spec.points, BrickKind::Standard { tier })
    }

    /// Standard brick for a grid row; rows past the tier table reuse the last tier
    pub fn standard(config: &Config, row: usize) -> Self {
        let types = &config.bricks.types;
        let tier = row.min(types.len().saturating_sub(1));
        match types.get(tier) {
            Some(spec) => Brick::from_tier(config, tier, spec),
            None => {
                log::warn!("No brick tiers configured, using a plain brick");
                Brick::base(config, 1, Color::WHITE, 10, BrickKind::Standard { tier: 0 })
            }
        }
    }

    pub fn steel(config: &Config) -> Self {
        let steel = &config.special_bricks.steel;
        Brick::base(config, steel.max_hits, steel.color, steel.points, BrickKind::Steel)
    }

    pub fn explosive(config: &Config) -> Self {
        let explosive = &config.special_bricks.explosive;
        Brick::base(
            config,
            1,
            explosive.color,
            explosive.points,
            BrickKind::Explosive {
                radius: explosive.explosion_radius,
            },
        )
    }

    pub fn chain(config: &Config) -> Self {
        let chain = &config.special_bricks.chain;
        Brick::base(
            config,
            1,
            chain.color,
            chain.points,
            BrickKind::Chain(ChainLinks {
                radius: chain.chain_radius,
                ..Default::default()
            }),
        )
    }

    pub fn mystery<R: Rng>(config: &Config, rng: &mut R) -> Self {
        let hue = random(rng, 0.0, 360.0);
        Brick::base(
            config,
            1,
            Color::from_hsl(hue, 1.0, 0.5),
            config.special_bricks.mystery.points,
            BrickKind::Mystery { hue },
        )
    }

    /// Build a brick by kind name; unknown names yield `None`
    pub fn from_name<R: Rng>(config: &Config, name: &str, row: usize, rng: &mut R) -> Option<Self> {
        match name {
            "standard" => Some(Brick::standard(config, row)),
            "steel" => Some(Brick::steel(config)),
            "explosive" => Some(Brick::explosive(config)),
            "chain" => Some(Brick::chain(config)),
            "mystery" => Some(Brick::mystery(config, rng)),
            _ => {
                log::warn!("Brick type '{name}' not found");
                None
            }
        }
    }

    /// Top-left corner of the grid cell at `(row, col)`
    pub fn grid_position(config: &Config, row: u32, col: u32) -> Vec2 {
        let b = &config.bricks;
        Vec2::new(
            col as f32 * (b.width + b.padding) + b.offset_left,
            row as f32 * (b.height + b.padding) + b.offset_top,
        )
    }

    /// Standard brick for a grid cell
    pub fn from_grid(config: &Config, row: u32, col: u32) -> (Vec2, Brick) {
        (
            Brick::grid_position(config, row, col),
            Brick::standard(config, row as usize),
        )
    }

    pub fn tags(&self) -> Tags {
        let base = Tags::BRICK | Tags::DESTRUCTIBLE | Tags::COLLIDABLE;
        base | match self.kind {
            BrickKind::Standard { .. } => Tags::empty(),
            BrickKind::Steel => Tags::STEEL | Tags::SPECIAL | Tags::DURABLE,
            BrickKind::Explosive { .. } => Tags::EXPLOSIVE | Tags::SPECIAL,
            BrickKind::Chain(_) => Tags::CHAIN | Tags::SPECIAL | Tags::ELECTRIC,
            BrickKind::Mystery { .. } => Tags::MYSTERY | Tags::SPECIAL | Tags::BONUS,
        }
    }

    pub fn is_damaged(&self) -> bool {
        self.hits < self.max_hits
    }

    pub fn damage_ratio(&self) -> f32 {
        1.0 - self.hits as f32 / self.max_hits as f32
    }

    pub fn is_chaining(&self) -> bool {
        matches!(&self.kind, BrickKind::Chain(links) if links.is_chaining)
    }

    pub fn chain_targets(&self) -> &[EntityId] {
        match &self.kind {
            BrickKind::Chain(links) => &links.targets,
            _ => &[],
        }
    }

    pub fn set_chain_targets(&mut self, targets: Vec<EntityId>) {
        if let BrickKind::Chain(links) = &mut self.kind {
            links.targets = targets;
        }
    }

    pub fn clear_links(&mut self) {
        if let BrickKind::Chain(links) = &mut self.kind {
            links.targets.clear();
        }
    }

    fn center(&self, body: &Body) -> Vec2 {
        body.pos + Vec2::new(self.width, self.height) / 2.0
    }

    /// Struck by a ball. Returns `true` if this hit destroyed the brick.
    pub fn hit(&mut self, id: EntityId, body: &Body, ctx: &mut UpdateCtx) -> bool {
        self.hit_from(id, body, DestroySource::Ball, ctx)
    }

    /// Take one hit from `source`, running the kind's effects first
    pub fn hit_from(
        &mut self,
        id: EntityId,
        body: &Body,
        source: DestroySource,
        ctx: &mut UpdateCtx,
    ) -> bool {
        if self.hits == 0 {
            return false;
        }
        let center = self.center(body);
        let bus = ctx.bus;

        match self.kind {
            BrickKind::Steel => {
                scatter(bus, ctx.rng, center, 15, Scatter {
                    jitter: Vec2::new(self.width, self.height),
                    speed: 0.3,
                    life: (500.0, 800.0),
                    size: (1.0, 3.0),
                    palette: &SPARK_COLORS,
                });
                bus.publish(GameEvent::ScreenShake { intensity: 3.0 });
                bus.publish(GameEvent::ColorFlash {
                    color: Color::rgb(0xCC, 0xCC, 0xCC),
                    intensity: 0.2,
                });
            }
            BrickKind::Explosive { radius } => {
                bus.publish(GameEvent::Explosion {
                    pos: center,
                    radius,
                    color: self.color,
                });
                bus.publish(GameEvent::ScreenShake { intensity: 8.0 });
                bus.publish(GameEvent::ColorFlash {
                    color: Color::rgb(0xFF, 0x44, 0x44),
                    intensity: 0.4,
                });
                bus.publish(GameEvent::BrickExplode {
                    brick: id,
                    center,
                    radius,
                });
                scatter(bus, ctx.rng, center, 50, Scatter {
                    jitter: Vec2::ZERO,
                    speed: 0.4,
                    life: (1500.0, 2500.0),
                    size: (2.0, 6.0),
                    palette: &EXPLOSION_COLORS,
                });
            }
            BrickKind::Chain(_) => self.trigger_chain_reaction(id, center, ctx),
            BrickKind::Mystery { hue } => {
                self.grant_mystery_bonus(center, ctx);
                let count = 30;
                for i in 0..count {
                    let angle = TAU * i as f32 / count as f32;
                    let speed = random(ctx.rng, 0.1, 0.3);
                    bus.publish(GameEvent::ParticleCreate {
                        pos: center,
                        vel: Vec2::from_angle(angle) * speed,
                        color: Color::from_hsl(hue + i as f32 * 12.0, 1.0, 0.5),
                        size: random(ctx.rng, 2.0, 5.0),
                        life_ms: random(ctx.rng, 1000.0, 1500.0),
                    });
                }
                bus.publish(GameEvent::ColorFlash {
                    color: self.color,
                    intensity: 0.3,
                });
                bus.publish(GameEvent::ScreenShake { intensity: 5.0 });
            }
            BrickKind::Standard { .. } => {}
        }

        self.hits -= 1;
        self.trigger_hit_effect(center, ctx);
        bus.publish(GameEvent::BrickHit {
            brick: id,
            pos: center,
            hits_remaining: self.hits,
            points: self.points,
        });

        if self.hits > 0 {
            return false;
        }

        if self.kind == BrickKind::Steel {
            scatter(bus, ctx.rng, center, 20, Scatter {
                jitter: Vec2::ZERO,
                speed: 0.4,
                life: (1000.0, 1500.0),
                size: (2.0, 5.0),
                palette: &[Color::rgb(0x88, 0x88, 0x88)],
            });
            bus.publish(GameEvent::ScreenShake { intensity: 6.0 });
        }
        self.publish_destroyed(id, center, source, bus);
        true
    }

    /// Flash, squash and the standard particle burst
    fn trigger_hit_effect(&mut self, center: Vec2, ctx: &mut UpdateCtx) {
        self.flash = 1.0;
        self.scale = Vec2::new(1.1, 0.9);
        ctx.bus.publish(GameEvent::ParticleSpawn {
            pos: center,
            color: self.color,
            count: ctx.config.particles.count_per_brick,
            style: ParticleStyle::Default,
        });

        match self.kind {
            BrickKind::Explosive { .. } => {
                ctx.bus.publish(GameEvent::ScreenShake { intensity: 4.0 });
            }
            BrickKind::Chain(_) => {
                let count = 12;
                for i in 0..count {
                    let angle = TAU * i as f32 / count as f32;
                    let speed = random(ctx.rng, 0.08, 0.2);
                    let color = pick(ctx.rng, &LIGHTNING_COLORS);
                    ctx.bus.publish(GameEvent::ParticleCreate {
                        pos: center,
                        vel: Vec2::from_angle(angle) * speed,
                        color,
                        size: random(ctx.rng, 1.0, 2.0),
                        life_ms: 500.0,
                    });
                }
            }
            BrickKind::Mystery { .. } => {
                for _ in 0..15 {
                    let angle = random(ctx.rng, 0.0, TAU);
                    let speed = random(ctx.rng, 0.05, 0.15);
                    let hue = random(ctx.rng, 0.0, 360.0);
                    ctx.bus.publish(GameEvent::ParticleCreate {
                        pos: center,
                        vel: Vec2::from_angle(angle) * speed,
                        color: Color::from_hsl(hue, 1.0, 0.5),
                        size: random(ctx.rng, 1.0, 3.0),
                        life_ms: 800.0,
                    });
                }
            }
            _ => {}
        }
    }

    fn publish_destroyed(&mut self, id: EntityId, center: Vec2, source: DestroySource, bus: &EventBus) {
        self.hits = 0;
        self.clear_links();
        bus.publish(GameEvent::BrickDestroyed {
            brick: id,
            pos: center,
            points: self.points,
            color: self.original_color,
            source,
        });
    }

    /// Remove outright without hit effects (explosion blast)
    pub fn shatter(&mut self, id: EntityId, body: &Body, source: DestroySource, bus: &EventBus) -> bool {
        if self.hits == 0 {
            return false;
        }
        let center = self.center(body);
        self.publish_destroyed(id, center, source, bus);
        true
    }

    /// Publish `chain:reaction` once per brick
    fn trigger_chain_reaction(&mut self, id: EntityId, center: Vec2, ctx: &mut UpdateCtx) {
        let BrickKind::Chain(links) = &mut self.kind else {
            return;
        };
        if links.is_chaining {
            return;
        }
        links.is_chaining = true;
        let targets = links.targets.clone();

        scatter(ctx.bus, ctx.rng, center, 25, Scatter {
            jitter: Vec2::ZERO,
            speed: 0.3,
            life: (800.0, 1200.0),
            size: (1.0, 3.0),
            palette: &LIGHTNING_COLORS,
        });
        log::debug!("Chain reaction from brick {id} to {} targets", targets.len());
        ctx.bus.publish(GameEvent::ChainReaction {
            source: id,
            targets,
            pos: center,
        });
        ctx.bus.publish(GameEvent::ScreenShake { intensity: 4.0 });
        ctx.bus.publish(GameEvent::ColorFlash {
            color: Color::rgb(0x00, 0xAA, 0xFF),
            intensity: 0.25,
        });
    }

    /// Set off by a neighbouring chain brick: destroyed without a ball.
    ///
    /// Returns `false` for non-chain bricks, already chaining bricks and
    /// bricks that are already gone.
    pub fn chain_activate(&mut self, id: EntityId, body: &Body, ctx: &mut UpdateCtx) -> bool {
        if self.hits == 0 || !matches!(self.kind, BrickKind::Chain(_)) || self.is_chaining() {
            return false;
        }
        let center = self.center(body);
        self.trigger_chain_reaction(id, center, ctx);
        self.publish_destroyed(id, center, DestroySource::Chain, ctx.bus);
        true
    }

    fn grant_mystery_bonus(&self, center: Vec2, ctx: &mut UpdateCtx) {
        let mystery = &ctx.config.special_bricks.mystery;
        if mystery.bonus_effects.is_empty() {
            return;
        }
        let bonus = mystery.bonus_effects[ctx.rng.random_range(0..mystery.bonus_effects.len())];
        match bonus {
            MysteryBonus::Points => {
                let (low, high) = mystery.bonus_points;
                let points = if high > low {
                    ctx.rng.random_range(low..high)
                } else {
                    low
                };
                ctx.bus.publish(GameEvent::ScoreBonus {
                    points: points as u64,
                    source: BonusSource::Mystery,
                    multiplier: 1,
                });
            }
            MysteryBonus::PowerUp => ctx.bus.publish(GameEvent::PowerUpSpawn {
                pos: center,
                kind: None,
            }),
            MysteryBonus::ExtraBall => ctx.bus.publish(GameEvent::ExtraBall { pos: center }),
            MysteryBonus::Combo => ctx.bus.publish(GameEvent::ComboBonus {
                amount: mystery.combo_bonus,
            }),
        }
        ctx.bus.publish(GameEvent::BonusReveal { pos: center, bonus });
    }

    pub fn update(&mut self, id: EntityId, body: &Body, dt: f64, ctx: &mut UpdateCtx) -> UpdateStatus {
        if self.flash > 0.0 {
            self.flash = (self.flash - (dt / 200.0) as f32).max(0.0);
        }
        if self.scale != Vec2::ONE {
            let t = ((dt / 100.0) as f32).min(1.0);
            self.scale = Vec2::new(lerp(self.scale.x, 1.0, t), lerp(self.scale.y, 1.0, t));
            if (self.scale.x - 1.0).abs() < 0.01 {
                self.scale.x = 1.0;
            }
            if (self.scale.y - 1.0).abs() < 0.01 {
                self.scale.y = 1.0;
            }
        }
        self.damage_alpha = if self.is_damaged() {
            self.damage_ratio() * 0.4
        } else {
            0.0
        };

        let center = self.center(body);
        match &mut self.kind {
            BrickKind::Standard { .. } => {}
            BrickKind::Steel => self.phase += (dt * 0.003) as f32,
            BrickKind::Explosive { .. } => self.phase += (dt * 0.005) as f32,
            BrickKind::Chain(links) => {
                self.phase += (dt * 0.008) as f32;
                links.since_relink += dt;
                if links.since_relink >= ctx.config.special_bricks.chain.relink_interval {
                    links.since_relink = 0.0;
                    ctx.bus.publish(GameEvent::ChainFindTargets {
                        brick: id,
                        center,
                        radius: links.radius,
                    });
                }
            }
            BrickKind::Mystery { hue } => {
                let shift = ctx.config.special_bricks.mystery.color_shift_speed * frame_scale(dt);
                *hue = (*hue + shift).rem_euclid(360.0);
                self.color = Color::from_hsl(*hue, 1.0, 0.5);
            }
        }
        UpdateStatus::Alive
    }

    pub fn render(&self, bounds: Rect, draw: &mut dyn DrawContext) {
        let color = if self.is_damaged() {
            self.original_color.darken(1.0 - self.damage_ratio() * 0.5)
        } else {
            self.color
        };
        let layer = |color: Color, alpha: f32| Shape::Rect {
            rect: bounds,
            color,
            alpha,
            scale: self.scale,
            rotation: 0.0,
        };

        draw.draw(layer(color, 1.0));
        match self.kind {
            BrickKind::Explosive { .. } => {
                draw.draw(layer(Color::rgb(0xFF, 0x88, 0x00), 0.3 + self.phase.sin() * 0.2));
            }
            BrickKind::Chain(_) => {
                draw.draw(layer(Color::rgb(0xAA, 0xEE, 0xFF), (0.4 + self.phase.sin() * 0.3) * 0.3));
            }
            _ => {}
        }
        if self.flash > 0.0 {
            draw.draw(layer(Color::WHITE, self.flash));
        }
        if self.damage_alpha > 0.0 {
            draw.draw(layer(Color::rgb(0, 0, 0), self.damage_alpha));
        }

        if self.max_hits > 1 {
            let size = 4.0;
            let spacing = 2.0;
            let start_x = bounds.right() - self.max_hits as f32 * (size + spacing) + spacing;
            let y = bounds.bottom() - size - 2.0;
            for i in 0..self.max_hits {
                draw.draw(Shape::Rect {
                    rect: Rect::new(start_x + i as f32 * (size + spacing), y, size, size),
                    color: Color::WHITE,
                    alpha: if i < self.hits { 0.8 } else { 0.2 },
                    scale: Vec2::ONE,
                    rotation: 0.0,
                });
            }
        }
    }
}

impl Entity {
    /// Ball strike on a brick entity; flags the entity destroyed at zero hits
    pub fn hit_brick(&mut self, ctx: &mut UpdateCtx) -> bool {
        self.hit_brick_from(DestroySource::Ball, ctx)
    }

    pub fn hit_brick_from(&mut self, source: DestroySource, ctx: &mut UpdateCtx) -> bool {
        let id = self.id;
        let EntityKind::Brick(brick) = &mut self.kind else {
            return false;
        };
        let destroyed = brick.hit_from(id, &self.body, source, ctx);
        if destroyed {
            self.destroy();
        }
        destroyed
    }

    /// Chain activation on a brick entity
    pub fn chain_activate_brick(&mut self, ctx: &mut UpdateCtx) -> bool {
        if !self.visible {
            return false;
        }
        let id = self.id;
        let EntityKind::Brick(brick) = &mut self.kind else {
            return false;
        };
        let destroyed = brick.chain_activate(id, &self.body, ctx);
        if destroyed {
            self.destroy();
        }
        destroyed
    }

    /// Blast removal without hit effects
    pub fn shatter_brick(&mut self, source: DestroySource, bus: &EventBus) -> bool {
        let id = self.id;
        let EntityKind::Brick(brick) = &mut self.kind else {
            return false;
        };
        let destroyed = brick.shatter(id, &self.body, source, bus);
        if destroyed {
            self.destroy();
        }
        destroyed
    }
}

const SPARK_COLORS: [Color; 4] = [
    Color::rgb(0xFF, 0xFF, 0x00),
    Color::rgb(0xFF, 0xAA, 0x00),
    Color::rgb(0xFF, 0xFF, 0xFF),
    Color::rgb(0xFF, 0xDD, 0x44),
];

const EXPLOSION_COLORS: [Color; 4] = [
    Color::rgb(0xFF, 0x44, 0x44),
    Color::rgb(0xFF, 0x88, 0x00),
    Color::rgb(0xFF, 0xAA, 0x00),
    Color::rgb(0xFF, 0xFF, 0x00),
];

const LIGHTNING_COLORS: [Color; 4] = [
    Color::rgb(0x00, 0xAA, 0xFF),
    Color::rgb(0xFF, 0xFF, 0xFF),
    Color::rgb(0xAA, 0xEE, 0xFF),
    Color::rgb(0x00, 0x88, 0xCC),
];

fn pick<R: Rng>(rng: &mut R, palette: &[Color]) -> Color {
    if palette.is_empty() {
        return Color::WHITE;
    }
    palette[rng.random_range(0..palette.len())]
}

/// Shape of a randomized `particle:create` burst
struct Scatter<'a> {
    /// Spawn offset range around the origin
    jitter: Vec2,
    /// Per-axis velocity range (units/ms)
    speed: f32,
    life: (f32, f32),
    size: (f32, f32),
    palette: &'a [Color],
}

fn scatter<R: Rng>(bus: &EventBus, rng: &mut R, origin: Vec2, count: u32, s: Scatter) {
    for _ in 0..count {
        let offset = Vec2::new(
            (rng.random::<f32>() - 0.5) * s.jitter.x,
            (rng.random::<f32>() - 0.5) * s.jitter.y,
        );
        let vel = Vec2::new(
            (rng.random::<f32>() - 0.5) * s.speed,
            (rng.random::<f32>() - 0.5) * s.speed,
        );
        let color = pick(rng, s.palette);
        bus.publish(GameEvent::ParticleCreate {
            pos: origin + offset,
            vel,
            color,
            size: random(rng, s.size.0, s.size.1),
            life_ms: random(rng, s.life.0, s.life.1),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::FRAME_MS;
    use crate::sim::events::{EventKind, record};
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    struct Fixture {
        config: Config,
        bus: EventBus,
        rng: Pcg32,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                config: Config::default(),
                bus: EventBus::new(),
                rng: Pcg32::seed_from_u64(11),
            }
        }

        fn ctx(&mut self) -> UpdateCtx<'_> {
            UpdateCtx {
                bus: &self.bus,
                config: &self.config,
                now: 0.0,
                rng: &mut self.rng,
            }
        }
    }

    #[test]
    fn test_two_hit_brick_lifecycle() {
        let mut fx = Fixture::new();
        let log = record(&fx.bus, &[EventKind::BrickHit, EventKind::BrickDestroyed]);
        let mut entity = Entity::new(1, Vec2::new(35.0, 60.0), EntityKind::Brick(Brick::standard(&fx.config, 2)));
        assert_eq!(entity.as_brick().unwrap().max_hits, 2);

        assert!(!entity.hit_brick(&mut fx.ctx()));
        assert!(entity.visible && entity.active);
        assert!(matches!(
            log.borrow()[0],
            GameEvent::BrickHit { hits_remaining: 1, .. }
        ));

        assert!(entity.hit_brick(&mut fx.ctx()));
        assert!(entity.is_destroyed());
        let events = log.borrow();
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[2],
            GameEvent::BrickDestroyed {
                brick: 1,
                points: 30,
                source: DestroySource::Ball,
                ..
            }
        ));
        drop(events);

        // A destroyed brick can't be hit again
        assert!(!entity.hit_brick(&mut fx.ctx()));
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn test_explosive_publishes_explode_once() {
        let mut fx = Fixture::new();
        let log = record(&fx.bus, &[EventKind::BrickExplode, EventKind::BrickDestroyed]);
        let mut entity = Entity::new(4, Vec2::new(100.0, 100.0), EntityKind::Brick(Brick::explosive(&fx.config)));
        assert!(entity.has_tag(Tags::EXPLOSIVE | Tags::SPECIAL));

        assert!(entity.hit_brick(&mut fx.ctx()));
        let events = log.borrow();
        let explodes: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                GameEvent::BrickExplode { brick, center, radius } => Some((*brick, *center, *radius)),
                _ => None,
            })
            .collect();
        assert_eq!(explodes, vec![(4, Vec2::new(137.5, 110.0), 90.0)]);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_steel_takes_three_hits() {
        let mut fx = Fixture::new();
        let shakes = record(&fx.bus, &[EventKind::ScreenShake]);
        let mut entity = Entity::new(2, Vec2::ZERO, EntityKind::Brick(Brick::steel(&fx.config)));
        assert!(!entity.hit_brick(&mut fx.ctx()));
        assert!(!entity.hit_brick(&mut fx.ctx()));
        assert!(entity.hit_brick(&mut fx.ctx()));
        let intensities: Vec<f32> = shakes
            .borrow()
            .iter()
            .filter_map(|e| match e {
                GameEvent::ScreenShake { intensity } => Some(*intensity),
                _ => None,
            })
            .collect();
        assert_eq!(intensities, vec![3.0, 3.0, 3.0, 6.0]);
    }

    #[test]
    fn test_chain_reaction_fires_once() {
        let mut fx = Fixture::new();
        let log = record(&fx.bus, &[EventKind::ChainReaction, EventKind::BrickDestroyed]);
        let mut brick = Brick::chain(&fx.config);
        brick.set_chain_targets(vec![7, 8]);
        let mut entity = Entity::new(6, Vec2::ZERO, EntityKind::Brick(brick));

        assert!(entity.chain_activate_brick(&mut fx.ctx()));
        assert!(entity.is_destroyed());
        assert!(!entity.chain_activate_brick(&mut fx.ctx()));
        assert!(!entity.hit_brick(&mut fx.ctx()));

        let events = log.borrow();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], GameEvent::ChainReaction { source: 6, targets, .. } if targets == &vec![7, 8]));
        assert!(matches!(
            events[1],
            GameEvent::BrickDestroyed {
                source: DestroySource::Chain,
                ..
            }
        ));
    }

    #[test]
    fn test_chain_relinks_on_interval() {
        let mut fx = Fixture::new();
        let log = record(&fx.bus, &[EventKind::ChainFindTargets]);
        let mut brick = Brick::chain(&fx.config);
        let body = Body::at(Vec2::ZERO);
        for _ in 0..101 {
            brick.update(3, &body, FRAME_MS, &mut fx.ctx());
        }
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_mystery_combo_bonus() {
        let mut fx = Fixture::new();
        fx.config.special_bricks.mystery.bonus_effects = vec![MysteryBonus::Combo];
        let log = record(&fx.bus, &[EventKind::ComboBonus, EventKind::BonusReveal]);
        let brick = Brick::mystery(&fx.config, &mut fx.rng);
        let mut entity = Entity::new(9, Vec2::ZERO, EntityKind::Brick(brick));
        assert!(entity.hit_brick(&mut fx.ctx()));
        let events = log.borrow();
        assert_eq!(events[0], GameEvent::ComboBonus { amount: 5 });
        assert!(matches!(
            events[1],
            GameEvent::BonusReveal {
                bonus: MysteryBonus::Combo,
                ..
            }
        ));
    }

    #[test]
    fn test_visuals_relax() {
        let mut fx = Fixture::new();
        let mut brick = Brick::standard(&fx.config, 3);
        let body = Body::at(Vec2::ZERO);
        brick.hit(1, &body, &mut fx.ctx());
        assert_eq!(brick.flash, 1.0);
        assert!(brick.damage_ratio() > 0.0);
        for _ in 0..20 {
            brick.update(1, &body, FRAME_MS, &mut fx.ctx());
        }
        assert_eq!(brick.flash, 0.0);
        assert_eq!(brick.scale, Vec2::ONE);
        assert!((brick.damage_alpha - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_name_and_grid() {
        let config = Config::default();
        let mut rng = Pcg32::seed_from_u64(1);
        assert!(Brick::from_name(&config, "rubber", 0, &mut rng).is_none());
        assert!(Brick::from_name(&config, "steel", 0, &mut rng).is_some());

        let (pos, brick) = Brick::from_grid(&config, 1, 2);
        assert_eq!(pos, Vec2::new(2.0 * 80.0 + 35.0, 25.0 + 60.0));
        assert_eq!(brick.points, 20);
        // Rows past the table reuse the last tier
        assert_eq!(Brick::standard(&config, 9).points, 40);
    }
}
