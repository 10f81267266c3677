//! One game session: frame driver, levels, scoring and lives
//!
//! The session owns the bus, the entity manager and every system. Event
//! handlers never touch the manager directly; anything that changes the
//! world (explosions, chain reactions, drops, extra balls, particle bursts)
//! is recorded as a [`WorldCommand`] and resolved after collision, looping
//! until cascades settle.

use std::cell::RefCell;
use std::rc::Rc;

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::achievements::{Achievement, AchievementSystem};
use super::assist::AssistanceSystem;
use super::ball::Ball;
use super::brick::{Brick, BrickKind};
use super::collision::CollisionSystem;
use super::combo::ComboSystem;
use super::effects::EffectsSystem;
use super::entity::{Body, Entity, EntityId, EntityKind, EntityType, SimTime, Tags, UpdateCtx};
use super::events::{ContextId, DestroySource, EventBus, EventKind, GameEvent, handler};
use super::manager::EntityManager;
use super::paddle::{Paddle, PaddleInput};
use super::particle::{Particle, ParticleStyle};
use super::powerup::{PowerUp, PowerUpKind};
use crate::config::{Color, Config};
use crate::consts::MAX_FRAME_MS;
use crate::math::to_radians;
use crate::render::{DrawContext, Overlay};

/// Effects stream is derived from the session seed so visuals never draw
/// from the gameplay stream
const EFFECTS_STREAM: u64 = 0x9E37_79B9_7F4A_7C15;
const OVERLAY_STREAM: u64 = 0xD1B5_4A32_D192_ED03;

/// Cascade rounds resolved per frame before the rest waits a frame
const MAX_COMMAND_ROUNDS: usize = 64;

/// Extra balls leave at this angle either side of the source ball
const MULTI_BALL_SPREAD_DEG: f32 = 30.0;

/// Current phase of gameplay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    /// Ball docked on the paddle, waiting for launch input
    Serve,
    /// Active gameplay
    Playing,
    /// Game is paused
    Paused,
    /// Between-level rest period
    LevelComplete,
    /// Out of lives
    GameOver,
}

/// Input intents for a single frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameInput {
    pub left: bool,
    pub right: bool,
    /// Pointer x in playfield units
    pub pointer_x: f32,
    /// Follow the pointer instead of the keys
    pub use_pointer: bool,
    /// Launch docked balls
    pub launch: bool,
    /// Pause toggle
    pub pause: bool,
    /// Demo mode - the paddle plays itself
    pub autopilot: bool,
}

/// World-level side effect raised by a handler, resolved by the session
#[derive(Debug, Clone, PartialEq)]
pub enum WorldCommand {
    Explode {
        source: EntityId,
        center: Vec2,
        radius: f32,
    },
    Chain {
        targets: Vec<EntityId>,
    },
    Relink {
        brick: EntityId,
        center: Vec2,
        radius: f32,
    },
    DropPowerUp {
        pos: Vec2,
    },
    SpawnPowerUp {
        pos: Vec2,
        kind: Option<PowerUpKind>,
    },
    MultiBall {
        pos: Vec2,
    },
    Particles {
        pos: Vec2,
        color: Color,
        count: u32,
        style: ParticleStyle,
    },
}

#[derive(Debug, Default)]
struct Scoreboard {
    score: u64,
    lives: u32,
    bricks_destroyed: u32,
}

/// End-of-run numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub seed: u64,
    pub score: u64,
    pub level: u32,
    pub lives: u32,
    pub bricks_destroyed: u32,
    pub max_combo: u32,
    pub achievements: Vec<Achievement>,
    pub sim_time_ms: f64,
    pub phase: GamePhase,
}

pub struct Session {
    config: Config,
    seed: u64,
    bus: EventBus,
    manager: EntityManager,
    collision: CollisionSystem,
    combo: ComboSystem,
    assist: AssistanceSystem,
    effects: EffectsSystem,
    achievements: AchievementSystem,
    /// Gameplay stream: launches, hits, drops, level layout
    rng: Pcg32,
    /// Visual stream: particle entity bursts and animation jitter
    effects_rng: Pcg32,
    commands: Rc<RefCell<Vec<WorldCommand>>>,
    scoreboard: Rc<RefCell<Scoreboard>>,
    phase: GamePhase,
    level: u32,
    now: SimTime,
    breather_left: f64,
}

impl Session {
    pub fn new(config: Config, seed: u64) -> Self {
        let bus = EventBus::new();
        let context = bus.new_context();
        let commands = Rc::new(RefCell::new(Vec::new()));
        let scoreboard = Rc::new(RefCell::new(Scoreboard {
            lives: config.game.initial_lives,
            ..Default::default()
        }));
        record_world_commands(&bus, &commands, context);
        track_score(&bus, &scoreboard, context);

        let collision = CollisionSystem::new();
        let combo = ComboSystem::new(&config.combo, &bus);
        let assist = AssistanceSystem::new(&config.ai, &bus);
        let effects = EffectsSystem::new(&config.effects, seed ^ OVERLAY_STREAM, &bus);
        let achievements = AchievementSystem::new(&config.achievements, &bus);

        let mut session = Self {
            rng: Pcg32::seed_from_u64(seed),
            effects_rng: Pcg32::seed_from_u64(seed ^ EFFECTS_STREAM),
            config,
            seed,
            bus,
            manager: EntityManager::new(),
            collision,
            combo,
            assist,
            effects,
            achievements,
            commands,
            scoreboard,
            phase: GamePhase::Serve,
            level: 1,
            now: 0.0,
            breather_left: 0.0,
        };

        log::info!("Starting session (seed {seed})");
        session.spawn_paddle();
        session.generate_level(1);
        session.spawn_docked_ball();
        session.manager.flush(&session.bus);
        session.bus.publish(GameEvent::GameStart);
        session.bus.publish(GameEvent::LevelStart { level: 1 });
        session
    }

    /// Back to level 1 with full lives; the rng streams carry on
    pub fn restart(&mut self) {
        log::info!("Restarting session");
        self.bus.publish(GameEvent::GameRestart);
        self.commands.borrow_mut().clear();
        {
            let mut board = self.scoreboard.borrow_mut();
            *board = Scoreboard {
                lives: self.config.game.initial_lives,
                ..Default::default()
            };
        }
        self.manager.clear();
        self.collision.reset();
        self.phase = GamePhase::Serve;
        self.level = 1;
        self.breather_left = 0.0;

        self.spawn_paddle();
        self.generate_level(1);
        self.spawn_docked_ball();
        self.manager.flush(&self.bus);
        self.bus.publish(GameEvent::GameStart);
        self.bus.publish(GameEvent::LevelStart { level: 1 });
    }

    /// Advance one frame. Never fails; a bad `dt` is clamped.
    pub fn update(&mut self, dt: f64, input: &FrameInput) {
        let dt = if dt.is_finite() { dt.clamp(0.0, MAX_FRAME_MS) } else { 0.0 };

        if input.pause {
            self.toggle_pause();
        }
        match self.phase {
            GamePhase::Paused | GamePhase::GameOver => return,
            _ => {}
        }

        self.now += dt;

        if self.phase == GamePhase::LevelComplete {
            self.breather_left -= dt;
            if self.breather_left <= 0.0 {
                self.next_level();
            }
        }

        let mut input = *input;
        if input.autopilot {
            self.autopilot(&mut input);
        }
        self.apply_input(&input);

        {
            let mut ctx = UpdateCtx {
                bus: &self.bus,
                config: &self.config,
                now: self.now,
                rng: &mut self.effects_rng,
            };
            self.manager.update(dt, &mut ctx);
        }

        if self.phase != GamePhase::LevelComplete {
            let mut ctx = UpdateCtx {
                bus: &self.bus,
                config: &self.config,
                now: self.now,
                rng: &mut self.rng,
            };
            self.collision.update(&mut self.manager, &mut ctx);
        }

        self.resolve_commands();
        self.check_ball_supply();
        self.check_level_complete();

        self.combo.update(dt, &self.bus);
        self.assist
            .update(dt, self.now, &mut self.manager, &mut self.collision, &self.bus);
        self.effects.update(dt);
        self.achievements.update(dt);
    }

    fn toggle_pause(&mut self) {
        match self.phase {
            GamePhase::Playing | GamePhase::Serve => {
                self.phase = GamePhase::Paused;
                self.bus.publish(GameEvent::GamePause);
            }
            GamePhase::Paused => {
                let docked = self
                    .manager
                    .entities_by_type(EntityType::Ball)
                    .filter_map(Entity::as_ball)
                    .any(|b| b.on_paddle);
                self.phase = if docked { GamePhase::Serve } else { GamePhase::Playing };
                self.bus.publish(GameEvent::GameResume);
            }
            _ => {}
        }
    }

    /// Track the lowest descending ball and serve automatically
    fn autopilot(&self, input: &mut FrameInput) {
        if self.phase == GamePhase::Serve {
            input.launch = true;
        }
        let target = self
            .manager
            .entities_by_type(EntityType::Ball)
            .filter(|e| e.as_ball().is_some_and(Ball::in_flight))
            .max_by(|a, b| {
                let key = |e: &Entity| (e.vel().y > 0.0, e.pos().y);
                let (da, ya) = key(a);
                let (db, yb) = key(b);
                da.cmp(&db).then(ya.total_cmp(&yb))
            });
        if let Some(ball) = target {
            input.pointer_x = ball.pos().x;
            input.use_pointer = true;
            input.left = false;
            input.right = false;
        }
    }

    fn apply_input(&mut self, input: &FrameInput) {
        if let Some(id) = self.paddle_id()
            && let Some(paddle) = self.manager.get_mut(id).and_then(Entity::as_paddle_mut)
        {
            paddle.set_input(PaddleInput {
                left: input.left,
                right: input.right,
                pointer_x: input.pointer_x,
                use_pointer: input.use_pointer,
            });
        }

        if input.launch && self.phase == GamePhase::Serve {
            for id in self.manager.ids_by_type(EntityType::Ball) {
                let Some(entity) = self.manager.get_mut(id) else {
                    continue;
                };
                if let EntityKind::Ball(ball) = &mut entity.kind {
                    ball.launch(id, &mut entity.body, None, &mut self.rng, &self.bus);
                }
            }
            self.phase = GamePhase::Playing;
        }
    }

    /// Drain and apply recorded world commands until cascades settle
    fn resolve_commands(&mut self) {
        for _ in 0..MAX_COMMAND_ROUNDS {
            let batch = std::mem::take(&mut *self.commands.borrow_mut());
            if batch.is_empty() {
                return;
            }
            for command in batch {
                self.apply_command(command);
            }
        }
        log::warn!("World command cascade still running, deferring to next frame");
    }

    fn apply_command(&mut self, command: WorldCommand) {
        match command {
            WorldCommand::Explode {
                source,
                center,
                radius,
            } => self.explode(source, center, radius),
            WorldCommand::Chain { targets } => {
                let mut ctx = UpdateCtx {
                    bus: &self.bus,
                    config: &self.config,
                    now: self.now,
                    rng: &mut self.rng,
                };
                for id in targets {
                    // Stale ids are skipped
                    let Some(entity) = self.manager.get_mut(id) else {
                        continue;
                    };
                    if entity.chain_activate_brick(&mut ctx) {
                        self.manager.queue_remove(id);
                    }
                }
            }
            WorldCommand::Relink {
                brick,
                center,
                radius,
            } => self.link_chain(brick, center, radius),
            WorldCommand::DropPowerUp { pos } => {
                if self.phase == GamePhase::LevelComplete {
                    return;
                }
                if let Some((body, powerup)) = PowerUp::create_at_position(&mut self.rng, &self.config, pos) {
                    self.spawn_powerup(body, powerup);
                }
            }
            WorldCommand::SpawnPowerUp { pos, kind } => {
                let created = match kind {
                    Some(kind) => PowerUp::create_of_type(&mut self.rng, &self.config, pos, kind),
                    None => {
                        let types = &self.config.powerups.types;
                        if types.is_empty() {
                            None
                        } else {
                            let kind = types[self.rng.random_range(0..types.len())].kind;
                            PowerUp::create_of_type(&mut self.rng, &self.config, pos, kind)
                        }
                    }
                };
                if let Some((body, powerup)) = created {
                    self.spawn_powerup(body, powerup);
                }
            }
            WorldCommand::MultiBall { pos } => self.multi_ball(pos),
            WorldCommand::Particles {
                pos,
                color,
                count,
                style,
            } => {
                let scaled = (count as f32 * self.config.effects.quality.burst_scale()).round() as u32;
                if scaled == 0 {
                    return;
                }
                for (body, particle) in
                    Particle::brick_burst(&mut self.effects_rng, &self.config, pos, color, scaled, style)
                {
                    self.spawn_body(body, EntityKind::Particle(particle));
                }
            }
        }
    }

    /// Blast every other live brick whose center lies within `radius`.
    /// Durable and explosive bricks take a hit; the rest shatter.
    fn explode(&mut self, source: EntityId, center: Vec2, radius: f32) {
        let in_range: Vec<EntityId> = self
            .manager
            .entities_by_type(EntityType::Brick)
            .filter(|e| e.id != source && e.visible && e.center().distance(center) <= radius)
            .map(|e| e.id)
            .collect();
        log::debug!("Explosion at {center} reaches {} bricks", in_range.len());

        let mut ctx = UpdateCtx {
            bus: &self.bus,
            config: &self.config,
            now: self.now,
            rng: &mut self.rng,
        };
        for id in in_range {
            let Some(entity) = self.manager.get_mut(id) else {
                continue;
            };
            let takes_hit = entity.has_tag(Tags::STEEL) || entity.has_tag(Tags::EXPLOSIVE);
            let destroyed = if takes_hit {
                entity.hit_brick_from(DestroySource::Explosion, &mut ctx)
            } else if entity.has_tag(Tags::CHAIN) && entity.chain_activate_brick(&mut ctx) {
                // A blasted chain brick still passes the reaction on
                true
            } else {
                entity.shatter_brick(DestroySource::Explosion, ctx.bus)
            };
            if destroyed {
                self.manager.queue_remove(id);
            }
        }
    }

    /// Point a chain brick at every other live chain brick within `radius`
    fn link_chain(&mut self, brick: EntityId, center: Vec2, radius: f32) {
        let targets: Vec<EntityId> = self
            .manager
            .entities_by_type(EntityType::Brick)
            .filter(|e| {
                e.id != brick
                    && e.visible
                    && e.has_tag(Tags::CHAIN)
                    && e.center().distance(center) <= radius
            })
            .map(|e| e.id)
            .collect();
        if let Some(chain) = self.manager.get_mut(brick).and_then(Entity::as_brick_mut) {
            chain.set_chain_targets(targets);
        }
    }

    /// Two extra balls fanned out from the first ball in flight
    fn multi_ball(&mut self, pos: Vec2) {
        let speed = self.level_speed();
        let (origin, base_vel) = self
            .manager
            .entities_by_type(EntityType::Ball)
            .find(|e| e.as_ball().is_some_and(Ball::in_flight))
            .map(|e| (e.pos(), e.vel()))
            .unwrap_or((pos, Vec2::new(0.0, -speed)));
        let base_vel = if base_vel.length_squared() > 0.0 {
            base_vel
        } else {
            Vec2::new(0.0, -speed)
        };

        let spread = to_radians(MULTI_BALL_SPREAD_DEG);
        for angle in [-spread, spread] {
            let mut ball = Ball::multi_ball(&self.config);
            ball.speed = speed;
            let body = Body {
                pos: origin,
                vel: Vec2::from_angle(angle).rotate(base_vel),
            };
            self.spawn_body(body, EntityKind::Ball(ball));
        }
    }

    fn spawn_powerup(&mut self, body: Body, powerup: PowerUp) {
        let kind = powerup.kind;
        let id = self.spawn_body(body, EntityKind::PowerUp(powerup));
        self.bus.publish(GameEvent::PowerUpSpawned {
            powerup: id,
            kind,
            pos: body.pos,
        });
    }

    /// Queue an entity keeping the given velocity
    fn spawn_body(&mut self, body: Body, kind: EntityKind) -> EntityId {
        let id = self.manager.next_entity_id();
        let mut entity = Entity::new(id, body.pos, kind);
        entity.body.vel = body.vel;
        self.manager.queue_add(entity);
        id
    }

    fn spawn_paddle(&mut self) {
        self.manager.spawn(
            Paddle::spawn_position(&self.config),
            EntityKind::Paddle(Paddle::new(&self.config)),
        );
    }

    fn spawn_docked_ball(&mut self) {
        let mut ball = Ball::new(&self.config);
        ball.speed = self.level_speed();
        let paddle = Paddle::spawn_position(&self.config);
        let pos = Vec2::new(
            paddle.x + self.config.paddle.width / 2.0,
            paddle.y - ball.radius,
        );
        self.manager.spawn(pos, EntityKind::Ball(ball));
    }

    fn paddle_id(&self) -> Option<EntityId> {
        self.manager.first_of_type(EntityType::Paddle).map(|e| e.id)
    }

    /// Losing the last ball in play costs a life
    fn check_ball_supply(&mut self) {
        if self.phase != GamePhase::Playing || self.manager.has_entities_of_type(EntityType::Ball) {
            return;
        }

        let lives = {
            let mut board = self.scoreboard.borrow_mut();
            board.lives = board.lives.saturating_sub(1);
            board.lives
        };
        log::info!("Life lost, {lives} remaining");
        self.bus.publish(GameEvent::PlayerLifeLost { lives });
        self.bus.publish(GameEvent::PlayerLivesChanged { lives });

        if lives == 0 {
            self.phase = GamePhase::GameOver;
            let score = self.score();
            log::info!("Game over at level {} with {score} points", self.level);
            self.bus.publish(GameEvent::GameOver {
                score,
                level: self.level,
            });
            return;
        }

        self.spawn_docked_ball();
        self.manager.flush(&self.bus);
        self.phase = GamePhase::Serve;
    }

    fn check_level_complete(&mut self) {
        if !matches!(self.phase, GamePhase::Playing | GamePhase::Serve) {
            return;
        }
        let remaining = self
            .manager
            .entities_by_type(EntityType::Brick)
            .any(|e| e.visible && e.has_tag(Tags::DESTRUCTIBLE));
        if remaining {
            return;
        }

        log::info!("Level {} complete", self.level);
        self.phase = GamePhase::LevelComplete;
        self.breather_left = self.config.game.level_breather;
        for entity_type in [EntityType::Ball, EntityType::PowerUp] {
            for id in self.manager.ids_by_type(entity_type) {
                self.manager.queue_remove(id);
            }
        }
        self.bus.publish(GameEvent::LevelComplete { level: self.level });
    }

    fn next_level(&mut self) {
        self.level += 1;
        for entity_type in [EntityType::Ball, EntityType::Brick, EntityType::PowerUp] {
            for id in self.manager.ids_by_type(entity_type) {
                self.manager.queue_remove(id);
            }
        }
        self.manager.flush(&self.bus);
        self.collision.reset();

        self.generate_level(self.level);
        self.spawn_docked_ball();
        self.manager.flush(&self.bus);
        self.phase = GamePhase::Serve;
        log::info!("Level {} start", self.level);
        self.bus.publish(GameEvent::LevelStart { level: self.level });
    }

    /// Target ball speed for the current level
    pub fn level_speed(&self) -> f32 {
        let ball = &self.config.ball;
        (ball.speed + self.level.saturating_sub(1) as f32 * ball.speed_increase_per_level)
            .min(ball.max_speed)
    }

    /// Lay out the brick grid for `level` and link its chain bricks.
    ///
    /// Rows use the standard tier table. From the configured start level
    /// each cell may roll a special brick, with per-level caps per kind.
    pub fn generate_level(&mut self, level: u32) {
        let rows = self.config.bricks.rows;
        let cols = self.config.bricks.cols;
        let specials_enabled = level >= self.config.bricks.special_start_level;
        let mut counts = SpecialCounts::default();
        let caps = SpecialCounts::caps(level);

        for row in 0..rows {
            for col in 0..cols {
                let pos = Brick::grid_position(&self.config, row, col);
                let special = if specials_enabled
                    && self.rng.random::<f64>() < self.config.bricks.special_chance
                {
                    determine_special(self.rng.random_range(0..100), &counts, &caps)
                } else {
                    None
                };
                let brick = match special {
                    Some(kind) => {
                        counts.add(kind);
                        match kind {
                            SpecialKind::Steel => Brick::steel(&self.config),
                            SpecialKind::Explosive => Brick::explosive(&self.config),
                            SpecialKind::Chain => Brick::chain(&self.config),
                            SpecialKind::Mystery => Brick::mystery(&self.config, &mut self.rng),
                        }
                    }
                    None => Brick::standard(&self.config, row as usize),
                };
                self.manager.spawn(pos, EntityKind::Brick(brick));
            }
        }
        self.manager.flush(&self.bus);

        let chains: Vec<(EntityId, Vec2, f32)> = self
            .manager
            .entities_by_type(EntityType::Brick)
            .filter_map(|e| match &e.as_brick()?.kind {
                BrickKind::Chain(links) => Some((e.id, e.center(), links.radius)),
                _ => None,
            })
            .collect();
        for (id, center, radius) in chains {
            self.link_chain(id, center, radius);
        }

        log::info!(
            "Level {level}: {} bricks ({} steel, {} explosive, {} chain, {} mystery)",
            rows * cols,
            counts.steel,
            counts.explosive,
            counts.chain,
            counts.mystery
        );
    }

    pub fn render(&self, draw: &mut dyn DrawContext) {
        self.manager.render(draw);
        self.effects.render(draw);
    }

    pub fn overlay(&self) -> Overlay {
        self.effects.overlay()
    }

    pub fn summary(&self) -> SessionSummary {
        let board = self.scoreboard.borrow();
        SessionSummary {
            seed: self.seed,
            score: board.score,
            level: self.level,
            lives: board.lives,
            bricks_destroyed: board.bricks_destroyed,
            max_combo: self.combo.max_combo(),
            achievements: self.achievements.unlocked(),
            sim_time_ms: self.now,
            phase: self.phase,
        }
    }

    pub fn score(&self) -> u64 {
        self.scoreboard.borrow().score
    }

    pub fn lives(&self) -> u32 {
        self.scoreboard.borrow().lives
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn manager(&self) -> &EntityManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut EntityManager {
        &mut self.manager
    }

    pub fn collision(&self) -> &CollisionSystem {
        &self.collision
    }

    pub fn combo(&self) -> &ComboSystem {
        &self.combo
    }

    pub fn achievements(&self) -> &AchievementSystem {
        &self.achievements
    }

    pub fn assist(&self) -> &AssistanceSystem {
        &self.assist
    }

    /// Switch adaptive assistance on or off
    pub fn set_assistance_active(&mut self, active: bool) {
        self.assist.set_active(active, &mut self.collision, &self.bus);
    }

    pub fn effects(&self) -> &EffectsSystem {
        &self.effects
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("seed", &self.seed)
            .field("phase", &self.phase)
            .field("level", &self.level)
            .field("now", &self.now)
            .field("entities", &self.manager.entity_count(None))
            .finish()
    }
}

/// Special brick kinds the level generator can place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecialKind {
    Steel,
    Explosive,
    Chain,
    Mystery,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SpecialCounts {
    steel: u32,
    explosive: u32,
    chain: u32,
    mystery: u32,
}

impl SpecialCounts {
    /// Per-level maximum of each kind
    fn caps(level: u32) -> Self {
        Self {
            steel: 2 + level,
            explosive: 1 + level / 2,
            chain: 4 + level,
            mystery: 2 + level / 3,
        }
    }

    fn get(&self, kind: SpecialKind) -> u32 {
        match kind {
            SpecialKind::Steel => self.steel,
            SpecialKind::Explosive => self.explosive,
            SpecialKind::Chain => self.chain,
            SpecialKind::Mystery => self.mystery,
        }
    }

    fn add(&mut self, kind: SpecialKind) {
        match kind {
            SpecialKind::Steel => self.steel += 1,
            SpecialKind::Explosive => self.explosive += 1,
            SpecialKind::Chain => self.chain += 1,
            SpecialKind::Mystery => self.mystery += 1,
        }
    }
}

/// Map a 0-99 roll to a special kind; capped kinds fall back to standard
fn determine_special(roll: u32, counts: &SpecialCounts, caps: &SpecialCounts) -> Option<SpecialKind> {
    let kind = match roll {
        0..30 => SpecialKind::Steel,
        30..50 => SpecialKind::Explosive,
        50..80 => SpecialKind::Chain,
        _ => SpecialKind::Mystery,
    };
    (counts.get(kind) < caps.get(kind)).then_some(kind)
}

/// Turn world-changing events into queued commands
fn record_world_commands(bus: &EventBus, commands: &Rc<RefCell<Vec<WorldCommand>>>, context: ContextId) {
    let kinds = [
        EventKind::BrickExplode,
        EventKind::ChainReaction,
        EventKind::ChainFindTargets,
        EventKind::BrickDestroyed,
        EventKind::PowerUpSpawn,
        EventKind::MultiBallCreate,
        EventKind::ParticleSpawn,
    ];
    for kind in kinds {
        let commands = Rc::clone(commands);
        bus.subscribe(
            kind,
            handler(move |_, event| {
                let command = match event {
                    &GameEvent::BrickExplode { brick, center, radius } => WorldCommand::Explode {
                        source: brick,
                        center,
                        radius,
                    },
                    GameEvent::ChainReaction { targets, .. } => WorldCommand::Chain {
                        targets: targets.clone(),
                    },
                    &GameEvent::ChainFindTargets { brick, center, radius } => WorldCommand::Relink {
                        brick,
                        center,
                        radius,
                    },
                    &GameEvent::BrickDestroyed { pos, .. } => WorldCommand::DropPowerUp { pos },
                    &GameEvent::PowerUpSpawn { pos, kind } => WorldCommand::SpawnPowerUp { pos, kind },
                    &GameEvent::MultiBallCreate { pos } => WorldCommand::MultiBall { pos },
                    &GameEvent::ParticleSpawn {
                        pos,
                        color,
                        count,
                        style,
                    } => WorldCommand::Particles {
                        pos,
                        color,
                        count,
                        style,
                    },
                    _ => return,
                };
                commands.borrow_mut().push(command);
            }),
            Some(context),
            false,
        );
    }
}

/// Score, bonuses and extra lives
fn track_score(bus: &EventBus, scoreboard: &Rc<RefCell<Scoreboard>>, context: ContextId) {
    let board = Rc::clone(scoreboard);
    bus.subscribe(
        EventKind::BrickDestroyed,
        handler(move |bus, event| {
            if let GameEvent::BrickDestroyed { points, .. } = event {
                let score = {
                    let mut b = board.borrow_mut();
                    b.bricks_destroyed += 1;
                    b.score += *points as u64;
                    b.score
                };
                bus.publish(GameEvent::PlayerScoreChanged {
                    score,
                    delta: *points as u64,
                });
            }
        }),
        Some(context),
        false,
    );

    let board = Rc::clone(scoreboard);
    bus.subscribe(
        EventKind::ScoreBonus,
        handler(move |bus, event| {
            if let GameEvent::ScoreBonus { points, .. } = event {
                let score = {
                    let mut b = board.borrow_mut();
                    b.score += *points;
                    b.score
                };
                bus.publish(GameEvent::PlayerScoreChanged {
                    score,
                    delta: *points,
                });
            }
        }),
        Some(context),
        false,
    );

    let board = Rc::clone(scoreboard);
    bus.subscribe(
        EventKind::ExtraBall,
        handler(move |bus, _| {
            let lives = {
                let mut b = board.borrow_mut();
                b.lives += 1;
                b.lives
            };
            bus.publish(GameEvent::PlayerLivesChanged { lives });
        }),
        Some(context),
        false,
    );
}
