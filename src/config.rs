//! Game configuration
//!
//! Every tunable the simulation reads lives here, grouped the same way the
//! JSON overrides are keyed (`{"BALL": {"SPEED": 5}}`). Groups default
//! individually, so an override file only needs the values it changes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::sim::assist::AssistanceLevel;
use crate::sim::brick::MysteryBonus;
use crate::sim::powerup::PowerUpKind;

/// RGB color, serialized as `#RRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(0xFF, 0xFF, 0xFF);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#RRGGBB` (the leading `#` is optional)
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(ConfigError::Color(s.to_string()));
        }
        let channel = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ConfigError::Color(s.to_string()))
        };
        Ok(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Build from hue (degrees), saturation and lightness (0-1)
    pub fn from_hsl(hue: f32, saturation: f32, lightness: f32) -> Self {
        let h = hue.rem_euclid(360.0) / 60.0;
        let s = saturation.clamp(0.0, 1.0);
        let l = lightness.clamp(0.0, 1.0);
        let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
        let x = c * (1.0 - (h % 2.0 - 1.0).abs());
        let (r, g, b) = match h as u32 {
            0 => (c, x, 0.0),
            1 => (x, c, 0.0),
            2 => (0.0, c, x),
            3 => (0.0, x, c),
            4 => (x, 0.0, c),
            _ => (c, 0.0, x),
        };
        let m = l - c / 2.0;
        let to_u8 = |v: f32| ((v + m) * 255.0).round().clamp(0.0, 255.0) as u8;
        Self::rgb(to_u8(r), to_u8(g), to_u8(b))
    }

    /// Scale every channel (damage darkening)
    pub fn darken(self, factor: f32) -> Self {
        let f = factor.clamp(0.0, 1.0);
        let scale = |c: u8| (c as f32 * f).floor() as u8;
        Self::rgb(scale(self.r), scale(self.g), scale(self.b))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Color {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::parse(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// Effects quality; sets the particle budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QualityPreset {
    Low,
    #[default]
    Medium,
    High,
}

/// How many particles a quality preset may keep alive
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParticleBudget {
    /// Pooled effect particles alive at once
    pub pool: usize,
    /// Scale on particle-entity burst counts
    pub burst_scale: f32,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 3] = [QualityPreset::Low, QualityPreset::Medium, QualityPreset::High];

    pub fn budget(self) -> ParticleBudget {
        let (pool, burst_scale) = match self {
            QualityPreset::Low => (100, 0.5),
            QualityPreset::Medium => (500, 1.0),
            QualityPreset::High => (2_000, 1.5),
        };
        ParticleBudget { pool, burst_scale }
    }

    pub fn max_particles(&self) -> usize {
        self.budget().pool
    }

    pub fn burst_scale(&self) -> f32 {
        self.budget().burst_scale
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for QualityPreset {
    type Err = ConfigError;

    /// Case-insensitive; `med` is accepted for medium
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = if s.eq_ignore_ascii_case("med") { "medium" } else { s };
        Self::ALL
            .into_iter()
            .find(|q| q.to_string().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownName {
                kind: "quality preset",
                name: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct CanvasConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PaddleConfig {
    pub width: f32,
    pub height: f32,
    /// Key-control speed (units per 60fps frame)
    pub speed: f32,
    pub color: Color,
    pub y_position: f32,
    pub wide_width: f32,
    /// Wide power-up duration (ms)
    pub wide_duration: f64,
    /// Fraction of the remaining distance closed per frame under pointer control
    pub pointer_easing: f32,
}

impl Default for PaddleConfig {
    fn default() -> Self {
        Self {
            width: 100.0,
            height: 15.0,
            speed: 8.0,
            color: Color::rgb(0x4C, 0xAF, 0x50),
            y_position: 550.0,
            wide_width: 150.0,
            wide_duration: 15_000.0,
            pointer_easing: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BallConfig {
    pub radius: f32,
    pub speed: f32,
    pub color: Color,
    pub multi_ball_color: Color,
    pub min_speed: f32,
    pub max_speed: f32,
    pub speed_increase_per_level: f32,
}

impl Default for BallConfig {
    fn default() -> Self {
        Self {
            radius: 8.0,
            speed: 4.0,
            color: Color::rgb(0xFF, 0xD7, 0x00),
            multi_ball_color: Color::rgb(0xFF, 0x69, 0xB4),
            min_speed: 2.0,
            max_speed: 8.0,
            speed_increase_per_level: 0.5,
        }
    }
}

/// One row tier of standard bricks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrickTier {
    pub color: Color,
    pub hits: u32,
    pub points: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BricksConfig {
    pub width: f32,
    pub height: f32,
    pub padding: f32,
    pub offset_top: f32,
    pub offset_left: f32,
    pub rows: u32,
    pub cols: u32,
    pub types: Vec<BrickTier>,
    /// First level that mixes special bricks into the grid
    pub special_start_level: u32,
    /// Per-cell chance of a special brick once they are enabled
    pub special_chance: f64,
}

impl Default for BricksConfig {
    fn default() -> Self {
        Self {
            width: 75.0,
            height: 20.0,
            padding: 5.0,
            offset_top: 60.0,
            offset_left: 35.0,
            rows: 6,
            cols: 10,
            types: vec![
                BrickTier {
                    color: Color::rgb(0xFF, 0x44, 0x44),
                    hits: 1,
                    points: 10,
                },
                BrickTier {
                    color: Color::rgb(0xFF, 0x88, 0x44),
                    hits: 1,
                    points: 20,
                },
                BrickTier {
                    color: Color::rgb(0xFF, 0xDD, 0x44),
                    hits: 2,
                    points: 30,
                },
                BrickTier {
                    color: Color::rgb(0x44, 0xFF, 0x44),
                    hits: 2,
                    points: 40,
                },
            ],
            special_start_level: 2,
            special_chance: 0.18,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SteelConfig {
    pub color: Color,
    pub max_hits: u32,
    pub points: u32,
}

impl Default for SteelConfig {
    fn default() -> Self {
        Self {
            color: Color::rgb(0xC0, 0xC0, 0xC0),
            max_hits: 3,
            points: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ExplosiveConfig {
    pub color: Color,
    pub points: u32,
    pub explosion_radius: f32,
}

impl Default for ExplosiveConfig {
    fn default() -> Self {
        Self {
            color: Color::rgb(0xFF, 0x44, 0x00),
            points: 30,
            explosion_radius: 90.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ChainConfig {
    pub color: Color,
    pub points: u32,
    pub chain_radius: f32,
    /// How often a chain brick re-resolves its neighbours (ms)
    pub relink_interval: f64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            color: Color::rgb(0x00, 0xAA, 0xFF),
            points: 25,
            chain_radius: 100.0,
            relink_interval: 1_667.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct MysteryConfig {
    pub points: u32,
    /// Hue degrees advanced per 60fps frame
    pub color_shift_speed: f32,
    pub bonus_effects: Vec<MysteryBonus>,
    /// Score bonus range, inclusive low and exclusive high
    pub bonus_points: (u32, u32),
    pub combo_bonus: u32,
}

impl Default for MysteryConfig {
    fn default() -> Self {
        Self {
            points: 50,
            color_shift_speed: 2.0,
            bonus_effects: vec![
                MysteryBonus::Points,
                MysteryBonus::PowerUp,
                MysteryBonus::ExtraBall,
                MysteryBonus::Combo,
            ],
            bonus_points: (200, 500),
            combo_bonus: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SpecialBricksConfig {
    pub steel: SteelConfig,
    pub explosive: ExplosiveConfig,
    pub chain: ChainConfig,
    pub mystery: MysteryConfig,
}

/// Metadata for one droppable power-up
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerUpSpec {
    #[serde(rename = "type")]
    pub kind: PowerUpKind,
    pub color: Color,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct PowerUpsConfig {
    pub drop_chance: f64,
    pub fall_speed: f32,
    pub width: f32,
    pub height: f32,
    pub types: Vec<PowerUpSpec>,
}

impl Default for PowerUpsConfig {
    fn default() -> Self {
        Self {
            drop_chance: 0.25,
            fall_speed: 2.0,
            width: 20.0,
            height: 20.0,
            types: vec![
                PowerUpSpec {
                    kind: PowerUpKind::WidePaddle,
                    color: Color::rgb(0x00, 0xFF, 0xFF),
                    name: "Wide Paddle".to_string(),
                },
                PowerUpSpec {
                    kind: PowerUpKind::MultiBall,
                    color: Color::rgb(0xFF, 0x00, 0xFF),
                    name: "Multi Ball".to_string(),
                },
            ],
        }
    }
}

impl PowerUpsConfig {
    /// Look up the metadata for a power-up kind
    pub fn spec(&self, kind: PowerUpKind) -> Option<&PowerUpSpec> {
        self.types.iter().find(|t| t.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ParticlesConfig {
    pub count_per_brick: u32,
    /// Default particle life (60fps frames)
    pub life_span: f32,
    pub speed_range: f32,
}

impl Default for ParticlesConfig {
    fn default() -> Self {
        Self {
            count_per_brick: 8,
            life_span: 30.0,
            speed_range: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AiThresholds {
    pub poor_accuracy: f64,
    pub fair_accuracy: f64,
    pub poor_brick_hit_rate: f64,
    pub max_consecutive_deaths: u32,
    /// Balls lost per second above which SUBTLE kicks in
    pub max_ball_loss_rate: f64,
}

impl Default for AiThresholds {
    fn default() -> Self {
        Self {
            poor_accuracy: 0.3,
            fair_accuracy: 0.6,
            poor_brick_hit_rate: 0.1,
            max_consecutive_deaths: 2,
            max_ball_loss_rate: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AiAssistance {
    pub subtle_paddle_bonus: f32,
    pub active_paddle_bonus: f32,
    pub ball_nudge_force: f32,
    pub speed_reduction: f32,
    /// Horizontal gap to the target brick before a nudge applies
    pub nudge_distance: f32,
    /// Ball speed above which damping applies
    pub speed_control_threshold: f32,
}

impl Default for AiAssistance {
    fn default() -> Self {
        Self {
            subtle_paddle_bonus: 10.0,
            active_paddle_bonus: 20.0,
            ball_nudge_force: 0.1,
            speed_reduction: 0.95,
            nudge_distance: 50.0,
            speed_control_threshold: 6.0,
        }
    }
}

impl AiAssistance {
    /// Extra paddle collision width granted at an assistance tier
    pub fn paddle_bonus(&self, level: AssistanceLevel) -> f32 {
        match level {
            AssistanceLevel::None => 0.0,
            AssistanceLevel::Subtle => self.subtle_paddle_bonus,
            AssistanceLevel::Active => self.active_paddle_bonus,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AiConfig {
    /// Sim time between performance analyses (ms)
    pub analysis_interval: f64,
    pub thresholds: AiThresholds,
    pub assistance: AiAssistance,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            analysis_interval: 5_000.0,
            thresholds: AiThresholds::default(),
            assistance: AiAssistance::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ComboConfig {
    /// Idle time that breaks a running combo (ms)
    pub break_timeout: f64,
    pub multiplier_thresholds: Vec<u32>,
    pub multiplier_values: Vec<u32>,
    /// Indexed by `combo / 5`
    pub screen_shake_intensity: Vec<f32>,
    /// Indexed by `combo / 3`
    pub particle_multiplier: Vec<f32>,
}

impl Default for ComboConfig {
    fn default() -> Self {
        Self {
            break_timeout: 3_000.0,
            multiplier_thresholds: vec![3, 6, 10, 15, 25],
            multiplier_values: vec![1, 2, 3, 5, 10, 20],
            screen_shake_intensity: vec![0.0, 2.0, 3.0, 5.0, 7.0, 10.0],
            particle_multiplier: vec![1.0, 1.5, 2.0, 2.5, 3.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EffectsConfig {
    pub quality: QualityPreset,
    /// Minimize shake and flashes
    pub reduced_motion: bool,
    pub shake_decay: f32,
    pub shake_floor: f32,
    pub flash_decay: f32,
    pub flash_floor: f32,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            quality: QualityPreset::Medium,
            reduced_motion: false,
            shake_decay: 0.9,
            shake_floor: 0.1,
            flash_decay: 0.95,
            flash_floor: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct GameConfig {
    pub initial_lives: u32,
    /// Pause between a cleared level and the next one (ms)
    pub level_breather: f64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            initial_lives: 3,
            level_breather: 2_000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AchievementsConfig {
    /// Streak that unlocks Combo Master
    pub combo_target: u32,
    /// Chain reactions per session that unlock Chain Master
    pub chain_target: u32,
    /// Distinct power-up kinds in one level that unlock Power Collector
    pub power_target: u32,
    /// A level cleared faster than this unlocks Speedrun (ms)
    pub speedrun_time: f64,
    /// How long an unlock notification stays queued (ms)
    pub notification_time: f64,
}

impl Default for AchievementsConfig {
    fn default() -> Self {
        Self {
            combo_target: 15,
            chain_target: 5,
            power_target: 2,
            speedrun_time: 60_000.0,
            notification_time: 4_000.0,
        }
    }
}

/// Complete, read-only configuration for one session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Config {
    pub canvas: CanvasConfig,
    pub paddle: PaddleConfig,
    pub ball: BallConfig,
    pub bricks: BricksConfig,
    pub special_bricks: SpecialBricksConfig,
    pub powerups: PowerUpsConfig,
    pub particles: ParticlesConfig,
    pub ai: AiConfig,
    pub combo: ComboConfig,
    pub effects: EffectsConfig,
    pub achievements: AchievementsConfig,
    pub game: GameConfig,
}

impl Config {
    /// Parse JSON overrides on top of the defaults and validate the result
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        log::info!(
            "Loaded config overrides (quality {})",
            config.effects.quality
        );
        Ok(config)
    }

    /// Read and parse a JSON config file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialize the full configuration (handy for dumping defaults)
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the simulation cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
            if value > 0.0 && value.is_finite() {
                Ok(())
            } else {
                Err(ConfigError::NonPositive { field, value })
            }
        }
        fn probability(field: &'static str, value: f64) -> Result<(), ConfigError> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::Probability { field, value })
            }
        }

        positive("CANVAS.WIDTH", self.canvas.width as f64)?;
        positive("CANVAS.HEIGHT", self.canvas.height as f64)?;
        positive("PADDLE.WIDTH", self.paddle.width as f64)?;
        positive("PADDLE.HEIGHT", self.paddle.height as f64)?;
        positive("BALL.RADIUS", self.ball.radius as f64)?;
        positive("BALL.MIN_SPEED", self.ball.min_speed as f64)?;
        positive("BRICKS.WIDTH", self.bricks.width as f64)?;
        positive("BRICKS.HEIGHT", self.bricks.height as f64)?;
        positive("AI.ANALYSIS_INTERVAL", self.ai.analysis_interval)?;
        positive("COMBO.BREAK_TIMEOUT", self.combo.break_timeout)?;
        let assistance = &self.ai.assistance;
        positive("AI.ASSISTANCE.NUDGE_DISTANCE", assistance.nudge_distance as f64)?;
        positive(
            "AI.ASSISTANCE.SPEED_CONTROL_THRESHOLD",
            assistance.speed_control_threshold as f64,
        )?;
        positive("ACHIEVEMENTS.NOTIFICATION_TIME", self.achievements.notification_time)?;
        positive("ACHIEVEMENTS.SPEEDRUN_TIME", self.achievements.speedrun_time)?;

        if self.ball.min_speed > self.ball.max_speed {
            return Err(ConfigError::SpeedRange {
                min: self.ball.min_speed,
                max: self.ball.max_speed,
            });
        }

        if self.bricks.types.is_empty() {
            return Err(ConfigError::EmptyTable("BRICKS.TYPES"));
        }
        if self.combo.screen_shake_intensity.is_empty() {
            return Err(ConfigError::EmptyTable("COMBO.SCREEN_SHAKE_INTENSITY"));
        }
        if self.combo.particle_multiplier.is_empty() {
            return Err(ConfigError::EmptyTable("COMBO.PARTICLE_MULTIPLIER"));
        }

        let thresholds = &self.combo.multiplier_thresholds;
        let values = &self.combo.multiplier_values;
        if values.len() != thresholds.len() + 1 {
            return Err(ConfigError::ComboTable {
                thresholds: thresholds.len(),
                values: values.len(),
            });
        }
        if thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::ComboThresholdOrder);
        }

        probability("POWERUPS.DROP_CHANCE", self.powerups.drop_chance)?;
        probability("BRICKS.SPECIAL_CHANCE", self.bricks.special_chance)?;

        Ok(())
    }
}
