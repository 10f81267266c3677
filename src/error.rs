//! Error types
//!
//! The simulation never fails mid-frame; errors only surface while loading
//! and validating configuration.

/// Configuration loading/validation failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown {kind} {name:?}")]
    UnknownName { kind: &'static str, name: String },
    #[error("invalid color {0:?}: expected #RRGGBB")]
    Color(String),
    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },
    #[error("BALL.MIN_SPEED ({min}) exceeds BALL.MAX_SPEED ({max})")]
    SpeedRange { min: f32, max: f32 },
    #[error("COMBO needs exactly one more multiplier value than thresholds ({thresholds} thresholds, {values} values)")]
    ComboTable { thresholds: usize, values: usize },
    #[error("COMBO.MULTIPLIER_THRESHOLDS must be strictly increasing")]
    ComboThresholdOrder,
    #[error("{0} table must not be empty")]
    EmptyTable(&'static str),
    #[error("probability {field} must be within [0, 1], got {value}")]
    Probability { field: &'static str, value: f64 },
}
