//! Brick Breaker entry point
//!
//! Runs a headless demo session with the paddle on autopilot and logs the
//! outcome. Usage: `brick-breaker [seed] [frames] [config.json]`

#[cfg(not(target_arch = "wasm32"))]
use std::process::ExitCode;

#[cfg(not(target_arch = "wasm32"))]
fn main() -> ExitCode {
    use brick_breaker::Config;
    use brick_breaker::consts::FRAME_MS;
    use brick_breaker::sim::{FrameInput, GamePhase, Session};

    env_logger::init();
    log::info!("Brick Breaker (headless) starting...");

    let mut args = std::env::args().skip(1);
    let seed = match args.next().map(|s| s.parse::<u64>()) {
        Some(Ok(seed)) => seed,
        Some(Err(e)) => {
            log::error!("Invalid seed: {e}");
            return ExitCode::FAILURE;
        }
        None => 42,
    };
    let frames = match args.next().map(|s| s.parse::<u32>()) {
        Some(Ok(frames)) => frames,
        Some(Err(e)) => {
            log::error!("Invalid frame count: {e}");
            return ExitCode::FAILURE;
        }
        None => 60 * 120,
    };
    let config = match args.next() {
        Some(path) => match Config::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load {path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };

    let mut session = Session::new(config, seed);
    let input = FrameInput {
        autopilot: true,
        ..Default::default()
    };
    for frame in 0..frames {
        session.update(FRAME_MS, &input);
        if session.phase() == GamePhase::GameOver {
            log::info!("Game over after {frame} frames");
            break;
        }
    }

    let summary = session.summary();
    log::info!(
        "Seed {}: score {}, level {}, lives {}, bricks {}, max combo {}",
        summary.seed,
        summary.score,
        summary.level,
        summary.lives,
        summary.bricks_destroyed,
        summary.max_combo
    );
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{json}"),
        Err(e) => log::warn!("Could not serialize summary: {e}"),
    }
    ExitCode::SUCCESS
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The library is driven by the host page on wasm
}
