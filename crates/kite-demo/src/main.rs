//! Headless demo driving the Kite physics adapter.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p kite-demo -- --gravity-y 300 --frames 120`.

mod scenes;

use std::path::PathBuf;

use clap::Parser;
use kite_config::{CliArgs, Config};
use kite_physics::{Physics, PhysicsError};
use tracing::{error, info};

fn config_dir(args: &CliArgs) -> PathBuf {
    args.config.clone().unwrap_or_else(|| {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("kite")
    })
}

fn run(config: &Config, frames: u32) -> Result<(), PhysicsError> {
    let physics = Physics::new(config.physics.clone())?;
    physics.load()?;
    info!(meter = physics.meter_scale(), frames, "physics ready");

    scenes::drop_ball(&physics, frames)?;
    scenes::pendulum(&physics, frames)?;
    scenes::one_way_platform(&physics, frames)?;
    scenes::ray_probe(&physics)?;
    Ok(())
}

fn main() {
    let args = CliArgs::parse();
    let config_dir = config_dir(&args);

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    kite_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));

    if let Err(err) = run(&config, args.frames) {
        error!(%err, "demo failed");
        std::process::exit(1);
    }
}
