//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, OverflowPolicy};

/// Kite command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug)]
#[command(name = "kite", about = "Kite 2D physics adapter")]
pub struct CliArgs {
    /// Pixels per physics unit.
    #[arg(long)]
    pub meter: Option<f32>,

    /// Solver iterations per step.
    #[arg(long)]
    pub sub_steps: Option<u32>,

    /// Horizontal gravity in pixels/s².
    #[arg(long, allow_hyphen_values = true)]
    pub gravity_x: Option<f32>,

    /// Vertical gravity in pixels/s².
    #[arg(long, allow_hyphen_values = true)]
    pub gravity_y: Option<f32>,

    /// Event buffer overflow policy.
    #[arg(long, value_enum)]
    pub overflow: Option<OverflowPolicy>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Number of frames to simulate.
    #[arg(long, default_value_t = 60)]
    pub frames: u32,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(meter) = args.meter {
            self.physics.meter = meter;
        }
        if let Some(sub_steps) = args.sub_steps {
            self.physics.sub_steps = sub_steps;
        }
        if let Some(gx) = args.gravity_x {
            self.physics.gravity[0] = gx;
        }
        if let Some(gy) = args.gravity_y {
            self.physics.gravity[1] = gy;
        }
        if let Some(policy) = args.overflow {
            self.physics.overflow = policy;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
