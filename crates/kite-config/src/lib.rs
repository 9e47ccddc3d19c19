//! Configuration for the Kite physics adapter.
//!
//! Runtime settings (meter scale, stepping, event buffers, logging) persist to
//! disk as RON files. Supports CLI overrides via clap, hot-reload detection,
//! and forward/backward compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, OverflowPolicy, PhysicsConfig, SolverBackend};
pub use error::ConfigError;
