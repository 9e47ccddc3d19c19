//! Configuration structs with sensible defaults and RON persistence.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Physics adapter settings.
    pub physics: PhysicsConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// What happens when a frame produces more events than `event_capacity`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum OverflowPolicy {
    /// Buffers start at `event_capacity` and grow; nothing is dropped.
    #[default]
    Grow,
    /// Buffers hold at most `event_capacity` entries; later events are dropped.
    DropNewest,
}

/// Which solver implementation the physics context loads on first use.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SolverBackend {
    /// The rapier2d-backed solver (requires the `rapier` feature).
    #[default]
    Rapier,
}

/// Physics adapter configuration.
///
/// Lengths are in pixels unless the field name says otherwise; the solver
/// works in physics units where one unit is `meter` pixels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Pixels per physics unit.
    pub meter: f32,
    /// Default gravity for new worlds in pixels/s².
    pub gravity: [f32; 2],
    /// Whether new worlds let bodies fall asleep.
    pub allow_sleep: bool,
    /// Solver iterations per step.
    pub sub_steps: u32,
    /// Fixed timestep used by the demo loop, in seconds.
    pub fixed_dt: f32,
    /// Minimum approach speed (units/s) for a touching pair to report a hit.
    pub hit_speed_threshold: f32,
    /// Initial (or maximum, see `overflow`) entries per event buffer.
    pub event_capacity: usize,
    /// Event buffer overflow behaviour.
    pub overflow: OverflowPolicy,
    /// Body index capacity of the solver.
    pub max_bodies: usize,
    /// Shape index capacity of the solver.
    pub max_shapes: usize,
    /// Density given to fixtures created without one.
    pub default_density: f32,
    /// Friction given to new fixtures.
    pub default_friction: f32,
    /// Solver implementation.
    pub backend: SolverBackend,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            meter: 30.0,
            gravity: [0.0, 0.0],
            allow_sleep: true,
            sub_steps: 4,
            fixed_dt: 1.0 / 60.0,
            hit_speed_threshold: 1.0,
            event_capacity: 256,
            overflow: OverflowPolicy::Grow,
            max_bodies: 4096,
            max_shapes: 8192,
            default_density: 1.0,
            default_friction: 0.2,
            backend: SolverBackend::Rapier,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Validation ---

fn finite(field: &'static str, value: f32) -> Result<f32, ConfigError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::invalid(field, format!("must be finite, got {value}")))
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if finite(field, value)? > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be positive, got {value}")))
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if finite(field, value)? >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must not be negative, got {value}")))
    }
}

fn at_least_one(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be at least 1"));
    }
    Ok(())
}

impl PhysicsConfig {
    /// Check the values a physics context would refuse or misbehave with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("meter", self.meter)?;
        positive("fixed_dt", self.fixed_dt)?;
        finite("gravity", self.gravity[0])?;
        finite("gravity", self.gravity[1])?;
        non_negative("hit_speed_threshold", self.hit_speed_threshold)?;
        non_negative("default_density", self.default_density)?;
        non_negative("default_friction", self.default_friction)?;
        at_least_one("sub_steps", self.sub_steps as usize)?;
        at_least_one("event_capacity", self.event_capacity)?;
        at_least_one("max_bodies", self.max_bodies)?;
        at_least_one("max_shapes", self.max_shapes)?;
        Ok(())
    }
}

// --- Persistence ---

const FILE_NAME: &str = "config.ron";

impl Config {
    /// Where [`load_or_create`](Self::load_or_create) looks inside `config_dir`.
    pub fn path_in(config_dir: &Path) -> PathBuf {
        config_dir.join(FILE_NAME)
    }

    /// Parse and validate settings text. `path` only labels errors.
    pub fn from_ron(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Config = ron::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.physics.validate()?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Option<Self>, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_ron(&text, path).map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ConfigError::io(path, err)),
        }
    }

    /// Read `config.ron` from `config_dir`, writing the defaults there first
    /// if the file does not exist yet.
    ///
    /// A file that parses but fails [`PhysicsConfig::validate`] is an error;
    /// it is never silently replaced.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = Self::path_in(config_dir);
        if let Some(config) = Self::read(&path)? {
            log::debug!("kite settings read from {}", path.display());
            return Ok(config);
        }
        let config = Config::default();
        config.save(config_dir)?;
        log::info!("wrote default kite settings to {}", path.display());
        Ok(config)
    }

    /// Validate, then write `config.ron` into `config_dir` (created if missing).
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        self.physics.validate()?;
        let pretty = ron::ser::PrettyConfig::new().depth_limit(2);
        let text = ron::ser::to_string_pretty(self, pretty)?;

        std::fs::create_dir_all(config_dir).map_err(|err| ConfigError::io(config_dir, err))?;
        let path = Self::path_in(config_dir);
        std::fs::write(&path, text).map_err(|err| ConfigError::io(&path, err))
    }

    /// Re-read `config.ron`. `Ok(None)` means the file matches `self`.
    ///
    /// A missing file is an error.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let path = Self::path_in(config_dir);
        let text = std::fs::read_to_string(&path).map_err(|err| ConfigError::io(&path, err))?;
        let fresh = Self::from_ron(&text, &path)?;
        if fresh == *self {
            return Ok(None);
        }
        log::info!("kite settings changed on disk: {}", path.display());
        Ok(Some(fresh))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("meter: 30.0"));
        assert!(ron_str.contains("event_capacity: 256"));
    }

    #[test]
    fn test_default_physics_capacities() {
        let physics = PhysicsConfig::default();
        assert_eq!(physics.max_bodies, 4096);
        assert_eq!(physics.max_shapes, 8192);
        assert_eq!(physics.sub_steps, 4);
        assert_eq!(physics.overflow, OverflowPolicy::Grow);
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.physics.overflow = OverflowPolicy::DropNewest;
        config.physics.gravity = [0.0, 300.0];
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_field_uses_default() {
        let ron_str = "(physics: (meter: 64.0))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.physics.meter, 64.0);
        assert_eq!(config.physics.sub_steps, 4);
        assert_eq!(config.debug, DebugConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let ron_str = "(future_setting: true)";
        let result: Result<Config, _> = ron::from_str(ron_str);
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.physics.meter = 64.0;
        config.debug.log_level = "debug".to_string();

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.physics.sub_steps = 8;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.map(|c| c.physics.sub_steps), Some(8));
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }

    #[test]
    fn test_default_physics_config_is_valid() {
        assert!(PhysicsConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_meter() {
        for meter in [0.0, -30.0, f32::NAN, f32::INFINITY] {
            let physics = PhysicsConfig {
                meter,
                ..PhysicsConfig::default()
            };
            let err = physics.validate().unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { field: "meter", .. }), "{err}");
        }
    }

    #[test]
    fn test_validate_rejects_zero_capacities() {
        let cases: [(&str, fn(&mut PhysicsConfig)); 4] = [
            ("event_capacity", |p| p.event_capacity = 0),
            ("max_bodies", |p| p.max_bodies = 0),
            ("max_shapes", |p| p.max_shapes = 0),
            ("sub_steps", |p| p.sub_steps = 0),
        ];
        for (name, apply) in cases {
            let mut physics = PhysicsConfig::default();
            apply(&mut physics);
            match physics.validate() {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, name),
                other => panic!("{name}: expected Invalid, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(Config::path_in(dir.path()), "(physics: (meter: -1.0))").unwrap();

        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "meter", .. }));
        assert_eq!(err.to_string(), "physics.meter must be positive, got -1");
        // The bad file is left in place for the user to fix.
        let text = std::fs::read_to_string(Config::path_in(dir.path())).unwrap();
        assert!(text.contains("-1.0"));
    }

    #[test]
    fn test_load_reports_parse_error_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = Config::path_in(dir.path());
        std::fs::write(&path, "(physics: (meter: ").unwrap();

        match Config::load_or_create(dir.path()) {
            Err(ConfigError::Parse { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected Parse, got {other:?}"),
        }
    }

    #[test]
    fn test_save_refuses_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.physics.event_capacity = 0;

        let err = config.save(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "event_capacity", .. }));
        assert!(!Config::path_in(dir.path()).exists());
    }

    #[test]
    fn test_reload_rejects_invalid_edit() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        std::fs::write(Config::path_in(dir.path()), "(physics: (max_shapes: 0))").unwrap();

        let err = config.reload(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "max_shapes", .. }));
    }

    #[test]
    fn test_reload_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::default().reload(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
