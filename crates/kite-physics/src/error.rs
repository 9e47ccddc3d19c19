use thiserror::Error;

/// Errors raised by factories and input validation.
///
/// Accessors on destroyed objects never error; they return defaults.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PhysicsError {
    #[error("meter scale must be positive and finite, got {0}")]
    InvalidScale(f32),

    #[error("unknown shape type \"{0}\"")]
    UnknownShapeType(String),

    #[error("unknown body type \"{0}\"")]
    UnknownBodyType(String),

    #[error("unknown joint type \"{0}\"")]
    UnknownJointType(String),

    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("physics solver unavailable: {0}")]
    SolverUnavailable(String),

    #[error("solver {0} capacity exhausted")]
    CapacityExhausted(&'static str),

    #[error("world has been destroyed")]
    WorldDestroyed,

    #[error("body has been destroyed")]
    BodyDestroyed,

    #[error("joint bodies belong to different worlds")]
    WorldMismatch,
}
