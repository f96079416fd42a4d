use thiserror::Error;

use tiltqd_core::ModelError;

use crate::solver::SolverError;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue { field: field.to_string(), message: message.into() }
    }
}

/// Controller errors
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Controller has not been initialized")]
    NotInitialized,

    #[error("Rotor geometry has already been injected")]
    GeometryAlreadyInjected,

    #[error("Invalid reference trajectory: {0}")]
    InvalidTrajectory(String),

    #[error("Joint state length mismatch: expected {expected}, got {got}")]
    JointStateLength { expected: usize, got: usize },

    #[error("Non-finite joint state")]
    NonFiniteJointState,

    #[error("Control mode service unavailable: {0}")]
    ControlModeService(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),
}
