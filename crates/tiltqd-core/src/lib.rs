//! # tiltqd-core
//!
//! Core models for a quadrotor whose four rotors are mounted on tiltable
//! servo gimbals.
//!
//! ## Modules
//!
//! - [`math`]: Quaternion helpers and numerical integrators
//! - [`model`]: State/control vectors, rotor geometry, physical parameters
//! - [`allocation`]: Geometry-derived control allocation and its pseudo-inverse
//! - [`disturbance`]: Bounded integral disturbance observer
//! - [`dynamics`]: Tilt-rotor rigid-body model used for prediction
//! - [`estimation`]: IMU pre-filtering for the wrench estimator

pub mod math;
pub mod model;
pub mod allocation;
pub mod disturbance;
pub mod dynamics;
pub mod estimation;

use nalgebra::{Vector3, Matrix3, UnitQuaternion};
use thiserror::Error;

/// 3D vector type
pub type Vec3 = Vector3<f64>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f64>;

/// Unit quaternion type for rotations
pub type Quat = UnitQuaternion<f64>;

/// Default gravity constant [m/s²]
pub const GRAVITY: f64 = 9.81;

/// Gravity vector in ENU convention: z-up
pub fn gravity_enu(g: f64) -> Vec3 {
    Vec3::new(0.0, 0.0, -g)
}

/// Errors raised while building models from configuration
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Rotor {index} lies on the body z axis; its arm direction is undefined")]
    DegenerateRotorArm { index: usize },
    #[error("Rotor spin direction must be +1 or -1, got {0}")]
    InvalidSpinDirection(i8),
    #[error("Pseudo-inverse of the allocation matrix failed: {0}")]
    PseudoInverse(&'static str),
    #[error("Invalid vector length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },
    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),
    #[error("Quaternion norm {0} is too small to normalize")]
    DegenerateQuaternion(f64),
}

/// Errors raised by sensor-facing collaborators
#[derive(Debug, Error, PartialEq)]
pub enum SensorError {
    #[error("Sensor sample contains a non-finite {0} value")]
    NonFinite(&'static str),
    #[error("Invalid sample period: {0}")]
    InvalidPeriod(f64),
    #[error("Filter order must be at least 1, got {0}")]
    InvalidFilterOrder(usize),
}
