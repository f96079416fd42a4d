//! Mathematical utilities
//!
//! Quaternion operations (sign continuity, attitude error, Euler conversion)
//! and the RK4 integrator used by the prediction model.

pub mod quaternion;
pub mod integrator;

pub use quaternion::*;
pub use integrator::*;
