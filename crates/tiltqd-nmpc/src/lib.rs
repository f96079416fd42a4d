//! # tiltqd-nmpc
//!
//! Receding-horizon NMPC controller for a quadrotor with four tiltable
//! rotors, with an integral disturbance observer and a geometry-derived
//! allocation feed-forward.
//!
//! # Architecture
//!
//! Every control period the controller solves
//!
//! ```text
//! minimize    Σ ‖y_k − y_ref,k‖²_W + ‖x_N − x_ref,N‖²_W_N
//! subject to  x₀ = x_est
//!             x_{k+1} = f(x_k, u_k, f_dist, τ_dist, drag)
//! ```
//!
//! over N = T_pred / T_integ intervals and sends the first control.
//!
//! # Components
//!
//! - [`config`]: Configuration with defaults and TOML loading
//! - [`reference`]: Reference window, point-mode feed-forward, trajectory messages
//! - [`problem`]: One solver problem instance and the rotor drag model
//! - [`solver`]: Solver trait, rollout backend and the acados backend
//! - [`command`]: Thrust and gimbal command output
//! - [`controller`]: The controller and its mode state machine
//! - [`reconfigure`]: Online parameter updates
//! - [`diagnostics`]: Telemetry snapshot

pub mod error;
pub mod config;
pub mod clock;
pub mod throttle;
pub mod reconfigure;
pub mod navigation;
pub mod estimator;
pub mod reference;
pub mod problem;
pub mod solver;
pub mod command;
pub mod diagnostics;
pub mod controller;

// ACADOS FFI bindings (only when feature is enabled)
#[cfg(feature = "acados")]
pub mod acados_ffi;

// Re-exports
pub use config::NmpcConfig;
pub use controller::{ControllerMode, FlightController, NmpcController, TrajectoryAck};
pub use error::{ConfigError, ControllerError};
pub use reference::{ReferenceTrajectory, ReferenceWindow};
pub use solver::{NmpcSolver, RolloutSolver};
