//! Diagnostic snapshot shared with telemetry
//!
//! The control thread publishes with `try_write` and skips the update if a
//! reader holds the lock; readers always see a complete snapshot, possibly
//! one cycle old.

use std::sync::{Arc, RwLock};

use nalgebra::{UnitQuaternion, Vector3};

use tiltqd_core::disturbance::DisturbanceWrench;
use tiltqd_core::model::State;

use crate::solver::SolverStatus;

/// Position and orientation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl From<&State> for Pose {
    fn from(state: &State) -> Self {
        Self { position: state.position, orientation: state.orientation }
    }
}

/// One cycle of controller diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticsSnapshot {
    /// Controller time of the cycle [s]
    pub stamp: f64,
    /// Disturbance force [N] (body frame)
    pub disturbance_force_body: Vector3<f64>,
    /// Disturbance torque [N·m] (body frame)
    pub disturbance_torque_body: Vector3<f64>,
    /// Predicted poses over the first N nodes
    pub predicted_poses: Vec<Pose>,
    /// Reference poses over the first N nodes
    pub reference_poses: Vec<Pose>,
    pub solver_status: Option<SolverStatus>,
}

impl Default for DiagnosticsSnapshot {
    fn default() -> Self {
        Self {
            stamp: 0.0,
            disturbance_force_body: Vector3::zeros(),
            disturbance_torque_body: Vector3::zeros(),
            predicted_poses: Vec::new(),
            reference_poses: Vec::new(),
            solver_status: None,
        }
    }
}

impl DiagnosticsSnapshot {
    /// Assemble a snapshot; the disturbance force is rotated into the body
    /// frame with the current attitude
    pub fn capture(
        stamp: f64,
        disturbance: &DisturbanceWrench,
        orientation: &UnitQuaternion<f64>,
        predicted: &[State],
        reference: &[State],
        horizon: usize,
        solver_status: Option<SolverStatus>,
    ) -> Self {
        Self {
            stamp,
            disturbance_force_body: disturbance.force_body(orientation),
            disturbance_torque_body: disturbance.torque_body,
            predicted_poses: predicted.iter().take(horizon).map(Pose::from).collect(),
            reference_poses: reference.iter().take(horizon).map(Pose::from).collect(),
            solver_status,
        }
    }
}

/// Shared, lock-protected snapshot
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsHandle {
    inner: Arc<RwLock<DiagnosticsSnapshot>>,
}

impl DiagnosticsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot unless the lock is busy; returns whether it was written
    pub fn try_publish(&self, snapshot: DiagnosticsSnapshot) -> bool {
        match self.inner.try_write() {
            Ok(mut guard) => {
                *guard = snapshot;
                true
            }
            Err(_) => false,
        }
    }

    /// Copy of the latest snapshot
    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_capture_rotates_force_into_body() {
        let disturbance = DisturbanceWrench {
            force_world: Vector3::new(0.0, 1.0, 0.0),
            torque_body: Vector3::new(0.1, 0.0, 0.0),
        };
        let yawed = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        let states = vec![State::default(); 21];
        let snapshot = DiagnosticsSnapshot::capture(1.0, &disturbance, &yawed, &states, &states, 20, None);

        assert_relative_eq!(snapshot.disturbance_force_body, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
        assert_eq!(snapshot.disturbance_torque_body.x, 0.1);
        assert_eq!(snapshot.predicted_poses.len(), 20);
        assert_eq!(snapshot.reference_poses.len(), 20);
    }

    #[test]
    fn test_publish_skipped_while_reader_holds_lock() {
        let handle = DiagnosticsHandle::new();
        let reader = handle.clone();
        let guard = reader.inner.read().unwrap();
        let published = handle.try_publish(DiagnosticsSnapshot { stamp: 2.0, ..Default::default() });
        assert!(!published);
        drop(guard);

        assert!(handle.try_publish(DiagnosticsSnapshot { stamp: 3.0, ..Default::default() }));
        assert_eq!(reader.snapshot().stamp, 3.0);
    }
}
