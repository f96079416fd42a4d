//! State estimator collaborator

use nalgebra::{UnitQuaternion, Vector3};

use tiltqd_core::math::quaternion_from_rpy;

/// Estimated CoG state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CogEstimate {
    /// Position [m] (world frame)
    pub position: Vector3<f64>,
    /// Velocity [m/s] (world frame)
    pub velocity: Vector3<f64>,
    /// Orientation (body to world)
    pub orientation: UnitQuaternion<f64>,
    /// Angular velocity [rad/s] (body frame)
    pub angular_velocity: Vector3<f64>,
}

impl Default for CogEstimate {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            angular_velocity: Vector3::zeros(),
        }
    }
}

impl CogEstimate {
    /// Build from an Euler-angle orientation
    pub fn from_rpy(
        position: Vector3<f64>,
        velocity: Vector3<f64>,
        rpy: Vector3<f64>,
        angular_velocity: Vector3<f64>,
    ) -> Self {
        Self { position, velocity, orientation: quaternion_from_rpy(&rpy), angular_velocity }
    }

    pub fn is_finite(&self) -> bool {
        let q = self.orientation.quaternion();
        self.position.iter().all(|v| v.is_finite())
            && self.velocity.iter().all(|v| v.is_finite())
            && self.angular_velocity.iter().all(|v| v.is_finite())
            && q.coords.iter().all(|v| v.is_finite())
    }
}

/// Source of the CoG state estimate
pub trait StateEstimator {
    fn cog_estimate(&self) -> CogEstimate;
}

/// Estimator that returns the last value pushed into it
#[derive(Debug, Clone, Default)]
pub struct LatestEstimate {
    estimate: CogEstimate,
}

impl LatestEstimate {
    pub fn new(estimate: CogEstimate) -> Self {
        Self { estimate }
    }

    pub fn set(&mut self, estimate: CogEstimate) {
        self.estimate = estimate;
    }
}

impl StateEstimator for LatestEstimate {
    fn cog_estimate(&self) -> CogEstimate {
        self.estimate
    }
}
