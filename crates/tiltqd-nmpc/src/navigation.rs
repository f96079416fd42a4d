//! Navigator collaborator
//!
//! The navigator owns the stabilization target and the flight phase. The
//! controller reads the target in point mode and writes it when it captures
//! the current pose (reset, tracking timeout).

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use tiltqd_core::math::quaternion_from_rpy;

/// Flight phase reported by the navigator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlightPhase {
    #[default]
    Disarmed,
    /// Motors armed, on the ground
    Armed,
    Takeoff,
    Hover,
    Land,
}

impl FlightPhase {
    pub fn is_armed(self) -> bool {
        self != FlightPhase::Disarmed
    }
}

/// Stabilization target
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NavTarget {
    /// Position [m] (world frame)
    pub position: Vector3<f64>,
    /// Velocity [m/s] (world frame)
    pub velocity: Vector3<f64>,
    /// Roll, pitch, yaw [rad]
    pub rpy: Vector3<f64>,
    /// Angular velocity [rad/s] (body frame)
    pub angular_velocity: Vector3<f64>,
}

impl NavTarget {
    pub fn orientation(&self) -> UnitQuaternion<f64> {
        quaternion_from_rpy(&self.rpy)
    }
}

/// Single settable component of the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetAxis {
    PosX,
    PosY,
    PosZ,
    VelX,
    VelY,
    VelZ,
    Roll,
    Pitch,
    Yaw,
    OmegaX,
    OmegaY,
    OmegaZ,
}

/// Source of the stabilization target
pub trait Navigator {
    fn phase(&self) -> FlightPhase;

    fn target(&self) -> NavTarget;

    /// Set one component of the target
    fn set_target_axis(&mut self, axis: TargetAxis, value: f64);

    fn set_target_position(&mut self, p: &Vector3<f64>) {
        self.set_target_axis(TargetAxis::PosX, p.x);
        self.set_target_axis(TargetAxis::PosY, p.y);
        self.set_target_axis(TargetAxis::PosZ, p.z);
    }

    fn set_target_velocity(&mut self, v: &Vector3<f64>) {
        self.set_target_axis(TargetAxis::VelX, v.x);
        self.set_target_axis(TargetAxis::VelY, v.y);
        self.set_target_axis(TargetAxis::VelZ, v.z);
    }

    fn set_target_rpy(&mut self, rpy: &Vector3<f64>) {
        self.set_target_axis(TargetAxis::Roll, rpy.x);
        self.set_target_axis(TargetAxis::Pitch, rpy.y);
        self.set_target_axis(TargetAxis::Yaw, rpy.z);
    }

    fn set_target_angular_velocity(&mut self, w: &Vector3<f64>) {
        self.set_target_axis(TargetAxis::OmegaX, w.x);
        self.set_target_axis(TargetAxis::OmegaY, w.y);
        self.set_target_axis(TargetAxis::OmegaZ, w.z);
    }
}

/// Navigator holding a fixed point target
#[derive(Debug, Clone, Default)]
pub struct PointNavigator {
    phase: FlightPhase,
    target: NavTarget,
}

impl PointNavigator {
    pub fn new(phase: FlightPhase, target: NavTarget) -> Self {
        Self { phase, target }
    }

    pub fn set_phase(&mut self, phase: FlightPhase) {
        self.phase = phase;
    }
}

impl Navigator for PointNavigator {
    fn phase(&self) -> FlightPhase {
        self.phase
    }

    fn target(&self) -> NavTarget {
        self.target
    }

    fn set_target_axis(&mut self, axis: TargetAxis, value: f64) {
        let t = &mut self.target;
        match axis {
            TargetAxis::PosX => t.position.x = value,
            TargetAxis::PosY => t.position.y = value,
            TargetAxis::PosZ => t.position.z = value,
            TargetAxis::VelX => t.velocity.x = value,
            TargetAxis::VelY => t.velocity.y = value,
            TargetAxis::VelZ => t.velocity.z = value,
            TargetAxis::Roll => t.rpy.x = value,
            TargetAxis::Pitch => t.rpy.y = value,
            TargetAxis::Yaw => t.rpy.z = value,
            TargetAxis::OmegaX => t.angular_velocity.x = value,
            TargetAxis::OmegaY => t.angular_velocity.y = value,
            TargetAxis::OmegaZ => t.angular_velocity.z = value,
        }
    }
}
