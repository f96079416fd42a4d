//! State and control vectors of the tilt-rotor quadrotor
//!
//! State (17): position [m], velocity [m/s] (world frame), orientation
//! quaternion (w, x, y, z, body to world), angular velocity [rad/s] (body
//! frame), servo tilt angles [rad].
//!
//! Control (8): four rotor thrusts [N], four servo angle commands [rad].

use nalgebra::{SVector, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::math::quaternion_from_wxyz;
use crate::ModelError;

/// Number of rotors (and servos)
pub const NUM_ROTORS: usize = 4;

/// State dimension
pub const NX: usize = 17;

/// Control dimension
pub const NU: usize = 8;

/// Smallest quaternion norm accepted when unpacking a flat state
pub const QUATERNION_NORM_MIN: f64 = 1e-6;

/// Flat state vector
pub type StateVector = SVector<f64, NX>;

/// Flat control vector
pub type ControlVector = SVector<f64, NU>;

/// Full vehicle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Position [m] (world frame)
    pub position: Vector3<f64>,
    /// Velocity [m/s] (world frame)
    pub velocity: Vector3<f64>,
    /// Orientation (body to world)
    pub orientation: UnitQuaternion<f64>,
    /// Angular velocity [rad/s] (body frame)
    pub angular_velocity: Vector3<f64>,
    /// Servo tilt angles [rad]
    pub servo_angles: [f64; NUM_ROTORS],
}

impl Default for State {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            velocity: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
            angular_velocity: Vector3::zeros(),
            servo_angles: [0.0; NUM_ROTORS],
        }
    }
}

impl State {
    /// Pack into the solver layout
    /// [px py pz vx vy vz qw qx qy qz wx wy wz a1 a2 a3 a4]
    pub fn to_vector(&self) -> StateVector {
        let q = self.orientation.quaternion();
        let mut x = StateVector::zeros();
        x.fixed_rows_mut::<3>(0).copy_from(&self.position);
        x.fixed_rows_mut::<3>(3).copy_from(&self.velocity);
        x[6] = q.w;
        x[7] = q.i;
        x[8] = q.j;
        x[9] = q.k;
        x.fixed_rows_mut::<3>(10).copy_from(&self.angular_velocity);
        for (i, a) in self.servo_angles.iter().enumerate() {
            x[13 + i] = *a;
        }
        x
    }

    /// Unpack from the solver layout; the quaternion is renormalized
    /// but keeps its sign.
    pub fn from_vector(x: &StateVector) -> Self {
        Self {
            position: Vector3::new(x[0], x[1], x[2]),
            velocity: Vector3::new(x[3], x[4], x[5]),
            orientation: quaternion_from_wxyz(x[6], x[7], x[8], x[9]),
            angular_velocity: Vector3::new(x[10], x[11], x[12]),
            servo_angles: [x[13], x[14], x[15], x[16]],
        }
    }

    /// Unpack from a flat slice of exactly [`NX`] values
    pub fn from_slice(values: &[f64]) -> Result<Self, ModelError> {
        if values.len() != NX {
            return Err(ModelError::InvalidLength { expected: NX, got: values.len() });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite("state"));
        }
        let q_norm = values[6..10].iter().map(|v| v * v).sum::<f64>().sqrt();
        if q_norm < QUATERNION_NORM_MIN {
            return Err(ModelError::DegenerateQuaternion(q_norm));
        }
        Ok(Self::from_vector(&StateVector::from_column_slice(values)))
    }

    pub fn is_finite(&self) -> bool {
        self.to_vector().iter().all(|v| v.is_finite())
    }
}

/// Control input
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Control {
    /// Rotor thrusts [N]
    pub thrusts: [f64; NUM_ROTORS],
    /// Servo angle commands [rad]
    pub servo_commands: [f64; NUM_ROTORS],
}

impl Control {
    /// Pack into the solver layout [ft1 ft2 ft3 ft4 ac1 ac2 ac3 ac4]
    pub fn to_vector(&self) -> ControlVector {
        let mut u = ControlVector::zeros();
        for i in 0..NUM_ROTORS {
            u[i] = self.thrusts[i];
            u[NUM_ROTORS + i] = self.servo_commands[i];
        }
        u
    }

    pub fn from_vector(u: &ControlVector) -> Self {
        Self {
            thrusts: [u[0], u[1], u[2], u[3]],
            servo_commands: [u[4], u[5], u[6], u[7]],
        }
    }

    /// Unpack from a flat slice of exactly [`NU`] values
    pub fn from_slice(values: &[f64]) -> Result<Self, ModelError> {
        if values.len() != NU {
            return Err(ModelError::InvalidLength { expected: NU, got: values.len() });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::NonFinite("control"));
        }
        Ok(Self::from_vector(&ControlVector::from_column_slice(values)))
    }

    /// Linear blend `self + ratio·(other − self)`
    pub fn interpolate(&self, other: &Control, ratio: f64) -> Control {
        Control::from_vector(&(self.to_vector() + (other.to_vector() - self.to_vector()) * ratio))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_state_layout() {
        let state = State {
            position: Vector3::new(1.0, 2.0, 3.0),
            servo_angles: [0.1, 0.2, 0.3, 0.4],
            ..Default::default()
        };
        let x = state.to_vector();
        assert_eq!(x[2], 3.0);
        assert_eq!(x[6], 1.0); // qw
        assert_eq!(x[16], 0.4);
    }

    #[test]
    fn test_from_vector_keeps_quaternion_sign() {
        let mut x = State::default().to_vector();
        x[6] = -1.0;
        let state = State::from_vector(&x);
        assert_relative_eq!(state.orientation.w, -1.0);
    }

    #[test]
    fn test_from_slice_rejects_wrong_length() {
        assert!(matches!(
            State::from_slice(&[0.0; 13]),
            Err(ModelError::InvalidLength { expected: 17, got: 13 })
        ));
        assert!(Control::from_slice(&[0.0; 9]).is_err());
    }

    #[test]
    fn test_from_slice_rejects_nan() {
        let mut values = [0.0; NX];
        values[6] = 1.0;
        values[0] = f64::NAN;
        assert!(matches!(State::from_slice(&values), Err(ModelError::NonFinite(_))));
    }

    #[test]
    fn test_from_slice_rejects_zero_quaternion() {
        let values = [0.0; NX];
        assert!(matches!(
            State::from_slice(&values),
            Err(ModelError::DegenerateQuaternion(n)) if n == 0.0
        ));
    }

    #[test]
    fn test_control_interpolation() {
        let u0 = Control { thrusts: [1.0; 4], servo_commands: [0.0; 4] };
        let u1 = Control { thrusts: [3.0; 4], servo_commands: [0.2; 4] };
        let mid = u0.interpolate(&u1, 0.25);
        assert_relative_eq!(mid.thrusts[0], 1.5);
        assert_relative_eq!(mid.servo_commands[3], 0.05);
    }
}
