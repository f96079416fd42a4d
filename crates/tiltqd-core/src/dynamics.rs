//! Tilt-rotor quadrotor dynamics
//!
//! ṗ = v
//! v̇ = R(q)·Σfᵢ / m + g + f_dist / m
//! q̇ = 1/2 Λ(q)[0; ω]
//! Jω̇ = −ω × Jω + Σ(pᵢ × fᵢ − drᵢ·k·ftᵢ·zᵢ) + τ_dist
//! α̇ᵢ = (α_cᵢ − αᵢ) / t_servo
//!
//! where zᵢ = Rz(ψᵢ)·Rx(αᵢ)·e₃ is the rotor axis in the body frame, ψᵢ the
//! arm azimuth and fᵢ = (ftᵢ + dragᵢ)·zᵢ. The disturbance force is given in
//! the world frame and the disturbance torque in the body frame.
//!
//! This is the model the optimizer predicts with; the allocation matrix is
//! its linearization about zero tilt split into radial/axial components.

use nalgebra::{Vector3, Vector4};

use crate::disturbance::DisturbanceWrench;
use crate::math::{quaternion_derivative, rk4};
use crate::model::{Control, ControlVector, PhysicalParams, State, StateVector, NUM_ROTORS};

/// Continuous-time model of the tilt-rotor quadrotor
#[derive(Debug, Clone)]
pub struct TiltQuadModel {
    params: PhysicalParams,
}

impl TiltQuadModel {
    pub fn new(params: PhysicalParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PhysicalParams {
        &self.params
    }

    /// Rotor axis in the body frame for tilt angle `alpha`
    pub fn rotor_axis(&self, i: usize, alpha: f64) -> Vector3<f64> {
        let (c, s) = self.params.rotors.arm_direction(i);
        Vector3::new(s * alpha.sin(), -c * alpha.sin(), alpha.cos())
    }

    /// Body force and torque produced by the rotors
    pub fn rotor_wrench(
        &self,
        thrusts: &[f64; NUM_ROTORS],
        angles: &[f64; NUM_ROTORS],
        drag: &[f64; NUM_ROTORS],
    ) -> (Vector3<f64>, Vector3<f64>) {
        let rotors = &self.params.rotors;
        let mut force = Vector3::zeros();
        let mut torque = Vector3::zeros();

        for i in 0..NUM_ROTORS {
            let axis = self.rotor_axis(i, angles[i]);
            let f = axis * (thrusts[i] + drag[i]);
            let dr = f64::from(rotors.directions[i]);

            force += f;
            torque += rotors.positions[i].cross(&f) - axis * (dr * rotors.kq_d_kt * thrusts[i]);
        }

        (force, torque)
    }

    /// State derivative ẋ = f(x, u)
    pub fn derivative(
        &self,
        x: &StateVector,
        u: &ControlVector,
        disturbance: &DisturbanceWrench,
        drag: &[f64; NUM_ROTORS],
    ) -> StateVector {
        let state = State::from_vector(x);
        let control = Control::from_vector(u);
        let p = &self.params;

        let (force_b, torque_b) = self.rotor_wrench(&control.thrusts, &state.servo_angles, drag);

        let acc = state.orientation * force_b / p.mass
            + Vector3::new(0.0, 0.0, -p.gravity)
            + disturbance.force_world / p.mass;

        let q = Vector4::new(x[6], x[7], x[8], x[9]);
        let q_dot = quaternion_derivative(&q, &state.angular_velocity);

        let w = &state.angular_velocity;
        let jw = p.inertia() * w;
        let w_dot = p.inertia_inv() * (-w.cross(&jw) + torque_b + disturbance.torque_body);

        let mut dx = StateVector::zeros();
        dx.fixed_rows_mut::<3>(0).copy_from(&state.velocity);
        dx.fixed_rows_mut::<3>(3).copy_from(&acc);
        dx.fixed_rows_mut::<4>(6).copy_from(&q_dot);
        dx.fixed_rows_mut::<3>(10).copy_from(&w_dot);
        for i in 0..NUM_ROTORS {
            dx[13 + i] = (control.servo_commands[i] - state.servo_angles[i]) / p.t_servo;
        }
        dx
    }

    /// Advance the state by `dt` with RK4 under a constant control
    pub fn step(
        &self,
        state: &State,
        control: &Control,
        disturbance: &DisturbanceWrench,
        drag: &[f64; NUM_ROTORS],
        dt: f64,
    ) -> State {
        let u = control.to_vector();
        let x_next = rk4(&state.to_vector(), dt, |x| self.derivative(x, &u, disturbance, drag));
        State::from_vector(&x_next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn hover_control(params: &PhysicalParams) -> Control {
        Control { thrusts: [params.hover_thrust() / 4.0; 4], servo_commands: [0.0; 4] }
    }

    #[test]
    fn test_hover_is_equilibrium() {
        let params = PhysicalParams::default();
        let model = TiltQuadModel::new(params.clone());
        let dx = model.derivative(
            &State::default().to_vector(),
            &hover_control(&params).to_vector(),
            &DisturbanceWrench::default(),
            &[0.0; 4],
        );
        assert_relative_eq!(dx.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_free_fall_without_thrust() {
        let model = TiltQuadModel::new(PhysicalParams::default());
        let next = model.step(
            &State::default(),
            &Control::default(),
            &DisturbanceWrench::default(),
            &[0.0; 4],
            0.1,
        );
        assert_relative_eq!(next.velocity.z, -9.81 * 0.1, epsilon = 1e-9);
        assert_relative_eq!(next.position.z, -0.5 * 9.81 * 0.01, epsilon = 1e-9);
    }

    #[test]
    fn test_servo_first_order_response() {
        let params = PhysicalParams::default();
        let model = TiltQuadModel::new(params.clone());
        let mut control = hover_control(&params);
        control.servo_commands = [0.3; 4];

        let mut state = State::default();
        for _ in 0..((params.t_servo / 0.001) as usize) {
            state = model.step(&state, &control, &DisturbanceWrench::default(), &[0.0; 4], 0.001);
        }
        // One time constant: 1 − e⁻¹ of the step
        assert_relative_eq!(state.servo_angles[0], 0.3 * (1.0 - (-1.0f64).exp()), epsilon = 5e-3);
    }

    #[test]
    fn test_world_disturbance_force_accelerates() {
        let params = PhysicalParams::default();
        let model = TiltQuadModel::new(params.clone());
        let disturbance = DisturbanceWrench {
            force_world: Vector3::new(1.0, 0.0, 0.0),
            torque_body: Vector3::zeros(),
        };
        let dx = model.derivative(
            &State::default().to_vector(),
            &hover_control(&params).to_vector(),
            &disturbance,
            &[0.0; 4],
        );
        assert_relative_eq!(dx[3], 1.0 / params.mass, epsilon = 1e-12);
    }

    #[test]
    fn test_rotor_axis_tilts_perpendicular_to_arm() {
        let model = TiltQuadModel::new(PhysicalParams::default());
        let axis = model.rotor_axis(0, 0.5);
        let arm = model.params().rotors.positions[0];
        assert_relative_eq!(axis.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(axis.dot(&Vector3::new(arm.x, arm.y, 0.0)), 0.0, epsilon = 1e-12);
    }
}
