//! Consistency between the allocation matrix and the prediction model
//!
//! The feed-forward computed through the pseudo-inverse must be an
//! equilibrium of the dynamics the optimizer predicts with.

use approx::assert_relative_eq;
use nalgebra::Vector3;

use tiltqd_core::allocation::{wrench, AllocationMatrix};
use tiltqd_core::disturbance::DisturbanceWrench;
use tiltqd_core::dynamics::TiltQuadModel;
use tiltqd_core::math::quaternion_from_rpy;
use tiltqd_core::model::{Control, PhysicalParams, RotorGeometry, State};

/// Thrusts and tilts from the allocation, with servos settled at the command
fn feed_forward(params: &PhysicalParams, rpy: Vector3<f64>) -> (State, Control) {
    let alloc = AllocationMatrix::from_geometry(&params.rotors).unwrap();
    let q = quaternion_from_rpy(&rpy);
    let force_b = q.inverse_transform_vector(&Vector3::new(0.0, 0.0, params.hover_thrust()));
    let setpoints = alloc.allocate(&wrench(&force_b, &Vector3::zeros()));

    let mut state = State { orientation: q, ..Default::default() };
    let mut control = Control::default();
    for (i, sp) in setpoints.iter().enumerate() {
        state.servo_angles[i] = sp.angle;
        control.thrusts[i] = sp.thrust;
        control.servo_commands[i] = sp.angle;
    }
    (state, control)
}

#[test]
fn level_hover_feed_forward_is_equilibrium() {
    let params = PhysicalParams::default();
    let model = TiltQuadModel::new(params.clone());
    let (state, control) = feed_forward(&params, Vector3::zeros());

    let dx = model.derivative(
        &state.to_vector(),
        &control.to_vector(),
        &DisturbanceWrench::default(),
        &[0.0; 4],
    );
    assert_relative_eq!(dx.norm(), 0.0, epsilon = 1e-9);
}

#[test]
fn tilted_hover_feed_forward_is_equilibrium() {
    // Fully actuated: holds a tilted attitude with zero net acceleration
    let params = PhysicalParams::default();
    let model = TiltQuadModel::new(params.clone());
    let (state, control) = feed_forward(&params, Vector3::new(0.15, -0.1, 0.4));

    let dx = model.derivative(
        &state.to_vector(),
        &control.to_vector(),
        &DisturbanceWrench::default(),
        &[0.0; 4],
    );
    assert_relative_eq!(dx.fixed_rows::<3>(3).norm(), 0.0, epsilon = 1e-9);
    assert_relative_eq!(dx.fixed_rows::<3>(10).norm(), 0.0, epsilon = 1e-9);
}

#[test]
fn allocation_reproduces_wrench_through_model() {
    let params = PhysicalParams::default();
    let alloc = AllocationMatrix::from_geometry(&params.rotors).unwrap();
    let model = TiltQuadModel::new(params.clone());

    let force = Vector3::new(0.3, -0.2, 4.5);
    let torque = Vector3::new(0.02, -0.01, 0.005);
    let setpoints = alloc.allocate(&wrench(&force, &torque));

    let thrusts = setpoints.map(|sp| sp.thrust);
    let angles = setpoints.map(|sp| sp.angle);
    let (f, tau) = model.rotor_wrench(&thrusts, &angles, &[0.0; 4]);

    assert_relative_eq!(f, force, epsilon = 1e-9);
    assert_relative_eq!(tau, torque, epsilon = 1e-9);
}

#[test]
fn hover_holds_position_over_horizon() {
    let params = PhysicalParams::default();
    let model = TiltQuadModel::new(params.clone());
    let (mut state, control) = feed_forward(&params, Vector3::zeros());

    for _ in 0..20 {
        state = model.step(&state, &control, &DisturbanceWrench::default(), &[0.0; 4], 0.1);
    }
    assert_relative_eq!(state.position.norm(), 0.0, epsilon = 1e-9);
}

#[test]
fn geometry_with_arm_offset_still_inverts() {
    let mut geometry = RotorGeometry::default();
    for p in geometry.positions.iter_mut() {
        p.z = 0.05;
    }
    let alloc = AllocationMatrix::from_geometry(&geometry).unwrap();
    let product = alloc.matrix() * alloc.pseudo_inverse();
    assert_relative_eq!(product, nalgebra::Matrix6::identity(), epsilon = 1e-9);
}
