//! Hover Demonstration
//!
//! Closes the loop between the NMPC controller and the tilt-rotor model:
//! - Vehicle starts on the ground and is armed
//! - Controller holds the reset pose with the allocation feed-forward
//! - A constant side wind is applied after 1 s and the disturbance
//!   observer picks it up
//!
//! Uses the rollout backend, so the printed commands are the feed-forward
//! part only. Build with `--features acados` and swap in `AcadosSolver`
//! for the optimized response.

use std::sync::Arc;

use nalgebra::Vector3;

use tiltqd_core::disturbance::DisturbanceWrench;
use tiltqd_core::dynamics::TiltQuadModel;
use tiltqd_core::model::{Control, State};
use tiltqd_nmpc::clock::ManualClock;
use tiltqd_nmpc::estimator::{CogEstimate, LatestEstimate};
use tiltqd_nmpc::navigation::{FlightPhase, PointNavigator};
use tiltqd_nmpc::{FlightController, NmpcConfig, NmpcController, RolloutSolver};

fn estimate_of(state: &State) -> CogEstimate {
    CogEstimate {
        position: state.position,
        velocity: state.velocity,
        orientation: state.orientation,
        angular_velocity: state.angular_velocity,
    }
}

fn main() {
    println!("=== Tilt-rotor NMPC hover demonstration ===\n");

    let config = NmpcConfig::default();
    let t_samp = config.horizon.t_samp;
    let model = TiltQuadModel::new(config.physical.clone());
    println!("{}", config.physical.summary());

    let clock = ManualClock::new(0.0);
    let solver = RolloutSolver::new(model.clone(), config.horizon.t_integ);
    let mut ctrl = NmpcController::new(
        solver,
        LatestEstimate::default(),
        PointNavigator::new(FlightPhase::Armed, Default::default()),
        Arc::new(clock.clone()),
    );
    if let Err(e) = ctrl.initialize(config.clone()) {
        eprintln!("initialization failed: {e}");
        return;
    }
    if let Err(e) = ctrl.inject_geometry(&config.physical.rotors) {
        eprintln!("geometry rejected: {e}");
        return;
    }

    let mut state = State::default();
    let no_drag = [0.0; 4];
    let wind = DisturbanceWrench { force_world: Vector3::new(0.3, 0.0, 0.0), torque_body: Vector3::zeros() };

    let steps = (3.0 / t_samp).round() as usize;
    for k in 0..steps {
        let t = k as f64 * t_samp;
        ctrl.estimator_mut().set(estimate_of(&state));
        if ctrl.on_joint_states(&state.servo_angles).is_err() {
            eprintln!("invalid joint states at t = {t:.3}");
            return;
        }

        let Some(command) = ctrl.update() else {
            println!("t = {t:.3} s: controller idle");
            clock.advance(t_samp);
            continue;
        };

        let control = Control {
            thrusts: command.thrusts.map(f64::from),
            servo_commands: command.gimbal.positions,
        };
        let disturbance = if t >= 1.0 { wind } else { DisturbanceWrench::default() };
        state = model.step(&state, &control, &disturbance, &no_drag, t_samp);

        // Ground contact
        if state.position.z < 0.0 {
            state.position.z = 0.0;
            state.velocity.z = state.velocity.z.max(0.0);
        }

        if k % 10 == 0 {
            let f_est = ctrl.observer().wrench().force_world;
            println!(
                "t = {:5.2} s  pos = [{:+.3}, {:+.3}, {:+.3}]  thrust = [{:.3}, {:.3}, {:.3}, {:.3}]  f_dist = [{:+.3}, {:+.3}, {:+.3}]",
                t,
                state.position.x,
                state.position.y,
                state.position.z,
                command.thrusts[0],
                command.thrusts[1],
                command.thrusts[2],
                command.thrusts[3],
                f_est.x,
                f_est.y,
                f_est.z,
            );
        }
        clock.advance(t_samp);
    }

    println!("\nFinal mode: {:?}", ctrl.mode());
}
