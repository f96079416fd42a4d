//! Actuator command output
//!
//! Converts the solver's predicted controls into the flight board thrust
//! command and the gimbal servo command.

use serde::{Deserialize, Serialize};

use tiltqd_core::model::NUM_ROTORS;

use crate::solver::PredictedTrajectory;

/// Servo joint names in rotor order
pub const GIMBAL_NAMES: [&str; NUM_ROTORS] = ["gimbal1", "gimbal2", "gimbal3", "gimbal4"];

/// Gimbal servo position command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GimbalCommand {
    pub names: [String; NUM_ROTORS],
    /// Servo angles [rad]
    pub positions: [f64; NUM_ROTORS],
}

impl GimbalCommand {
    pub fn new(positions: [f64; NUM_ROTORS]) -> Self {
        Self { names: GIMBAL_NAMES.map(String::from), positions }
    }
}

/// Command for one control period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActuatorCommand {
    /// Rotor thrusts [N]
    pub thrusts: [f32; NUM_ROTORS],
    pub gimbal: GimbalCommand,
}

impl ActuatorCommand {
    /// Zero thrust, servos at zero
    pub fn zero() -> Self {
        Self { thrusts: [0.0; NUM_ROTORS], gimbal: GimbalCommand::new([0.0; NUM_ROTORS]) }
    }
}

/// Samples the predicted controls at a fixed lookahead
#[derive(Debug, Clone)]
pub struct CommandTranslator {
    t_integ: f64,
    lookahead: f64,
}

impl CommandTranslator {
    pub fn new(t_integ: f64, lookahead: f64) -> Self {
        Self { t_integ, lookahead }
    }

    pub fn translate(&self, prediction: &PredictedTrajectory) -> ActuatorCommand {
        let u = prediction.control_at(self.lookahead, self.t_integ);
        ActuatorCommand {
            thrusts: u.thrusts.map(|f| f as f32),
            gimbal: GimbalCommand::new(u.servo_commands),
        }
    }
}
