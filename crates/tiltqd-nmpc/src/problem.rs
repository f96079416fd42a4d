//! One optimization problem instance

use tiltqd_core::disturbance::DisturbanceWrench;
use tiltqd_core::model::{State, NUM_ROTORS};

use crate::config::NY;
use crate::reference::ReferenceWindow;

/// Rotor drag as a quartic in the tilt angle, shared by all rotors
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragModel {
    coeffs: [f64; 5],
}

impl DragModel {
    pub fn new(coeffs: [f64; 5]) -> Self {
        Self { coeffs }
    }

    /// c0 + c1·α + c2·α² + c3·α³ + c4·α⁴
    pub fn eval(&self, alpha: f64) -> f64 {
        // Horner form
        self.coeffs.iter().rev().fold(0.0, |acc, c| acc * alpha + c)
    }

    /// Drag of each rotor at the measured tilt angles
    pub fn per_rotor(&self, angles: &[f64; NUM_ROTORS]) -> [f64; NUM_ROTORS] {
        angles.map(|a| self.eval(a))
    }
}

/// Everything the solver needs for one solve
///
/// Rotor drag is evaluated once from the measured tilt and applies to
/// every stage of the horizon.
#[derive(Debug, Clone)]
pub struct NmpcProblem<'a> {
    /// Current state: estimate plus measured servo angles
    pub initial_state: State,
    /// Shifted reference window
    pub reference: &'a ReferenceWindow,
    /// Disturbance force (world) and torque (body)
    pub disturbance: DisturbanceWrench,
    /// Per-rotor drag held constant over the horizon
    pub rotor_drag: [f64; NUM_ROTORS],
    /// Stage cost diagonal; the terminal cost uses its state prefix
    pub cost_diagonal: [f64; NY],
}
