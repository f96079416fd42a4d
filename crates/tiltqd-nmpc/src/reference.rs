//! Reference window over the prediction horizon
//!
//! The window holds N+1 reference states and N reference controls. Every
//! cycle it slides one step left: entries 0..N-1 take the values of
//! 1..N, the new state is written to slot N-1 and duplicated at N, and the
//! new control is written to slot N-1.
//!
//! In point mode the new entry is the navigator target with a gravity
//! feed-forward allocated through the pseudo-inverse. In tracking mode an
//! external trajectory replaces the whole window.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use tiltqd_core::allocation::{wrench, AllocationMatrix};
use tiltqd_core::model::{Control, State, NU, NUM_ROTORS, NX};

use crate::error::ControllerError;
use crate::navigation::NavTarget;

/// Fixed-length reference window
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceWindow {
    states: Vec<State>,
    controls: Vec<Control>,
}

impl ReferenceWindow {
    /// Window of `n` intervals holding `state` everywhere and zero controls
    pub fn seeded(state: &State, n: usize) -> Self {
        Self {
            states: vec![state.clone(); n + 1],
            controls: vec![Control::default(); n],
        }
    }

    /// Build from flat row-major arrays of (n+1)×17 states and n×8 controls
    pub fn from_flat(n: usize, x: &[f64], u: &[f64]) -> Result<Self, ControllerError> {
        if x.len() != (n + 1) * NX {
            return Err(ControllerError::InvalidTrajectory(format!(
                "state array has {} values, expected {}",
                x.len(),
                (n + 1) * NX
            )));
        }
        if u.len() != n * NU {
            return Err(ControllerError::InvalidTrajectory(format!(
                "control array has {} values, expected {}",
                u.len(),
                n * NU
            )));
        }

        let states = x
            .chunks_exact(NX)
            .map(State::from_slice)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ControllerError::InvalidTrajectory(e.to_string()))?;
        let controls = u
            .chunks_exact(NU)
            .map(Control::from_slice)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ControllerError::InvalidTrajectory(e.to_string()))?;

        Ok(Self { states, controls })
    }

    /// Number of shooting intervals N
    pub fn horizon(&self) -> usize {
        self.controls.len()
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    pub fn terminal_state(&self) -> &State {
        &self.states[self.states.len() - 1]
    }

    pub fn last_control(&self) -> &Control {
        &self.controls[self.controls.len() - 1]
    }

    /// Slide one step left and append a new terminal entry
    pub fn shift_in(&mut self, state: State, control: Control) {
        let n = self.horizon();

        self.states.rotate_left(1);
        self.controls.rotate_left(1);

        self.states[n - 1] = state.clone();
        self.states[n] = state;
        self.controls[n - 1] = control;
    }

    /// Slide one step left re-appending the current terminal entry
    pub fn shift_hold_terminal(&mut self) {
        let state = self.terminal_state().clone();
        let control = *self.last_control();
        self.shift_in(state, control);
    }

    /// Replace every entry; the horizon must match
    pub fn replace(&mut self, other: ReferenceWindow) -> Result<(), ControllerError> {
        if other.horizon() != self.horizon() {
            return Err(ControllerError::InvalidTrajectory(format!(
                "horizon {} does not match {}",
                other.horizon(),
                self.horizon()
            )));
        }
        *self = other;
        Ok(())
    }
}

/// External reference trajectory message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTrajectory {
    /// (N+1)×17 states, row-major
    pub x: Vec<f64>,
    /// N×8 controls, row-major
    pub u: Vec<f64>,
}

impl ReferenceTrajectory {
    /// Flatten a window into a message
    pub fn from_window(window: &ReferenceWindow) -> Self {
        Self {
            x: window.states().iter().flat_map(|s| s.to_vector().as_slice().to_vec()).collect(),
            u: window.controls().iter().flat_map(|c| c.to_vector().as_slice().to_vec()).collect(),
        }
    }

    pub fn to_window(&self, n: usize) -> Result<ReferenceWindow, ControllerError> {
        ReferenceWindow::from_flat(n, &self.x, &self.u)
    }
}

/// Reference state and control for holding `target`
///
/// The gravity force is expressed in the target body frame, allocated
/// through the pseudo-inverse, and each rotor's (a, b) pair is converted
/// to tilt angle atan2(a, b) and thrust √(a² + b²). Reference servo
/// command slots are zero.
pub fn point_reference(
    target: &NavTarget,
    allocation: &AllocationMatrix,
    mass: f64,
    gravity: f64,
) -> (State, Control) {
    let q = target.orientation();
    let force_b = q.inverse_transform_vector(&Vector3::new(0.0, 0.0, mass * gravity));
    let setpoints = allocation.allocate(&wrench(&force_b, &Vector3::zeros()));

    let mut state = State {
        position: target.position,
        velocity: target.velocity,
        orientation: q,
        angular_velocity: target.angular_velocity,
        servo_angles: [0.0; NUM_ROTORS],
    };
    let mut control = Control::default();
    for (i, sp) in setpoints.iter().enumerate() {
        state.servo_angles[i] = sp.angle;
        control.thrusts[i] = sp.thrust;
    }
    (state, control)
}
