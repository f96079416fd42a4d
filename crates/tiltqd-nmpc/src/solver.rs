//! Solver interface
//!
//! [`NmpcSolver`] is the seam between the controller and the numerical
//! optimizer. The controller submits one [`NmpcProblem`] per cycle and then
//! reads whatever trajectory the solver holds; reporting a failed or
//! non-converged solve is the solver's job, signalled through
//! [`SolverStatus`].
//!
//! Two backends:
//! - `AcadosSolver` (feature `acados`): the generated SQP-RTI solver
//! - [`RolloutSolver`]: integrates the prediction model under the reference
//!   controls; a warm-start stand-in for simulation and tests

use std::time::Instant;

use thiserror::Error;

use tiltqd_core::dynamics::TiltQuadModel;
use tiltqd_core::model::{Control, State};

use crate::problem::NmpcProblem;
use crate::reference::ReferenceWindow;

#[cfg(feature = "acados")]
use crate::acados_ffi::{self, AcadosCapsule};
#[cfg(feature = "acados")]
use crate::config::{NY, NYN};
#[cfg(feature = "acados")]
use tiltqd_core::model::{ControlVector, StateVector};

/// Solver errors
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("Solver initialization failed with status {0}")]
    InitializationFailed(i32),
    #[error("Setting solver input failed with status {0}")]
    InputRejected(i32),
    #[error("Horizon mismatch: solver has {expected} intervals, problem has {got}")]
    HorizonMismatch { expected: usize, got: usize },
}

/// ACADOS solver status codes (from acados/utils/types.h)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SolverStatus {
    /// Prediction produced without optimization (rollout backend)
    NotOptimized = -2,
    Unknown = -1,          // ACADOS_UNKNOWN
    Success = 0,           // ACADOS_SUCCESS
    NaNDetected = 1,       // ACADOS_NAN_DETECTED
    MaxIterations = 2,     // ACADOS_MAXITER
    MinStep = 3,           // ACADOS_MINSTEP
    QpFailure = 4,         // ACADOS_QP_FAILURE
    Ready = 5,             // ACADOS_READY
    Unbounded = 6,         // ACADOS_UNBOUNDED
    Timeout = 7,           // ACADOS_TIMEOUT
    QpScalingFailed = 8,   // ACADOS_QPSCALING_BOUNDS_NOT_SATISFIED
    Infeasible = 9,        // ACADOS_INFEASIBLE
}

impl From<i32> for SolverStatus {
    fn from(code: i32) -> Self {
        match code {
            -2 => SolverStatus::NotOptimized,
            0 => SolverStatus::Success,
            1 => SolverStatus::NaNDetected,
            2 => SolverStatus::MaxIterations,
            3 => SolverStatus::MinStep,
            4 => SolverStatus::QpFailure,
            5 => SolverStatus::Ready,
            6 => SolverStatus::Unbounded,
            7 => SolverStatus::Timeout,
            8 => SolverStatus::QpScalingFailed,
            9 => SolverStatus::Infeasible,
            _ => SolverStatus::Unknown,
        }
    }
}

impl SolverStatus {
    /// Whether the status should be reported as a problem
    pub fn is_failure(self) -> bool {
        !matches!(self, SolverStatus::Success | SolverStatus::NotOptimized)
    }
}

/// Solution statistics from solver
#[derive(Debug, Clone, Default)]
pub struct SolveStatistics {
    /// Number of SQP iterations
    pub sqp_iterations: usize,
    /// Total solve time [ms]
    pub solve_time_ms: f64,
}

/// Result of one solve
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolverStatus,
    pub stats: SolveStatistics,
}

/// Predicted state/control trajectory over the horizon
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedTrajectory {
    /// N+1 states
    pub states: Vec<State>,
    /// N controls
    pub controls: Vec<Control>,
}

impl PredictedTrajectory {
    pub fn from_window(window: &ReferenceWindow) -> Self {
        Self {
            states: window.states().to_vec(),
            controls: window.controls().to_vec(),
        }
    }

    /// Control at `t` into the first interval, linear between steps 0 and 1
    pub fn control_at(&self, t: f64, t_integ: f64) -> Control {
        let first = self.controls.first().copied().unwrap_or_default();
        if t == 0.0 {
            return first;
        }
        match self.controls.get(1) {
            Some(second) => first.interpolate(second, t / t_integ),
            None => first,
        }
    }
}

/// Numerical optimizer behind the controller
pub trait NmpcSolver {
    /// Re-initialize the solver and its warm start from a reference window
    fn reset(&mut self, window: &ReferenceWindow) -> Result<(), SolverError>;

    /// Solve one problem instance
    fn solve(&mut self, problem: &NmpcProblem<'_>) -> Result<SolveOutcome, SolverError>;

    /// Trajectory from the latest solve (or reset)
    fn prediction(&self) -> &PredictedTrajectory;
}

/// Forward rollout of the prediction model under the reference controls
///
/// Thrusts come from the reference controls and servo commands track the
/// reference tilt angles. No optimization is performed.
#[derive(Debug, Clone)]
pub struct RolloutSolver {
    model: TiltQuadModel,
    t_integ: f64,
    prediction: PredictedTrajectory,
}

impl RolloutSolver {
    pub fn new(model: TiltQuadModel, t_integ: f64) -> Self {
        Self {
            model,
            t_integ,
            prediction: PredictedTrajectory { states: Vec::new(), controls: Vec::new() },
        }
    }
}

impl NmpcSolver for RolloutSolver {
    fn reset(&mut self, window: &ReferenceWindow) -> Result<(), SolverError> {
        self.prediction = PredictedTrajectory::from_window(window);
        Ok(())
    }

    fn solve(&mut self, problem: &NmpcProblem<'_>) -> Result<SolveOutcome, SolverError> {
        let start = Instant::now();
        let reference = problem.reference;
        let n = reference.horizon();

        let mut states = Vec::with_capacity(n + 1);
        let mut controls = Vec::with_capacity(n);
        let mut state = problem.initial_state.clone();
        states.push(state.clone());

        for k in 0..n {
            let control = Control {
                thrusts: reference.controls()[k].thrusts,
                servo_commands: reference.states()[k].servo_angles,
            };
            state = self.model.step(&state, &control, &problem.disturbance, &problem.rotor_drag, self.t_integ);
            states.push(state.clone());
            controls.push(control);
        }

        self.prediction = PredictedTrajectory { states, controls };

        Ok(SolveOutcome {
            status: SolverStatus::NotOptimized,
            stats: SolveStatistics {
                sqp_iterations: 0,
                solve_time_ms: start.elapsed().as_secs_f64() * 1000.0,
            },
        })
    }

    fn prediction(&self) -> &PredictedTrajectory {
        &self.prediction
    }
}

/// Generated ACADOS solver
///
/// Stage parameters are `[q_ref(4), f_dist_w(3), tau_dist_b(3), drag(4)]`;
/// the reference quaternion enters the attitude error of the cost.
#[cfg(feature = "acados")]
pub struct AcadosSolver {
    capsule: AcadosCapsule,
    prediction: PredictedTrajectory,
    /// Last diagonal pushed to the solver
    cost_diagonal: Option<[f64; NY]>,
}

#[cfg(feature = "acados")]
impl AcadosSolver {
    pub fn new() -> Result<Self, SolverError> {
        let capsule = AcadosCapsule::new().map_err(SolverError::InitializationFailed)?;
        Ok(Self {
            capsule,
            prediction: PredictedTrajectory { states: Vec::new(), controls: Vec::new() },
            cost_diagonal: None,
        })
    }

    fn check_horizon(window: &ReferenceWindow) -> Result<(), SolverError> {
        if window.horizon() != acados_ffi::N {
            return Err(SolverError::HorizonMismatch { expected: acados_ffi::N, got: window.horizon() });
        }
        Ok(())
    }

    fn set_cost_diagonal(&mut self, diagonal: &[f64; NY]) -> Result<(), SolverError> {
        if self.cost_diagonal.as_ref() == Some(diagonal) {
            return Ok(());
        }
        for stage in 0..acados_ffi::N {
            self.capsule.set_weight_diagonal(stage, diagonal).map_err(SolverError::InputRejected)?;
        }
        self.capsule
            .set_weight_diagonal(acados_ffi::N, &diagonal[..NYN])
            .map_err(SolverError::InputRejected)?;
        self.cost_diagonal = Some(*diagonal);
        Ok(())
    }

    fn stage_parameters(state_ref: &State, problem: &NmpcProblem<'_>) -> [f64; acados_ffi::NP] {
        let q = state_ref.orientation.quaternion();
        let f = problem.disturbance.force_world;
        let tau = problem.disturbance.torque_body;
        let d = problem.rotor_drag;
        [q.w, q.i, q.j, q.k, f.x, f.y, f.z, tau.x, tau.y, tau.z, d[0], d[1], d[2], d[3]]
    }

    fn read_prediction(&self) -> PredictedTrajectory {
        let n = acados_ffi::N;
        let states = (0..=n)
            .map(|k| State::from_vector(&StateVector::from_column_slice(&self.capsule.get_state(k))))
            .collect();
        let controls = (0..n)
            .map(|k| Control::from_vector(&ControlVector::from_column_slice(&self.capsule.get_control(k))))
            .collect();
        PredictedTrajectory { states, controls }
    }
}

#[cfg(feature = "acados")]
impl NmpcSolver for AcadosSolver {
    fn reset(&mut self, window: &ReferenceWindow) -> Result<(), SolverError> {
        Self::check_horizon(window)?;
        self.capsule.reset().map_err(SolverError::InputRejected)?;

        for (k, state) in window.states().iter().enumerate() {
            self.capsule
                .set_state_init(k, state.to_vector().as_slice())
                .map_err(SolverError::InputRejected)?;
        }
        for (k, control) in window.controls().iter().enumerate() {
            self.capsule
                .set_control_init(k, control.to_vector().as_slice())
                .map_err(SolverError::InputRejected)?;
        }

        self.prediction = PredictedTrajectory::from_window(window);
        Ok(())
    }

    fn solve(&mut self, problem: &NmpcProblem<'_>) -> Result<SolveOutcome, SolverError> {
        let reference = problem.reference;
        Self::check_horizon(reference)?;
        let n = acados_ffi::N;

        self.set_cost_diagonal(&problem.cost_diagonal)?;
        self.capsule
            .set_initial_state(problem.initial_state.to_vector().as_slice())
            .map_err(SolverError::InputRejected)?;

        for k in 0..n {
            let state_ref = &reference.states()[k];
            let mut y_ref = [0.0; NY];
            y_ref[..acados_ffi::NX].copy_from_slice(state_ref.to_vector().as_slice());
            y_ref[acados_ffi::NX..].copy_from_slice(reference.controls()[k].to_vector().as_slice());
            self.capsule.set_reference(k, &y_ref).map_err(SolverError::InputRejected)?;

            let params = Self::stage_parameters(state_ref, problem);
            self.capsule.set_parameters(k, &params).map_err(SolverError::InputRejected)?;
        }

        let terminal = reference.terminal_state();
        self.capsule
            .set_reference(n, terminal.to_vector().as_slice())
            .map_err(SolverError::InputRejected)?;
        let params = Self::stage_parameters(terminal, problem);
        self.capsule.set_parameters(n, &params).map_err(SolverError::InputRejected)?;

        let status = SolverStatus::from(self.capsule.solve());
        let stats = SolveStatistics {
            sqp_iterations: self.capsule.get_sqp_iterations().max(0) as usize,
            solve_time_ms: self.capsule.get_solve_time() * 1000.0,
        };

        self.prediction = self.read_prediction();
        Ok(SolveOutcome { status, stats })
    }

    fn prediction(&self) -> &PredictedTrajectory {
        &self.prediction
    }
}
