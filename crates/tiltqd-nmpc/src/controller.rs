//! Receding-horizon NMPC controller
//!
//! Runs one cycle per control period:
//!
//! ```text
//! parameter updates → estimate → reference shift → disturbance → solve → command
//! ```
//!
//! The controller is generic over its collaborators (solver, state
//! estimator, navigator) and reads time through a [`Clock`]. It is built in
//! two phases: after construction and [`FlightController::initialize`] it
//! stays not ready until the rotor geometry has been injected, and
//! [`FlightController::update`] returns `None` until then.

use std::sync::Arc;

use log::{error, info, warn};
use nalgebra::Vector3;

use tiltqd_core::allocation::AllocationMatrix;
use tiltqd_core::disturbance::{DisturbanceObserver, DisturbanceWrench};
use tiltqd_core::math::align_hemisphere;
use tiltqd_core::model::{RotorGeometry, State, NUM_ROTORS};

use crate::clock::Clock;
use crate::command::{ActuatorCommand, CommandTranslator};
use crate::config::NmpcConfig;
use crate::diagnostics::{DiagnosticsHandle, DiagnosticsSnapshot};
use crate::error::ControllerError;
use crate::estimator::{CogEstimate, StateEstimator};
use crate::navigation::{FlightPhase, Navigator};
use crate::problem::{DragModel, NmpcProblem};
use crate::reconfigure::{self, ParameterUpdate, ReconfigureHandle, ReconfigureQueue};
use crate::reference::{point_reference, ReferenceTrajectory, ReferenceWindow};
use crate::solver::{NmpcSolver, SolverStatus};
use crate::throttle::Throttle;

/// Period of rate-limited warnings [s]
const WARN_PERIOD: f64 = 1.0;

/// Common interface of flight controllers
pub trait FlightController {
    /// Apply a configuration; must be called before the first update
    fn initialize(&mut self, config: NmpcConfig) -> Result<(), ControllerError>;

    /// Run one control cycle; `None` if the cycle was not executed
    fn update(&mut self) -> Option<ActuatorCommand>;

    /// Capture the current pose as target and restart from rest
    fn reset(&mut self);
}

/// Flight board mode switch
pub trait ControlModeService {
    /// Report attitude / body-rate control flags, waiting at most `timeout` [s]
    fn set_control_mode(&mut self, is_attitude: bool, is_body_rate: bool, timeout: f64) -> Result<(), String>;
}

/// Reference source currently driving the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerMode {
    /// No cycle has run since initialization
    Uninitialized,
    /// Stabilizing the navigator target
    HoldingPoint,
    /// Following an external trajectory
    TrackingTrajectory,
}

/// Outcome of an external trajectory message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrajectoryAck {
    Accepted,
    IgnoredDuringTakeoff,
}

#[derive(Debug, Clone)]
enum Readiness {
    NotReady,
    Ready(AllocationMatrix),
}

/// NMPC controller for the tilt-rotor quadrotor
pub struct NmpcController<S, E, N> {
    solver: S,
    estimator: E,
    navigator: N,
    clock: Arc<dyn Clock>,
    control_mode_service: Option<Box<dyn ControlModeService + Send>>,

    config: NmpcConfig,
    initialized: bool,
    readiness: Readiness,
    mode: ControllerMode,

    window: ReferenceWindow,
    /// A trajectory arrived since the last cycle
    fresh_trajectory: bool,
    last_trajectory_time: f64,

    observer: DisturbanceObserver,
    drag: DragModel,
    translator: CommandTranslator,

    joint_angles: [f64; NUM_ROTORS],
    /// Last finite estimate, sign-aligned
    last_estimate: CogEstimate,
    last_command: ActuatorCommand,
    last_status: Option<SolverStatus>,

    reconfigure_tx: ReconfigureHandle,
    reconfigure_rx: ReconfigureQueue,
    diagnostics: DiagnosticsHandle,

    sensor_warn: Throttle,
    takeoff_warn: Throttle,
    solver_warn: Throttle,
}

impl<S, E, N> NmpcController<S, E, N>
where
    S: NmpcSolver,
    E: StateEstimator,
    N: Navigator,
{
    pub fn new(solver: S, estimator: E, navigator: N, clock: Arc<dyn Clock>) -> Self {
        let config = NmpcConfig::default();
        let (reconfigure_tx, reconfigure_rx) = reconfigure::channel();
        let warn_period = config.tracking.warn_period;

        Self {
            solver,
            estimator,
            navigator,
            clock,
            control_mode_service: None,
            initialized: false,
            readiness: Readiness::NotReady,
            mode: ControllerMode::Uninitialized,
            window: ReferenceWindow::seeded(&State::default(), config.horizon.num_nodes()),
            fresh_trajectory: false,
            last_trajectory_time: 0.0,
            observer: DisturbanceObserver::new(&config.disturbance, config.horizon.sample_rate()),
            drag: DragModel::new(config.physical.drag_coeffs),
            translator: CommandTranslator::new(config.horizon.t_integ, config.horizon.command_lookahead),
            joint_angles: [0.0; NUM_ROTORS],
            last_estimate: CogEstimate::default(),
            last_command: ActuatorCommand::zero(),
            last_status: None,
            reconfigure_tx,
            reconfigure_rx,
            diagnostics: DiagnosticsHandle::new(),
            sensor_warn: Throttle::new(WARN_PERIOD),
            takeoff_warn: Throttle::new(warn_period),
            solver_warn: Throttle::new(WARN_PERIOD),
            config,
        }
    }

    /// Attach the flight board mode service, contacted at initialization
    pub fn with_control_mode_service(mut self, service: Box<dyn ControlModeService + Send>) -> Self {
        self.control_mode_service = Some(service);
        self
    }

    /// Second construction phase: derive the allocation from the rotor geometry
    ///
    /// Allowed once per controller lifetime.
    pub fn inject_geometry(&mut self, geometry: &RotorGeometry) -> Result<(), ControllerError> {
        if let Readiness::Ready(_) = self.readiness {
            return Err(ControllerError::GeometryAlreadyInjected);
        }
        let allocation = AllocationMatrix::from_geometry(geometry)?;
        self.config.physical.rotors = geometry.clone();
        self.readiness = Readiness::Ready(allocation);
        info!("Rotor geometry injected, allocation matrix ready");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.readiness, Readiness::Ready(_))
    }

    pub fn allocation(&self) -> Option<&AllocationMatrix> {
        match &self.readiness {
            Readiness::Ready(allocation) => Some(allocation),
            Readiness::NotReady => None,
        }
    }

    pub fn mode(&self) -> ControllerMode {
        self.mode
    }

    pub fn config(&self) -> &NmpcConfig {
        &self.config
    }

    pub fn window(&self) -> &ReferenceWindow {
        &self.window
    }

    pub fn observer(&self) -> &DisturbanceObserver {
        &self.observer
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn estimator_mut(&mut self) -> &mut E {
        &mut self.estimator
    }

    pub fn navigator(&self) -> &N {
        &self.navigator
    }

    pub fn navigator_mut(&mut self) -> &mut N {
        &mut self.navigator
    }

    /// Last finite, sign-aligned state estimate
    pub fn last_estimate(&self) -> &CogEstimate {
        &self.last_estimate
    }

    pub fn joint_angles(&self) -> [f64; NUM_ROTORS] {
        self.joint_angles
    }

    pub fn last_command(&self) -> &ActuatorCommand {
        &self.last_command
    }

    pub fn last_status(&self) -> Option<SolverStatus> {
        self.last_status
    }

    /// Sender for online parameter updates
    pub fn reconfigure_handle(&self) -> ReconfigureHandle {
        self.reconfigure_tx.clone()
    }

    /// Reader side of the diagnostics snapshot
    pub fn diagnostics(&self) -> DiagnosticsHandle {
        self.diagnostics.clone()
    }

    /// Measured servo angles [rad] in rotor order
    pub fn on_joint_states(&mut self, positions: &[f64]) -> Result<(), ControllerError> {
        if positions.len() != NUM_ROTORS {
            return Err(ControllerError::JointStateLength { expected: NUM_ROTORS, got: positions.len() });
        }
        if positions.iter().any(|p| !p.is_finite()) {
            return Err(ControllerError::NonFiniteJointState);
        }
        self.joint_angles.copy_from_slice(positions);
        Ok(())
    }

    /// Set the navigator's roll, pitch and yaw target [rad]
    pub fn set_target_rpy(&mut self, rpy: &Vector3<f64>) {
        self.navigator.set_target_rpy(rpy);
    }

    /// Ingest an external reference trajectory
    ///
    /// Replaces the whole window and switches to tracking. Ignored while
    /// taking off.
    pub fn on_reference_trajectory(
        &mut self,
        trajectory: &ReferenceTrajectory,
    ) -> Result<TrajectoryAck, ControllerError> {
        if !self.initialized {
            return Err(ControllerError::NotInitialized);
        }

        let now = self.clock.now();
        if self.navigator.phase() == FlightPhase::Takeoff {
            if self.takeoff_warn.ready(now) {
                warn!("Reference trajectory ignored during takeoff");
            }
            return Ok(TrajectoryAck::IgnoredDuringTakeoff);
        }

        let window = trajectory.to_window(self.window.horizon())?;
        if self.mode == ControllerMode::Uninitialized {
            self.reset();
        }
        self.window.replace(window)?;
        self.last_trajectory_time = now;
        self.fresh_trajectory = true;

        if self.mode != ControllerMode::TrackingTrajectory {
            info!("Trajectory received, switching to tracking mode");
            self.mode = ControllerMode::TrackingTrajectory;
        }
        Ok(TrajectoryAck::Accepted)
    }

    fn apply_parameter_updates(&mut self) {
        for update in self.reconfigure_rx.drain() {
            match update {
                ParameterUpdate::CostWeight { group, value } => match self.config.weights.set(group, value) {
                    Ok(()) => info!("Cost weight {group:?} set to {value}"),
                    Err(e) => warn!("Cost weight update rejected: {e}"),
                },
                ParameterUpdate::IntegralGain { axis, value } => {
                    self.observer.set_gain(axis, value);
                    self.config.disturbance.gains[axis.index()] = value;
                    info!("Disturbance gain {axis:?} set to {value}");
                }
                ParameterUpdate::SaturationLimit { axis, value } => {
                    self.observer.set_limit(axis, value);
                    self.config.disturbance.limits[axis.index()] = value;
                    info!("Disturbance limit {axis:?} set to {value}");
                }
            }
        }
    }

    /// Current estimate, or the last good one if it is not finite
    fn read_estimate(&mut self, now: f64) -> CogEstimate {
        let mut estimate = self.estimator.cog_estimate();
        if !estimate.is_finite() {
            if self.sensor_warn.ready(now) {
                warn!("Non-finite state estimate, reusing the last good sample");
            }
            return self.last_estimate;
        }
        estimate.orientation = align_hemisphere(&estimate.orientation, &self.last_estimate.orientation);
        self.last_estimate = estimate;
        estimate
    }

    fn current_state(&self, estimate: &CogEstimate) -> State {
        State {
            position: estimate.position,
            velocity: estimate.velocity,
            orientation: estimate.orientation,
            angular_velocity: estimate.angular_velocity,
            servo_angles: self.joint_angles,
        }
    }

    /// Shift the window one step and append the new terminal entry
    fn update_reference(&mut self, now: f64, estimate: &CogEstimate) {
        if self.mode == ControllerMode::TrackingTrajectory {
            if now - self.last_trajectory_time > self.config.tracking.timeout {
                let (roll, pitch, yaw) = estimate.orientation.euler_angles();
                self.navigator.set_target_position(&estimate.position);
                self.navigator.set_target_rpy(&Vector3::new(roll, pitch, yaw));
                self.navigator.set_target_velocity(&Vector3::zeros());
                self.navigator.set_target_angular_velocity(&Vector3::zeros());
                self.mode = ControllerMode::HoldingPoint;
                self.fresh_trajectory = false;
                info!(
                    "No trajectory for {:.3} s, holding position [{:.3}, {:.3}, {:.3}]",
                    now - self.last_trajectory_time,
                    estimate.position.x,
                    estimate.position.y,
                    estimate.position.z
                );
            } else if self.fresh_trajectory {
                self.fresh_trajectory = false;
                return;
            } else {
                self.window.shift_hold_terminal();
                return;
            }
        }

        let Readiness::Ready(allocation) = &self.readiness else {
            return;
        };
        let (state, control) = point_reference(
            &self.navigator.target(),
            allocation,
            self.config.physical.mass,
            self.config.physical.gravity,
        );
        self.window.shift_in(state, control);
    }

    fn update_disturbance(&mut self, estimate: &CogEstimate) -> DisturbanceWrench {
        let (target_position, target_orientation) = match self.mode {
            ControllerMode::TrackingTrajectory => {
                let head = &self.window.states()[0];
                (head.position, head.orientation)
            }
            _ => {
                let target = self.navigator.target();
                (target.position, target.orientation())
            }
        };
        self.observer.update(&estimate.position, &estimate.orientation, &target_position, &target_orientation)
    }
}

impl<S, E, N> FlightController for NmpcController<S, E, N>
where
    S: NmpcSolver,
    E: StateEstimator,
    N: Navigator,
{
    fn initialize(&mut self, config: NmpcConfig) -> Result<(), ControllerError> {
        config.validate()?;

        let cm = &config.control_mode;
        if let Some(service) = self.control_mode_service.as_mut() {
            service
                .set_control_mode(cm.is_attitude_ctrl, cm.is_body_rate_ctrl, cm.service_timeout)
                .map_err(ControllerError::ControlModeService)?;
            info!(
                "Set control mode: attitude = {} and body rate = {}",
                cm.is_attitude_ctrl, cm.is_body_rate_ctrl
            );
        }

        let mut config = config;
        if let Readiness::Ready(_) = self.readiness {
            // Injected geometry wins over the configured one
            config.physical.rotors = self.config.physical.rotors.clone();
        }

        let horizon = &config.horizon;
        self.window = ReferenceWindow::seeded(&State::default(), horizon.num_nodes());
        self.observer = DisturbanceObserver::new(&config.disturbance, horizon.sample_rate());
        self.drag = DragModel::new(config.physical.drag_coeffs);
        self.translator = CommandTranslator::new(horizon.t_integ, horizon.command_lookahead);
        self.takeoff_warn = Throttle::new(config.tracking.warn_period);
        self.fresh_trajectory = false;
        self.last_command = ActuatorCommand::zero();
        self.last_status = None;
        self.mode = ControllerMode::Uninitialized;

        info!(
            "NMPC controller initialized: N = {}, T_samp = {} s, T_integ = {} s",
            horizon.num_nodes(),
            horizon.t_samp,
            horizon.t_integ
        );
        info!("Physical parameters:\n{}", config.physical.summary());

        self.config = config;
        self.initialized = true;
        Ok(())
    }

    fn update(&mut self) -> Option<ActuatorCommand> {
        if !self.initialized {
            return None;
        }
        self.apply_parameter_updates();

        if !self.navigator.phase().is_armed() || !self.is_ready() {
            return None;
        }
        if self.mode == ControllerMode::Uninitialized {
            self.reset();
        }

        let now = self.clock.now();
        let estimate = self.read_estimate(now);

        self.update_reference(now, &estimate);
        let disturbance = self.update_disturbance(&estimate);
        let rotor_drag = self.drag.per_rotor(&self.joint_angles);

        let problem = NmpcProblem {
            initial_state: self.current_state(&estimate),
            reference: &self.window,
            disturbance,
            rotor_drag,
            cost_diagonal: self.config.weights.diagonal(),
        };
        self.last_status = match self.solver.solve(&problem) {
            Ok(outcome) => {
                if outcome.status.is_failure() && self.solver_warn.ready(now) {
                    warn!("NMPC solver returned status {:?}", outcome.status);
                }
                Some(outcome.status)
            }
            Err(e) => {
                if self.solver_warn.ready(now) {
                    warn!("NMPC solve failed: {e}");
                }
                None
            }
        };

        let prediction = self.solver.prediction();
        let command = self.translator.translate(prediction);

        let horizon = self.window.horizon();
        self.diagnostics.try_publish(DiagnosticsSnapshot::capture(
            now,
            &disturbance,
            &estimate.orientation,
            &prediction.states,
            self.window.states(),
            horizon,
            self.last_status,
        ));

        self.last_command = command.clone();
        Some(command)
    }

    fn reset(&mut self) {
        if !self.initialized {
            warn!("Reset requested before initialization");
            return;
        }

        let now = self.clock.now();
        let estimate = self.read_estimate(now);
        let (roll, pitch, yaw) = estimate.orientation.euler_angles();

        self.navigator.set_target_position(&estimate.position);
        self.navigator.set_target_velocity(&Vector3::zeros());
        self.navigator.set_target_rpy(&Vector3::new(roll, pitch, yaw));
        self.navigator.set_target_angular_velocity(&Vector3::zeros());

        self.observer.reset();

        let state = self.current_state(&estimate);
        self.window = ReferenceWindow::seeded(&state, self.config.horizon.num_nodes());
        if let Err(e) = self.solver.reset(&self.window) {
            error!("Solver reset failed: {e}");
        }

        self.fresh_trajectory = false;
        self.last_command = ActuatorCommand::zero();
        self.mode = ControllerMode::HoldingPoint;
        info!(
            "NMPC controller reset at [{:.3}, {:.3}, {:.3}]",
            estimate.position.x, estimate.position.y, estimate.position.z
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::estimator::LatestEstimate;
    use crate::navigation::PointNavigator;
    use crate::solver::{PredictedTrajectory, RolloutSolver, SolveOutcome, SolverError};
    use approx::assert_relative_eq;
    use tiltqd_core::dynamics::TiltQuadModel;

    type TestController = NmpcController<RolloutSolver, LatestEstimate, PointNavigator>;

    fn controller(phase: FlightPhase) -> TestController {
        let config = NmpcConfig::default();
        let solver = RolloutSolver::new(TiltQuadModel::new(config.physical.clone()), config.horizon.t_integ);
        let navigator = PointNavigator::new(phase, Default::default());
        let mut ctrl = NmpcController::new(solver, LatestEstimate::default(), navigator, Arc::new(ManualClock::new(0.0)));
        ctrl.initialize(config).unwrap();
        ctrl
    }

    struct RecordingService {
        calls: Arc<std::sync::Mutex<Vec<(bool, bool)>>>,
    }

    impl ControlModeService for RecordingService {
        fn set_control_mode(&mut self, is_attitude: bool, is_body_rate: bool, _timeout: f64) -> Result<(), String> {
            self.calls.lock().unwrap().push((is_attitude, is_body_rate));
            Ok(())
        }
    }

    /// Rollout backend that keeps the last problem's rotor drag
    struct RecordingSolver {
        inner: RolloutSolver,
        rotor_drag: Option<[f64; NUM_ROTORS]>,
    }

    impl NmpcSolver for RecordingSolver {
        fn reset(&mut self, window: &ReferenceWindow) -> Result<(), SolverError> {
            self.inner.reset(window)
        }

        fn solve(&mut self, problem: &NmpcProblem<'_>) -> Result<SolveOutcome, SolverError> {
            self.rotor_drag = Some(problem.rotor_drag);
            self.inner.solve(problem)
        }

        fn prediction(&self) -> &PredictedTrajectory {
            self.inner.prediction()
        }
    }

    struct UnavailableService;

    impl ControlModeService for UnavailableService {
        fn set_control_mode(&mut self, _: bool, _: bool, _: f64) -> Result<(), String> {
            Err("timed out".into())
        }
    }

    #[test]
    fn test_update_refused_before_initialize() {
        let config = NmpcConfig::default();
        let solver = RolloutSolver::new(TiltQuadModel::new(config.physical.clone()), 0.1);
        let mut ctrl = NmpcController::new(
            solver,
            LatestEstimate::default(),
            PointNavigator::new(FlightPhase::Hover, Default::default()),
            Arc::new(ManualClock::new(0.0)),
        );
        assert!(ctrl.update().is_none());
    }

    #[test]
    fn test_second_geometry_injection_rejected() {
        let mut ctrl = controller(FlightPhase::Hover);
        let geometry = RotorGeometry::default();
        ctrl.inject_geometry(&geometry).unwrap();
        assert!(matches!(ctrl.inject_geometry(&geometry), Err(ControllerError::GeometryAlreadyInjected)));
    }

    #[test]
    fn test_control_mode_reported_at_initialize() {
        let calls = Arc::new(std::sync::Mutex::new(Vec::new()));
        let config = NmpcConfig::default();
        let solver = RolloutSolver::new(TiltQuadModel::new(config.physical.clone()), 0.1);
        let mut ctrl = NmpcController::new(
            solver,
            LatestEstimate::default(),
            PointNavigator::default(),
            Arc::new(ManualClock::new(0.0)),
        )
        .with_control_mode_service(Box::new(RecordingService { calls: calls.clone() }));

        ctrl.initialize(config).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec![(true, false)]);
    }

    #[test]
    fn test_unavailable_control_mode_service_fails_initialize() {
        let config = NmpcConfig::default();
        let solver = RolloutSolver::new(TiltQuadModel::new(config.physical.clone()), 0.1);
        let mut ctrl = NmpcController::new(
            solver,
            LatestEstimate::default(),
            PointNavigator::default(),
            Arc::new(ManualClock::new(0.0)),
        )
        .with_control_mode_service(Box::new(UnavailableService));

        assert!(matches!(ctrl.initialize(config), Err(ControllerError::ControlModeService(_))));
    }

    #[test]
    fn test_joint_state_validation() {
        let mut ctrl = controller(FlightPhase::Hover);
        assert!(matches!(
            ctrl.on_joint_states(&[0.1, 0.2, 0.3]),
            Err(ControllerError::JointStateLength { expected: 4, got: 3 })
        ));
        assert!(matches!(
            ctrl.on_joint_states(&[0.1, f64::NAN, 0.3, 0.4]),
            Err(ControllerError::NonFiniteJointState)
        ));
        ctrl.on_joint_states(&[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert_eq!(ctrl.joint_angles(), [0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_set_target_rpy_reaches_navigator() {
        let mut ctrl = controller(FlightPhase::Hover);
        ctrl.set_target_rpy(&Vector3::new(0.0, 0.1, 1.0));
        assert_eq!(ctrl.navigator().target().rpy, Vector3::new(0.0, 0.1, 1.0));
    }

    #[test]
    fn test_rotor_drag_follows_joint_angles() {
        let mut config = NmpcConfig::default();
        // drag(α) = α
        config.physical.drag_coeffs = [0.0, 1.0, 0.0, 0.0, 0.0];
        let solver = RecordingSolver {
            inner: RolloutSolver::new(TiltQuadModel::new(config.physical.clone()), config.horizon.t_integ),
            rotor_drag: None,
        };
        let mut ctrl = NmpcController::new(
            solver,
            LatestEstimate::default(),
            PointNavigator::new(FlightPhase::Hover, Default::default()),
            Arc::new(ManualClock::new(0.0)),
        );
        ctrl.initialize(config).unwrap();
        ctrl.inject_geometry(&RotorGeometry::default()).unwrap();

        ctrl.on_joint_states(&[0.1, 0.2, 0.3, 0.4]).unwrap();
        assert!(ctrl.update().is_some());
        let drag = ctrl.solver().rotor_drag.unwrap();
        for (d, a) in drag.iter().zip([0.1, 0.2, 0.3, 0.4]) {
            assert_relative_eq!(*d, a, epsilon = 1e-12);
        }

        ctrl.on_joint_states(&[-0.2, 0.0, 0.2, 0.5]).unwrap();
        ctrl.update();
        assert_eq!(ctrl.solver().rotor_drag, Some([-0.2, 0.0, 0.2, 0.5]));
    }

    #[test]
    fn test_first_cycle_resets() {
        let mut ctrl = controller(FlightPhase::Hover);
        ctrl.inject_geometry(&RotorGeometry::default()).unwrap();
        assert_eq!(ctrl.mode(), ControllerMode::Uninitialized);
        assert!(ctrl.update().is_some());
        assert_eq!(ctrl.mode(), ControllerMode::HoldingPoint);
    }
}
