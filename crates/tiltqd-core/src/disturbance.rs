//! Integral disturbance observer
//!
//! Six bounded integrators turn the pose tracking error into an estimate of
//! the external wrench acting on the vehicle: forces along world x/y/z from
//! the position error and torques about body x/y/z from the attitude error.
//! The estimate is handed to the optimizer as a known disturbance so that a
//! persistent offset (payload, wind, CoG shift) is rejected without a
//! steady-state error.
//!
//! Each integrator follows `term += gain·error / sample_rate` and is clamped
//! to `[−limit, +limit]` after every update (anti-windup).

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::math::attitude_error;

/// Axis of a disturbance wrench component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WrenchAxis {
    X,
    Y,
    Z,
    Roll,
    Pitch,
    Yaw,
}

impl WrenchAxis {
    pub const ALL: [WrenchAxis; 6] = [
        WrenchAxis::X,
        WrenchAxis::Y,
        WrenchAxis::Z,
        WrenchAxis::Roll,
        WrenchAxis::Pitch,
        WrenchAxis::Yaw,
    ];

    pub fn index(self) -> usize {
        match self {
            WrenchAxis::X => 0,
            WrenchAxis::Y => 1,
            WrenchAxis::Z => 2,
            WrenchAxis::Roll => 3,
            WrenchAxis::Pitch => 4,
            WrenchAxis::Yaw => 5,
        }
    }
}

/// Observer gains and saturation limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisturbanceObserverConfig {
    /// Integral gains (x, y, z, roll, pitch, yaw)
    pub gains: [f64; 6],
    /// Saturation limits [N] / [N·m] (x, y, z, roll, pitch, yaw)
    pub limits: [f64; 6],
}

impl Default for DisturbanceObserverConfig {
    fn default() -> Self {
        Self {
            gains: [1.0, 1.0, 1.0, 0.5, 0.5, 0.5],
            limits: [5.0, 5.0, 5.0, 1.0, 1.0, 1.0],
        }
    }
}

/// Single clamped integrator
#[derive(Debug, Clone, PartialEq)]
pub struct IntegralTerm {
    gain: f64,
    limit: f64,
    sample_rate: f64,
    value: f64,
}

impl IntegralTerm {
    pub fn new(gain: f64, limit: f64, sample_rate: f64) -> Self {
        Self { gain, limit: limit.abs(), sample_rate, value: 0.0 }
    }

    /// Accumulate one error sample and return the clamped value.
    /// A non-finite sample leaves the accumulator untouched.
    pub fn update(&mut self, error: f64) -> f64 {
        if !error.is_finite() {
            return self.value;
        }
        self.value += self.gain * error / self.sample_rate;
        self.value = self.value.clamp(-self.limit, self.limit);
        self.value
    }

    /// Change the gain; the accumulator is kept
    pub fn set_gain(&mut self, gain: f64) {
        self.gain = gain;
    }

    /// Change the limit; takes effect on the next update
    pub fn set_limit(&mut self, limit: f64) {
        self.limit = limit.abs();
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn reset(&mut self) {
        self.value = 0.0;
    }
}

/// Estimated disturbance wrench
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DisturbanceWrench {
    /// Force [N] (world frame)
    pub force_world: Vector3<f64>,
    /// Torque [N·m] (body frame, about the CoG)
    pub torque_body: Vector3<f64>,
}

impl DisturbanceWrench {
    /// Force expressed in the body frame of `orientation`
    pub fn force_body(&self, orientation: &UnitQuaternion<f64>) -> Vector3<f64> {
        orientation.inverse_transform_vector(&self.force_world)
    }
}

/// Six-axis integral disturbance observer
#[derive(Debug, Clone)]
pub struct DisturbanceObserver {
    terms: [IntegralTerm; 6],
    wrench: DisturbanceWrench,
}

impl DisturbanceObserver {
    /// Create an observer sampled at `sample_rate` [Hz]
    pub fn new(config: &DisturbanceObserverConfig, sample_rate: f64) -> Self {
        let terms = std::array::from_fn(|i| {
            IntegralTerm::new(config.gains[i], config.limits[i], sample_rate)
        });
        Self { terms, wrench: DisturbanceWrench::default() }
    }

    /// Integrate the current pose error and return the new estimate
    pub fn update(
        &mut self,
        position: &Vector3<f64>,
        orientation: &UnitQuaternion<f64>,
        target_position: &Vector3<f64>,
        target_orientation: &UnitQuaternion<f64>,
    ) -> DisturbanceWrench {
        let pos_err = position - target_position;
        let att_err = attitude_error(orientation, target_orientation);

        let force = Vector3::new(
            self.terms[0].update(pos_err.x),
            self.terms[1].update(pos_err.y),
            self.terms[2].update(pos_err.z),
        );
        let torque = Vector3::new(
            self.terms[3].update(att_err.x),
            self.terms[4].update(att_err.y),
            self.terms[5].update(att_err.z),
        );

        self.wrench = DisturbanceWrench { force_world: force, torque_body: torque };
        self.wrench
    }

    /// Latest estimate without integrating
    pub fn wrench(&self) -> DisturbanceWrench {
        self.wrench
    }

    pub fn term(&self, axis: WrenchAxis) -> &IntegralTerm {
        &self.terms[axis.index()]
    }

    pub fn set_gain(&mut self, axis: WrenchAxis, gain: f64) {
        self.terms[axis.index()].set_gain(gain);
    }

    pub fn set_limit(&mut self, axis: WrenchAxis, limit: f64) {
        self.terms[axis.index()].set_limit(limit);
    }

    /// Zero all six accumulators
    pub fn reset(&mut self) {
        for term in &mut self.terms {
            term.reset();
        }
        self.wrench = DisturbanceWrench::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const RATE: f64 = 40.0;

    fn identity() -> UnitQuaternion<f64> {
        UnitQuaternion::identity()
    }

    #[test]
    fn test_integral_term_accumulates() {
        let mut term = IntegralTerm::new(2.0, 10.0, 10.0);
        term.update(1.0);
        assert_relative_eq!(term.update(1.0), 0.4);
    }

    #[test]
    fn test_integral_term_saturates() {
        let mut term = IntegralTerm::new(1.0, 5.0, RATE);
        for _ in 0..10_000 {
            term.update(3.0);
        }
        assert_relative_eq!(term.value(), 5.0);
        for _ in 0..10_000 {
            term.update(-3.0);
        }
        assert_relative_eq!(term.value(), -5.0);
    }

    #[test]
    fn test_zero_error_holds_value() {
        let mut term = IntegralTerm::new(1.0, 5.0, RATE);
        for _ in 0..20 {
            term.update(1.0);
        }
        let held = term.value();
        for _ in 0..100 {
            assert_relative_eq!(term.update(0.0), held);
        }
    }

    #[test]
    fn test_non_finite_error_ignored() {
        let mut term = IntegralTerm::new(1.0, 5.0, RATE);
        term.update(2.0);
        let held = term.value();
        assert_relative_eq!(term.update(f64::NAN), held);
        assert_relative_eq!(term.update(f64::INFINITY), held);
        assert_relative_eq!(term.update(2.0), held + 2.0 / RATE);
    }

    #[test]
    fn test_nan_target_keeps_observer_finite() {
        let mut observer = DisturbanceObserver::new(&DisturbanceObserverConfig::default(), RATE);
        let w = observer.update(
            &Vector3::zeros(),
            &identity(),
            &Vector3::new(f64::NAN, 0.0, 0.0),
            &identity(),
        );
        assert!(w.force_world.iter().all(|v| v.is_finite()));
        assert!(w.torque_body.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_gain_change_keeps_accumulator() {
        let mut term = IntegralTerm::new(1.0, 5.0, 1.0);
        term.update(2.0);
        term.set_gain(0.0);
        assert_relative_eq!(term.value(), 2.0);
        assert_relative_eq!(term.update(1.0), 2.0);
    }

    #[test]
    fn test_lowered_limit_clamps_next_update() {
        let mut term = IntegralTerm::new(1.0, 5.0, 1.0);
        term.update(4.0);
        term.set_limit(1.0);
        assert_relative_eq!(term.update(0.0), 1.0);
    }

    #[test]
    fn test_position_error_drives_world_force() {
        let mut observer = DisturbanceObserver::new(&DisturbanceObserverConfig::default(), RATE);
        let w = observer.update(
            &Vector3::new(0.4, 0.0, -0.8),
            &identity(),
            &Vector3::zeros(),
            &identity(),
        );
        assert_relative_eq!(w.force_world.x, 0.4 / RATE);
        assert_relative_eq!(w.force_world.z, -0.8 / RATE);
        assert_relative_eq!(w.torque_body.norm(), 0.0);
    }

    #[test]
    fn test_attitude_error_drives_body_torque() {
        let mut observer = DisturbanceObserver::new(&DisturbanceObserverConfig::default(), RATE);
        let current = UnitQuaternion::from_euler_angles(0.2, 0.0, 0.0);
        let w = observer.update(&Vector3::zeros(), &current, &Vector3::zeros(), &identity());
        assert_relative_eq!(w.torque_body.x, 0.5 * (0.1f64).sin() / RATE, epsilon = 1e-12);

        // The negated quaternion is the same attitude and must give the same torque
        let mut other = DisturbanceObserver::new(&DisturbanceObserverConfig::default(), RATE);
        let negated = UnitQuaternion::new_unchecked(-current.into_inner());
        let w2 = other.update(&Vector3::zeros(), &negated, &Vector3::zeros(), &identity());
        assert_relative_eq!(w.torque_body, w2.torque_body, epsilon = 1e-12);
    }

    #[test]
    fn test_every_component_within_limit() {
        let config = DisturbanceObserverConfig::default();
        let mut observer = DisturbanceObserver::new(&config, RATE);
        let tilted = UnitQuaternion::from_euler_angles(1.0, -1.0, 2.0);
        for _ in 0..5_000 {
            observer.update(&Vector3::new(50.0, -50.0, 50.0), &tilted, &Vector3::zeros(), &identity());
        }
        for axis in WrenchAxis::ALL {
            let term = observer.term(axis);
            assert!(term.value().abs() <= config.limits[axis.index()] + 1e-12);
        }
    }

    #[test]
    fn test_reset_zeroes_accumulators() {
        let mut observer = DisturbanceObserver::new(&DisturbanceObserverConfig::default(), RATE);
        observer.update(&Vector3::new(1.0, 1.0, 1.0), &identity(), &Vector3::zeros(), &identity());
        observer.reset();
        for axis in WrenchAxis::ALL {
            assert_eq!(observer.term(axis).value(), 0.0);
        }
        assert_eq!(observer.wrench(), DisturbanceWrench::default());
    }

    #[test]
    fn test_force_body_rotation() {
        let w = DisturbanceWrench { force_world: Vector3::new(1.0, 0.0, 0.0), torque_body: Vector3::zeros() };
        let yawed = UnitQuaternion::from_euler_angles(0.0, 0.0, std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(w.force_body(&yawed), Vector3::new(0.0, -1.0, 0.0), epsilon = 1e-12);
    }
}
