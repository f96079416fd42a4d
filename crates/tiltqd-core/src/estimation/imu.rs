//! IMU pre-filter
//!
//! Low-pass filters the gyro rate and a finite-difference angular
//! acceleration at the IMU sample rate with a third-order (by default)
//! cascaded IIR filter. Samples with any non-finite channel
//! are rejected. The first accepted sample only seeds the filters.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::SensorError;

/// Discrete low-pass built from `order` identical first-order sections
///
/// Each section is `y += α·(x − y)` with `α = dt / (τ + dt)` and
/// `τ = 1 / (2π·f_c)`; cascading them steepens the roll-off above `f_c`.
#[derive(Debug, Clone)]
pub struct IirLowPass {
    alpha: f64,
    sections: Vec<Vector3<f64>>,
}

impl IirLowPass {
    pub fn new(sample_freq: f64, cutoff_freq: f64, order: usize) -> Self {
        let dt = 1.0 / sample_freq;
        let tau = 1.0 / (2.0 * std::f64::consts::PI * cutoff_freq);
        Self { alpha: dt / (tau + dt), sections: vec![Vector3::zeros(); order] }
    }

    pub fn order(&self) -> usize {
        self.sections.len()
    }

    /// Push one sample through every section
    pub fn update(&mut self, input: &Vector3<f64>) -> Vector3<f64> {
        let mut x = *input;
        for y in &mut self.sections {
            *y += (x - *y) * self.alpha;
            x = *y;
        }
        x
    }

    /// Output of the last section
    pub fn value(&self) -> Vector3<f64> {
        self.sections.last().copied().unwrap_or_else(Vector3::zeros)
    }

    /// Set every section to `value`
    pub fn reset(&mut self, value: Vector3<f64>) {
        self.sections.iter_mut().for_each(|y| *y = value);
    }
}

/// Pre-filter parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuFilterConfig {
    /// IMU sample frequency [Hz]
    pub sample_freq: f64,
    /// Low-pass cutoff frequency [Hz]
    pub cutoff_freq: f64,
    /// Number of cascaded low-pass sections
    pub order: usize,
}

impl Default for ImuFilterConfig {
    fn default() -> Self {
        Self {
            sample_freq: 200.0,
            cutoff_freq: 20.0,
            order: 3,
        }
    }
}

/// Raw IMU sample (body frame)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    /// Specific force [m/s²]
    pub acc: Vector3<f64>,
    /// Angular velocity [rad/s]
    pub gyro: Vector3<f64>,
    /// Attitude angles reported by the board [rad]
    pub angles: Vector3<f64>,
    /// Magnetometer reading
    pub mag: Vector3<f64>,
}

impl ImuSample {
    fn check_finite(&self) -> Result<(), SensorError> {
        let channels = [
            ("acc", &self.acc),
            ("gyro", &self.gyro),
            ("angles", &self.angles),
            ("mag", &self.mag),
        ];
        for (name, v) in channels {
            if v.iter().any(|x| !x.is_finite()) {
                return Err(SensorError::NonFinite(name));
            }
        }
        Ok(())
    }
}

/// Filtered output of one accepted sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilteredImu {
    pub omega: Vector3<f64>,
    pub omega_dot: Vector3<f64>,
    pub acc: Vector3<f64>,
}

/// Whether the filters have been seeded
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterState {
    Uninitialized,
    Running { prev_omega: Vector3<f64> },
}

/// Angular rate and acceleration pre-filter
#[derive(Debug, Clone)]
pub struct ImuPreFilter {
    config: ImuFilterConfig,
    omega_filter: IirLowPass,
    omega_dot_filter: IirLowPass,
    state: FilterState,
}

impl ImuPreFilter {
    pub fn new(config: ImuFilterConfig) -> Result<Self, SensorError> {
        if !(config.sample_freq.is_finite() && config.sample_freq > 0.0) {
            return Err(SensorError::InvalidPeriod(config.sample_freq));
        }
        if config.order == 0 {
            return Err(SensorError::InvalidFilterOrder(config.order));
        }
        let (fs, fc, order) = (config.sample_freq, config.cutoff_freq, config.order);
        Ok(Self {
            omega_filter: IirLowPass::new(fs, fc, order),
            omega_dot_filter: IirLowPass::new(fs, fc, order),
            state: FilterState::Uninitialized,
            config,
        })
    }

    pub fn state(&self) -> FilterState {
        self.state
    }

    /// Feed one sample
    ///
    /// Returns `Ok(None)` for the seeding sample and an error for a sample
    /// with non-finite channels; a rejected sample leaves the filter untouched.
    pub fn process(&mut self, sample: &ImuSample) -> Result<Option<FilteredImu>, SensorError> {
        sample.check_finite()?;

        match self.state {
            FilterState::Uninitialized => {
                self.omega_filter.reset(sample.gyro);
                self.omega_dot_filter.reset(Vector3::zeros());
                self.state = FilterState::Running { prev_omega: sample.gyro };
                Ok(None)
            }
            FilterState::Running { prev_omega } => {
                let omega = self.omega_filter.update(&sample.gyro);
                let raw_omega_dot = (sample.gyro - prev_omega) * self.config.sample_freq;
                let omega_dot = self.omega_dot_filter.update(&raw_omega_dot);
                self.state = FilterState::Running { prev_omega: sample.gyro };
                Ok(Some(FilteredImu { omega, omega_dot, acc: sample.acc }))
            }
        }
    }

    /// Drop back to the unseeded state
    pub fn reset(&mut self) {
        self.state = FilterState::Uninitialized;
    }
}
