//! Controller configuration
//!
//! All parameters have defaults; a TOML file only needs to name the values
//! it overrides.
//!
//! ```toml
//! [horizon]
//! t_pred = 1.5
//!
//! [weights]
//! qp_z = 500.0
//!
//! [disturbance]
//! gains = [1.0, 1.0, 2.0, 0.5, 0.5, 0.5]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use tiltqd_core::disturbance::DisturbanceObserverConfig;
use tiltqd_core::model::{PhysicalParams, NU, NX};

use crate::error::ConfigError;

/// Length of the stage cost diagonal
pub const NY: usize = NX + NU;

/// Length of the terminal cost diagonal
pub const NYN: usize = NX;

/// Main controller configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NmpcConfig {
    /// Vehicle parameters
    pub physical: PhysicalParams,
    /// Timing of the control loop and prediction horizon
    pub horizon: HorizonConfig,
    /// Cost function weights
    pub weights: CostWeights,
    /// Disturbance observer gains and limits
    pub disturbance: DisturbanceObserverConfig,
    /// Control mode reported to the flight board
    pub control_mode: ControlModeConfig,
    /// Trajectory tracking behavior
    pub tracking: TrackingConfig,
}

impl NmpcConfig {
    /// Parse from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.physical;
        if !(p.mass > 0.0) {
            return Err(ConfigError::invalid("physical.mass", format!("{} (must be > 0)", p.mass)));
        }
        if !(p.gravity > 0.0) {
            return Err(ConfigError::invalid("physical.gravity", format!("{} (must be > 0)", p.gravity)));
        }
        if p.inertia_diag.iter().any(|v| !(*v > 0.0)) {
            return Err(ConfigError::invalid("physical.inertia_diag", "all entries must be > 0"));
        }
        if !(p.t_servo > 0.0) {
            return Err(ConfigError::invalid("physical.t_servo", format!("{} (must be > 0)", p.t_servo)));
        }
        p.rotors.validate()?;

        self.horizon.validate()?;
        self.weights.validate()?;

        for (i, (gain, limit)) in self
            .disturbance
            .gains
            .iter()
            .zip(self.disturbance.limits.iter())
            .enumerate()
        {
            if !gain.is_finite() {
                return Err(ConfigError::invalid("disturbance.gains", format!("entry {i} is not finite")));
            }
            if !(*limit >= 0.0) {
                return Err(ConfigError::invalid("disturbance.limits", format!("entry {i} must be >= 0")));
            }
        }

        if !(self.tracking.timeout > 0.0) {
            return Err(ConfigError::invalid("tracking.timeout", "must be > 0"));
        }
        Ok(())
    }
}

/// Timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HorizonConfig {
    /// Control period [s]
    pub t_samp: f64,
    /// Integration step of one shooting interval [s]
    pub t_integ: f64,
    /// Prediction horizon [s]
    pub t_pred: f64,
    /// Time into the first interval at which the command is sampled [s]
    pub command_lookahead: f64,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            t_samp: 0.025,           // 40 Hz control loop
            t_integ: 0.1,
            t_pred: 2.0,             // N = 20
            command_lookahead: 0.0,  // first-step control
        }
    }
}

impl HorizonConfig {
    /// Number of shooting intervals N
    pub fn num_nodes(&self) -> usize {
        (self.t_pred / self.t_integ).round() as usize
    }

    /// Disturbance observer sample rate [Hz]
    pub fn sample_rate(&self) -> f64 {
        1.0 / self.t_samp
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.t_samp > 0.0) {
            return Err(ConfigError::invalid("horizon.t_samp", "must be > 0"));
        }
        if !(self.t_integ > 0.0) {
            return Err(ConfigError::invalid("horizon.t_integ", "must be > 0"));
        }
        if !(self.t_pred >= 2.0 * self.t_integ) {
            return Err(ConfigError::invalid("horizon.t_pred", "must span at least two intervals"));
        }
        if !(self.command_lookahead >= 0.0 && self.command_lookahead <= self.t_integ) {
            return Err(ConfigError::invalid(
                "horizon.command_lookahead",
                "must lie within the first interval",
            ));
        }
        Ok(())
    }
}

/// Group of entries on the cost diagonal sharing one weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightGroup {
    PositionXy,
    PositionZ,
    VelocityXy,
    VelocityZ,
    AttitudeXy,
    AttitudeZ,
    RateXy,
    RateZ,
    ServoAngle,
    Thrust,
    ServoCommandRate,
}

impl WeightGroup {
    pub const ALL: [WeightGroup; 11] = [
        WeightGroup::PositionXy,
        WeightGroup::PositionZ,
        WeightGroup::VelocityXy,
        WeightGroup::VelocityZ,
        WeightGroup::AttitudeXy,
        WeightGroup::AttitudeZ,
        WeightGroup::RateXy,
        WeightGroup::RateZ,
        WeightGroup::ServoAngle,
        WeightGroup::Thrust,
        WeightGroup::ServoCommandRate,
    ];

    /// Indices on the stage cost diagonal
    ///
    /// Index 6 (quaternion scalar) belongs to no group and stays 0.
    pub fn indices(self) -> std::ops::Range<usize> {
        match self {
            WeightGroup::PositionXy => 0..2,
            WeightGroup::PositionZ => 2..3,
            WeightGroup::VelocityXy => 3..5,
            WeightGroup::VelocityZ => 5..6,
            WeightGroup::AttitudeXy => 7..9,
            WeightGroup::AttitudeZ => 9..10,
            WeightGroup::RateXy => 10..12,
            WeightGroup::RateZ => 12..13,
            WeightGroup::ServoAngle => 13..17,
            WeightGroup::Thrust => 17..21,
            WeightGroup::ServoCommandRate => 21..25,
        }
    }

    /// Whether the group also appears in the terminal cost
    pub fn is_state_weight(self) -> bool {
        self.indices().end <= NX
    }
}

/// Cost function weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    pub qp_xy: f64,
    pub qp_z: f64,
    pub qv_xy: f64,
    pub qv_z: f64,
    pub qq_xy: f64,
    pub qq_z: f64,
    pub qw_xy: f64,
    pub qw_z: f64,
    /// Servo angle
    pub qa: f64,
    /// Rotor thrust
    pub rt: f64,
    /// Servo command rate
    pub rac_d: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            qp_xy: 300.0,
            qp_z: 400.0,
            qv_xy: 10.0,
            qv_z: 10.0,
            qq_xy: 300.0,
            qq_z: 300.0,
            qw_xy: 5.0,
            qw_z: 5.0,
            qa: 1.0,
            rt: 1.0,
            rac_d: 250.0,
        }
    }
}

impl CostWeights {
    pub fn get(&self, group: WeightGroup) -> f64 {
        match group {
            WeightGroup::PositionXy => self.qp_xy,
            WeightGroup::PositionZ => self.qp_z,
            WeightGroup::VelocityXy => self.qv_xy,
            WeightGroup::VelocityZ => self.qv_z,
            WeightGroup::AttitudeXy => self.qq_xy,
            WeightGroup::AttitudeZ => self.qq_z,
            WeightGroup::RateXy => self.qw_xy,
            WeightGroup::RateZ => self.qw_z,
            WeightGroup::ServoAngle => self.qa,
            WeightGroup::Thrust => self.rt,
            WeightGroup::ServoCommandRate => self.rac_d,
        }
    }

    /// Set one group; negative or non-finite weights are rejected
    pub fn set(&mut self, group: WeightGroup, value: f64) -> Result<(), ConfigError> {
        if !(value >= 0.0 && value.is_finite()) {
            return Err(ConfigError::invalid(
                "weights",
                format!("{group:?} = {value} (must be finite and >= 0)"),
            ));
        }
        let slot = match group {
            WeightGroup::PositionXy => &mut self.qp_xy,
            WeightGroup::PositionZ => &mut self.qp_z,
            WeightGroup::VelocityXy => &mut self.qv_xy,
            WeightGroup::VelocityZ => &mut self.qv_z,
            WeightGroup::AttitudeXy => &mut self.qq_xy,
            WeightGroup::AttitudeZ => &mut self.qq_z,
            WeightGroup::RateXy => &mut self.qw_xy,
            WeightGroup::RateZ => &mut self.qw_z,
            WeightGroup::ServoAngle => &mut self.qa,
            WeightGroup::Thrust => &mut self.rt,
            WeightGroup::ServoCommandRate => &mut self.rac_d,
        };
        *slot = value;
        Ok(())
    }

    /// Stage cost diagonal [x (17), u (8)]
    pub fn diagonal(&self) -> [f64; NY] {
        let mut w = [0.0; NY];
        for group in WeightGroup::ALL {
            let value = self.get(group);
            for i in group.indices() {
                w[i] = value;
            }
        }
        w
    }

    /// Terminal cost diagonal: the state part of the stage diagonal
    pub fn terminal_diagonal(&self) -> [f64; NYN] {
        let mut w = [0.0; NYN];
        w.copy_from_slice(&self.diagonal()[..NYN]);
        w
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for group in WeightGroup::ALL {
            let value = self.get(group);
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ConfigError::invalid(
                    "weights",
                    format!("{group:?} = {value} (must be finite and >= 0)"),
                ));
            }
        }
        Ok(())
    }
}

/// Flight board control mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlModeConfig {
    pub is_attitude_ctrl: bool,
    pub is_body_rate_ctrl: bool,
    /// How long to wait for the control mode service [s]
    pub service_timeout: f64,
}

impl Default for ControlModeConfig {
    fn default() -> Self {
        Self {
            is_attitude_ctrl: true,
            is_body_rate_ctrl: false,
            service_timeout: 5.0,
        }
    }
}

/// Trajectory tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Time without a trajectory message before falling back to point mode [s]
    pub timeout: f64,
    /// Minimum period between repeated warnings [s]
    pub warn_period: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            timeout: 0.1,
            warn_period: 1.0,
        }
    }
}
