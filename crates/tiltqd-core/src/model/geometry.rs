//! Rotor geometry and physical parameters
//!
//! Each rotor sits at body position pᵢ on an arm whose azimuth is
//! atan2(pᵢ.y, pᵢ.x). The servo tilts the rotor about the arm-local x axis.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use super::state::NUM_ROTORS;
use crate::{ModelError, GRAVITY};

/// Placement and spin of the four rotors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotorGeometry {
    /// Rotor positions relative to the CoG [m] (body frame)
    pub positions: [Vector3<f64>; NUM_ROTORS],
    /// Spin directions, +1 or -1
    pub directions: [i8; NUM_ROTORS],
    /// Rotor drag torque to thrust ratio [m]
    pub kq_d_kt: f64,
}

impl Default for RotorGeometry {
    fn default() -> Self {
        // X configuration, 0.3 m diagonal arms
        let r = 0.3 * std::f64::consts::FRAC_1_SQRT_2;
        Self {
            positions: [
                Vector3::new(r, -r, 0.0),
                Vector3::new(r, r, 0.0),
                Vector3::new(-r, r, 0.0),
                Vector3::new(-r, -r, 0.0),
            ],
            directions: [1, -1, 1, -1],
            kq_d_kt: 0.0172,
        }
    }
}

impl RotorGeometry {
    /// Check that every arm has a horizontal component and a valid spin
    pub fn validate(&self) -> Result<(), ModelError> {
        for (index, p) in self.positions.iter().enumerate() {
            if !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()) {
                return Err(ModelError::NonFinite("rotor position"));
            }
            if p.xy().norm() < 1e-9 {
                return Err(ModelError::DegenerateRotorArm { index });
            }
        }
        for &d in &self.directions {
            if d != 1 && d != -1 {
                return Err(ModelError::InvalidSpinDirection(d));
            }
        }
        Ok(())
    }

    /// Horizontal arm length of rotor `i`
    pub fn arm_length(&self, i: usize) -> f64 {
        self.positions[i].xy().norm()
    }

    /// Unit arm direction (cos, sin of the arm azimuth)
    pub fn arm_direction(&self, i: usize) -> (f64, f64) {
        let p = &self.positions[i];
        let d = self.arm_length(i);
        (p.x / d, p.y / d)
    }
}

/// Rigid-body and actuator parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicalParams {
    /// Mass [kg]
    pub mass: f64,
    /// Gravity magnitude [m/s²]
    pub gravity: f64,
    /// Principal moments of inertia [kg·m²]
    pub inertia_diag: Vector3<f64>,
    /// Servo first-order time constant [s]
    pub t_servo: f64,
    /// Rotor drag polynomial coefficients c0..c4 in the tilt angle
    pub drag_coeffs: [f64; 5],
    /// Rotor geometry
    pub rotors: RotorGeometry,
}

impl Default for PhysicalParams {
    fn default() -> Self {
        Self {
            mass: 0.5,
            gravity: GRAVITY,
            inertia_diag: Vector3::new(0.0049, 0.0049, 0.0083),
            t_servo: 0.085,
            drag_coeffs: [0.0; 5],
            rotors: RotorGeometry::default(),
        }
    }
}

impl PhysicalParams {
    pub fn inertia(&self) -> Matrix3<f64> {
        Matrix3::from_diagonal(&self.inertia_diag)
    }

    pub fn inertia_inv(&self) -> Matrix3<f64> {
        Matrix3::from_diagonal(&self.inertia_diag.map(|v| 1.0 / v))
    }

    /// Total thrust needed to hover [N]
    pub fn hover_thrust(&self) -> f64 {
        self.mass * self.gravity
    }

    /// Multi-line human readable summary, logged at initialization
    pub fn summary(&self) -> String {
        let mut out = format!(
            "mass: {:.4} kg\ngravity: {:.4} m/s^2\ninertia: [{:.6}, {:.6}, {:.6}] kg*m^2\n\
             kq_d_kt: {:.6}\nt_servo: {:.4} s\n",
            self.mass,
            self.gravity,
            self.inertia_diag.x,
            self.inertia_diag.y,
            self.inertia_diag.z,
            self.rotors.kq_d_kt,
            self.t_servo,
        );
        for (i, p) in self.rotors.positions.iter().enumerate() {
            out.push_str(&format!(
                "rotor {}: p = [{:.4}, {:.4}, {:.4}] m, dir = {}\n",
                i + 1,
                p.x,
                p.y,
                p.z,
                self.rotors.directions[i]
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_geometry_is_valid() {
        let geometry = RotorGeometry::default();
        assert!(geometry.validate().is_ok());
        assert_relative_eq!(geometry.arm_length(0), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_rotor_on_axis_rejected() {
        let mut geometry = RotorGeometry::default();
        geometry.positions[2] = Vector3::new(0.0, 0.0, 0.1);
        assert!(matches!(
            geometry.validate(),
            Err(ModelError::DegenerateRotorArm { index: 2 })
        ));
    }

    #[test]
    fn test_bad_spin_direction_rejected() {
        let mut geometry = RotorGeometry::default();
        geometry.directions[1] = 0;
        assert!(geometry.validate().is_err());
    }

    #[test]
    fn test_summary_lists_rotors() {
        let summary = PhysicalParams::default().summary();
        assert!(summary.contains("mass: 0.5000 kg"));
        assert!(summary.contains("rotor 4"));
    }
}
