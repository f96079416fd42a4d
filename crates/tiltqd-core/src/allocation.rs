//! Control allocation for tiltable rotors
//!
//! Each rotor's thrust vector is split into an in-plane component `a`
//! (perpendicular to the arm, produced by tilting) and an out-of-plane
//! component `b` along body z. For rotor i at p = (px, py, pz) with
//! d = √(px² + py²), spin direction dr and torque ratio k:
//!
//! ```text
//! column 2i   : f = [py/d, −px/d, 0]
//!               τ = [−dr·k·py/d + px·pz/d, dr·k·px/d + py·pz/d, −(px²+py²)/d]
//! column 2i+1 : f = [0, 0, 1]
//!               τ = [py, −px, −dr·k]
//! ```
//!
//! A body wrench w maps to x = A⁺·w, and each pair (a, b) = (x₂ᵢ, x₂ᵢ₊₁)
//! gives tilt angle atan2(a, b) and thrust √(a² + b²).

use nalgebra::{SMatrix, SVector, Vector3};

use crate::model::{RotorGeometry, NUM_ROTORS};
use crate::ModelError;

/// 6×8 allocation matrix type
pub type AllocMatrix = SMatrix<f64, 6, 8>;

/// 8×6 pseudo-inverse type
pub type AllocPinv = SMatrix<f64, 8, 6>;

/// Body wrench [fx fy fz τx τy τz]
pub type Wrench = SVector<f64, 6>;

/// Singular value threshold for the pseudo-inverse
const PINV_EPS: f64 = 1e-9;

/// Thrust and tilt for one rotor
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RotorSetpoint {
    /// Servo tilt angle [rad]
    pub angle: f64,
    /// Thrust magnitude [N]
    pub thrust: f64,
}

/// Allocation matrix and its Moore-Penrose pseudo-inverse
///
/// Built once from the rotor geometry and immutable afterwards.
#[derive(Debug, Clone)]
pub struct AllocationMatrix {
    matrix: AllocMatrix,
    pinv: AllocPinv,
}

impl AllocationMatrix {
    /// Build the matrix from rotor geometry and invert it
    pub fn from_geometry(geometry: &RotorGeometry) -> Result<Self, ModelError> {
        geometry.validate()?;

        let k = geometry.kq_d_kt;
        let mut matrix = AllocMatrix::zeros();

        for i in 0..NUM_ROTORS {
            let p = &geometry.positions[i];
            let dr = f64::from(geometry.directions[i]);
            let d = geometry.arm_length(i);

            let radial = 2 * i;
            matrix[(0, radial)] = p.y / d;
            matrix[(1, radial)] = -p.x / d;
            matrix[(2, radial)] = 0.0;
            matrix[(3, radial)] = -dr * k * p.y / d + p.x * p.z / d;
            matrix[(4, radial)] = dr * k * p.x / d + p.y * p.z / d;
            matrix[(5, radial)] = -(p.x * p.x + p.y * p.y) / d;

            let axial = 2 * i + 1;
            matrix[(0, axial)] = 0.0;
            matrix[(1, axial)] = 0.0;
            matrix[(2, axial)] = 1.0;
            matrix[(3, axial)] = p.y;
            matrix[(4, axial)] = -p.x;
            matrix[(5, axial)] = -dr * k;
        }

        let pinv = matrix
            .pseudo_inverse(PINV_EPS)
            .map_err(ModelError::PseudoInverse)?;

        if pinv.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::PseudoInverse("non-finite entries"));
        }

        Ok(Self { matrix, pinv })
    }

    pub fn matrix(&self) -> &AllocMatrix {
        &self.matrix
    }

    pub fn pseudo_inverse(&self) -> &AllocPinv {
        &self.pinv
    }

    /// Per-rotor force pairs (a, b) for a body wrench
    pub fn force_pairs(&self, wrench: &Wrench) -> SVector<f64, 8> {
        self.pinv * wrench
    }

    /// Per-rotor tilt angle and thrust for a body wrench
    pub fn allocate(&self, wrench: &Wrench) -> [RotorSetpoint; NUM_ROTORS] {
        let x = self.force_pairs(wrench);
        let mut out = [RotorSetpoint::default(); NUM_ROTORS];
        for (i, setpoint) in out.iter_mut().enumerate() {
            let a = x[2 * i];
            let b = x[2 * i + 1];
            setpoint.angle = a.atan2(b);
            setpoint.thrust = a.hypot(b);
        }
        out
    }
}

/// Assemble a wrench from body force and torque
pub fn wrench(force: &Vector3<f64>, torque: &Vector3<f64>) -> Wrench {
    Wrench::new(force.x, force.y, force.z, torque.x, torque.y, torque.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_symmetric_hover_allocation() {
        let alloc = AllocationMatrix::from_geometry(&RotorGeometry::default()).unwrap();
        let mg = 0.5 * 9.81;
        let setpoints = alloc.allocate(&wrench(&Vector3::new(0.0, 0.0, mg), &Vector3::zeros()));

        for sp in &setpoints {
            assert_relative_eq!(sp.angle, 0.0, epsilon = 1e-9);
            assert_relative_eq!(sp.thrust, mg / 4.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_pseudo_inverse_is_right_inverse() {
        let alloc = AllocationMatrix::from_geometry(&RotorGeometry::default()).unwrap();
        let product = alloc.matrix() * alloc.pseudo_inverse();
        assert_relative_eq!(product, SMatrix::<f64, 6, 6>::identity(), epsilon = 1e-9);
    }

    #[test]
    fn test_reconstructs_arbitrary_wrench() {
        let alloc = AllocationMatrix::from_geometry(&RotorGeometry::default()).unwrap();
        let w = Wrench::new(0.4, -0.3, 5.2, 0.05, -0.02, 0.01);
        let x = alloc.force_pairs(&w);
        assert_relative_eq!(alloc.matrix() * x, w, epsilon = 1e-9);
    }

    #[test]
    fn test_lateral_force_tilts_rotors() {
        let alloc = AllocationMatrix::from_geometry(&RotorGeometry::default()).unwrap();
        let setpoints = alloc.allocate(&wrench(&Vector3::new(1.0, 0.0, 4.9), &Vector3::zeros()));
        assert!(setpoints.iter().any(|sp| sp.angle.abs() > 1e-3));
    }

    #[test]
    fn test_degenerate_geometry_is_config_error() {
        let mut geometry = RotorGeometry::default();
        geometry.positions[0] = Vector3::zeros();
        assert!(AllocationMatrix::from_geometry(&geometry).is_err());
    }
}
