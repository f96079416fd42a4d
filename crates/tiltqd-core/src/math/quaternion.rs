//! Quaternion operations for attitude representation
//!
//! - Quaternion derivative: q̇ = 1/2 Λ(q)[0;ω]
//! - Hemisphere alignment against the previous sample (no double-cover flips)
//! - Shortest-rotation attitude error qe = q_ref⁻¹ ⊗ q

use nalgebra::{Matrix4, Quaternion, UnitQuaternion, Vector3, Vector4};

/// Build an orientation from roll/pitch/yaw (R = Rz(yaw)·Ry(pitch)·Rx(roll))
pub fn quaternion_from_rpy(rpy: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(rpy.x, rpy.y, rpy.z)
}

/// Four-dimensional dot product of two quaternions
pub fn quaternion_dot(a: &UnitQuaternion<f64>, b: &UnitQuaternion<f64>) -> f64 {
    a.w * b.w + a.i * b.i + a.j * b.j + a.k * b.k
}

/// Return `q` or `-q`, whichever lies in the same hemisphere as `previous`
///
/// Both represent the same rotation; picking the one with a non-negative dot
/// product keeps the quaternion sign continuous from cycle to cycle.
pub fn align_hemisphere(
    q: &UnitQuaternion<f64>,
    previous: &UnitQuaternion<f64>,
) -> UnitQuaternion<f64> {
    if quaternion_dot(q, previous) < 0.0 {
        UnitQuaternion::new_unchecked(-q.into_inner())
    } else {
        *q
    }
}

/// Shortest-rotation attitude error of `current` relative to `target`
///
/// Computes qe = q_target⁻¹ ⊗ q_current and returns its vector part scaled
/// by the sign of its scalar part, so that q and -q yield the same error.
/// The result is expressed in the body frame of the target attitude.
pub fn attitude_error(
    current: &UnitQuaternion<f64>,
    target: &UnitQuaternion<f64>,
) -> Vector3<f64> {
    let qe = target.quaternion().conjugate() * current.quaternion();
    let sign = if qe.w > 0.0 { 1.0 } else { -1.0 };
    Vector3::new(qe.i, qe.j, qe.k) * sign
}

/// Compute the quaternion derivative given angular velocity
///
/// q̇ = 1/2 Λ(q)[0;ω], components ordered (w, x, y, z)
pub fn quaternion_derivative(q: &Vector4<f64>, omega: &Vector3<f64>) -> Vector4<f64> {
    let (w, x, y, z) = (q[0], q[1], q[2], q[3]);

    // Λ(q) = [w  -x  -y  -z]
    //        [x   w  -z   y]
    //        [y   z   w  -x]
    //        [z  -y   x   w]
    let lambda = Matrix4::new(
        w, -x, -y, -z,
        x,  w, -z,  y,
        y,  z,  w, -x,
        z, -y,  x,  w,
    );

    0.5 * lambda * Vector4::new(0.0, omega.x, omega.y, omega.z)
}

/// Unit quaternion from raw (w, x, y, z) components, renormalized
///
/// Keeps the sign of the input, unlike canonicalizing constructors.
pub fn quaternion_from_wxyz(w: f64, x: f64, y: f64, z: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_rpy_matches_axis_rotation() {
        let q = quaternion_from_rpy(&Vector3::new(0.0, 0.0, PI / 2.0));
        let x_rotated = q * Vector3::x();
        assert_relative_eq!(x_rotated, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_align_keeps_same_hemisphere() {
        let prev = quaternion_from_rpy(&Vector3::new(0.1, -0.2, 0.3));
        let q = quaternion_from_rpy(&Vector3::new(0.12, -0.18, 0.31));
        let aligned = align_hemisphere(&q, &prev);
        assert_relative_eq!(aligned.w, q.w, epsilon = 1e-15);
        assert!(quaternion_dot(&aligned, &prev) >= 0.0);
    }

    #[test]
    fn test_align_flips_opposite_hemisphere() {
        let prev = quaternion_from_rpy(&Vector3::new(0.0, 0.0, 0.2));
        let q = UnitQuaternion::new_unchecked(-prev.into_inner());
        let aligned = align_hemisphere(&q, &prev);
        assert!(quaternion_dot(&aligned, &prev) > 0.99);
        // Same rotation either way
        assert_relative_eq!(aligned.angle_to(&q), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_no_flip_over_full_yaw_sweep() {
        let mut prev = UnitQuaternion::identity();
        for step in 0..400 {
            let yaw = step as f64 * 0.05;
            let raw = quaternion_from_rpy(&Vector3::new(0.0, 0.0, yaw));
            // Alternate the sign the way an estimator might hand it over
            let raw = if step % 3 == 0 {
                UnitQuaternion::new_unchecked(-raw.into_inner())
            } else {
                raw
            };
            let aligned = align_hemisphere(&raw, &prev);
            assert!(quaternion_dot(&aligned, &prev) >= 0.0, "flip at step {step}");
            prev = aligned;
        }
    }

    #[test]
    fn test_attitude_error_zero_at_target() {
        let q = quaternion_from_rpy(&Vector3::new(0.3, 0.1, -1.0));
        assert_relative_eq!(attitude_error(&q, &q).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_attitude_error_ignores_double_cover() {
        let target = UnitQuaternion::identity();
        let current = quaternion_from_rpy(&Vector3::new(0.2, 0.0, 0.0));
        let negated = UnitQuaternion::new_unchecked(-current.into_inner());

        let e1 = attitude_error(&current, &target);
        let e2 = attitude_error(&negated, &target);
        assert_relative_eq!(e1, e2, epsilon = 1e-12);
        // sin(0.1) about x
        assert_relative_eq!(e1.x, (0.1f64).sin(), epsilon = 1e-12);
    }

    #[test]
    fn test_quaternion_derivative_pure_yaw() {
        let q = Vector4::new(1.0, 0.0, 0.0, 0.0);
        let q_dot = quaternion_derivative(&q, &Vector3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(q_dot, Vector4::new(0.0, 0.0, 0.0, 0.5), epsilon = 1e-12);
    }
}
