//! Numerical integration methods
//!
//! Fixed-step RK4 for the prediction model.

use nalgebra::SVector;

/// Generic RK4 integrator for any state vector
///
/// Solves dx/dt = f(x) using 4th-order Runge-Kutta.
pub fn rk4<const N: usize, F>(x: &SVector<f64, N>, dt: f64, f: F) -> SVector<f64, N>
where
    F: Fn(&SVector<f64, N>) -> SVector<f64, N>,
{
    let k1 = f(x);
    let k2 = f(&(x + k1 * (dt / 2.0)));
    let k3 = f(&(x + k2 * (dt / 2.0)));
    let k4 = f(&(x + k3 * dt));

    x + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    #[test]
    fn test_rk4_exponential_decay() {
        // dx/dt = -x, x(1) = e^-1
        let mut x = SVector::<f64, 1>::new(1.0);
        for _ in 0..100 {
            x = rk4(&x, 0.01, |x| -x);
        }
        assert_relative_eq!(x[0], (-1.0f64).exp(), epsilon = 1e-9);
    }

    #[test]
    fn test_rk4_harmonic_oscillator_energy() {
        let mut x = Vector2::new(1.0, 0.0);
        for _ in 0..1000 {
            x = rk4(&x, 0.01, |s| Vector2::new(s[1], -s[0]));
        }
        assert_relative_eq!(x.norm(), 1.0, epsilon = 1e-6);
    }
}
