//! Scalar error metrics driving Gill's step-size heuristic.

use crate::traits::Scalar;

/// Smallest increment above 1.0 representable in `f64` (≈ 2.22e-16).
/// Used as the default error bound.
pub fn machine_precision() -> f64 {
    f64::EPSILON
}

/// Machine epsilon of an arbitrary scalar type.
pub fn machine_precision_of<T: Scalar>() -> T {
    T::epsilon()
}

/// Initial trial step for the curvature estimate:
/// 2 (1 + |x|) sqrt(error_bound / (1 + |f(x)|))
///
/// Scales with the magnitude of both the evaluation point and the function value.
pub fn initial_step_size<T: Scalar>(x: T, fx: T, error_bound: T) -> T {
    let one = T::one();
    let two = T::from_f64(2.0).unwrap();
    two * (one + x.abs()) * (error_bound / (one + fx.abs())).sqrt()
}

/// Conditional error of the forward-difference derivative:
/// 4 error_bound / (hs^2 |phi|)
///
/// Non-finite when `phi` or `hs` is zero; callers must check the result.
pub fn conditional_error<T: Scalar>(error_bound: T, hs: T, phi: T) -> T {
    let four = T::from_f64(4.0).unwrap();
    (four * error_bound) / (hs * hs * phi.abs())
}

/// Optimal forward-difference step: 2 sqrt(error_bound / |phi|)
pub fn optimal_step_size<T: Scalar>(error_bound: T, phi: T) -> T {
    let two = T::from_f64(2.0).unwrap();
    two * (error_bound / phi.abs()).sqrt()
}

/// |measured - real_value| / |real_value|
pub fn relative_error<T: Scalar>(measured: T, real_value: T) -> T {
    (measured - real_value).abs() / real_value.abs()
}
