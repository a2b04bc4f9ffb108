use crate::traits::Scalar;

/// Forward finite difference approximation of f'(x):
/// (f(x + h) - f(x)) / h
///
/// `h` must be non-zero.
pub fn forward_difference<T, F>(f: F, x: T, h: T) -> T
where
    T: Scalar,
    F: Fn(T) -> T,
{
    (f(x + h) - f(x)) / h
}

/// Central second-order difference approximation of f''(x):
/// (f(x + hs) - 2 f(x) + f(x - hs)) / hs^2
///
/// Used by the step-size search as the curvature estimate (phi).
/// `hs` must be non-zero.
pub fn central_difference<T, F>(f: F, x: T, hs: T) -> T
where
    T: Scalar,
    F: Fn(T) -> T,
{
    let two = T::from_f64(2.0).unwrap();
    (f(x + hs) - two * f(x) + f(x - hs)) / (hs * hs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_difference_is_exact_for_linear_functions() {
        let d = forward_difference(|x: f64| 3.0 * x - 1.0, 2.0, 0.5);
        assert!((d - 3.0).abs() < 1e-12);
    }

    #[test]
    fn forward_difference_approximates_exp() {
        let d = forward_difference(f64::exp, 1.0, 1e-8);
        assert!((d - 1.0_f64.exp()).abs() < 1e-6, "got {d}");
    }

    #[test]
    fn forward_difference_has_first_order_bias() {
        // f(x) = x^2: (2xh + h^2) / h = 2x + h
        let d = forward_difference(|x: f64| x * x, 1.0, 0.25);
        assert!((d - 2.25).abs() < 1e-12);
    }

    #[test]
    fn central_difference_recovers_quadratic_curvature() {
        let phi = central_difference(|x: f64| 4.0 * x * x + x, -0.7, 1e-3);
        assert!((phi - 8.0).abs() < 1e-6, "got {phi}");
    }

    #[test]
    fn central_difference_of_sin() {
        let x = 0.4_f64;
        let phi = central_difference(f64::sin, x, 1e-4);
        assert!((phi + x.sin()).abs() < 1e-6, "got {phi}");
    }

    #[test]
    fn central_difference_vanishes_for_odd_function_at_origin() {
        let phi = central_difference(|x: f64| x * x * x, 0.0, 0.1);
        assert_eq!(phi, 0.0);
    }

    #[test]
    fn kernels_are_generic_over_scalar() {
        let d = forward_difference(|x: f32| 2.0 * x, 1.0_f32, 0.5);
        let phi = central_difference(|x: f32| x * x, 1.0_f32, 0.5);
        assert!((d - 2.0).abs() < 1e-6);
        assert!((phi - 2.0).abs() < 1e-5);
    }
}
