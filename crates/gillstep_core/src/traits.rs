use crate::error::DomainError;
use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// A trait for types that can be used as scalars by the difference kernels and metrics.
/// Must support basic arithmetic, debug printing, and conversion from f64.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A single-variable real function that may fail outside its natural domain.
pub trait ScalarFunction<T: Scalar> {
    /// Evaluates the function at `x`.
    /// Returns `Err` when `x` lies outside the function's domain
    /// (division by zero, invalid argument to a transcendental, ...).
    fn evaluate(&self, x: T) -> Result<T, DomainError>;
}

impl<T: Scalar, S: ScalarFunction<T> + ?Sized> ScalarFunction<T> for &S {
    fn evaluate(&self, x: T) -> Result<T, DomainError> {
        (**self).evaluate(x)
    }
}

impl<T: Scalar, S: ScalarFunction<T> + ?Sized> ScalarFunction<T> for Box<S> {
    fn evaluate(&self, x: T) -> Result<T, DomainError> {
        (**self).evaluate(x)
    }
}

/// Wraps an infallible closure. A NaN or infinite output is reported as a domain error,
/// which is how plain float arithmetic signals e.g. `1.0 / 0.0` or `(-1.0).sqrt()`.
#[derive(Clone, Copy)]
pub struct PlainFn<F>(pub F);

impl<T, F> ScalarFunction<T> for PlainFn<F>
where
    T: Scalar,
    F: Fn(T) -> T,
{
    fn evaluate(&self, x: T) -> Result<T, DomainError> {
        let y = (self.0)(x);
        if y.is_finite() {
            Ok(y)
        } else {
            Err(DomainError::NonFinite(y.to_f64().unwrap_or(f64::NAN)))
        }
    }
}

/// Wraps a closure that reports its own domain failures.
#[derive(Clone, Copy)]
pub struct CheckedFn<F>(pub F);

impl<T, F> ScalarFunction<T> for CheckedFn<F>
where
    T: Scalar,
    F: Fn(T) -> Result<T, DomainError>,
{
    fn evaluate(&self, x: T) -> Result<T, DomainError> {
        (self.0)(x)
    }
}
