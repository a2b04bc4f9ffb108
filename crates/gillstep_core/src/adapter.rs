//! Target-function adapter.
//!
//! Turns a fallible [`ScalarFunction`] into the total `f64 -> f64` map the search
//! loop needs. Domain failures are replaced according to a [`Fallback`] policy and
//! counted so callers can tell when the result leaned on substituted values.

use crate::error::DomainError;
use crate::traits::ScalarFunction;
use serde::{Deserialize, Serialize};
use std::cell::Cell;

/// What to return when the target function cannot be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Fallback {
    /// Substitute a fixed value (zero by default).
    Substitute(f64),
    /// Return NaN; the search then reports a degenerate curvature.
    Propagate,
}

impl Default for Fallback {
    fn default() -> Self {
        Fallback::Substitute(0.0)
    }
}

impl Fallback {
    fn value(self) -> f64 {
        match self {
            Fallback::Substitute(v) => v,
            Fallback::Propagate => f64::NAN,
        }
    }
}

pub struct TargetFunction<F> {
    inner: F,
    fallback: Fallback,
    fallbacks: Cell<usize>,
}

impl<F: ScalarFunction<f64>> TargetFunction<F> {
    pub fn new(inner: F, fallback: Fallback) -> Self {
        Self {
            inner,
            fallback,
            fallbacks: Cell::new(0),
        }
    }

    /// Evaluates the wrapped function, substituting the fallback on a domain error.
    pub fn call(&self, x: f64) -> f64 {
        match self.inner.evaluate(x) {
            Ok(y) => y,
            Err(err) => self.substitute(x, &err),
        }
    }

    fn substitute(&self, x: f64, err: &DomainError) -> f64 {
        self.fallbacks.set(self.fallbacks.get() + 1);
        let value = self.fallback.value();
        tracing::debug!(x, %err, fallback = value, "domain error in target function");
        value
    }

    /// Number of evaluations that used the fallback so far.
    pub fn fallback_count(&self) -> usize {
        self.fallbacks.get()
    }

    pub fn fallback(&self) -> Fallback {
        self.fallback
    }

    pub fn into_inner(self) -> F {
        self.inner
    }
}
