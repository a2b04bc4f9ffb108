//! Error types shared across the core.

use thiserror::Error;

/// Failure to evaluate the target function at a probed point.
///
/// These never reach the search loop: the target-function adapter replaces them
/// with the configured fallback value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid argument {value} to {function}")]
    InvalidArgument { function: &'static str, value: f64 },
    #[error("function produced a non-finite value ({0})")]
    NonFinite(f64),
    #[error("function evaluation failed: {0}")]
    Evaluation(String),
}

/// Rejected search configuration. Raised before any function evaluation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepSizeError {
    #[error("error bound must be positive and finite, got {0}")]
    NonPositiveErrorBound(f64),
    #[error(
        "conditional error thresholds must satisfy 0 < lower < upper, got lower = {lower}, upper = {upper}"
    )]
    InvalidThresholds { lower: f64, upper: f64 },
    #[error("max_iterations must be greater than zero")]
    ZeroIterations,
    #[error("evaluation point must be finite, got {0}")]
    NonFiniteEvaluationPoint(f64),
}

/// Failure to parse or compile an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EquationError {
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("expected ')'")]
    MissingParen,
    #[error("unknown variable or constant: {0}")]
    UnknownSymbol(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("invalid number literal: {0}")]
    InvalidNumber(String),
    #[error("unrecognized character '{0}'")]
    InvalidCharacter(char),
    #[error("trailing input after expression: '{0}'")]
    TrailingInput(String),
}
