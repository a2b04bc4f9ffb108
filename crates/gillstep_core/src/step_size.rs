//! Gill/Murray/Wright adaptive step-size search.
//!
//! The search estimates curvature with a central second difference at a trial
//! step, measures the conditional error of the eventual forward difference, and
//! rescales the trial step until that error falls inside a target band. Rescaling
//! always starts from the initial trial step (`hs0 * 10` or `hs0 / 10`), so the
//! trial steps form a fixed three-rung ladder rather than a compounding sequence.

use crate::adapter::{Fallback, TargetFunction};
use crate::difference::central_difference;
use crate::error::StepSizeError;
use crate::metrics::{conditional_error, initial_step_size, machine_precision, optimal_step_size};
use crate::traits::ScalarFunction;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ITERATIONS: usize = 50;
pub const DEFAULT_LOWER_THRESHOLD: f64 = 0.001;
pub const DEFAULT_UPPER_THRESHOLD: f64 = 0.1;
/// Factor applied to the initial trial step when the conditional error is out of band.
pub const RESCALE_FACTOR: f64 = 10.0;

/// Settings for one step-size search. Immutable while the search runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Relative accuracy of function values; machine epsilon unless the function is noisier.
    pub error_bound: f64,
    pub lower_threshold: f64,
    pub upper_threshold: f64,
    pub max_iterations: usize,
    pub fallback: Fallback,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            error_bound: machine_precision(),
            lower_threshold: DEFAULT_LOWER_THRESHOLD,
            upper_threshold: DEFAULT_UPPER_THRESHOLD,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            fallback: Fallback::default(),
        }
    }
}

impl SearchConfig {
    pub fn new(lower_threshold: f64, upper_threshold: f64) -> Self {
        Self {
            lower_threshold,
            upper_threshold,
            ..Self::default()
        }
    }

    pub fn with_error_bound(mut self, error_bound: f64) -> Self {
        self.error_bound = error_bound;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_fallback(mut self, fallback: Fallback) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn validate(&self) -> Result<(), StepSizeError> {
        if !(self.error_bound.is_finite() && self.error_bound > 0.0) {
            return Err(StepSizeError::NonPositiveErrorBound(self.error_bound));
        }
        let lower = self.lower_threshold;
        let upper = self.upper_threshold;
        if !(lower.is_finite() && upper.is_finite() && lower > 0.0 && lower < upper) {
            return Err(StepSizeError::InvalidThresholds { lower, upper });
        }
        if self.max_iterations == 0 {
            return Err(StepSizeError::ZeroIterations);
        }
        Ok(())
    }

    /// Whether a conditional error lies inside `[lower_threshold, upper_threshold]`.
    pub fn accepts(&self, conditional_error: f64) -> bool {
        conditional_error >= self.lower_threshold && conditional_error <= self.upper_threshold
    }
}

/// How a search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    /// The conditional error entered the target band.
    Converged,
    /// The iteration cap was reached first; the step size is the best available estimate.
    Exhausted,
    /// Curvature was zero or a metric went non-finite; no step size is reported.
    Degenerate,
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TerminalState::Converged => "converged",
            TerminalState::Exhausted => "exhausted",
            TerminalState::Degenerate => "degenerate",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "terminal_state", rename_all = "snake_case")]
pub enum SearchPhase {
    Initializing,
    Searching,
    Finished(TerminalState),
}

/// Mutable state of a running search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchState {
    pub evaluation_point: f64,
    pub step_size: f64,
    /// Central second difference (phi) at `step_size`.
    pub curvature: f64,
    pub conditional_error: f64,
    pub iteration_count: usize,
    pub phase: SearchPhase,
}

/// One probe of the search. Iteration 0 is the initial estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub step_size: f64,
    pub curvature: f64,
    pub conditional_error: f64,
    pub optimal_step_size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Forward-difference step; NaN when the search is degenerate.
    pub optimal_step_size: f64,
    pub final_conditional_error: f64,
    pub curvature: f64,
    pub initial_step_size: f64,
    pub final_step_size: f64,
    pub iterations_used: usize,
    pub terminal_state: TerminalState,
    /// Target evaluations that were replaced by the fallback value.
    pub fallback_evaluations: usize,
    pub history: Vec<IterationRecord>,
}

impl SearchResult {
    pub fn converged(&self) -> bool {
        self.terminal_state == TerminalState::Converged
    }

    /// The step size, unless the search was degenerate.
    pub fn step_size(&self) -> Option<f64> {
        match self.terminal_state {
            TerminalState::Degenerate => None,
            _ => Some(self.optimal_step_size),
        }
    }
}

/// Incremental step-size search. Each [`step`](Self::step) performs one rescaling
/// iteration; [`run`](Self::run) drives it to a terminal state.
pub struct StepSizeSearch<F> {
    target: TargetFunction<F>,
    config: SearchConfig,
    initial_step_size: f64,
    state: SearchState,
    history: Vec<IterationRecord>,
}

impl<F: ScalarFunction<f64>> StepSizeSearch<F> {
    pub fn new(f: F, x: f64, config: SearchConfig) -> Result<Self, StepSizeError> {
        config.validate()?;
        if !x.is_finite() {
            return Err(StepSizeError::NonFiniteEvaluationPoint(x));
        }

        let target = TargetFunction::new(f, config.fallback);
        let fx = target.call(x);
        let hs0 = initial_step_size(x, fx, config.error_bound);
        tracing::debug!(
            x,
            fx,
            initial_step_size = hs0,
            lower = config.lower_threshold,
            upper = config.upper_threshold,
            "starting step-size search"
        );

        let mut search = Self {
            target,
            config,
            initial_step_size: hs0,
            state: SearchState {
                evaluation_point: x,
                step_size: hs0,
                curvature: f64::NAN,
                conditional_error: f64::NAN,
                iteration_count: 0,
                phase: SearchPhase::Initializing,
            },
            history: Vec::new(),
        };
        search.probe(hs0);
        search.state.phase = SearchPhase::Searching;
        search.settle();
        Ok(search)
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn history(&self) -> &[IterationRecord] {
        &self.history
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state.phase, SearchPhase::Finished(_))
    }

    /// Performs one rescaling iteration. No-op once the search has finished.
    pub fn step(&mut self) -> SearchPhase {
        if self.is_done() {
            return self.state.phase;
        }

        let hs = if self.state.conditional_error > self.config.upper_threshold {
            self.initial_step_size * RESCALE_FACTOR
        } else {
            self.initial_step_size / RESCALE_FACTOR
        };
        self.state.iteration_count += 1;
        self.probe(hs);
        self.settle();
        self.state.phase
    }

    /// Performs up to `batch_size` iterations.
    pub fn run_steps(&mut self, batch_size: usize) -> SearchPhase {
        for _ in 0..batch_size {
            if self.is_done() {
                break;
            }
            self.step();
        }
        self.state.phase
    }

    /// Runs to a terminal state and returns the result.
    pub fn run(&mut self) -> SearchResult {
        while !self.is_done() {
            self.step();
        }
        self.build_result()
    }

    /// The result, once the search has finished.
    pub fn result(&self) -> Option<SearchResult> {
        if self.is_done() {
            Some(self.build_result())
        } else {
            None
        }
    }

    fn probe(&mut self, hs: f64) {
        let x = self.state.evaluation_point;
        let eps = self.config.error_bound;
        let phi = central_difference(|t| self.target.call(t), x, hs);
        let ce = conditional_error(eps, hs, phi);

        self.state.step_size = hs;
        self.state.curvature = phi;
        self.state.conditional_error = ce;
        self.history.push(IterationRecord {
            iteration: self.state.iteration_count,
            step_size: hs,
            curvature: phi,
            conditional_error: ce,
            optimal_step_size: optimal_step_size(eps, phi),
        });
        tracing::trace!(
            iteration = self.state.iteration_count,
            step_size = hs,
            curvature = phi,
            conditional_error = ce,
            "probed trial step"
        );
    }

    fn settle(&mut self) {
        let terminal = if self.is_degenerate() {
            Some(TerminalState::Degenerate)
        } else if self.config.accepts(self.state.conditional_error) {
            Some(TerminalState::Converged)
        } else if self.state.iteration_count >= self.config.max_iterations {
            Some(TerminalState::Exhausted)
        } else {
            None
        };

        if let Some(terminal) = terminal {
            self.state.phase = SearchPhase::Finished(terminal);
            self.log_terminal(terminal);
        }
    }

    fn is_degenerate(&self) -> bool {
        let s = &self.state;
        let step = optimal_step_size(self.config.error_bound, s.curvature);
        !(s.step_size.is_finite() && s.step_size > 0.0)
            || !s.curvature.is_finite()
            || s.curvature == 0.0
            || !s.conditional_error.is_finite()
            || !(step.is_finite() && step > 0.0)
    }

    fn log_terminal(&self, terminal: TerminalState) {
        let s = &self.state;
        match terminal {
            TerminalState::Converged => tracing::debug!(
                iterations = s.iteration_count,
                conditional_error = s.conditional_error,
                "step-size search converged"
            ),
            TerminalState::Exhausted => tracing::warn!(
                iterations = s.iteration_count,
                conditional_error = s.conditional_error,
                lower = self.config.lower_threshold,
                upper = self.config.upper_threshold,
                "step-size search hit the iteration cap without converging"
            ),
            TerminalState::Degenerate => tracing::warn!(
                x = s.evaluation_point,
                step_size = s.step_size,
                curvature = s.curvature,
                conditional_error = s.conditional_error,
                "degenerate curvature estimate; no step size available"
            ),
        }
    }

    fn build_result(&self) -> SearchResult {
        let terminal_state = match self.state.phase {
            SearchPhase::Finished(terminal) => terminal,
            _ => TerminalState::Exhausted,
        };
        let optimal = match terminal_state {
            TerminalState::Degenerate => f64::NAN,
            _ => optimal_step_size(self.config.error_bound, self.state.curvature),
        };
        SearchResult {
            optimal_step_size: optimal,
            final_conditional_error: self.state.conditional_error,
            curvature: self.state.curvature,
            initial_step_size: self.initial_step_size,
            final_step_size: self.state.step_size,
            iterations_used: self.state.iteration_count,
            terminal_state,
            fallback_evaluations: self.target.fallback_count(),
            history: self.history.clone(),
        }
    }
}

/// Finds the optimal forward-difference step size for `f` at `x`.
///
/// # Errors
/// * `StepSizeError` if the configuration or the evaluation point is invalid.
///
/// Non-convergence and degenerate curvature are not errors; they are reported
/// through [`SearchResult::terminal_state`].
pub fn search_step_size<F: ScalarFunction<f64>>(
    f: F,
    x: f64,
    config: &SearchConfig,
) -> Result<SearchResult, StepSizeError> {
    let mut search = StepSizeSearch::new(f, x, *config)?;
    Ok(search.run())
}

/// Runs an independent search at each point.
pub fn search_step_sizes<F: ScalarFunction<f64>>(
    f: &F,
    points: &[f64],
    config: &SearchConfig,
) -> Vec<Result<SearchResult, StepSizeError>> {
    points
        .iter()
        .map(|&x| search_step_size(f, x, config))
        .collect()
}
