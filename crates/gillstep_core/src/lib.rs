pub mod adapter;
pub mod difference;
pub mod equation_engine;
pub mod error;
pub mod metrics;
pub mod step_size;
/// The `gillstep_core` crate computes forward-difference step sizes with Gill's
/// adaptive heuristic (Gill, Murray & Wright).
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `ScalarFunction` (fallible single-variable functions).
/// - **Difference**: forward and central second-order difference kernels.
/// - **Metrics**: conditional error, optimal step size, initial step, relative error, machine precision.
/// - **Step size**: the search loop (`search_step_size`, `StepSizeSearch`) with an explicit terminal state.
/// - **Adapter**: `TargetFunction`, which replaces domain errors with a configurable fallback.
/// - **Equation Engine**: a small bytecode VM for user-supplied expressions such as `exp(x)/x`.
pub mod traits;

pub use adapter::{Fallback, TargetFunction};
pub use error::{DomainError, EquationError, StepSizeError};
pub use metrics::machine_precision;
pub use step_size::{
    search_step_size, search_step_sizes, IterationRecord, SearchConfig, SearchPhase, SearchResult,
    SearchState, StepSizeSearch, TerminalState,
};
pub use traits::{CheckedFn, PlainFn, Scalar, ScalarFunction};
