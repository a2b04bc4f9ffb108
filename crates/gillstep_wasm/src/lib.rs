//! WASM bindings for the gillstep core.
//!
//! Expressions are compiled with the core equation engine; JavaScript callbacks are
//! wrapped so that thrown exceptions count as domain errors.

mod function;
mod runner;
mod search;

pub use function::JsFunction;
pub use runner::WasmStepSizeRunner;
pub use search::{forward_difference_expression, search_expression, search_function};
