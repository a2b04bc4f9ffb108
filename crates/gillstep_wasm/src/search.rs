//! One-shot search entry points.

use crate::function::JsFunction;
use gillstep_core::difference::forward_difference;
use gillstep_core::equation_engine::{compile_function, CompiledFunction};
use gillstep_core::{search_step_size, Fallback, SearchConfig, TargetFunction};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

pub(crate) const VARIABLE: &str = "x";

/// Reads a `SearchConfig` from a JS object. `undefined`/`null` select the defaults;
/// missing fields fall back to their default values.
pub(crate) fn parse_config(config: JsValue) -> Result<SearchConfig, JsValue> {
    if config.is_undefined() || config.is_null() {
        return Ok(SearchConfig::default());
    }
    from_value(config).map_err(|e| JsValue::from_str(&format!("Invalid search config: {}", e)))
}

pub(crate) fn compile_expression(expression: &str) -> Result<CompiledFunction, JsValue> {
    compile_function(expression, VARIABLE)
        .map_err(|e| JsValue::from_str(&format!("Failed to compile '{}': {}", expression, e)))
}

pub(crate) fn serialize<T: serde::Serialize>(value: &T) -> Result<JsValue, JsValue> {
    to_value(value).map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
}

/// Searches the optimal forward-difference step for an expression in `x`.
#[wasm_bindgen]
pub fn search_expression(expression: &str, x: f64, config: JsValue) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let config = parse_config(config)?;
    let function = compile_expression(expression)?;
    let result = search_step_size(&function, x, &config)
        .map_err(|e| JsValue::from_str(&format!("Step-size search failed: {}", e)))?;
    serialize(&result)
}

/// Searches the optimal forward-difference step for a JS callback.
/// Exceptions thrown by the callback are replaced by the configured fallback.
#[wasm_bindgen]
pub fn search_function(
    func: &js_sys::Function,
    x: f64,
    config: JsValue,
) -> Result<JsValue, JsValue> {
    console_error_panic_hook::set_once();

    let config = parse_config(config)?;
    let function = JsFunction::new(func.clone());
    let result = search_step_size(function, x, &config)
        .map_err(|e| JsValue::from_str(&format!("Step-size search failed: {}", e)))?;
    serialize(&result)
}

/// Forward difference of an expression at `x` with step `h`, for checking a
/// returned step size against a known derivative.
#[wasm_bindgen]
pub fn forward_difference_expression(expression: &str, x: f64, h: f64) -> Result<f64, JsValue> {
    if h == 0.0 || !h.is_finite() {
        return Err(JsValue::from_str("Step size h must be non-zero and finite."));
    }
    let function = compile_expression(expression)?;
    let target = TargetFunction::new(function, Fallback::default());
    Ok(forward_difference(|t| target.call(t), x, h))
}
