//! JavaScript callback adapter.

use gillstep_core::{DomainError, ScalarFunction};
use wasm_bindgen::{JsCast, JsValue};

/// A JS function `(x: number) => number` used as a search target.
pub struct JsFunction {
    func: js_sys::Function,
}

impl JsFunction {
    pub fn new(func: js_sys::Function) -> Self {
        Self { func }
    }
}

impl ScalarFunction<f64> for JsFunction {
    fn evaluate(&self, x: f64) -> Result<f64, DomainError> {
        let value = self
            .func
            .call1(&JsValue::NULL, &JsValue::from_f64(x))
            .map_err(|err| DomainError::Evaluation(describe_js_error(&err)))?;
        let y = value
            .as_f64()
            .ok_or_else(|| DomainError::Evaluation("callback did not return a number".to_string()))?;
        if y.is_finite() {
            Ok(y)
        } else {
            Err(DomainError::NonFinite(y))
        }
    }
}

fn describe_js_error(err: &JsValue) -> String {
    err.as_string()
        .or_else(|| {
            err.dyn_ref::<js_sys::Error>()
                .map(|e| String::from(e.message()))
        })
        .unwrap_or_else(|| "callback threw".to_string())
}
