//! Stepped step-size search runner.

use crate::search::{compile_expression, parse_config, serialize};
use gillstep_core::equation_engine::CompiledFunction;
use gillstep_core::{SearchConfig, SearchPhase, StepSizeSearch, TerminalState};
use serde::Serialize;
use wasm_bindgen::prelude::*;

/// Progress payload for the stepped search.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct StepSizeSearchProgress {
    done: bool,
    iterations: usize,
    max_iterations: usize,
    step_size: f64,
    conditional_error: f64,
    terminal_state: Option<TerminalState>,
}

struct StepSizeRunnerState {
    search: StepSizeSearch<CompiledFunction>,
}

impl StepSizeRunnerState {
    fn new(function: CompiledFunction, x: f64, config: SearchConfig) -> anyhow::Result<Self> {
        let search = StepSizeSearch::new(function, x, config)?;
        Ok(Self { search })
    }

    fn advance(&mut self, batch_size: usize) -> StepSizeSearchProgress {
        self.search.run_steps(batch_size);
        self.progress()
    }

    fn progress(&self) -> StepSizeSearchProgress {
        let state = self.search.state();
        let terminal_state = match state.phase {
            SearchPhase::Finished(terminal) => Some(terminal),
            _ => None,
        };
        StepSizeSearchProgress {
            done: terminal_state.is_some(),
            iterations: state.iteration_count,
            max_iterations: self.search.config().max_iterations,
            step_size: state.step_size,
            conditional_error: state.conditional_error,
            terminal_state,
        }
    }
}

#[wasm_bindgen]
pub struct WasmStepSizeRunner {
    state: Option<StepSizeRunnerState>,
}

#[wasm_bindgen]
impl WasmStepSizeRunner {
    #[wasm_bindgen(constructor)]
    pub fn new(expression: &str, x: f64, config: JsValue) -> Result<WasmStepSizeRunner, JsValue> {
        console_error_panic_hook::set_once();

        let config = parse_config(config)?;
        let function = compile_expression(expression)?;
        let state = StepSizeRunnerState::new(function, x, config)
            .map_err(|e| JsValue::from_str(&format!("Step-size search failed: {}", e)))?;

        Ok(WasmStepSizeRunner { state: Some(state) })
    }

    pub fn is_done(&self) -> bool {
        self.state
            .as_ref()
            .map_or(true, |state| state.search.is_done())
    }

    pub fn run_steps(&mut self, batch_size: u32) -> Result<JsValue, JsValue> {
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;

        let progress = state.advance(batch_size as usize);
        serialize(&progress)
    }

    pub fn get_progress(&self) -> Result<JsValue, JsValue> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;

        serialize(&state.progress())
    }

    pub fn get_result(&self) -> Result<JsValue, JsValue> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| JsValue::from_str("Runner not initialized"))?;

        let result = state
            .search
            .result()
            .ok_or_else(|| JsValue::from_str("Step-size search has not finished yet."))?;
        serialize(&result)
    }
}


#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use gillstep_core::SearchResult;
    use serde_wasm_bindgen::from_value;
    use wasm_bindgen_test::wasm_bindgen_test;

    #[wasm_bindgen_test]
    fn runner_result_is_unavailable_before_finishing() {
        let config = serde_wasm_bindgen::to_value(&SearchConfig::new(10.0, 20.0)).expect("config");
        let runner = WasmStepSizeRunner::new("x^2", 0.0, config).expect("runner");
        assert!(!runner.is_done());
        let message = runner
            .get_result()
            .err()
            .and_then(|err| err.as_string())
            .unwrap_or_default();
        assert!(message.contains("not finished"));
    }

    #[wasm_bindgen_test]
    fn runner_result_round_trips() {
        let mut runner = WasmStepSizeRunner::new("exp(x)", 1.0, JsValue::UNDEFINED).expect("runner");
        while !runner.is_done() {
            runner.run_steps(1).expect("step");
        }
        let result: SearchResult = from_value(runner.get_result().expect("result")).expect("decode");
        assert!(result.converged());
    }
}
