//! gillstep CLI: forward finite-difference step-size optimization with Gill's method.

mod config;
mod export;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use config::SearchArgs;
use gillstep_core::difference::forward_difference;
use gillstep_core::equation_engine::{compile_function, CompiledFunction};
use gillstep_core::metrics::relative_error;
use gillstep_core::{
    search_step_size, search_step_sizes, SearchConfig, SearchResult, TargetFunction,
    TerminalState,
};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "gillstep")]
#[command(about = "Optimize the forward finite difference (FFD) step size using Gill's method")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find the optimal step size at one evaluation point.
    Optimize(OptimizeArgs),

    /// Find optimal step sizes at evenly spaced points.
    Sweep(SweepArgs),
}

#[derive(Debug, Clone, Args)]
struct FunctionArgs {
    /// Single-variable function, e.g. "exp(x)/sqrt(sin(x)^3 + cos(x)^3)".
    #[arg(long)]
    func: String,

    /// Name of the independent variable in --func.
    #[arg(long, default_value = "x")]
    variable: String,
}

#[derive(Debug, Clone, Args)]
struct OptimizeArgs {
    #[command(flatten)]
    function: FunctionArgs,

    /// The evaluation point for the FFD approximation.
    #[arg(long, allow_hyphen_values = true)]
    evaluation_point: f64,

    #[command(flatten)]
    search: SearchArgs,

    /// Path to write the per-iteration history as delimited text.
    #[arg(long)]
    history: Option<PathBuf>,

    /// Field delimiter for --history.
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Known derivative at the evaluation point; reports the FFD relative error.
    #[arg(long, allow_hyphen_values = true)]
    reference_derivative: Option<f64>,

    /// Print the full result as JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Args)]
struct SweepArgs {
    #[command(flatten)]
    function: FunctionArgs,

    /// First evaluation point.
    #[arg(long, allow_hyphen_values = true)]
    start: f64,

    /// Last evaluation point.
    #[arg(long, allow_hyphen_values = true)]
    end: f64,

    /// Number of evenly spaced points, endpoints included.
    #[arg(long, default_value = "11")]
    points: usize,

    #[command(flatten)]
    search: SearchArgs,

    /// Path to write the sweep table (stdout when omitted).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Field delimiter for the sweep table.
    #[arg(long, default_value_t = ',')]
    delimiter: char,
}

/// Forward difference at the optimal step compared against a known derivative.
#[derive(Debug, Clone, Serialize)]
struct DerivativeCheck {
    reference: f64,
    forward_difference: f64,
    relative_error: f64,
}

impl DerivativeCheck {
    fn new(
        function: &CompiledFunction,
        x: f64,
        config: &SearchConfig,
        result: &SearchResult,
        reference: f64,
    ) -> Option<Self> {
        let h = result.step_size()?;
        let target = TargetFunction::new(function, config.fallback);
        let estimate = forward_difference(|t| target.call(t), x, h);
        Some(Self {
            reference,
            forward_difference: estimate,
            relative_error: relative_error(estimate, reference),
        })
    }
}

#[derive(Serialize)]
struct OptimizeReport<'a> {
    function: &'a str,
    evaluation_point: f64,
    config: &'a SearchConfig,
    result: &'a SearchResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    derivative_check: Option<DerivativeCheck>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Optimize(args) => run_optimize(&args),
        Commands::Sweep(args) => run_sweep(&args),
    }
}

fn compile(function: &FunctionArgs) -> Result<CompiledFunction> {
    compile_function(&function.func, &function.variable)
        .with_context(|| format!("Failed to compile function '{}'", function.func))
}

// --- Optimize ---

fn run_optimize(args: &OptimizeArgs) -> Result<()> {
    let config = args.search.resolve()?;
    let function = compile(&args.function)?;
    let x = args.evaluation_point;

    tracing::info!("Optimizing step size for {} at {} = {}", function.source, args.function.variable, x);

    let result = search_step_size(&function, x, &config)?;
    log_terminal_state(&result);

    if let Some(path) = &args.history {
        let file = create_output(path)?;
        export::write_history(file, &result.history, args.delimiter)
            .with_context(|| format!("Failed to write history {}", path.display()))?;
        tracing::info!("History written to {}", path.display());
    }

    let derivative_check = args
        .reference_derivative
        .and_then(|reference| DerivativeCheck::new(&function, x, &config, &result, reference));
    if args.reference_derivative.is_some() && derivative_check.is_none() {
        tracing::warn!("Skipping derivative check: no step size available");
    }

    if args.json {
        let report = OptimizeReport {
            function: &function.source,
            evaluation_point: x,
            config: &config,
            result: &result,
            derivative_check,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&result, derivative_check.as_ref());
    }

    Ok(())
}

fn print_summary(result: &SearchResult, check: Option<&DerivativeCheck>) {
    println!("iteration: {}", result.iterations_used);
    println!("terminal state: {}", result.terminal_state);
    println!("conditional error: {}", result.final_conditional_error);
    println!("curvature (phi): {}", result.curvature);
    println!("optimized step size: {}", result.optimal_step_size);
    if result.fallback_evaluations > 0 {
        println!("fallback evaluations: {}", result.fallback_evaluations);
    }
    if let Some(check) = check {
        println!("forward difference: {}", check.forward_difference);
        println!("reference derivative: {}", check.reference);
        println!("relative error: {}", check.relative_error);
    }
}

fn log_terminal_state(result: &SearchResult) {
    match result.terminal_state {
        TerminalState::Converged => tracing::info!(
            "Converged after {} iteration(s)",
            result.iterations_used
        ),
        TerminalState::Exhausted => tracing::warn!(
            "Iteration cap reached after {} iteration(s); conditional error {} is outside the target band",
            result.iterations_used,
            result.final_conditional_error
        ),
        TerminalState::Degenerate => tracing::warn!(
            "Degenerate curvature estimate (phi = {}); the step size cannot be trusted",
            result.curvature
        ),
    }
}

// --- Sweep ---

fn sweep_points(start: f64, end: f64, points: usize) -> Result<Vec<f64>> {
    if !start.is_finite() || !end.is_finite() {
        bail!("Sweep bounds must be finite.");
    }
    if points == 0 {
        bail!("points must be at least 1.");
    }
    if points == 1 {
        return Ok(vec![start]);
    }
    let step = (end - start) / (points - 1) as f64;
    Ok((0..points)
        .map(|i| {
            if i == points - 1 {
                end
            } else {
                start + step * i as f64
            }
        })
        .collect())
}

fn run_sweep(args: &SweepArgs) -> Result<()> {
    let config = args.search.resolve()?;
    let function = compile(&args.function)?;
    let points = sweep_points(args.start, args.end, args.points)?;

    tracing::info!(
        "Sweeping {} point(s) of {} over [{}, {}]",
        points.len(),
        function.source,
        args.start,
        args.end
    );

    let mut rows = Vec::with_capacity(points.len());
    for (x, result) in points.iter().zip(search_step_sizes(&function, &points, &config)) {
        rows.push((*x, result?));
    }

    let count = |state: TerminalState| rows.iter().filter(|(_, r)| r.terminal_state == state).count();
    tracing::info!(
        "Converged: {}, exhausted: {}, degenerate: {}",
        count(TerminalState::Converged),
        count(TerminalState::Exhausted),
        count(TerminalState::Degenerate)
    );

    match &args.out {
        Some(path) => {
            let file = create_output(path)?;
            export::write_sweep(file, &rows, args.delimiter)
                .with_context(|| format!("Failed to write sweep {}", path.display()))?;
            tracing::info!("Sweep written to {}", path.display());
        }
        None => export::write_sweep(io::stdout().lock(), &rows, args.delimiter)?,
    }

    Ok(())
}

fn create_output(path: &Path) -> Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gillstep_core::Fallback;

    #[test]
    fn parses_optimize_with_negative_point() {
        let cli = Cli::try_parse_from([
            "gillstep",
            "optimize",
            "--func",
            "exp(x)",
            "--evaluation-point",
            "-1.5",
            "--lower",
            "0.001",
            "--upper",
            "0.1",
            "--fallback",
            "-2",
        ])
        .expect("arguments should parse");

        match cli.command {
            Commands::Optimize(args) => {
                assert_eq!(args.function.func, "exp(x)");
                assert_eq!(args.function.variable, "x");
                assert_eq!(args.evaluation_point, -1.5);
                assert_eq!(args.delimiter, ',');
                assert!(!args.json);
                let config = args.search.resolve().unwrap();
                assert_eq!(config.fallback, Fallback::Substitute(-2.0));
            }
            Commands::Sweep(_) => panic!("expected optimize"),
        }
    }

    #[test]
    fn fallback_conflicts_with_propagation() {
        let result = Cli::try_parse_from([
            "gillstep",
            "optimize",
            "--func",
            "1/x",
            "--evaluation-point",
            "0",
            "--fallback",
            "0",
            "--propagate-domain-errors",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn optimize_requires_function() {
        let result = Cli::try_parse_from(["gillstep", "optimize", "--evaluation-point", "1"]);
        assert!(result.is_err());
    }

    #[test]
    fn sweep_points_include_endpoints() {
        let points = sweep_points(-1.0, 1.0, 5).unwrap();
        assert_eq!(points, vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
        assert_eq!(sweep_points(2.0, 3.0, 1).unwrap(), vec![2.0]);
        assert!(sweep_points(0.0, 1.0, 0).is_err());
        assert!(sweep_points(0.0, f64::NAN, 3).is_err());
    }

    #[test]
    fn derivative_check_uses_optimal_step() {
        let function = compile(&FunctionArgs {
            func: "exp(x)".to_string(),
            variable: "x".to_string(),
        })
        .unwrap();
        let config = SearchConfig::default();
        let result = search_step_size(&function, 1.0, &config).unwrap();
        let check = DerivativeCheck::new(&function, 1.0, &config, &result, 1.0_f64.exp())
            .expect("step size available");
        assert!(check.relative_error < 1e-6, "got {}", check.relative_error);
    }

    #[test]
    fn derivative_check_is_skipped_for_degenerate_search() {
        let function = compile(&FunctionArgs {
            func: "1/x".to_string(),
            variable: "x".to_string(),
        })
        .unwrap();
        let config = SearchConfig::default();
        let result = search_step_size(&function, 0.0, &config).unwrap();
        assert_eq!(result.terminal_state, TerminalState::Degenerate);
        assert!(DerivativeCheck::new(&function, 0.0, &config, &result, 1.0).is_none());
    }

    #[test]
    fn compile_error_names_the_function() {
        let err = compile(&FunctionArgs {
            func: "x + y".to_string(),
            variable: "x".to_string(),
        })
        .expect_err("unknown symbol");
        let message = format!("{err:#}");
        assert!(message.contains("x + y"));
        assert!(message.contains("unknown variable"));
    }
}
