//! Search configuration assembled from defaults, an optional JSON file and flags.

use anyhow::{Context, Result};
use clap::Args;
use gillstep_core::{Fallback, SearchConfig};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Args)]
pub struct SearchArgs {
    /// JSON file with search settings; explicit flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Error bound on function values (default: machine precision).
    #[arg(long)]
    pub error_bound: Option<f64>,

    /// Lower conditional-error threshold (default: 0.001).
    #[arg(long)]
    pub lower: Option<f64>,

    /// Upper conditional-error threshold (default: 0.1).
    #[arg(long)]
    pub upper: Option<f64>,

    /// Maximum rescaling iterations (default: 50).
    #[arg(long)]
    pub max_iters: Option<usize>,

    /// Value substituted when the function cannot be evaluated (default: 0).
    #[arg(long, allow_hyphen_values = true)]
    pub fallback: Option<f64>,

    /// Report domain errors as a degenerate search instead of substituting a value.
    #[arg(long, conflicts_with = "fallback")]
    pub propagate_domain_errors: bool,
}

impl SearchArgs {
    pub fn resolve(&self) -> Result<SearchConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SearchConfig::default(),
        };

        if let Some(error_bound) = self.error_bound {
            config.error_bound = error_bound;
        }
        if let Some(lower) = self.lower {
            config.lower_threshold = lower;
        }
        if let Some(upper) = self.upper {
            config.upper_threshold = upper;
        }
        if let Some(max_iters) = self.max_iters {
            config.max_iterations = max_iters;
        }
        if let Some(value) = self.fallback {
            config.fallback = Fallback::Substitute(value);
        }
        if self.propagate_domain_errors {
            config.fallback = Fallback::Propagate;
        }

        config.validate().context("Invalid search configuration")?;
        Ok(config)
    }
}

fn load_config(path: &PathBuf) -> Result<SearchConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    tracing::debug!(path = %path.display(), ?config, "loaded search config");
    Ok(config)
}
