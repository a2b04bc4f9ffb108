//! Delimited export of iteration histories and sweeps.

use gillstep_core::{IterationRecord, SearchResult};
use std::io::{self, Write};

pub const HISTORY_COLUMNS: [&str; 5] = [
    "iteration",
    "conditional_error",
    "step_size",
    "curvature",
    "optimal_step_size",
];

pub const SWEEP_COLUMNS: [&str; 6] = [
    "evaluation_point",
    "terminal_state",
    "iterations",
    "conditional_error",
    "curvature",
    "optimal_step_size",
];

fn write_row<W: Write>(out: &mut W, fields: &[String], delimiter: char) -> io::Result<()> {
    let mut sep = [0u8; 4];
    let sep = delimiter.encode_utf8(&mut sep);
    writeln!(out, "{}", fields.join(&*sep))
}

fn header(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

/// One row per probe: iteration, conditional error, step size, curvature, optimal step.
pub fn write_history<W: Write>(
    mut out: W,
    history: &[IterationRecord],
    delimiter: char,
) -> io::Result<()> {
    write_row(&mut out, &header(&HISTORY_COLUMNS), delimiter)?;
    for record in history {
        let fields = [
            record.iteration.to_string(),
            record.conditional_error.to_string(),
            record.step_size.to_string(),
            record.curvature.to_string(),
            record.optimal_step_size.to_string(),
        ];
        write_row(&mut out, &fields, delimiter)?;
    }
    out.flush()
}

/// One row per evaluation point of a sweep.
pub fn write_sweep<W: Write>(
    mut out: W,
    rows: &[(f64, SearchResult)],
    delimiter: char,
) -> io::Result<()> {
    write_row(&mut out, &header(&SWEEP_COLUMNS), delimiter)?;
    for (x, result) in rows {
        let fields = [
            x.to_string(),
            result.terminal_state.to_string(),
            result.iterations_used.to_string(),
            result.final_conditional_error.to_string(),
            result.curvature.to_string(),
            result.optimal_step_size.to_string(),
        ];
        write_row(&mut out, &fields, delimiter)?;
    }
    out.flush()
}
