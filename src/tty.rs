//! Command-line output: truth tables, expressions and clocked runs.

use std::io::Write;

use tracing::{info, warn};

use crate::analyze::{OutputExpressions, TruthTable};
use crate::circuit::Value;
use crate::components::Pin;
use crate::error::{GatesimError, Result};
use crate::sim::Propagator;

/// Label of the output pin that stops a clocked run when it goes high.
pub const HALT_LABEL: &str = "halt";

fn output_error(e: std::io::Error) -> GatesimError {
    GatesimError::OutputError {
        message: e.to_string(),
    }
}

/// Print a truth table, one row per input combination.
pub fn print_table(out: &mut impl Write, table: &TruthTable) -> Result<()> {
    write!(out, "{}", table).map_err(output_error)?;
    out.flush().map_err(output_error)
}

/// Print one `name = expression` line per output bit.
pub fn print_expressions(out: &mut impl Write, model: &OutputExpressions) -> Result<()> {
    for (name, expr) in &model.expressions {
        match expr {
            Some(e) => writeln!(out, "{} = {}", name, e),
            None => writeln!(out, "{} = ?", name),
        }
        .map_err(output_error)?;
    }
    out.flush().map_err(output_error)
}

/// How a clocked run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// All requested half cycles ran.
    Completed,
    /// The `halt` pin went high after this many half cycles.
    Halted(u32),
    /// The circuit did not settle after this many half cycles.
    Oscillating(u32),
}

/// Toggle clocks for `ticks` half cycles, printing the output pins after
/// each one. Stops early on oscillation or when the `halt` pin is high.
pub fn run_clocked(
    out: &mut impl Write,
    prop: &mut Propagator,
    labels: &[(Pin, String)],
    ticks: u32,
) -> Result<RunOutcome> {
    let outputs: Vec<&(Pin, String)> = labels.iter().filter(|(p, _)| !p.is_input()).collect();
    let header: Vec<&str> = outputs.iter().map(|(_, l)| l.as_str()).collect();
    writeln!(out, "tick {}", header.join(" ")).map_err(output_error)?;

    prop.propagate();
    for tick in 0..=ticks {
        if tick > 0 {
            if !prop.toggle_clocks() && tick == 1 {
                warn!("circuit has no clocks; outputs will not change");
            }
            prop.propagate();
        }
        if prop.is_oscillating() {
            writeln!(out, "{:>4} oscillation", tick).map_err(output_error)?;
            out.flush().map_err(output_error)?;
            warn!(tick, points = prop.oscillation_points().len(), "run stopped: oscillation");
            return Ok(RunOutcome::Oscillating(tick));
        }

        let values: Vec<Value> = outputs
            .iter()
            .map(|(p, _)| prop.pin_value(p.id).unwrap_or(Value::NIL))
            .collect();
        let cells: Vec<String> = values
            .iter()
            .zip(&header)
            .map(|(v, h)| format!("{:<w$}", v.to_string(), w = h.len()))
            .collect();
        writeln!(out, "{:>4} {}", tick, cells.join(" ").trim_end()).map_err(output_error)?;

        let halted = outputs
            .iter()
            .zip(&values)
            .any(|((_, l), v)| l.eq_ignore_ascii_case(HALT_LABEL) && *v == Value::TRUE);
        if halted {
            out.flush().map_err(output_error)?;
            info!(tick, "run stopped: halt pin high");
            return Ok(RunOutcome::Halted(tick));
        }
    }
    out.flush().map_err(output_error)?;
    Ok(RunOutcome::Completed)
}
