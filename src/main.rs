//! Gatesim - Digital Logic Circuit Simulator
//!
//! Loads a netlist and either prints the truth table or the output
//! expressions of one circuit, or runs it against its clocks.
//!
//! # Usage
//!
//! ```bash
//! gatesim adder.gsn
//! gatesim adder.gsn --mode expr
//! gatesim counter.gsn --mode run --ticks 32 -vv
//! ```

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use gatesim_core::{
    analyze::{compute_expression, compute_table, pin_labels},
    circuit::validate_circuit,
    dsl,
    error::{GatesimError, Result},
    tty, Project, Propagator, SimContext, SimulatorConfig,
};
use tracing::Level;

/// What to do with the selected circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Print the truth table
    Table,
    /// Print one Boolean expression per output bit
    Expr,
    /// Toggle the clocks and print outputs after each half cycle
    Run,
}

/// Digital logic circuit simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the netlist file (.gsn)
    #[arg(value_name = "NETLIST")]
    netlist: PathBuf,

    /// Circuit to analyze (defaults to the main circuit)
    #[arg(short, long)]
    circuit: Option<String>,

    /// Output mode
    #[arg(short, long, value_enum, default_value_t = Mode::Table)]
    mode: Mode,

    /// Half clock cycles to run in `run` mode
    #[arg(long, default_value_t = 16)]
    ticks: u32,

    /// Propagation jitter; 0 disables it
    #[arg(long, default_value_t = 0)]
    jitter: u32,

    /// Seed for the jitter generator
    #[arg(long)]
    seed: Option<u64>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    // Parse and build every circuit in the file
    let ast = dsl::parse_file(&args.netlist)?;
    let ctx = SimContext::new()?;
    let project = Project::from_ast(&ast, &ctx)?;

    let circuit = match &args.circuit {
        Some(name) => Arc::clone(
            project
                .circuit(name)
                .ok_or_else(|| GatesimError::UnknownCircuit { name: name.clone() })?,
        ),
        None => Arc::clone(project.main_circuit()),
    };
    validate_circuit(&circuit)?;

    let labels = pin_labels(&circuit);
    let mut config = SimulatorConfig::new().with_jitter(args.jitter);
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match args.mode {
        Mode::Table => {
            let table = compute_table(&circuit, &labels, &config)?;
            tty::print_table(&mut out, &table)?;
        }
        Mode::Expr => {
            let model = compute_expression(&circuit, &labels)?;
            tty::print_expressions(&mut out, &model)?;
        }
        Mode::Run => {
            let mut prop = Propagator::with_config(circuit, config);
            tty::run_clocked(&mut out, &mut prop, &labels, args.ticks)?;
        }
    }

    Ok(())
}
