//! Command line interface for inspecting saved traces.

use crate::console::{render_summary, render_trace, Verbosity};
use crate::serializers::load_trace_json;
use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "nodetracer", version, about = "Inspect causal execution traces")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect a trace JSON file
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Path to trace JSON file
    pub trace_file: PathBuf,

    /// Console render verbosity
    #[arg(long, value_enum, default_value_t = Verbosity::Standard)]
    pub verbosity: Verbosity,
}

/// Execute a parsed command, writing its report to `out`
pub fn run(cli: Cli, out: &mut impl Write) -> anyhow::Result<()> {
    match cli.command {
        Command::Inspect(args) => inspect(&args, out),
    }
}

fn inspect(args: &InspectArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let trace = load_trace_json(&args.trace_file)
        .with_context(|| format!("Failed to load trace {}", args.trace_file.display()))?;

    writeln!(out, "{}", render_summary(&trace))?;
    writeln!(out)?;
    writeln!(out, "{}", render_trace(&trace, args.verbosity))?;
    Ok(())
}
