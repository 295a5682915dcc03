//! The nbtester command-line interface.
//!
//! Thin orchestration over the library: load notebooks, run the plot-call
//! matcher, and walk directories of notebooks with a colored pass/fail
//! summary.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::Parser;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use walkdir::WalkDir;

use crate::cli::args::{Command, NbArgs};
use crate::loader::{CellSelection, Loader};
use crate::output::{StderrSink, StdoutSink};
use crate::plotmock::{matplotlib_test_with, MatchOutcome};
use crate::runtime::VariableScope;

pub mod args;

/// The main entry point for the CLI. Returns the process exit code.
pub fn run() -> i32 {
    let args = NbArgs::parse();
    let result = match args.command {
        Command::Run {
            file,
            execution_order,
        } => handle_run(&file, execution_order),
        Command::Calls { file } => handle_calls(&file),
        Command::Check { file, expect, conv } => handle_check(&file, &expect, &conv),
        Command::Suite { dir } => handle_suite(&dir),
    };
    match result {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{:?}", report);
            1
        }
    }
}

fn handle_run(file: &Path, execution_order: bool) -> Result<i32, miette::Report> {
    let mut loader = Loader::new();
    if execution_order {
        loader = loader.selection(CellSelection::ExecutionOrder);
    }
    let mut variables = VariableScope::new();
    loader
        .load(&mut variables, file)
        .map_err(miette::Report::new)?;
    for name in variables.sorted_names() {
        if let Some(value) = variables.get(name) {
            println!("{} = {}", name, value.repr());
        }
    }
    Ok(0)
}

fn handle_calls(file: &Path) -> Result<i32, miette::Report> {
    let target = file.to_string_lossy();
    let mut sink = StdoutSink;
    let outcome =
        matplotlib_test_with(&target, None, None, &mut sink).map_err(miette::Report::new)?;
    if outcome == MatchOutcome::NotPerformed {
        eprintln!("a matching run is already in progress; nothing was done");
        return Ok(1);
    }
    Ok(0)
}

fn handle_check(file: &Path, expect: &Path, conv: &[String]) -> Result<i32, miette::Report> {
    let expected = fs::read_to_string(expect)
        .map_err(|e| miette::Report::msg(format!("cannot read {}: {}", expect.display(), e)))?;
    let conv_pairs = parse_conv_pairs(conv)?;
    let target = file.to_string_lossy();
    let mut sink = StderrSink;
    let outcome = matplotlib_test_with(
        &target,
        Some(&expected),
        if conv_pairs.is_empty() {
            None
        } else {
            Some(&conv_pairs)
        },
        &mut sink,
    )
    .map_err(miette::Report::new)?;
    if outcome.is_satisfied() {
        println!("OK");
        Ok(0)
    } else {
        Ok(1)
    }
}

fn parse_conv_pairs(conv: &[String]) -> Result<Vec<(String, String)>, miette::Report> {
    conv.iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .ok_or_else(|| {
                    miette::Report::msg(format!("invalid conv pair '{}', expected FROM=TO", pair))
                })
        })
        .collect()
}

fn handle_suite(dir: &Path) -> Result<i32, miette::Report> {
    let mut notebooks: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry
            .map_err(|e| miette::Report::msg(format!("failed to walk directory: {}", e)))?;
        let path = entry.path();
        if path.extension().map(|ext| ext == "ipynb").unwrap_or(false) {
            notebooks.push(path.to_path_buf());
        }
    }
    // Deterministic execution order regardless of filesystem iteration.
    notebooks.sort();

    let mut stdout = StandardStream::stdout(ColorChoice::Auto);
    let mut failures = 0usize;
    for path in &notebooks {
        let mut variables = VariableScope::new();
        match Loader::new().load(&mut variables, path) {
            Ok(()) => {
                print_status(&mut stdout, "PASS", Color::Green);
                println!(" {} ({} bindings)", path.display(), variables.len());
            }
            Err(err) => {
                failures += 1;
                print_status(&mut stdout, "FAIL", Color::Red);
                println!(" {}", path.display());
                eprintln!("{:?}", miette::Report::new(err));
            }
        }
    }
    println!(
        "{} notebook(s), {} passed, {} failed",
        notebooks.len(),
        notebooks.len() - failures,
        failures
    );
    Ok(if failures == 0 { 0 } else { 1 })
}

fn print_status(stream: &mut StandardStream, label: &str, color: Color) {
    let mut spec = ColorSpec::new();
    spec.set_fg(Some(color)).set_bold(true);
    let _ = stream.set_color(&spec);
    let _ = write!(stream, "{}", label);
    let _ = stream.reset();
}
