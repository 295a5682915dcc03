//! Command-line arguments for the nbtester CLI.
//!
//! Uses `clap` with its derive feature for a declarative, type-safe argument
//! structure.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "nbtester",
    version,
    about = "Test utilities for Jupyter-style notebook documents."
)]
pub struct NbArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Load every code cell of a notebook and print the resulting bindings.
    Run {
        /// The notebook document to load.
        #[arg(required = true)]
        file: PathBuf,
        /// Replay cells in recorded execution order instead of document order.
        #[arg(long)]
        execution_order: bool,
    },
    /// Run a notebook with plotting calls intercepted and print each distinct
    /// call observed.
    Calls {
        /// The notebook document to inspect.
        #[arg(required = true)]
        file: PathBuf,
    },
    /// Match recorded plotting calls against an expectation file.
    Check {
        /// The notebook document to run.
        #[arg(required = true)]
        file: PathBuf,
        /// File of expected calls, one per line.
        #[arg(long)]
        expect: PathBuf,
        /// Token rewrites applied to reported expectations, as FROM=TO pairs.
        #[arg(long = "conv", value_name = "FROM=TO")]
        conv: Vec<String>,
    },
    /// Discover every notebook under a directory, load each, and report
    /// pass/fail.
    Suite {
        /// Directory to scan for .ipynb files.
        #[arg(required = true)]
        dir: PathBuf,
    },
}
