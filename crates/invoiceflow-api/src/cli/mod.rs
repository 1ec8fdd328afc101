//! CLI command definitions for the `invflow` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod review;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run invoices through the approval workflow and manage human review.
#[derive(Parser)]
#[command(name = "invflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for info, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Workflow document (JSON or YAML). Defaults to `workflow_path` from
    /// config.toml, then the built-in invoice workflow.
    #[arg(long, global = true, env = "INVOICEFLOW_WORKFLOW")]
    pub workflow: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run an invoice through the workflow until it completes or pauses.
    Run {
        /// Path to the invoice JSON payload.
        invoice: PathBuf,

        /// Preferred tool for a pool, as POOL=TOOL. Repeatable.
        #[arg(long = "prefer", value_name = "POOL=TOOL")]
        prefer: Vec<String>,
    },

    /// Resume a paused run after its checkpoint has been decided.
    Resume {
        /// Checkpoint id printed by `invflow run`.
        checkpoint_id: String,

        /// Preferred tool for a pool, as POOL=TOOL. Repeatable.
        #[arg(long = "prefer", value_name = "POOL=TOOL")]
        prefer: Vec<String>,
    },

    /// Inspect and decide human review checkpoints.
    Review {
        #[command(subcommand)]
        action: review::ReviewCommand,
    },

    /// Start the review HTTP API.
    Serve {
        /// Port to listen on (default from config.toml, else 8000).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (default from config.toml, else 127.0.0.1).
        #[arg(long)]
        host: Option<String>,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
