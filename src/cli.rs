//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// orchestratord - multi-agent task orchestrator (Conductor/Executor/Router/Retrieval)
#[derive(Parser)]
#[command(
    name = "orchestratord",
    about = "Multi-agent task orchestrator: classification, durable execution, backend routing and retrieval",
    version,
    after_help = "Logs are written to stderr; set RUST_LOG to control verbosity."
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the Conductor HTTP listener, the Executor worker-pool loop and
    /// the stuck-task sweeper.
    Serve {
        /// Address to bind the HTTP listener to.
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },

    /// Print process health and subsystem status to stdout, equivalent to
    /// `GET /status` without a running server.
    Status {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Ask the board synthesizer a question outside of any Task, equivalent
    /// to `POST /api/board/consult`.
    BoardConsult {
        /// The question to put to the arbiter model.
        question: String,
    },

    /// Synchronize the experts table from a newline-delimited seed file
    /// (`{name, role, department}` per line, UPSERT semantics).
    Migrate {
        /// Path to the expert seed file.
        #[arg(long)]
        experts: PathBuf,
    },
}

/// Output format for status/metrics commands
#[derive(Clone, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
