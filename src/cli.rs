//! Command line interface built on clap.
//!
//! [`Cli`] carries the [`Command`] subcommands (run, templates, summary,
//! set-status, demo) and the global overrides for the config file.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use applyflow::governor::ApplicationStatus;

/// Record-once, replay-many automation for job applications.
#[derive(Debug, Parser)]
#[command(name = "applyflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Where templates and application records are stored.
    #[arg(long, global = true)]
    pub storage_dir: Option<PathBuf>,

    /// Daily cap on recorded applications.
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_per_day: Option<u32>,

    /// Debug-level logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Status accepted by `set-status`, mapped onto [`ApplicationStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Pending,
    InProgress,
    Submitted,
    Rejected,
    Interview,
    Offer,
    Withdrawn,
}

impl From<StatusArg> for ApplicationStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Pending => ApplicationStatus::Pending,
            StatusArg::InProgress => ApplicationStatus::InProgress,
            StatusArg::Submitted => ApplicationStatus::Submitted,
            StatusArg::Rejected => ApplicationStatus::Rejected,
            StatusArg::Interview => ApplicationStatus::Interview,
            StatusArg::Offer => ApplicationStatus::Offer,
            StatusArg::Withdrawn => ApplicationStatus::Withdrawn,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process the cases in a JSON file until done or interrupted.
    Run {
        /// JSON array of cases.
        #[arg(long)]
        cases: PathBuf,
    },

    /// List stored workflow templates.
    Templates,

    /// Print application and workflow statistics.
    Summary,

    /// Change the status of a recorded application.
    SetStatus {
        /// Application id.
        id: String,

        status: StatusArg,

        /// Note appended to the record.
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Record a workflow and replay it against sample cases in a scratch directory.
    Demo,
}
