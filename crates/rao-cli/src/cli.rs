use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Set the logging level (defaults to the parameter file's [logging] level, then info)
    #[arg(long, global = true)]
    pub log_level: Option<tracing::Level>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Optimize remedial actions for a scenario
    Optimize {
        /// JSON scenario: network, crac and sensitivity model
        #[arg(long, value_hint = ValueHint::FilePath)]
        scenario: PathBuf,
        /// TOML parameter file (defaults are used when omitted)
        #[arg(long, value_hint = ValueHint::FilePath)]
        params: Option<PathBuf>,
        /// Write the JSON outcome to this file instead of stdout
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
        /// Threads for leaves and contingency scenarios ("auto" = all CPUs)
        #[arg(long)]
        threads: Option<String>,
    },
    /// Check a scenario for inconsistencies without optimizing
    Validate {
        /// JSON scenario to check
        #[arg(long, value_hint = ValueHint::FilePath)]
        scenario: PathBuf,
    },
    /// Print or write the default parameter file
    Params {
        /// Write to this file instead of stdout
        #[arg(short, long, value_hint = ValueHint::FilePath)]
        out: Option<PathBuf>,
    },
}

impl Commands {
    /// Parameter file named on the command line, if any.
    pub fn params_path(&self) -> Option<&PathBuf> {
        match self {
            Commands::Optimize { params, .. } => params.as_ref(),
            _ => None,
        }
    }
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}
