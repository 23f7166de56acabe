use clap::Parser;
use rao_cli::{Cli, Commands, ParamsFile};
use std::io;
use std::process::ExitCode;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

mod commands;

/// `--log-level` first, then the parameter file's `[logging] level`.
fn log_level(cli: &Cli) -> Level {
    cli.log_level
        .or_else(|| {
            let path = cli.command.params_path()?;
            ParamsFile::load(path).ok()?.log_level()
        })
        .unwrap_or(Level::INFO)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(&cli))
        .with_writer(io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {err}");
    }

    let result = match &cli.command {
        Commands::Optimize {
            scenario,
            params,
            out,
            threads,
        } => {
            info!("Optimizing scenario {}", scenario.display());
            commands::optimize::handle(
                scenario,
                params.as_deref(),
                out.as_deref(),
                threads.as_deref(),
            )
        }
        Commands::Validate { scenario } => {
            info!("Validating scenario {}", scenario.display());
            commands::validate::handle(scenario)
        }
        Commands::Params { out } => commands::params::handle(out.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("command failed: {:?}", e);
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
