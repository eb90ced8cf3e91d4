use std::process::ExitCode;

use clap::Parser;

use n6_cli::cli::{Cli, Commands};
use n6_cli::commands;
use n6_cli::error::CliError;
use n6_cli::logging;
use n6_cli::output::OutputWriter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_tracing(&cli.log_level, cli.log_format) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("error: {e}");
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Spec(args) => commands::spec::execute(args, &writer),
        Commands::Config(args) => commands::config::execute(args, &writer),
        Commands::State(args) => commands::state::execute(args, &writer),
    }
}
