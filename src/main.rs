use clap::Parser;
use filedispatch::cli::{Cli, run_cli};
use filedispatch::logging::init_logging;
use filedispatch::output::OutputFormatter;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.log_format) {
        eprintln!("Warning: could not set up logging: {}", e);
    }

    let code = match run_cli(cli) {
        Ok(code) => code,
        Err(e) => {
            OutputFormatter::error(&format!("Error: {}", e));
            e.exit_code()
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
