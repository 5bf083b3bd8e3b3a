mod cli;

use clap::Parser;
use cli::Cli;
use std::process::ExitCode;
use twitch_dl::utils::init_logging;

#[tokio::main]
async fn main() -> ExitCode {
    // Keep the guard alive so file logs are flushed on exit
    let _guard = init_logging();

    let cli = Cli::parse();
    match cli.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Returning drops the runtime, which kills any child still running
            eprintln!("twitch-dl error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
