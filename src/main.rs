use clap::Parser;
use std::process::ExitCode;
use tidywatch::cli::{Cli, run_cli};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_cli(&cli) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            if !e.is_logged() {
                eprintln!("Error: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}
