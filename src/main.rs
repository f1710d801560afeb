use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = bookharvest::logging::init() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    let cli = bookharvest::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match bookharvest::pipeline::run(&cli).await.context("harvest") {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err:#}");
            eprintln!("State has been saved. Re-run to resume from where it stopped.");
            ExitCode::FAILURE
        }
    }
}
