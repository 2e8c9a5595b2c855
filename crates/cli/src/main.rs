use std::process::ExitCode;

use clap::Parser;

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the process environment still applies.
    let _ = dotenvy::dotenv();

    let cli = shopcast_cli::Cli::parse();
    match shopcast_cli::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
