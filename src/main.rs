use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use stampede_bulk::cli::{init_tracing, Cli};
use stampede_bulk::commands;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);
    let json = cli.json;

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "Command failed");
            if json {
                match serde_json::to_string_pretty(&err) {
                    Ok(rendered) => println!("{}", rendered),
                    Err(e) => error!(error = %e, "Failed to render error as JSON"),
                }
            }
            let presentation = err.to_presentation();
            eprintln!("Error ({}): {}", presentation.title, err);
            if let Some(action) = presentation.action {
                eprintln!("Try this: {}", action);
            }
            ExitCode::FAILURE
        }
    }
}
