use clap::Parser;

mod cli;
mod commands;
mod domain;
mod services;

use cli::{Cli, Commands};
use domain::errors::error_code;

fn main() {
    let cli = Cli::parse();
    match dispatch(&cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            if cli.json {
                let envelope = serde_json::json!({
                    "ok": false,
                    "error": {
                        "code": error_code(&err),
                        "message": err.to_string(),
                    }
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&envelope)
                        .unwrap_or_else(|_| envelope.to_string())
                );
            } else {
                eprintln!("error: {err}");
            }
            std::process::exit(1);
        }
    }
}

fn dispatch(cli: &Cli) -> anyhow::Result<bool> {
    match &cli.command {
        Commands::Reconcile {
            all: _,
            service,
            force_pull,
            dry_run,
        } => commands::handle_reconcile(cli, service.as_deref(), *force_pull, *dry_run),
        Commands::Status { service } => commands::handle_status(cli, service.as_deref()),
        Commands::Teardown { service } => commands::handle_teardown(cli, service),
        Commands::List => commands::handle_list(cli),
        Commands::Check => commands::handle_check(cli),
        Commands::Vault { command } => commands::handle_vault_commands(cli, command),
    }
}
