use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "homestack", version, about = "Homestack CLI — declarative service stacks for a single host")]
pub struct Cli {
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Stack directory (contains stack.yaml, templates/, vault.json, build/)"
    )]
    pub stack: String,
    #[arg(
        long,
        global = true,
        help = "Read the vault passphrase from this file ('-' for stdin)"
    )]
    pub passphrase_file: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Converge running state to the declared configuration
    Reconcile {
        #[arg(long, conflicts_with = "service", help = "All enabled services (the default)")]
        all: bool,
        #[arg(long, help = "Reconcile exactly one named service")]
        service: Option<String>,
        #[arg(long, help = "Re-pull images and converge even when unchanged")]
        force_pull: bool,
        #[arg(long, help = "Report what would change without touching the runtime")]
        dry_run: bool,
    },
    /// Report running state per service
    Status {
        #[arg(long)]
        service: Option<String>,
    },
    /// Stop one service's containers
    Teardown {
        #[arg(long)]
        service: String,
    },
    /// List declared services
    List,
    /// Validate the stack offline (templates, config, secrets)
    Check,
    /// Manage the encrypted secret vault
    Vault {
        #[command(subcommand)]
        command: VaultCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum VaultCommands {
    /// Create an empty vault
    Init,
    /// Store or replace one secret
    Set { key: String, value: String },
    /// Remove one secret
    Unset { key: String },
    /// List secret key names (never values)
    Keys,
}
