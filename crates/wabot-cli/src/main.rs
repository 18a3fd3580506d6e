mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// wabot -- WhatsApp command bot with an admission-control core.
#[derive(Parser, Debug)]
#[command(name = "wabot", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter wabot.toml
    Init {
        /// Owner phone number or chat address
        #[arg(long, required = true)]
        owner: Vec<String>,

        /// Where to write the file
        #[arg(long, default_value = wabot_types::CONFIG_FILENAME)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Load and validate a configuration file, then print a summary
    CheckConfig {
        #[arg(long, default_value = wabot_types::CONFIG_FILENAME)]
        config: PathBuf,
    },

    /// Show the canonical forms of a user identifier
    Normalize {
        /// Raw identifier (phone number or chat address)
        id: String,

        /// Country code replacing a leading 0
        #[arg(long, default_value = "62")]
        country_code: String,
    },

    /// Run the dispatcher over stdin/stdout (one message per line)
    Run {
        #[arg(long, default_value = wabot_types::CONFIG_FILENAME)]
        config: PathBuf,

        /// Sender used for plain-text lines; defaults to the first owner
        #[arg(long = "as")]
        sender: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { owner, path, force } => commands::init::run(&path, &owner, force),
        Commands::CheckConfig { config } => commands::check::run(&config),
        Commands::Normalize { id, country_code } => commands::normalize::run(&id, &country_code),
        Commands::Run { config, sender } => commands::serve::run(&config, sender).await,
    }
}
