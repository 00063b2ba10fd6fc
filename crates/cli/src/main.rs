//! Outreach CLI — the main entry point.
//!
//! Commands:
//! - `serve`   — Start the WebSocket drafting server
//! - `draft`   — Run both pipelines once and print their events
//! - `doctor`  — Check configuration, credentials and the tool server

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "outreach",
    about = "Outreach — side-by-side sales email drafting",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ./outreach.toml)
    #[arg(short, long, global = true, env = "OUTREACH_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/WebSocket server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Draft one email with both pipelines and print events as JSON lines
    Draft {
        /// What to write, e.g. "Email Acme's VP of Sales about our CRM"
        #[arg(short, long)]
        message: String,
    },

    /// Diagnose configuration and connectivity
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so `draft` output stays machine-readable.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Draft { message } => commands::draft::run(config_path, &message).await?,
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}
