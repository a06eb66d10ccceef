//! codeloop CLI — the main entry point.
//!
//! Commands:
//! - `init`    — Write the default config file
//! - `chat`    — Interactive loop, or a single query with `-m`
//! - `run`     — Run exactly one query
//! - `status`  — Show configuration and stored state

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "codeloop",
    about = "codeloop — generate, run and remember code with an LLM",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init,

    /// Ask for code interactively
    Chat {
        /// Send a single query instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Run a single query and exit
    Run {
        /// The query
        #[arg(short, long)]
        message: String,
    },

    /// Show configuration and stored state
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with streamed output.
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Chat { message } => commands::chat::run(message).await?,
        Commands::Run { message } => commands::chat::run(Some(message)).await?,
        Commands::Status => commands::status::run().await?,
    }

    Ok(())
}
