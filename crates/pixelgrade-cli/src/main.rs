//! pixelgrade CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "pixelgrade", version, about = "Hybrid HTML/CSS/JS grading engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade one candidate against a challenge
    Evaluate {
        /// Challenge .toml file
        #[arg(long)]
        challenge: PathBuf,

        /// Candidate directory, .toml or .html file
        #[arg(long)]
        candidate: PathBuf,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Also write the JSON result to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Queue a candidate for the worker
    Submit {
        /// Challenge the candidate is graded against
        #[arg(long)]
        challenge_id: String,

        /// Candidate directory, .toml or .html file
        #[arg(long)]
        candidate: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show a queued submission and its result
    Status {
        /// Submission id printed by `submit`
        #[arg(long)]
        id: String,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run the queue worker until interrupted
    Worker {
        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Max concurrent evaluations (overrides config)
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Queue poll interval in milliseconds (overrides config)
        #[arg(long)]
        poll_interval_ms: Option<u64>,
    },

    /// Validate challenge TOML files
    Validate {
        /// Path to a challenge file or directory
        #[arg(long)]
        challenge: PathBuf,
    },

    /// Create starter config and example challenge
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pixelgrade=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Evaluate {
            challenge,
            candidate,
            format,
            output,
            config,
        } => commands::evaluate::execute(challenge, candidate, format, output, config).await,
        Commands::Submit {
            challenge_id,
            candidate,
            config,
        } => commands::submit::execute(challenge_id, candidate, config).await,
        Commands::Status { id, format, config } => {
            commands::status::execute(id, format, config).await
        }
        Commands::Worker {
            config,
            max_concurrent,
            poll_interval_ms,
        } => commands::worker::execute(config, max_concurrent, poll_interval_ms).await,
        Commands::Validate { challenge } => commands::validate::execute(challenge),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
