use anyhow::Result;
use clap::{Parser, Subcommand};
use elector::commands::{check, goals, run};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "elector")]
#[command(about = "Automated supplementary course election engine", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "elector.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the login and election loops
    Run {
        /// Serve run snapshots on the monitor socket
        #[arg(long)]
        monitor: bool,
    },

    /// Validate the configuration and rules without logging in
    Check,

    /// List the configured goals with their compiled rules
    Goals,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { monitor } => run::execute(&cli.config, monitor),
        Commands::Check => check::execute(&cli.config),
        Commands::Goals => goals::execute(&cli.config),
    }
}
