use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{
    BookmarkCommand, ConfigCommand, DeviceCommand, GroupCommand, RunCommand, Session,
};
use seedsync::config::Config;

#[derive(Parser)]
#[command(name = "seedsync")]
#[command(version)]
#[command(about = "Keep bookmarks in sync across devices sharing a seed", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, join or leave a sync group
    Group(GroupCommand),

    /// Manage bookmarks
    Bookmark(BookmarkCommand),

    /// List or remove paired devices
    Device(DeviceCommand),

    /// Stay connected and sync until interrupted
    Run(RunCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("seedsync=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match &cli.command {
        Some(command) => execute_command(command, &config).await,
        None => {
            println!("Use --help to see available commands");
            Ok(())
        }
    }
}

async fn execute_command(
    command: &Commands,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    // Config commands never touch the store or the relay
    if let Commands::Config(cmd) = command {
        return cmd.run(config);
    }

    let session = Session::open(config).await?;
    let result: Result<(), Box<dyn std::error::Error>> = match command {
        Commands::Group(cmd) => cmd.run(&session).await.map_err(Into::into),
        Commands::Bookmark(cmd) => cmd.run(&session).await.map_err(Into::into),
        Commands::Device(cmd) => cmd.run(&session).await.map_err(Into::into),
        Commands::Run(cmd) => cmd.run(&session).await.map_err(Into::into),
        Commands::Config(_) => Ok(()),
    };
    session.close().await;

    result
}
