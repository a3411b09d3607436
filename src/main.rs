use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod commands;

use commands::{
    current_user, ConfigCommand, LocationCommand, NeighborsCommand, NotificationsCommand,
    OfferCommand, PantryCommand, RequestCommand, ShareCommand, WatchCommand,
};
use pantryshare::{Config, Engine, ShareError};

#[derive(Parser)]
#[command(name = "pantryshare")]
#[command(version)]
#[command(about = "Share pantry items and food requests with your neighbors", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Act as this user (UUID) instead of the configured one
    #[arg(long, global = true)]
    user: Option<Uuid>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Set or show your location
    Location(LocationCommand),

    /// Manage your pantry
    Pantry(PantryCommand),

    /// List neighbors around you
    Neighbors(NeighborsCommand),

    /// Share pantry items and browse what neighbors share
    Share(ShareCommand),

    /// Post and browse food requests
    Request(RequestCommand),

    /// Make and answer offers on food requests
    Offer(OfferCommand),

    /// Show your notifications
    Notifications(NotificationsCommand),

    /// Follow changes around you live
    Watch(WatchCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pantryshare=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        match e.downcast_ref::<ShareError>() {
            Some(share_error) => {
                tracing::debug!("{}", share_error);
                eprintln!("Error: {}", share_error.user_message());
            }
            None => eprintln!("Error: {}", e),
        }
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Location(cmd)) => {
            let (engine, user) = connect(&config, cli.user).await?;
            cmd.run(&engine, user).await?;
        }
        Some(Commands::Pantry(cmd)) => {
            let (engine, user) = connect(&config, cli.user).await?;
            cmd.run(&engine, user).await?;
        }
        Some(Commands::Neighbors(cmd)) => {
            let (engine, user) = connect(&config, cli.user).await?;
            cmd.run(&engine, &config, user).await?;
        }
        Some(Commands::Share(cmd)) => {
            let (engine, user) = connect(&config, cli.user).await?;
            cmd.run(&engine, &config, user).await?;
        }
        Some(Commands::Request(cmd)) => {
            let (engine, user) = connect(&config, cli.user).await?;
            cmd.run(&engine, &config, user).await?;
        }
        Some(Commands::Offer(cmd)) => {
            let (engine, user) = connect(&config, cli.user).await?;
            cmd.run(&engine, user).await?;
        }
        Some(Commands::Notifications(cmd)) => {
            let (engine, user) = connect(&config, cli.user).await?;
            cmd.run(&engine, user).await?;
        }
        Some(Commands::Watch(cmd)) => {
            let (engine, user) = connect(&config, cli.user).await?;
            cmd.run(&engine, &config, user).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}

/// Resolves the acting user before touching the database.
async fn connect(
    config: &Config,
    user_override: Option<Uuid>,
) -> Result<(Engine, Uuid), Box<dyn std::error::Error>> {
    let user = current_user(config, user_override)?;
    let engine = Engine::open(config).await?;
    Ok((engine, user))
}
