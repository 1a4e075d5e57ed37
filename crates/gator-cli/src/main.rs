use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gator_core::{scheduler::parse_interval, storage::Database, AppConfig};

use commands::{logged_in, State};

mod commands;

#[derive(Parser)]
#[command(name = "gator")]
#[command(author, version, about = "A command-line RSS aggregator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file (defaults to ~/.config/gator/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a user and log in as them
    Register { name: String },
    /// Switch the current user
    Login { name: String },
    /// Delete every user, along with their feeds and follows
    Reset,
    /// List registered users
    Users,
    /// Register a feed and follow it
    #[command(name = "addfeed")]
    AddFeed { name: String, url: String },
    /// List all feeds
    Feeds,
    /// Follow an existing feed
    Follow { url: String },
    /// Stop following a feed
    Unfollow { url: String },
    /// List the feeds the current user follows
    Following,
    /// Fetch feeds continuously, one per interval (e.g. "30s", "1m")
    Agg {
        #[arg(value_parser = parse_interval)]
        interval: Duration,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(AppConfig::config_path);
    let config = AppConfig::load_from(&config_path)?;

    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Reject bad arguments before anything touches the data directory
    if let Err(e) = validate_command(&cli.command) {
        return report(e);
    }

    let db = match Database::new(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::error!("Cannot open database: {}", e);
            return Err(e.into());
        }
    };

    let mut state = State {
        config,
        config_path,
        db,
    };

    match dispatch(&mut state, cli.command).await {
        Ok(()) => Ok(()),
        Err(e) => report(e),
    }
}

/// Recoverable errors are printed and exit with status 1; anything else is
/// logged and propagated
fn report(e: anyhow::Error) -> Result<()> {
    match e.downcast_ref::<gator_core::Error>() {
        Some(err) if err.is_recoverable() => {
            eprintln!("{}", err);
            std::process::exit(1);
        }
        _ => {
            tracing::error!("{:#}", e);
            Err(e)
        }
    }
}

/// Argument checks that need no store access
fn validate_command(command: &Commands) -> Result<()> {
    if let Commands::AddFeed { url, .. } = command {
        commands::feeds::validate_url(url)?;
    }
    Ok(())
}

async fn dispatch(state: &mut State, command: Commands) -> Result<()> {
    match command {
        Commands::Register { name } => commands::users::register(state, &name).await,
        Commands::Login { name } => commands::users::login(state, &name).await,
        Commands::Reset => commands::users::reset(state).await,
        Commands::Users => commands::users::list(state).await,
        Commands::Feeds => commands::feeds::list(state).await,
        Commands::Agg { interval } => commands::agg::run(state, interval).await,
        Commands::AddFeed { name, url } => {
            let state = &*state;
            logged_in(state, |user| commands::feeds::add(state, user, &name, &url)).await
        }
        Commands::Follow { url } => {
            let state = &*state;
            logged_in(state, |user| commands::follows::follow(state, user, &url)).await
        }
        Commands::Unfollow { url } => {
            let state = &*state;
            logged_in(state, |user| commands::follows::unfollow(state, user, &url)).await
        }
        Commands::Following => {
            let state = &*state;
            logged_in(state, |user| commands::follows::following(state, user)).await
        }
    }
}
