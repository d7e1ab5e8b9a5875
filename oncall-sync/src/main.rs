use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod calendar_sync;
mod commands;
mod config;
mod credentials;
mod errors;
mod google_auth;
mod google_calendar;
mod http_utils;
mod resolver;
mod xmatters;

use commands::{
    auth::{AuthGoogleCommand, ConfigureCommand},
    calendar::{ListCalendarsCommand, PlanCommand, SyncCommand},
    Command, CommandContext,
};
use config::Config;

#[derive(Parser)]
#[command(name = "oncall-calendar-sync")]
#[command(about = "Mirror your xMatters on-call shifts into a Google Calendar")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace upcoming events in the on-call calendar with your current shifts
    Sync,
    /// Show the events a sync would create without changing the calendar
    Plan,
    /// Enter xMatters credentials and username
    Configure,
    /// Authorize access to Google Calendar
    AuthGoogle,
    /// List calendars on the Google account
    Calendars,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load()
        .await
        .context("Failed to load application configuration")?;

    // Initialize logging
    let log_level = if cli.debug {
        "debug".to_string()
    } else {
        config.general.log_level.clone()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("oncall_calendar_sync={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Configuration loaded");

    let context = CommandContext::new(Arc::new(RwLock::new(config)), cli.debug);

    let mut command: Box<dyn Command> = match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => Box::new(SyncCommand),
        Commands::Plan => Box::new(PlanCommand),
        Commands::Configure => Box::new(ConfigureCommand),
        Commands::AuthGoogle => Box::new(AuthGoogleCommand),
        Commands::Calendars => Box::new(ListCalendarsCommand),
    };

    command
        .execute(&context)
        .await
        .context("Failed to execute command")?;

    Ok(())
}
