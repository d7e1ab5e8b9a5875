use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use crate::calendar_sync::{CalendarSyncService, ShiftPlanner};
use crate::config::Config;
use crate::credentials::StaticCredentials;
use crate::google_auth::GoogleTokenStore;
use crate::google_calendar::GoogleCalendarClient;
use crate::xmatters::XmattersClient;

pub mod auth;
pub mod calendar;

/// Trait for all command implementations
#[async_trait]
pub trait Command {
    /// Execute the command with the provided context
    async fn execute(&mut self, context: &CommandContext) -> Result<()>;
}

/// Shared context for all commands
pub struct CommandContext {
    pub config: Arc<RwLock<Config>>,
    pub debug: bool,
}

pub type LivePlanner = ShiftPlanner<XmattersClient<StaticCredentials>>;

pub type LiveSyncService =
    CalendarSyncService<GoogleCalendarClient<GoogleTokenStore>, XmattersClient<StaticCredentials>>;

impl CommandContext {
    pub fn new(config: Arc<RwLock<Config>>, debug: bool) -> Self {
        Self { config, debug }
    }

    pub fn token_store(&self) -> Result<GoogleTokenStore> {
        let config = self.config.read().clone();
        config.validate_google()?;
        let data_dir = Config::get_data_dir()?;
        Ok(GoogleTokenStore::new(config.google_calendar, &data_dir))
    }

    pub fn calendar_client(&self) -> Result<GoogleCalendarClient<GoogleTokenStore>> {
        Ok(GoogleCalendarClient::new(self.token_store()?))
    }

    /// Schedule side only; Google settings are not consulted
    pub fn planner(&self) -> Result<LivePlanner> {
        let config = self.config.read().clone();
        config
            .validate_xmatters()
            .context("xMatters is not configured")?;

        let schedule = XmattersClient::new(
            &config.xmatters.domain,
            StaticCredentials::from(&config.xmatters),
        );
        Ok(ShiftPlanner::new(schedule).with_horizon(config.get_horizon()))
    }

    /// Wire the live clients together; validates config before any request
    pub fn sync_service(&self) -> Result<LiveSyncService> {
        let planner = self.planner()?;
        Ok(CalendarSyncService::new(self.calendar_client()?, planner))
    }
}
