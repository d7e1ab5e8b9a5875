use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use super::{Command, CommandContext};
use crate::google_calendar::CalendarApi;

/// Command to mirror the rotation into the calendar
pub struct SyncCommand;

/// Command to show what a sync would write, without writing it
pub struct PlanCommand;

/// Command to list calendars visible to the Google account
pub struct ListCalendarsCommand;

#[async_trait]
impl Command for SyncCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        let (calendar_name, username) = {
            let config = context.config.read();
            (
                config.google_calendar.calendar_name.clone(),
                config.xmatters.username.clone(),
            )
        };

        let service = context.sync_service()?;
        let report = service
            .reconcile(&calendar_name, &username, Utc::now())
            .await
            .with_context(|| format!("Failed to sync on-call shifts into '{}'", calendar_name))?;

        if report.calendar_created {
            println!("📅 Created calendar '{}'", calendar_name);
        }
        println!("🗑️  Removed {} upcoming events", report.events_deleted);
        println!("✅ Added {} on-call events to '{}'", report.events_created, calendar_name);
        if context.debug {
            println!("   Calendar ID: {}", report.calendar_id);
        }

        Ok(())
    }
}

#[async_trait]
impl Command for PlanCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        let username = context.config.read().xmatters.username.clone();
        let planner = context.planner()?;

        let events = planner
            .plan(&username, Utc::now())
            .await
            .context("Failed to resolve on-call schedule")?;

        if events.is_empty() {
            println!("ℹ️  {} has no upcoming on-call shifts", username);
            return Ok(());
        }

        println!("📋 {} events would be created:", events.len());
        for event in events {
            println!(
                "  {}  ({} → {})",
                event.summary,
                event.start.format("%Y-%m-%d %H:%M UTC"),
                event.end.format("%Y-%m-%d %H:%M UTC")
            );
        }

        Ok(())
    }
}

#[async_trait]
impl Command for ListCalendarsCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        info!("Listing Google calendars");
        let target = context.config.read().google_calendar.calendar_name.clone();

        let calendars = context
            .calendar_client()?
            .list_calendars()
            .await
            .context("Failed to list calendars")?;

        println!("📅 Available calendars:");
        for calendar in calendars {
            let marker = if calendar.name == target { "✓" } else { " " };
            println!("  {} {} ({})", marker, calendar.name, calendar.id);
        }

        Ok(())
    }
}
