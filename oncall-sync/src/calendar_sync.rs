use chrono::{DateTime, Datelike, Months, Utc};
use tracing::{debug, error, info};

use crate::errors::{SyncError, SyncResult};
use crate::google_calendar::{Calendar, CalendarApi, NewEvent};
use crate::resolver::{resolve_my_shifts, ResolvedSchedule, ResolvedShift};
use crate::xmatters::ScheduleSource;

/// Outcome of one reconciliation run
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub calendar_id: String,
    pub calendar_created: bool,
    pub events_deleted: usize,
    pub events_created: usize,
}

const DEFAULT_HORIZON_MONTHS: u32 = 3;

const STEP_LOCATE: &str = "locate calendar";
const STEP_DELETE: &str = "delete future events";
const STEP_FETCH: &str = "fetch schedule";
const STEP_CREATE: &str = "create events";

fn step_failed(step: &str, error: SyncError) -> SyncError {
    error!("Step '{}' failed: {}", step, error);
    error.in_step(step)
}

/// Reads the rotation and works out which shifts belong to the user.
/// Needs only the schedule source, so a dry run never touches Google.
pub struct ShiftPlanner<S> {
    schedule: S,
    horizon_months: u32,
}

impl<S: ScheduleSource> ShiftPlanner<S> {
    pub fn new(schedule: S) -> Self {
        Self {
            schedule,
            horizon_months: DEFAULT_HORIZON_MONTHS,
        }
    }

    pub fn with_horizon(mut self, months: u32) -> Self {
        self.horizon_months = months;
        self
    }

    pub fn schedule(&self) -> &S {
        &self.schedule
    }

    /// Events a sync would create, without touching the calendar
    pub async fn plan(&self, user_key: &str, now: DateTime<Utc>) -> SyncResult<Vec<NewEvent>> {
        let schedule = self
            .fetch_my_shifts(user_key, now)
            .await
            .map_err(|e| step_failed(STEP_FETCH, e))?;
        Ok(schedule.shifts.iter().map(build_event).collect())
    }

    /// `[now, now + horizon)`
    pub fn window(&self, now: DateTime<Utc>) -> SyncResult<(DateTime<Utc>, DateTime<Utc>)> {
        let until = now
            .checked_add_months(Months::new(self.horizon_months))
            .ok_or(SyncError::ScheduleWindow {
                from: now,
                months: self.horizon_months,
            })?;
        Ok((now, until))
    }

    pub async fn fetch_my_shifts(&self, user_key: &str, now: DateTime<Utc>) -> SyncResult<ResolvedSchedule> {
        let memberships = self.schedule.list_group_memberships(user_key).await?;
        let group = memberships
            .into_iter()
            .next()
            .map(|m| m.group)
            .ok_or_else(|| SyncError::NoGroupMembership {
                user: user_key.to_string(),
            })?;

        let (from, until) = self.window(now)?;
        debug!("Fetching shifts for group '{}' until {}", group.target_name, until);
        let shifts = self.schedule.list_on_call_shifts(&group.id, from, until).await?;

        let schedule = ResolvedSchedule::from(resolve_my_shifts(&shifts, user_key));
        info!("Total: {} of {} shifts are yours", schedule.total, shifts.len());
        Ok(schedule)
    }
}

/// Rebuilds the on-call calendar from the current rotation.
///
/// Not transactional: a failure while deleting or inserting leaves the
/// calendar half-updated, and the next run's wipe cleans it up.
pub struct CalendarSyncService<C, S> {
    calendar: C,
    planner: ShiftPlanner<S>,
}

impl<C: CalendarApi, S: ScheduleSource> CalendarSyncService<C, S> {
    pub fn new(calendar: C, planner: ShiftPlanner<S>) -> Self {
        Self { calendar, planner }
    }

    pub fn calendar(&self) -> &C {
        &self.calendar
    }

    pub fn planner(&self) -> &ShiftPlanner<S> {
        &self.planner
    }

    /// Wipe future events and recreate one per shift the user owns.
    /// Errors carry the name of the step that failed.
    pub async fn reconcile(
        &self,
        calendar_name: &str,
        user_key: &str,
        now: DateTime<Utc>,
    ) -> SyncResult<SyncReport> {
        info!("Reconciling calendar '{}' for {}", calendar_name, user_key);

        let (calendar, calendar_created) = self
            .ensure_calendar(calendar_name)
            .await
            .map_err(|e| step_failed(STEP_LOCATE, e))?;
        let events_deleted = self
            .clear_future_events(&calendar.id, now)
            .await
            .map_err(|e| step_failed(STEP_DELETE, e))?;
        let schedule = self
            .planner
            .fetch_my_shifts(user_key, now)
            .await
            .map_err(|e| step_failed(STEP_FETCH, e))?;
        let events_created = self
            .create_events(&calendar.id, &schedule.shifts)
            .await
            .map_err(|e| step_failed(STEP_CREATE, e))?;

        info!(
            "Calendar sync completed: {} deleted, {} created",
            events_deleted, events_created
        );
        Ok(SyncReport {
            calendar_id: calendar.id,
            calendar_created,
            events_deleted,
            events_created,
        })
    }

    async fn ensure_calendar(&self, calendar_name: &str) -> SyncResult<(Calendar, bool)> {
        debug!("Looking for calendar '{}'", calendar_name);
        let existing = self
            .calendar
            .list_calendars()
            .await?
            .into_iter()
            .find(|c| c.name == calendar_name);

        match existing {
            Some(calendar) => {
                debug!("Found calendar '{}' ({})", calendar.name, calendar.id);
                Ok((calendar, false))
            }
            None => {
                info!("Calendar '{}' not found, creating now", calendar_name);
                let calendar = self.calendar.create_calendar(calendar_name).await?;
                Ok((calendar, true))
            }
        }
    }

    async fn clear_future_events(&self, calendar_id: &str, now: DateTime<Utc>) -> SyncResult<usize> {
        let stale: Vec<_> = self
            .calendar
            .list_events(calendar_id, Some(now))
            .await?
            .into_iter()
            .filter(|event| !event.is_past(now))
            .collect();

        if !stale.is_empty() {
            info!("Deleting {} existing events", stale.len());
        }
        for event in &stale {
            debug!("Deleting '{}' ({})", event.summary, event.id);
            self.calendar.delete_event(calendar_id, &event.id).await?;
        }

        Ok(stale.len())
    }

    async fn create_events(&self, calendar_id: &str, shifts: &[ResolvedShift]) -> SyncResult<usize> {
        for shift in shifts {
            let created = self.calendar.insert_event(calendar_id, &build_event(shift)).await?;
            info!("Event created: {}", created.summary);
        }
        Ok(shifts.len())
    }
}

pub fn build_event(shift: &ResolvedShift) -> NewEvent {
    let title = event_title(shift);
    NewEvent {
        summary: title.clone(),
        description: title,
        start: shift.start,
        end: shift.end,
    }
}

/// "On Call - Monday 21st Jul 2025", plus " (replacing Name)" when covering
pub fn event_title(shift: &ResolvedShift) -> String {
    let start = shift.start;
    let title = format!(
        "On Call - {} {}{} {}",
        start.format("%A"),
        start.day(),
        ordinal_suffix(start.day()),
        start.format("%b %Y"),
    );

    match &shift.replacing_name {
        Some(name) => format!("{} (replacing {})", title, name),
        None => title,
    }
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}
