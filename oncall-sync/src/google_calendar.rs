use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::credentials::AccessTokenProvider;
use crate::errors::{SyncError, SyncResult};
use crate::http_utils::{handle_api_response, parse_json_response, transport_error};

const SERVICE: &str = "Google Calendar";
const API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const UTC_ZONE: &str = "UTC";

/// Read/write access to calendars and their events
#[async_trait]
pub trait CalendarApi: Send + Sync {
    async fn list_calendars(&self) -> SyncResult<Vec<Calendar>>;

    async fn create_calendar(&self, name: &str) -> SyncResult<Calendar>;

    /// Events on the calendar; with `min_start`, only those not over by then
    async fn list_events(
        &self,
        calendar_id: &str,
        min_start: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<CalendarEvent>>;

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> SyncResult<()>;

    async fn insert_event(&self, calendar_id: &str, event: &NewEvent) -> SyncResult<CalendarEvent>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Calendar {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CalendarEvent {
    /// Over at or before `now`; these are never touched
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        self.end <= now
    }
}

/// Event to be inserted; always written with a UTC zone tag
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub summary: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleCalendarList {
    items: Option<Vec<GoogleCalendarListEntry>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GoogleCalendarListEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    summary: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventsResponse {
    items: Option<Vec<GoogleEvent>>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
struct GoogleEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    start: Option<GoogleEventDateTime>,
    end: Option<GoogleEventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GoogleEventDateTime {
    #[serde(rename = "dateTime", skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(rename = "timeZone", skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

impl GoogleEventDateTime {
    fn utc(at: DateTime<Utc>) -> Self {
        Self {
            date_time: Some(at.to_rfc3339()),
            date: None,
            time_zone: Some(UTC_ZONE.to_string()),
        }
    }

    /// All-day dates are pinned to midnight UTC
    fn to_utc(&self) -> SyncResult<DateTime<Utc>> {
        if let Some(datetime_str) = &self.date_time {
            DateTime::parse_from_rfc3339(datetime_str)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| decode_error(format!("Invalid event datetime '{}': {}", datetime_str, e)))
        } else if let Some(date_str) = &self.date {
            let naive_date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                .map_err(|e| decode_error(format!("Invalid event date '{}': {}", date_str, e)))?;
            let naive_datetime = naive_date
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| decode_error(format!("Invalid event date '{}'", date_str)))?;
            Ok(DateTime::from_naive_utc_and_offset(naive_datetime, Utc))
        } else {
            Err(decode_error("Event time has neither dateTime nor date".to_string()))
        }
    }
}

fn decode_error(message: String) -> SyncError {
    SyncError::Decode {
        context: "Google Calendar event".to_string(),
        message,
    }
}

fn to_google_event(event: &NewEvent) -> GoogleEvent {
    GoogleEvent {
        id: None,
        summary: Some(event.summary.clone()),
        description: Some(event.description.clone()),
        start: Some(GoogleEventDateTime::utc(event.start)),
        end: Some(GoogleEventDateTime::utc(event.end)),
        status: None,
    }
}

fn from_google_event(gcal_event: GoogleEvent) -> SyncResult<CalendarEvent> {
    let id = gcal_event
        .id
        .ok_or_else(|| decode_error("Event has no id".to_string()))?;
    let start = gcal_event
        .start
        .as_ref()
        .ok_or_else(|| decode_error(format!("Event {} has no start time", id)))?
        .to_utc()?;
    let end = match &gcal_event.end {
        Some(end) => end.to_utc()?,
        None => start,
    };

    Ok(CalendarEvent {
        id,
        summary: gcal_event.summary.unwrap_or_default(),
        description: gcal_event.description,
        start,
        end,
    })
}

/// Recurring series are expanded into instances so each occurrence is
/// listed, and later deleted, on its own
fn events_query(min_start: Option<DateTime<Utc>>, page_token: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("maxResults", "250".to_string()),
        ("singleEvents", "true".to_string()),
    ];
    if let Some(min_start) = min_start {
        query.push(("timeMin", min_start.to_rfc3339()));
    }
    if let Some(token) = page_token {
        query.push(("pageToken", token.to_string()));
    }
    query
}

pub struct GoogleCalendarClient<P> {
    tokens: P,
    base_url: String,
    http_client: reqwest::Client,
}

impl<P: AccessTokenProvider> GoogleCalendarClient<P> {
    pub fn new(tokens: P) -> Self {
        Self::with_base_url(tokens, API_BASE)
    }

    pub fn with_base_url(tokens: P, base_url: &str) -> Self {
        Self {
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!("{}/calendars/{}/events", self.base_url, urlencoding::encode(calendar_id))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> SyncResult<reqwest::Response> {
        let access_token = self.tokens.access_token().await?;
        let response = request
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        handle_api_response(SERVICE, response).await
    }
}

#[async_trait]
impl<P: AccessTokenProvider> CalendarApi for GoogleCalendarClient<P> {
    async fn list_calendars(&self) -> SyncResult<Vec<Calendar>> {
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http_client
                .get(format!("{}/users/me/calendarList", self.base_url));
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = self.send(request).await?;
            let calendar_list: GoogleCalendarList =
                parse_json_response(response, "Google Calendar list response").await?;

            for calendar in calendar_list.items.unwrap_or_default() {
                if let (Some(id), Some(name)) = (calendar.id, calendar.summary) {
                    calendars.push(Calendar { id, name });
                }
            }

            page_token = calendar_list.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        debug!("Listed {} calendars", calendars.len());
        Ok(calendars)
    }

    async fn create_calendar(&self, name: &str) -> SyncResult<Calendar> {
        let body = GoogleCalendarListEntry {
            id: None,
            summary: Some(name.to_string()),
        };
        let request = self
            .http_client
            .post(format!("{}/calendars", self.base_url))
            .json(&body);

        let response = self.send(request).await?;
        let created: GoogleCalendarListEntry =
            parse_json_response(response, "Google Calendar create response").await?;

        let id = created.id.ok_or_else(|| SyncError::Decode {
            context: "Google Calendar create response".to_string(),
            message: "missing calendar id".to_string(),
        })?;

        info!("Created calendar '{}' ({})", name, id);
        Ok(Calendar {
            id,
            name: created.summary.unwrap_or_else(|| name.to_string()),
        })
    }

    async fn list_events(
        &self,
        calendar_id: &str,
        min_start: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<CalendarEvent>> {
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let request = self
                .http_client
                .get(self.events_url(calendar_id))
                .query(&events_query(min_start, page_token.as_deref()));
            let response = self.send(request).await?;
            let events_response: GoogleEventsResponse =
                parse_json_response(response, "Google Calendar events response").await?;

            for gcal_event in events_response.items.unwrap_or_default() {
                if gcal_event.status.as_deref() == Some("cancelled") {
                    continue;
                }
                events.push(from_google_event(gcal_event)?);
            }

            page_token = events_response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        debug!("Listed {} events on calendar {}", events.len(), calendar_id);
        Ok(events)
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> SyncResult<()> {
        let url = format!("{}/{}", self.events_url(calendar_id), urlencoding::encode(event_id));
        self.send(self.http_client.delete(url)).await?;
        debug!("Deleted event {}", event_id);
        Ok(())
    }

    async fn insert_event(&self, calendar_id: &str, event: &NewEvent) -> SyncResult<CalendarEvent> {
        let request = self
            .http_client
            .post(self.events_url(calendar_id))
            .json(&to_google_event(event));

        let response = self.send(request).await?;
        let created: GoogleEvent =
            parse_json_response(response, "Google Calendar insert response").await?;
        from_google_event(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;

    struct FixedToken;

    #[async_trait]
    impl AccessTokenProvider for FixedToken {
        async fn access_token(&self) -> SyncResult<String> {
            Ok("test-token".to_string())
        }
    }

    fn json_mock(server: &mut mockito::ServerGuard, path: &str, body: &str) -> mockito::Mock {
        server
            .mock("GET", Matcher::Regex(path.to_string()))
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    #[test]
    fn test_new_event_is_written_in_utc() {
        let event = NewEvent {
            summary: "On Call - Monday 21st Jul 2025".to_string(),
            description: "On Call - Monday 21st Jul 2025".to_string(),
            start: Utc.with_ymd_and_hms(2025, 7, 21, 9, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 7, 22, 9, 0, 0).unwrap(),
        };

        let json = serde_json::to_value(to_google_event(&event)).unwrap();
        assert_eq!(json["summary"], "On Call - Monday 21st Jul 2025");
        assert_eq!(json["start"]["dateTime"], "2025-07-21T09:00:00+00:00");
        assert_eq!(json["start"]["timeZone"], "UTC");
        assert_eq!(json["end"]["timeZone"], "UTC");
        assert!(json.get("id").is_none());
        assert!(json["start"].get("date").is_none());
    }

    #[test]
    fn test_from_google_event_with_offset_and_all_day() {
        let timed: GoogleEvent = serde_json::from_str(
            r#"{
                "id": "evt1",
                "summary": "On Call",
                "start": {"dateTime": "2025-07-21T11:00:00+02:00", "timeZone": "Europe/Paris"},
                "end": {"dateTime": "2025-07-22T11:00:00+02:00"}
            }"#,
        )
        .unwrap();
        let event = from_google_event(timed).unwrap();
        assert_eq!(event.start, Utc.with_ymd_and_hms(2025, 7, 21, 9, 0, 0).unwrap());
        assert_eq!(event.end, Utc.with_ymd_and_hms(2025, 7, 22, 9, 0, 0).unwrap());

        let all_day: GoogleEvent = serde_json::from_str(
            r#"{"id": "evt2", "start": {"date": "2025-07-23"}, "end": {"date": "2025-07-24"}}"#,
        )
        .unwrap();
        let event = from_google_event(all_day).unwrap();
        assert_eq!(event.summary, "");
        assert_eq!(event.start, Utc.with_ymd_and_hms(2025, 7, 23, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_event_without_start_fails_to_decode() {
        let broken = GoogleEvent {
            id: Some("evt3".to_string()),
            ..GoogleEvent::default()
        };
        assert!(matches!(
            from_google_event(broken),
            Err(SyncError::Decode { .. })
        ));
    }

    #[test]
    fn test_is_past_boundary() {
        let now = Utc.with_ymd_and_hms(2025, 7, 21, 12, 0, 0).unwrap();
        let mut event = CalendarEvent {
            id: "e".to_string(),
            summary: String::new(),
            description: None,
            start: now - chrono::Duration::hours(3),
            end: now,
        };
        assert!(event.is_past(now));

        event.end = now + chrono::Duration::seconds(1);
        assert!(!event.is_past(now));
    }

    #[test]
    fn test_events_query_expands_recurring_series() {
        let now = Utc.with_ymd_and_hms(2025, 7, 20, 12, 0, 0).unwrap();
        let query = events_query(Some(now), Some("p2"));
        assert_eq!(
            query,
            vec![
                ("maxResults", "250".to_string()),
                ("singleEvents", "true".to_string()),
                ("timeMin", "2025-07-20T12:00:00+00:00".to_string()),
                ("pageToken", "p2".to_string()),
            ]
        );
    }

    #[test]
    fn test_recurring_instance_decodes_with_its_own_times() {
        let instance: GoogleEvent = serde_json::from_str(
            r#"{
                "id": "standup_20250722T090000Z",
                "recurringEventId": "standup",
                "summary": "Standup",
                "start": {"dateTime": "2025-07-22T09:00:00Z"},
                "end": {"dateTime": "2025-07-22T10:00:00Z"}
            }"#,
        )
        .unwrap();
        let event = from_google_event(instance).unwrap();
        assert_eq!(event.id, "standup_20250722T090000Z");

        let now = Utc.with_ymd_and_hms(2025, 7, 20, 12, 0, 0).unwrap();
        assert!(!event.is_past(now));
        assert!(event.is_past(Utc.with_ymd_and_hms(2025, 7, 22, 10, 0, 0).unwrap()));
    }

    #[tokio::test]
    async fn test_list_events_follows_page_token() {
        let mut server = mockito::Server::new_async().await;
        let first = json_mock(
            &mut server,
            r"^/calendars/cal-1/events\?maxResults=250&singleEvents=true$",
            r#"{
                "items": [{
                    "id": "standup_20250721T090000Z",
                    "recurringEventId": "standup",
                    "summary": "Standup",
                    "start": {"dateTime": "2025-07-21T09:00:00Z"},
                    "end": {"dateTime": "2025-07-21T10:00:00Z"}
                }],
                "nextPageToken": "p2"
            }"#,
        )
        .create_async()
        .await;
        let second = json_mock(
            &mut server,
            r"^/calendars/cal-1/events\?maxResults=250&singleEvents=true&pageToken=p2$",
            r#"{
                "items": [
                    {"id": "gone", "status": "cancelled"},
                    {
                        "id": "standup_20250722T090000Z",
                        "summary": "Standup",
                        "start": {"dateTime": "2025-07-22T09:00:00Z"},
                        "end": {"dateTime": "2025-07-22T10:00:00Z"}
                    }
                ]
            }"#,
        )
        .create_async()
        .await;

        let client = GoogleCalendarClient::with_base_url(FixedToken, &server.url());
        let events = client.list_events("cal-1", None).await.unwrap();

        let ids: Vec<_> = events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["standup_20250721T090000Z", "standup_20250722T090000Z"]);
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_list_calendars_follows_page_token() {
        let mut server = mockito::Server::new_async().await;
        let first = json_mock(
            &mut server,
            r"^/users/me/calendarList$",
            r#"{"items": [{"id": "primary", "summary": "Personal"}], "nextPageToken": "c2"}"#,
        )
        .create_async()
        .await;
        let second = json_mock(
            &mut server,
            r"^/users/me/calendarList\?pageToken=c2$",
            r#"{"items": [{"id": "cal-1", "summary": "On Call"}, {"id": "no-name"}]}"#,
        )
        .create_async()
        .await;

        let client = GoogleCalendarClient::with_base_url(FixedToken, &server.url());
        let calendars = client.list_calendars().await.unwrap();

        assert_eq!(
            calendars,
            vec![
                Calendar {
                    id: "primary".to_string(),
                    name: "Personal".to_string()
                },
                Calendar {
                    id: "cal-1".to_string(),
                    name: "On Call".to_string()
                },
            ]
        );
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_delete_is_upstream_status() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("DELETE", "/calendars/cal-1/events/evt-1")
            .with_status(403)
            .with_body("Forbidden")
            .create_async()
            .await;

        let client = GoogleCalendarClient::with_base_url(FixedToken, &server.url());
        let err = client.delete_event("cal-1", "evt-1").await.unwrap_err();

        assert_eq!(
            err,
            SyncError::UpstreamStatus {
                service: "Google Calendar".to_string(),
                status: 403,
                body: "Forbidden".to_string(),
            }
        );
        mock.assert_async().await;
    }
}
