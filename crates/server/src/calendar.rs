use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use citabot_core::config::CalendarConfig;
use citabot_store::{CalendarEvent, CalendarStore, StoreError};

use crate::http::{ensure_success, join_segments, request_error};

const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventTime<'a> {
    date_time: String,
    time_zone: &'a str,
}

#[derive(Debug, Serialize)]
struct ReminderOverride {
    method: &'static str,
    minutes: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Reminders {
    use_default: bool,
    overrides: Vec<ReminderOverride>,
}

#[derive(Debug, Serialize)]
struct EventBody<'a> {
    summary: &'a str,
    description: &'a str,
    start: EventTime<'a>,
    end: EventTime<'a>,
    reminders: Reminders,
}

#[derive(Debug, Deserialize)]
struct CreatedEvent {
    id: String,
}

pub struct GoogleCalendarStore {
    http: Client,
    base_url: String,
    calendar_id: String,
    access_token: SecretString,
    timeout_secs: u64,
}

impl GoogleCalendarStore {
    pub fn from_config(config: &CalendarConfig) -> Result<Option<Self>, reqwest::Error> {
        let (true, Some(calendar_id), Some(access_token)) =
            (config.enabled, config.calendar_id.as_ref(), config.access_token.as_ref())
        else {
            return Ok(None);
        };

        let http = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Some(Self {
            http,
            base_url: config.base_url.clone(),
            calendar_id: calendar_id.clone(),
            access_token: access_token.clone(),
            timeout_secs: config.timeout_secs,
        }))
    }
}

#[async_trait]
impl CalendarStore for GoogleCalendarStore {
    async fn create_event(&self, event: &CalendarEvent) -> Result<String, StoreError> {
        let url = join_segments(&self.base_url, &["calendars", self.calendar_id.as_str(), "events"])?;
        let response = self
            .http
            .post(url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&event_body(event))
            .send()
            .await
            .map_err(|error| request_error(error, self.timeout_secs))?;
        let created = ensure_success(response)
            .await?
            .json::<CreatedEvent>()
            .await
            .map_err(|error| StoreError::Decode(error.to_string()))?;

        debug!(event_id = %created.id, "calendar event created");
        Ok(created.id)
    }
}

fn event_body(event: &CalendarEvent) -> EventBody<'_> {
    EventBody {
        summary: &event.summary,
        description: &event.description,
        start: EventTime {
            date_time: event.start.format(DATE_TIME_FORMAT).to_string(),
            time_zone: &event.timezone,
        },
        end: EventTime {
            date_time: event.end.format(DATE_TIME_FORMAT).to_string(),
            time_zone: &event.timezone,
        },
        reminders: Reminders {
            use_default: false,
            overrides: event
                .reminder_minutes
                .iter()
                .map(|minutes| ReminderOverride { method: "popup", minutes: *minutes })
                .collect(),
        },
    }
}
