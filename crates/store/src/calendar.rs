use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use citabot_core::domain::appointment::Appointment;
use citabot_core::errors::DomainError;

/// Popup reminders: one day, one hour and ten minutes before the start.
pub const REMINDER_MINUTES: [u32; 3] = [1440, 60, 10];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub summary: String,
    pub description: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub timezone: String,
    pub reminder_minutes: Vec<u32>,
}

impl CalendarEvent {
    /// One-hour event in local wall-clock time for `timezone`.
    pub fn for_appointment(appointment: &Appointment, timezone: &str) -> Result<Self, DomainError> {
        let start = appointment.starts_at()?;
        let mut description = format!(
            "Cliente: {}\nTeléfono: {}\nServicio: {}",
            appointment.client_name, appointment.client_phone, appointment.service
        );
        if let Some(worker) = &appointment.worker {
            description.push_str(&format!("\nProfesional: {worker}"));
        }

        Ok(Self {
            summary: format!("{} - {}", appointment.service, appointment.client_name),
            description,
            start,
            end: start + Duration::hours(1),
            timezone: timezone.to_owned(),
            reminder_minutes: REMINDER_MINUTES.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Weekday};

    use citabot_core::domain::appointment::Appointment;
    use citabot_core::normalize::NormalizedDate;

    use super::{CalendarEvent, REMINDER_MINUTES};

    fn appointment(worker: Option<&str>) -> Appointment {
        Appointment {
            client_name: "Ana".to_owned(),
            client_phone: "5215550001".to_owned(),
            service: "Corte".to_owned(),
            worker: worker.map(str::to_owned),
            relative_date: "lunes".to_owned(),
            normalized_date: NormalizedDate {
                weekday: Weekday::Mon,
                date: NaiveDate::from_ymd_opt(2026, 10, 26).expect("date"),
            },
            normalized_time: "3:00 PM".to_owned(),
        }
    }

    #[test]
    fn event_lasts_one_hour_with_reminders() {
        let event = CalendarEvent::for_appointment(&appointment(Some("Luis")), "America/Mexico_City")
            .expect("event");

        assert_eq!(event.summary, "Corte - Ana");
        assert_eq!(event.start.format("%Y-%m-%dT%H:%M").to_string(), "2026-10-26T15:00");
        assert_eq!(event.end.format("%H:%M").to_string(), "16:00");
        assert_eq!(event.reminder_minutes, REMINDER_MINUTES.to_vec());
        assert!(event.description.contains("Teléfono: 5215550001"));
        assert!(event.description.ends_with("Profesional: Luis"));
    }

    #[test]
    fn worker_line_is_omitted_without_worker() {
        let event =
            CalendarEvent::for_appointment(&appointment(None), "UTC").expect("event");
        assert!(!event.description.contains("Profesional"));
    }
}
