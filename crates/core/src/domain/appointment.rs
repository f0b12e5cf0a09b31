use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::domain::session::{SlotName, SlotSet};
use crate::errors::DomainError;
use crate::normalize::{normalize_date, to_24_hour, NormalizedDate, TimeNormalizer};

/// A booking derived from a complete slot set. Never stored as session state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub client_name: String,
    pub client_phone: String,
    pub service: String,
    pub worker: Option<String>,
    pub relative_date: String,
    pub normalized_date: NormalizedDate,
    pub normalized_time: String,
}

impl Appointment {
    /// `client_phone` is the transport sender identity, never a typed slot.
    pub fn from_slots(
        slots: &SlotSet,
        client_phone: &str,
        today: NaiveDate,
        times: &TimeNormalizer,
        worker_required: bool,
    ) -> Result<Self, DomainError> {
        if let Some(missing) = slots.missing(worker_required).first() {
            return Err(DomainError::MissingSlot(*missing));
        }
        let required = |slot: SlotName| {
            slots.get(slot).map(str::to_owned).ok_or(DomainError::MissingSlot(slot))
        };

        let relative_date = required(SlotName::Date)?;
        let normalized_date = normalize_date(&relative_date, today)?;
        let normalized_time = times.normalize(&required(SlotName::Time)?)?;

        Ok(Self {
            client_name: required(SlotName::Name)?,
            client_phone: client_phone.to_owned(),
            service: required(SlotName::Service)?,
            worker: slots.get(SlotName::Worker).map(str::to_owned),
            relative_date,
            normalized_date,
            normalized_time,
        })
    }

    pub fn starts_at(&self) -> Result<NaiveDateTime, DomainError> {
        let (hour, minute) = to_24_hour(&self.normalized_time)?;
        let time = NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| {
            DomainError::InvariantViolation(format!("invalid clock {hour}:{minute}"))
        })?;
        Ok(self.normalized_date.date.and_time(time))
    }

    /// `lunes 26/10/2026 a las 10:00 AM`
    pub fn when(&self) -> String {
        format!(
            "{} {} a las {}",
            self.normalized_date.weekday_name(),
            self.normalized_date.exact(),
            self.normalized_time
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Weekday};

    use super::Appointment;
    use crate::domain::session::{SlotName, SlotSet};
    use crate::errors::DomainError;
    use crate::normalize::TimeNormalizer;

    fn slots() -> SlotSet {
        SlotSet {
            name: Some("Ana".to_owned()),
            service: Some("Corte".to_owned()),
            worker: None,
            date: Some("lunes".to_owned()),
            time: Some("10:00 AM".to_owned()),
        }
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).expect("fixture date")
    }

    #[test]
    fn builds_appointment_from_complete_slots() {
        let times = TimeNormalizer::new(vec!["10:00 AM".to_owned()]);
        let appointment = Appointment::from_slots(&slots(), "5215550001", monday(), &times, false)
            .expect("complete slots");

        assert_eq!(appointment.client_phone, "5215550001");
        assert_eq!(appointment.normalized_date.weekday, Weekday::Mon);
        assert_eq!(appointment.normalized_date.exact(), "26/10/2026");
        assert_eq!(appointment.normalized_time, "10:00 AM");
        assert_eq!(appointment.when(), "lunes 26/10/2026 a las 10:00 AM");
        assert_eq!(
            appointment.starts_at().expect("start").format("%Y-%m-%d %H:%M").to_string(),
            "2026-10-26 10:00"
        );
    }

    #[test]
    fn missing_worker_is_reported_when_staff_is_plural() {
        let times = TimeNormalizer::new(Vec::new());
        let error = Appointment::from_slots(&slots(), "5215550001", monday(), &times, true)
            .expect_err("worker required");
        assert_eq!(error, DomainError::MissingSlot(SlotName::Worker));
    }

    #[test]
    fn unparseable_date_surfaces_time_parse_error() {
        let mut slots = slots();
        slots.date = Some("algún día".to_owned());
        let times = TimeNormalizer::new(Vec::new());
        let error = Appointment::from_slots(&slots, "5215550001", monday(), &times, false)
            .expect_err("bad date");
        assert!(matches!(error, DomainError::TimeParse(_)));
    }
}
