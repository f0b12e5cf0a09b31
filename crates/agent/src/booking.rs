use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use citabot_core::config::ConfirmationPolicy;
use citabot_core::domain::appointment::Appointment;
use citabot_core::domain::profile::BusinessProfile;
use citabot_store::{
    slot_row, weekday_column, CalendarEvent, CalendarStore, CellRef, GridStore, StoreError,
};

use crate::confirmation::ConfirmationGenerator;

/// Separator line between appointments sharing one grid cell.
pub const CELL_SEPARATOR: &str = "---";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Grid,
    Calendar,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendStatus {
    Written { reference: String },
    Failed { error: String },
    NotConfigured,
}

impl BackendStatus {
    fn is_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }

    fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PersistenceOutcome {
    FullyPersisted,
    PartiallyPersisted { failed: Backend },
    NotPersisted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PersistenceReport {
    pub outcome: PersistenceOutcome,
    pub grid: BackendStatus,
    pub calendar: BackendStatus,
}

impl PersistenceReport {
    /// An unconfigured backend is neither a success nor a failure.
    pub fn from_statuses(grid: BackendStatus, calendar: BackendStatus) -> Self {
        let outcome = match (grid.is_written(), calendar.is_written()) {
            (true, true) => PersistenceOutcome::FullyPersisted,
            (true, false) if calendar.is_failed() => {
                PersistenceOutcome::PartiallyPersisted { failed: Backend::Calendar }
            }
            (false, true) if grid.is_failed() => {
                PersistenceOutcome::PartiallyPersisted { failed: Backend::Grid }
            }
            (true, false) | (false, true) => PersistenceOutcome::FullyPersisted,
            (false, false) => PersistenceOutcome::NotPersisted,
        };
        Self { outcome, grid, calendar }
    }

    pub fn should_confirm(&self, policy: ConfirmationPolicy) -> bool {
        match policy {
            ConfirmationPolicy::Always => true,
            ConfirmationPolicy::RequireAnyBackend => {
                self.outcome != PersistenceOutcome::NotPersisted
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BookingResult {
    pub report: PersistenceReport,
    /// `None` when the confirmation policy declined to confirm.
    pub confirmation: Option<String>,
}

#[derive(Clone)]
pub struct GridTarget {
    pub store: Arc<dyn GridStore>,
    pub sheet_name: String,
}

#[derive(Clone)]
pub struct CalendarTarget {
    pub store: Arc<dyn CalendarStore>,
    pub timezone: String,
}

/// Writes a complete appointment to both backends and produces the confirmation.
///
/// The two writes run concurrently and are best-effort: neither rolls back
/// the other, and a failure only shows up in the returned report.
///
/// Appends to one grid cell are serialized per cell, so bookings from
/// different identities for the same slot never overwrite each other.
pub struct BookingCoordinator {
    grid: Option<GridTarget>,
    calendar: Option<CalendarTarget>,
    timeout: Duration,
    policy: ConfirmationPolicy,
    confirmations: ConfirmationGenerator,
    cell_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl BookingCoordinator {
    pub fn new(
        grid: Option<GridTarget>,
        calendar: Option<CalendarTarget>,
        timeout: Duration,
        policy: ConfirmationPolicy,
        confirmations: ConfirmationGenerator,
    ) -> Self {
        Self { grid, calendar, timeout, policy, confirmations, cell_locks: Mutex::default() }
    }

    pub fn policy(&self) -> ConfirmationPolicy {
        self.policy
    }

    pub async fn book(
        &self,
        appointment: &Appointment,
        profile: &BusinessProfile,
        correlation_id: &str,
    ) -> BookingResult {
        let (grid, calendar) = tokio::join!(
            self.write_grid(appointment, profile, correlation_id),
            self.write_calendar(appointment, correlation_id)
        );
        let report = PersistenceReport::from_statuses(grid, calendar);

        info!(
            event_name = "booking.persisted",
            correlation_id = %correlation_id,
            client_phone = %appointment.client_phone,
            outcome = ?report.outcome,
            "appointment persistence finished"
        );

        let confirmation = if report.should_confirm(self.policy) {
            Some(self.confirmations.generate(appointment, profile, correlation_id).await)
        } else {
            warn!(
                event_name = "booking.confirmation_declined",
                correlation_id = %correlation_id,
                "no backend accepted the appointment; confirmation withheld"
            );
            None
        };

        BookingResult { report, confirmation }
    }

    async fn write_grid(
        &self,
        appointment: &Appointment,
        profile: &BusinessProfile,
        correlation_id: &str,
    ) -> BackendStatus {
        let Some(target) = &self.grid else {
            return BackendStatus::NotConfigured;
        };

        let status = match grid_cell(appointment, profile, &target.sheet_name) {
            Ok(cell) => match self.append_to_cell(target, &cell, &grid_entry(appointment)).await {
                Ok(()) => BackendStatus::Written { reference: cell.a1() },
                Err(error) => BackendStatus::Failed { error: error.to_string() },
            },
            Err(error) => BackendStatus::Failed { error },
        };

        if let BackendStatus::Failed { error } = &status {
            warn!(
                event_name = "booking.grid_write_failed",
                correlation_id = %correlation_id,
                error = %error,
                "grid write failed; continuing with calendar"
            );
        }
        status
    }

    async fn append_to_cell(
        &self,
        target: &GridTarget,
        cell: &CellRef,
        entry: &str,
    ) -> Result<(), StoreError> {
        let lock = self.cell_lock(cell).await;
        let _held = lock.lock().await;

        let existing = with_timeout(self.timeout, target.store.read_cell(cell)).await?;
        let content = match existing.as_deref().map(str::trim).filter(|text| !text.is_empty()) {
            Some(existing) => format!("{existing}\n{CELL_SEPARATOR}\n{entry}"),
            None => entry.to_owned(),
        };
        with_timeout(self.timeout, target.store.write_cell(cell, &content)).await
    }

    async fn cell_lock(&self, cell: &CellRef) -> Arc<Mutex<()>> {
        self.cell_locks.lock().await.entry(cell.a1()).or_default().clone()
    }

    async fn write_calendar(&self, appointment: &Appointment, correlation_id: &str) -> BackendStatus {
        let Some(target) = &self.calendar else {
            return BackendStatus::NotConfigured;
        };

        let status = match CalendarEvent::for_appointment(appointment, &target.timezone) {
            Ok(event) => {
                match with_timeout(self.timeout, target.store.create_event(&event)).await {
                    Ok(event_id) => BackendStatus::Written { reference: event_id },
                    Err(error) => BackendStatus::Failed { error: error.to_string() },
                }
            }
            Err(error) => BackendStatus::Failed { error: error.to_string() },
        };

        if let BackendStatus::Failed { error } = &status {
            warn!(
                event_name = "booking.calendar_write_failed",
                correlation_id = %correlation_id,
                error = %error,
                "calendar event creation failed"
            );
        }
        status
    }
}

/// Column from the weekday, row from the time's position in the bookable slots.
pub fn grid_cell(
    appointment: &Appointment,
    profile: &BusinessProfile,
    sheet_name: &str,
) -> Result<CellRef, String> {
    let index = profile
        .time_normalizer()
        .slot_index(&appointment.normalized_time)
        .ok_or_else(|| format!("time {} is not a bookable slot", appointment.normalized_time))?;
    Ok(CellRef::new(sheet_name, weekday_column(appointment.normalized_date.weekday), slot_row(index)))
}

pub fn grid_entry(appointment: &Appointment) -> String {
    let mut entry = format!("{} - {}", appointment.client_name, appointment.service);
    if let Some(worker) = &appointment.worker {
        entry.push_str(&format!(" ({worker})"));
    }
    entry.push_str(&format!(
        "\nTel: {}\n{}",
        appointment.client_phone,
        appointment.normalized_date.exact()
    ));
    entry
}

async fn with_timeout<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| StoreError::Timeout(timeout.as_secs()))?
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{NaiveDate, Weekday};

    use citabot_core::config::ConfirmationPolicy;
    use citabot_core::domain::appointment::Appointment;
    use citabot_core::domain::profile::BusinessProfile;
    use citabot_core::normalize::NormalizedDate;
    use citabot_store::{
        CellRef, GridStore, InMemoryCalendarStore, InMemoryGridStore, StoreError,
    };

    use super::{
        Backend, BackendStatus, BookingCoordinator, CalendarTarget, GridTarget, PersistenceOutcome,
        PersistenceReport,
    };
    use crate::confirmation::ConfirmationGenerator;
    use crate::llm::TextGenerator;
    use crate::templates::Templates;

    fn appointment(time: &str) -> Appointment {
        Appointment {
            client_name: "Ana".to_owned(),
            client_phone: "5215550001".to_owned(),
            service: "Corte".to_owned(),
            worker: None,
            relative_date: "miércoles".to_owned(),
            normalized_date: NormalizedDate {
                weekday: Weekday::Wed,
                date: NaiveDate::from_ymd_opt(2026, 10, 21).expect("date"),
            },
            normalized_time: time.to_owned(),
        }
    }

    /// Yields between reading a cell and writing it back.
    struct SlowGrid {
        inner: Arc<InMemoryGridStore>,
    }

    #[async_trait]
    impl GridStore for SlowGrid {
        async fn read_cell(&self, cell: &CellRef) -> Result<Option<String>, StoreError> {
            let value = self.inner.read_cell(cell).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            value
        }

        async fn write_cell(&self, cell: &CellRef, value: &str) -> Result<(), StoreError> {
            self.inner.write_cell(cell, value).await
        }
    }

    fn coordinator(
        grid: &Arc<InMemoryGridStore>,
        calendar: &Arc<InMemoryCalendarStore>,
        policy: ConfirmationPolicy,
    ) -> BookingCoordinator {
        coordinator_over(grid.clone(), calendar, policy)
    }

    fn coordinator_over(
        grid: Arc<dyn GridStore>,
        calendar: &Arc<InMemoryCalendarStore>,
        policy: ConfirmationPolicy,
    ) -> BookingCoordinator {
        BookingCoordinator::new(
            Some(GridTarget { store: grid, sheet_name: "Agenda".to_owned() }),
            Some(CalendarTarget { store: calendar.clone(), timezone: "UTC".to_owned() }),
            Duration::from_secs(1),
            policy,
            ConfirmationGenerator::new(
                TextGenerator::disabled(),
                Arc::new(Templates::new().expect("templates")),
            ),
        )
    }

    #[tokio::test]
    async fn second_booking_in_same_cell_is_appended_below_separator() {
        let grid = Arc::new(InMemoryGridStore::default());
        let calendar = Arc::new(InMemoryCalendarStore::default());
        let coordinator = coordinator(&grid, &calendar, ConfirmationPolicy::Always);
        let profile = BusinessProfile::default();

        let first = coordinator.book(&appointment("10:00 AM"), &profile, "msg-1").await;
        assert_eq!(first.report.outcome, PersistenceOutcome::FullyPersisted);
        assert_eq!(first.report.grid, BackendStatus::Written { reference: "Agenda!D3".to_owned() });

        let mut other = appointment("10:00 AM");
        other.client_name = "Beto".to_owned();
        coordinator.book(&other, &profile, "msg-2").await;

        let cell = grid.cell("Agenda!D3").await.expect("cell written");
        assert!(cell.starts_with("Ana - Corte"));
        assert!(cell.contains("\n---\nBeto - Corte"));
        assert_eq!(calendar.events().await.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_bookings_for_one_cell_keep_both_entries() {
        let grid = Arc::new(InMemoryGridStore::default());
        let calendar = Arc::new(InMemoryCalendarStore::default());
        let coordinator = coordinator_over(
            Arc::new(SlowGrid { inner: grid.clone() }),
            &calendar,
            ConfirmationPolicy::Always,
        );
        let profile = BusinessProfile::default();

        let ana = appointment("10:00 AM");
        let mut beto = appointment("10:00 AM");
        beto.client_name = "Beto".to_owned();
        beto.client_phone = "5215550002".to_owned();

        let (first, second) = tokio::join!(
            coordinator.book(&ana, &profile, "msg-a"),
            coordinator.book(&beto, &profile, "msg-b")
        );
        assert_eq!(first.report.outcome, PersistenceOutcome::FullyPersisted);
        assert_eq!(second.report.outcome, PersistenceOutcome::FullyPersisted);

        let cell = grid.cell("Agenda!D3").await.expect("cell written");
        assert!(cell.contains("Ana - Corte"), "cell was `{cell}`");
        assert!(cell.contains("Beto - Corte"), "cell was `{cell}`");
        assert_eq!(cell.matches("\n---\n").count(), 1);
    }

    #[tokio::test]
    async fn calendar_failure_still_confirms_under_default_policy() {
        let grid = Arc::new(InMemoryGridStore::default());
        let calendar = Arc::new(InMemoryCalendarStore::default());
        calendar.set_failing(true);

        let result = coordinator(&grid, &calendar, ConfirmationPolicy::Always)
            .book(&appointment("10:00 AM"), &BusinessProfile::default(), "msg-3")
            .await;

        assert_eq!(
            result.report.outcome,
            PersistenceOutcome::PartiallyPersisted { failed: Backend::Calendar }
        );
        assert!(result.confirmation.is_some_and(|text| !text.is_empty()));
    }

    #[tokio::test]
    async fn strict_policy_withholds_confirmation_when_nothing_persisted() {
        let grid = Arc::new(InMemoryGridStore::default());
        let calendar = Arc::new(InMemoryCalendarStore::default());
        grid.set_failing(true);
        calendar.set_failing(true);

        let result = coordinator(&grid, &calendar, ConfirmationPolicy::RequireAnyBackend)
            .book(&appointment("10:00 AM"), &BusinessProfile::default(), "msg-4")
            .await;

        assert_eq!(result.report.outcome, PersistenceOutcome::NotPersisted);
        assert_eq!(result.confirmation, None);
    }

    #[tokio::test]
    async fn time_outside_bookable_slots_fails_only_the_grid() {
        let grid = Arc::new(InMemoryGridStore::default());
        let calendar = Arc::new(InMemoryCalendarStore::default());

        let result = coordinator(&grid, &calendar, ConfirmationPolicy::Always)
            .book(&appointment("8:00 PM"), &BusinessProfile::default(), "msg-5")
            .await;

        assert!(matches!(result.report.grid, BackendStatus::Failed { .. }));
        assert!(matches!(result.report.calendar, BackendStatus::Written { .. }));
    }

    #[test]
    fn unconfigured_backends_do_not_count_as_failures() {
        let report = PersistenceReport::from_statuses(
            BackendStatus::Written { reference: "Agenda!B2".to_owned() },
            BackendStatus::NotConfigured,
        );
        assert_eq!(report.outcome, PersistenceOutcome::FullyPersisted);

        let report =
            PersistenceReport::from_statuses(BackendStatus::NotConfigured, BackendStatus::NotConfigured);
        assert_eq!(report.outcome, PersistenceOutcome::NotPersisted);
        assert!(report.should_confirm(ConfirmationPolicy::Always));
        assert!(!report.should_confirm(ConfirmationPolicy::RequireAnyBackend));
    }
}
