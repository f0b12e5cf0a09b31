use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use citabot_core::domain::session::Session;

use super::{
    CalendarEvent, CalendarStore, CellRef, GridStore, SessionHandle, SessionStore, StoreError,
};

/// Process-local session map. Sessions are lost on restart.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

#[async_trait::async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, identity: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(identity) {
            return Arc::clone(handle);
        }

        let mut sessions = self.sessions.write().await;
        Arc::clone(
            sessions
                .entry(identity.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(Session::new()))),
        )
    }

    async fn clear(&self, identity: &str) {
        self.sessions.write().await.remove(identity);
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[derive(Default)]
pub struct InMemoryGridStore {
    cells: RwLock<HashMap<String, String>>,
    failing: AtomicBool,
}

impl InMemoryGridStore {
    /// Makes every subsequent write fail with `StoreError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn cell(&self, a1: &str) -> Option<String> {
        self.cells.read().await.get(a1).cloned()
    }
}

#[async_trait::async_trait]
impl GridStore for InMemoryGridStore {
    async fn read_cell(&self, cell: &CellRef) -> Result<Option<String>, StoreError> {
        Ok(self.cells.read().await.get(&cell.a1()).cloned())
    }

    async fn write_cell(&self, cell: &CellRef, value: &str) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("grid write to {cell} refused")));
        }
        self.cells.write().await.insert(cell.a1(), value.to_owned());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCalendarStore {
    events: RwLock<Vec<CalendarEvent>>,
    failing: AtomicBool,
}

impl InMemoryCalendarStore {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<CalendarEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait::async_trait]
impl CalendarStore for InMemoryCalendarStore {
    async fn create_event(&self, event: &CalendarEvent) -> Result<String, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("calendar insert refused".to_owned()));
        }
        let mut events = self.events.write().await;
        events.push(event.clone());
        Ok(format!("evt-{}", events.len()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{
        acquire, reset, CellRef, GridStore, InMemoryGridStore, InMemorySessionStore, SessionStore,
        StoreError,
    };

    #[tokio::test]
    async fn get_or_create_returns_the_same_session_per_identity() {
        let store = InMemorySessionStore::default();
        let first = store.get_or_create("5215550001").await;
        let again = store.get_or_create("5215550001").await;
        let other = store.get_or_create("5215550002").await;

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn clear_yields_a_fresh_session() {
        let store = InMemorySessionStore::default();
        {
            let mut session = acquire(&store, "5215550001").await;
            session.scheduling = true;
        }

        store.clear("5215550001").await;
        assert!(store.is_empty().await);

        let session = acquire(&store, "5215550001").await;
        assert!(!session.scheduling);
    }

    #[tokio::test]
    async fn waiter_on_retired_session_reacquires_replacement() {
        let store = Arc::new(InMemorySessionStore::default());
        let mut holder = acquire(store.as_ref(), "5215550001").await;
        holder.scheduling = true;

        let waiter_store = Arc::clone(&store);
        let waiter = tokio::spawn(async move {
            let session = acquire(waiter_store.as_ref(), "5215550001").await;
            session.scheduling
        });

        tokio::task::yield_now().await;
        reset(store.as_ref(), "5215550001", &mut holder).await;
        drop(holder);

        let scheduling = waiter.await.expect("waiter task");
        assert!(!scheduling, "waiter must see the fresh session, not the retired one");
    }

    #[tokio::test]
    async fn grid_cells_round_trip_and_failures_are_reported() {
        let grid = InMemoryGridStore::default();
        let cell = CellRef::new("Agenda", 'B', 2);

        assert_eq!(grid.read_cell(&cell).await.expect("read"), None);
        grid.write_cell(&cell, "Ana - Corte").await.expect("write");
        assert_eq!(grid.cell("Agenda!B2").await.as_deref(), Some("Ana - Corte"));

        grid.set_failing(true);
        let error = grid.write_cell(&cell, "otro").await.expect_err("failing grid");
        assert!(matches!(error, StoreError::Unavailable(_)));
    }
}
