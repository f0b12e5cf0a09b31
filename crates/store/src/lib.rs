use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

use citabot_core::domain::session::Session;

pub mod calendar;
pub mod grid;
pub mod memory;

pub use calendar::CalendarEvent;
pub use grid::{slot_row, weekday_column, CellRef};
pub use memory::{InMemoryCalendarStore, InMemoryGridStore, InMemorySessionStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend rejected request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("backend did not answer within {0} seconds")]
    Timeout(u64),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Shared, lockable session. Holding the lock serializes message handling for
/// one identity.
pub type SessionHandle = Arc<Mutex<Session>>;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the live session for `identity`, creating an empty one on first contact.
    async fn get_or_create(&self, identity: &str) -> SessionHandle;

    /// Detaches the session for `identity`. The next `get_or_create` yields a fresh session.
    async fn clear(&self, identity: &str);

    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Locks the live session for `identity`.
///
/// A waiter can wake up holding a session that was retired while it queued;
/// it then retries against the replacement.
pub async fn acquire(store: &dyn SessionStore, identity: &str) -> OwnedMutexGuard<Session> {
    loop {
        let guard = store.get_or_create(identity).await.lock_owned().await;
        if !guard.is_retired() {
            return guard;
        }
        tracing::debug!(
            event_name = "session.acquire.retired",
            identity = %identity,
            "session was reset while waiting; re-acquiring"
        );
    }
}

/// Retires the locked session and drops it from the store.
pub async fn reset(store: &dyn SessionStore, identity: &str, session: &mut Session) {
    session.retire();
    store.clear(identity).await;
}

/// Cell-addressed spreadsheet backend.
#[async_trait]
pub trait GridStore: Send + Sync {
    async fn read_cell(&self, cell: &CellRef) -> Result<Option<String>, StoreError>;
    async fn write_cell(&self, cell: &CellRef, value: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CalendarStore: Send + Sync {
    /// Creates the event and returns the backend's event id.
    async fn create_event(&self, event: &CalendarEvent) -> Result<String, StoreError>;
}
