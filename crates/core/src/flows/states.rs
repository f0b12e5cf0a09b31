use serde::{Deserialize, Serialize};

use crate::domain::session::{Session, SlotName};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogState {
    Idle,
    Collecting,
    ReadyToSave,
    Saved,
}

impl DialogState {
    pub fn of(session: &Session, worker_required: bool) -> Self {
        if session.saved {
            Self::Saved
        } else if !session.scheduling {
            Self::Idle
        } else if session.slots.missing(worker_required).is_empty() {
            Self::ReadyToSave
        } else {
            Self::Collecting
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogEvent {
    ConversationTurn,
    BookingIntentDetected,
    SlotsMerged,
    AppointmentPersisted,
    PersistenceDeclined,
    DuplicateWithinQuietWindow,
    QuietWindowElapsed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DialogContext {
    pub missing_slots: Vec<SlotName>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialogAction {
    ReplyConversationally,
    PromptForSlot(SlotName),
    PersistAppointment,
    ApologizeForFailedSave,
    StaySilent,
    ResetSession,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: DialogState,
    pub to: DialogState,
    pub event: DialogEvent,
    pub actions: Vec<DialogAction>,
}
