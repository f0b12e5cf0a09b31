use thiserror::Error;

use crate::domain::session::SlotName;
use crate::flows::states::{DialogAction, DialogContext, DialogEvent, DialogState, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> DialogState;
    fn transition(
        &self,
        current: &DialogState,
        event: &DialogEvent,
        context: &DialogContext,
    ) -> Result<TransitionOutcome, DialogTransitionError>;
}

/// The appointment booking conversation.
#[derive(Clone, Debug, Default)]
pub struct BookingFlow;

impl FlowDefinition for BookingFlow {
    fn initial_state(&self) -> DialogState {
        DialogState::Idle
    }

    fn transition(
        &self,
        current: &DialogState,
        event: &DialogEvent,
        context: &DialogContext,
    ) -> Result<TransitionOutcome, DialogTransitionError> {
        transition_booking(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> DialogState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &DialogState,
        event: &DialogEvent,
        context: &DialogContext,
    ) -> Result<TransitionOutcome, DialogTransitionError> {
        self.flow.transition(current, event, context)
    }
}

impl Default for FlowEngine<BookingFlow> {
    fn default() -> Self {
        Self::new(BookingFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DialogTransitionError {
    #[error("cannot persist from {state:?} while slots are missing: {missing_slots:?}")]
    MissingSlots { state: DialogState, missing_slots: Vec<SlotName> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: DialogState, event: DialogEvent },
}

/// Collecting and ready-to-save are decided by the missing-slot list: an
/// empty list moves straight to persistence, otherwise the first missing slot
/// in collection order is requested.
fn collect_or_persist(context: &DialogContext) -> (DialogState, Vec<DialogAction>) {
    match context.missing_slots.first() {
        Some(slot) => (DialogState::Collecting, vec![DialogAction::PromptForSlot(*slot)]),
        None => (DialogState::ReadyToSave, vec![DialogAction::PersistAppointment]),
    }
}

fn transition_booking(
    current: &DialogState,
    event: &DialogEvent,
    context: &DialogContext,
) -> Result<TransitionOutcome, DialogTransitionError> {
    use DialogAction::{ApologizeForFailedSave, ReplyConversationally, ResetSession, StaySilent};
    use DialogEvent::{
        AppointmentPersisted, BookingIntentDetected, ConversationTurn, DuplicateWithinQuietWindow,
        PersistenceDeclined, QuietWindowElapsed, SlotsMerged,
    };
    use DialogState::{Collecting, Idle, ReadyToSave, Saved};

    let (to, actions) = match (current, event) {
        (Idle, ConversationTurn) => (Idle, vec![ReplyConversationally]),
        (Idle, BookingIntentDetected) | (Collecting, SlotsMerged) | (ReadyToSave, SlotsMerged) => {
            collect_or_persist(context)
        }
        (ReadyToSave, AppointmentPersisted) => {
            if !context.missing_slots.is_empty() {
                return Err(DialogTransitionError::MissingSlots {
                    state: *current,
                    missing_slots: context.missing_slots.clone(),
                });
            }
            (Saved, Vec::new())
        }
        (ReadyToSave, PersistenceDeclined) => (ReadyToSave, vec![ApologizeForFailedSave]),
        (Saved, DuplicateWithinQuietWindow) => (Saved, vec![StaySilent]),
        (Saved, QuietWindowElapsed) => (Idle, vec![ResetSession]),
        _ => {
            return Err(DialogTransitionError::InvalidTransition {
                state: *current,
                event: *event,
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: *event, actions })
}

#[cfg(test)]
mod tests {
    use crate::domain::session::{Session, SlotName, SlotSet};
    use crate::flows::engine::{BookingFlow, DialogTransitionError, FlowDefinition, FlowEngine};
    use crate::flows::states::{DialogAction, DialogContext, DialogEvent, DialogState};

    fn missing(slots: &[SlotName]) -> DialogContext {
        DialogContext { missing_slots: slots.to_vec() }
    }

    #[test]
    fn booking_happy_path() {
        let engine = FlowEngine::default();
        let mut state = engine.initial_state();

        let collecting = engine
            .apply(&state, &DialogEvent::BookingIntentDetected, &missing(&[SlotName::Name]))
            .expect("idle -> collecting");
        assert_eq!(collecting.to, DialogState::Collecting);
        assert_eq!(collecting.actions, vec![DialogAction::PromptForSlot(SlotName::Name)]);
        state = collecting.to;

        let ready = engine
            .apply(&state, &DialogEvent::SlotsMerged, &DialogContext::default())
            .expect("collecting -> ready");
        assert_eq!(ready.to, DialogState::ReadyToSave);
        assert_eq!(ready.actions, vec![DialogAction::PersistAppointment]);
        state = ready.to;

        let saved = engine
            .apply(&state, &DialogEvent::AppointmentPersisted, &DialogContext::default())
            .expect("ready -> saved");
        assert_eq!(saved.to, DialogState::Saved);
        state = saved.to;

        let reset = engine
            .apply(&state, &DialogEvent::QuietWindowElapsed, &DialogContext::default())
            .expect("saved -> idle");
        assert_eq!(reset.to, DialogState::Idle);
        assert_eq!(reset.actions, vec![DialogAction::ResetSession]);
    }

    #[test]
    fn prompts_only_for_first_missing_slot() {
        let outcome = BookingFlow
            .transition(
                &DialogState::Collecting,
                &DialogEvent::SlotsMerged,
                &missing(&[SlotName::Date, SlotName::Time]),
            )
            .expect("collecting stays collecting");
        assert_eq!(outcome.actions, vec![DialogAction::PromptForSlot(SlotName::Date)]);
    }

    #[test]
    fn intent_with_all_slots_goes_straight_to_persistence() {
        let outcome = FlowEngine::default()
            .apply(&DialogState::Idle, &DialogEvent::BookingIntentDetected, &DialogContext::default())
            .expect("idle -> ready");
        assert_eq!(outcome.to, DialogState::ReadyToSave);
    }

    #[test]
    fn saved_session_stays_silent_inside_quiet_window() {
        let outcome = FlowEngine::default()
            .apply(
                &DialogState::Saved,
                &DialogEvent::DuplicateWithinQuietWindow,
                &DialogContext::default(),
            )
            .expect("saved stays saved");
        assert_eq!(outcome.actions, vec![DialogAction::StaySilent]);
    }

    #[test]
    fn persisting_with_missing_slots_is_rejected() {
        let error = FlowEngine::default()
            .apply(
                &DialogState::ReadyToSave,
                &DialogEvent::AppointmentPersisted,
                &missing(&[SlotName::Time]),
            )
            .expect_err("must reject");
        assert!(matches!(error, DialogTransitionError::MissingSlots { .. }));
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let error = FlowEngine::default()
            .apply(&DialogState::Idle, &DialogEvent::AppointmentPersisted, &DialogContext::default())
            .expect_err("idle cannot persist");
        assert_eq!(
            error,
            DialogTransitionError::InvalidTransition {
                state: DialogState::Idle,
                event: DialogEvent::AppointmentPersisted,
            }
        );
    }

    #[test]
    fn state_is_derived_from_session() {
        let mut session = Session::new();
        assert_eq!(DialogState::of(&session, false), DialogState::Idle);

        session.scheduling = true;
        assert_eq!(DialogState::of(&session, false), DialogState::Collecting);

        session.slots = SlotSet {
            name: Some("Ana".to_owned()),
            service: Some("Corte".to_owned()),
            worker: None,
            date: Some("lunes".to_owned()),
            time: Some("10:00 AM".to_owned()),
        };
        assert_eq!(DialogState::of(&session, false), DialogState::ReadyToSave);
        assert_eq!(DialogState::of(&session, true), DialogState::Collecting);

        session.saved = true;
        assert_eq!(DialogState::of(&session, false), DialogState::Saved);
    }
}
