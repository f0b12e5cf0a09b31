pub mod engine;
pub mod states;

pub use engine::{BookingFlow, DialogTransitionError, FlowDefinition, FlowEngine};
pub use states::{DialogAction, DialogContext, DialogEvent, DialogState, TransitionOutcome};
