//! Conversational booking runtime.
//!
//! Turns a stream of chat messages from one sender into a persisted appointment:
//! 1. **Intent classification** (`nlu`) - model-backed with a keyword fallback
//! 2. **Dialog engine** (`dialog`) - slot collection driven by the core state machine
//! 3. **Booking** (`booking`) - best-effort writes to the grid and calendar backends
//! 4. **Confirmation** (`confirmation`) - generated text with a templated fallback
//!
//! The language model is strictly a helper: it classifies and phrases, while
//! slot rules, date resolution and persistence stay deterministic.

pub mod booking;
pub mod confirmation;
pub mod dialog;
pub mod llm;
pub mod nlu;
pub mod templates;

pub use booking::{
    Backend, BackendStatus, BookingCoordinator, BookingResult, CalendarTarget, GridTarget,
    PersistenceOutcome, PersistenceReport,
};
pub use confirmation::ConfirmationGenerator;
pub use dialog::{DialogEngine, DialogSettings, DialogTurn, Topic, UserMessage};
pub use llm::{CompletionRequest, LlmClient, LlmError, TextGenerator};
pub use nlu::{
    IntentClassifier, IntentRouter, KeywordIntentClassifier, ModelIntentClassifier, NluError,
    NluRequest, NluResult,
};
pub use templates::Templates;
