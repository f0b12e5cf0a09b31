pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod normalize;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AppConfig, ConfirmationPolicy, LoadOptions};
pub use domain::appointment::Appointment;
pub use domain::profile::{BusinessProfile, ProfileSource, ServiceOffering};
pub use domain::session::{ExtractedSlots, Session, SlotName, SlotSet, Speaker};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{DialogAction, DialogEvent, DialogState, FlowEngine};
pub use normalize::{NormalizedDate, TimeNormalizer, TimeParseError};
