//! Date and time phrase normalization.
//!
//! Pure functions: the caller supplies "today" so results are deterministic.

pub mod date;
pub mod text;
pub mod time;

use thiserror::Error;

pub use date::{next_occurrence, normalize_date, parse_weekday, weekday_name, NormalizedDate};
pub use text::fold;
pub use time::{to_24_hour, TimeNormalizer};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TimeParseError {
    #[error("unrecognized date phrase `{0}`")]
    UnrecognizedDate(String),
    #[error("unrecognized time phrase `{0}`")]
    UnrecognizedTime(String),
    #[error("time `{0}` is missing an AM/PM marker")]
    MissingMeridiem(String),
    #[error("time `{0}` is not a valid H:MM clock value")]
    InvalidClock(String),
}
