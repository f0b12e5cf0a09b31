use std::sync::OnceLock;

use super::text::fold;
use super::TimeParseError;

/// Bare hour numerals, matched only on exact equality.
static NUMERAL_TABLE: OnceLock<Vec<(String, String)>> = OnceLock::new();
/// Natural phrasings, matched by containment, longest phrase first.
static PHRASE_TABLE: OnceLock<Vec<(String, String)>> = OnceLock::new();

const SPOKEN_PREFIXES: [&str; 3] = ["a las ", "a la ", "las "];

fn clock(hour: u32, meridiem: &str) -> String {
    format!("{hour}:00 {meridiem}")
}

fn numeral_table() -> &'static [(String, String)] {
    NUMERAL_TABLE.get_or_init(|| {
        (0..=23u32)
            .filter_map(|hour| {
                let value = match hour {
                    0 => return None,
                    1..=6 => clock(hour, "PM"),
                    7..=11 => clock(hour, "AM"),
                    12 => clock(12, "PM"),
                    _ => clock(hour - 12, "PM"),
                };
                Some((hour.to_string(), value))
            })
            .collect()
    })
}

fn phrase_table() -> &'static [(String, String)] {
    PHRASE_TABLE.get_or_init(|| {
        let mut table = Vec::new();
        for hour in 1..=12u32 {
            let am = clock(hour, "AM");
            let pm = clock(hour, "PM");
            for pattern in ["{h}:00 am", "{h}:00am", "{h} am", "{h}am", "{h} de la manana"] {
                table.push((pattern.replace("{h}", &hour.to_string()), am.clone()));
            }
            for pattern in ["{h}:00 pm", "{h}:00pm", "{h} pm", "{h}pm", "{h} de la tarde"] {
                table.push((pattern.replace("{h}", &hour.to_string()), pm.clone()));
            }
            if hour >= 6 && hour != 12 {
                table.push((format!("{hour} de la noche"), pm.clone()));
            }
        }
        for (phrase, value) in [
            ("al mediodia", "12:00 PM"),
            ("mediodia", "12:00 PM"),
            ("medio dia", "12:00 PM"),
            ("en la manana", "9:00 AM"),
            ("por la manana", "9:00 AM"),
            ("temprano", "9:00 AM"),
            ("en la tarde", "3:00 PM"),
            ("por la tarde", "3:00 PM"),
            ("en la noche", "7:00 PM"),
            ("por la noche", "7:00 PM"),
        ] {
            table.push((phrase.to_owned(), value.to_owned()));
        }
        table.sort_by(|left, right| right.0.len().cmp(&left.0.len()));
        table
    })
}

/// Maps time-of-day phrases onto canonical `H:MM AM|PM` strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeNormalizer {
    bookable_slots: Vec<String>,
}

impl TimeNormalizer {
    pub fn new(bookable_slots: Vec<String>) -> Self {
        Self { bookable_slots }
    }

    pub fn bookable_slots(&self) -> &[String] {
        &self.bookable_slots
    }

    /// Position of a normalized time in the bookable slot list.
    pub fn slot_index(&self, normalized: &str) -> Option<usize> {
        let folded = fold(normalized);
        self.bookable_slots.iter().position(|slot| fold(slot) == folded)
    }

    /// Case and accent insensitive lookup; the first match wins.
    ///
    /// Order: bare hour numerals, natural phrasings, then the bookable slots
    /// themselves by substring containment.
    pub fn normalize(&self, phrase: &str) -> Result<String, TimeParseError> {
        let folded = strip_spoken_prefix(&fold(phrase));
        if folded.is_empty() {
            return Err(TimeParseError::UnrecognizedTime(phrase.trim().to_owned()));
        }

        if let Some((_, value)) = numeral_table().iter().find(|(key, _)| *key == folded) {
            return Ok(value.clone());
        }

        if let Some((_, value)) =
            phrase_table().iter().find(|(key, _)| contains_phrase(&folded, key))
        {
            return Ok(value.clone());
        }

        self.bookable_slots
            .iter()
            .find(|slot| {
                let slot_folded = fold(slot);
                contains_phrase(&folded, &slot_folded)
                    || (folded.contains(':') && slot_folded.starts_with(&folded))
            })
            .cloned()
            .ok_or_else(|| TimeParseError::UnrecognizedTime(phrase.trim().to_owned()))
    }
}

fn strip_spoken_prefix(folded: &str) -> String {
    SPOKEN_PREFIXES
        .iter()
        .find_map(|prefix| folded.strip_prefix(prefix))
        .unwrap_or(folded)
        .trim()
        .to_owned()
}

/// Substring match that refuses to split a number (`"9 am"` must not match inside `"19 am"`).
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let preceded_by_digit =
            haystack[..start].chars().next_back().is_some_and(|previous| previous.is_ascii_digit());
        let followed_by_digit = haystack[start + needle.len()..]
            .chars()
            .next()
            .is_some_and(|next| next.is_ascii_digit());
        !preceded_by_digit && !followed_by_digit
    })
}

/// Converts a normalized `H:MM AM|PM` string into a 24-hour `(hour, minute)` pair.
pub fn to_24_hour(normalized: &str) -> Result<(u32, u32), TimeParseError> {
    let trimmed = normalized.trim();
    let upper = trimmed.to_ascii_uppercase();
    let (clock_part, is_pm) = if let Some(rest) = upper.strip_suffix("PM") {
        (rest.trim(), true)
    } else if let Some(rest) = upper.strip_suffix("AM") {
        (rest.trim(), false)
    } else {
        return Err(TimeParseError::MissingMeridiem(trimmed.to_owned()));
    };

    let invalid = || TimeParseError::InvalidClock(trimmed.to_owned());
    let (hour_text, minute_text) = clock_part.split_once(':').ok_or_else(invalid)?;
    let hour = hour_text.parse::<u32>().map_err(|_| invalid())?;
    let minute = minute_text.parse::<u32>().map_err(|_| invalid())?;
    if !(1..=12).contains(&hour) || minute > 59 {
        return Err(invalid());
    }

    let hour = match (hour, is_pm) {
        (12, false) => 0,
        (12, true) => 12,
        (hour, true) => hour + 12,
        (hour, false) => hour,
    };
    Ok((hour, minute))
}
