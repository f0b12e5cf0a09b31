use chrono::NaiveDate;
use serde_json::json;

use citabot_core::config::{AppConfig, LoadOptions};
use citabot_core::normalize::{normalize_date, to_24_hour};
use citabot_core::{Clock, SystemClock};

use super::CommandResult;

const UNRECOGNIZED_EXIT_CODE: u8 = 3;

/// Resolves against `today`, or against the current date in the business timezone.
pub fn date(phrase: &str, today: Option<NaiveDate>) -> CommandResult {
    let today = match today {
        Some(today) => today,
        None => match AppConfig::load(LoadOptions::default()).and_then(|config| config.calendar.tz())
        {
            Ok(timezone) => SystemClock::new(timezone).today(),
            Err(error) => {
                return CommandResult::failure(
                    "normalize_date",
                    "config_validation",
                    error.to_string(),
                    2,
                )
            }
        },
    };

    match normalize_date(phrase, today) {
        Ok(normalized) => CommandResult::success_with_details(
            "normalize_date",
            format!("{} {}", normalized.weekday_name(), normalized.exact()),
            Some(json!({
                "phrase": phrase,
                "today": today.to_string(),
                "weekday": normalized.weekday_name(),
                "date": normalized.exact(),
            })),
        ),
        Err(error) => CommandResult::failure(
            "normalize_date",
            "unrecognized_phrase",
            error.to_string(),
            UNRECOGNIZED_EXIT_CODE,
        ),
    }
}

/// Matches against the configured bookable slots.
pub fn time(phrase: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("normalize_time", "config_validation", error.to_string(), 2)
        }
    };

    let normalized = match config.business.time_normalizer().normalize(phrase) {
        Ok(normalized) => normalized,
        Err(error) => {
            return CommandResult::failure(
                "normalize_time",
                "unrecognized_phrase",
                error.to_string(),
                UNRECOGNIZED_EXIT_CODE,
            )
        }
    };

    let clock = to_24_hour(&normalized).ok().map(|(hour, minute)| format!("{hour:02}:{minute:02}"));
    CommandResult::success_with_details(
        "normalize_time",
        normalized.clone(),
        Some(json!({ "phrase": phrase, "time": normalized, "clock_24h": clock })),
    )
}
