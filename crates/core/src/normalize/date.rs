use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::text::fold;
use super::TimeParseError;

/// Folded lookup key, canonical display name, chrono weekday.
const WEEKDAYS: [(&str, &str, Weekday); 7] = [
    ("lunes", "lunes", Weekday::Mon),
    ("martes", "martes", Weekday::Tue),
    ("miercoles", "miércoles", Weekday::Wed),
    ("jueves", "jueves", Weekday::Thu),
    ("viernes", "viernes", Weekday::Fri),
    ("sabado", "sábado", Weekday::Sat),
    ("domingo", "domingo", Weekday::Sun),
];

const EXACT_DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedDate {
    pub weekday: Weekday,
    pub date: NaiveDate,
}

impl NormalizedDate {
    fn from_date(date: NaiveDate) -> Self {
        Self { weekday: date.weekday(), date }
    }

    pub fn weekday_name(&self) -> &'static str {
        weekday_name(self.weekday)
    }

    /// `DD/MM/YYYY`
    pub fn exact(&self) -> String {
        self.date.format(EXACT_DATE_FORMAT).to_string()
    }
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    WEEKDAYS[weekday.num_days_from_monday() as usize].1
}

/// Parses a weekday written in Spanish, with or without accents.
pub fn parse_weekday(phrase: &str) -> Option<Weekday> {
    let folded = fold(phrase);
    WEEKDAYS.iter().find(|(key, _, _)| *key == folded).map(|(_, _, weekday)| *weekday)
}

/// Next calendar occurrence of `weekday` strictly after `today`.
///
/// When `today` already falls on `weekday` the result is one full week ahead.
pub fn next_occurrence(weekday: Weekday, today: NaiveDate) -> NaiveDate {
    let current = today.weekday().num_days_from_monday() as i64;
    let target = weekday.num_days_from_monday() as i64;
    let mut ahead = (target - current).rem_euclid(7);
    if ahead == 0 {
        ahead = 7;
    }
    today + Duration::days(ahead)
}

/// Resolves a free-form date phrase relative to `today`.
///
/// Accepted forms, tried in order: a bare weekday name, a relative word
/// (`hoy`, `mañana`, `pasado mañana`) or `el <weekday>`, and an explicit `DD/MM/YYYY`.
/// Relative words are first mapped to a weekday and then resolved like a weekday name.
pub fn normalize_date(phrase: &str, today: NaiveDate) -> Result<NormalizedDate, TimeParseError> {
    let folded = fold(phrase);

    if let Some(weekday) = parse_weekday(&folded) {
        return Ok(NormalizedDate::from_date(next_occurrence(weekday, today)));
    }

    if let Some(weekday) = relative_weekday(&folded, today) {
        return Ok(NormalizedDate::from_date(next_occurrence(weekday, today)));
    }

    NaiveDate::parse_from_str(phrase.trim(), EXACT_DATE_FORMAT)
        .map(NormalizedDate::from_date)
        .map_err(|_| TimeParseError::UnrecognizedDate(phrase.trim().to_owned()))
}

fn relative_weekday(folded: &str, today: NaiveDate) -> Option<Weekday> {
    let offset = match folded {
        "hoy" => Some(0),
        "pasado manana" => Some(2),
        "manana" => Some(1),
        _ => None,
    };
    if let Some(days) = offset {
        return Some((today + Duration::days(days)).weekday());
    }

    let rest = folded
        .strip_prefix("el proximo ")
        .or_else(|| folded.strip_prefix("este "))
        .or_else(|| folded.strip_prefix("el "))?;
    parse_weekday(rest)
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, NaiveDate, Weekday};

    use super::{next_occurrence, normalize_date, parse_weekday, weekday_name};
    use crate::normalize::TimeParseError;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid fixture date")
    }

    #[test]
    fn weekday_matching_today_rolls_a_full_week() {
        // 2026-10-19 is a Monday.
        let monday = date(2026, 10, 19);
        for offset in 0..7 {
            let today = monday + chrono::Duration::days(offset);
            let name = weekday_name(today.weekday());
            let resolved = normalize_date(name, today).expect("weekday resolves");
            assert_eq!(resolved.date, today + chrono::Duration::days(7), "weekday {name}");
            assert_eq!(resolved.weekday, today.weekday());
        }
    }

    #[test]
    fn weekday_resolves_to_next_occurrence() {
        let monday = date(2026, 10, 19);
        let resolved = normalize_date("Miércoles", monday).expect("wednesday");
        assert_eq!(resolved.date, date(2026, 10, 21));
        assert_eq!(resolved.weekday_name(), "miércoles");
        assert_eq!(resolved.exact(), "21/10/2026");

        let sunday = normalize_date("domingo", monday).expect("sunday");
        assert_eq!(sunday.date, date(2026, 10, 25));
    }

    #[test]
    fn relative_words_map_through_weekday_resolution() {
        let monday = date(2026, 10, 19);

        let tomorrow = normalize_date("mañana", monday).expect("tomorrow");
        assert_eq!(tomorrow.date, date(2026, 10, 20));

        let after = normalize_date("Pasado mañana", monday).expect("day after tomorrow");
        assert_eq!(after.date, date(2026, 10, 21));

        let today = normalize_date("hoy", monday).expect("today");
        assert_eq!(today.date, date(2026, 10, 26));
    }

    #[test]
    fn el_weekday_phrasing_is_recognized() {
        let monday = date(2026, 10, 19);
        let friday = normalize_date("el viernes", monday).expect("friday");
        assert_eq!(friday.date, date(2026, 10, 23));
        assert_eq!(friday.weekday, Weekday::Fri);
    }

    #[test]
    fn explicit_date_is_parsed_directly() {
        let resolved = normalize_date("03/11/2026", date(2026, 10, 19)).expect("explicit date");
        assert_eq!(resolved.date, date(2026, 11, 3));
        assert_eq!(resolved.weekday, Weekday::Tue);
        assert_eq!(resolved.weekday_name(), "martes");
    }

    #[test]
    fn unrecognized_phrase_is_an_error() {
        let error = normalize_date("algún día", date(2026, 10, 19)).expect_err("unrecognized");
        assert_eq!(error, TimeParseError::UnrecognizedDate("algún día".to_owned()));
        assert!(normalize_date("31/02/2026", date(2026, 10, 19)).is_err());
    }

    #[test]
    fn next_occurrence_never_returns_today() {
        let saturday = date(2026, 10, 24);
        assert_eq!(next_occurrence(Weekday::Sat, saturday), date(2026, 10, 31));
        assert_eq!(next_occurrence(Weekday::Sun, saturday), date(2026, 10, 25));
        assert_eq!(parse_weekday("SABADO"), Some(Weekday::Sat));
    }
}
