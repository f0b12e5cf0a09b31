use std::borrow::Cow;
use std::fmt;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// A single cell in A1 notation, e.g. `Agenda!C4` or `'Mi Agenda'!C4`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub sheet: String,
    pub column: char,
    pub row: u32,
}

impl CellRef {
    pub fn new(sheet: impl Into<String>, column: char, row: u32) -> Self {
        Self { sheet: sheet.into(), column, row }
    }

    pub fn a1(&self) -> String {
        format!("{}!{}{}", quoted_sheet(&self.sheet), self.column, self.row)
    }
}

/// Sheet names other than plain ASCII words are wrapped in single quotes,
/// with embedded quotes doubled.
fn quoted_sheet(name: &str) -> Cow<'_, str> {
    let bare = !name.is_empty()
        && name.chars().all(|character| character.is_ascii_alphanumeric() || character == '_');
    if bare {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("'{}'", name.replace('\'', "''")))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.a1())
    }
}

/// Column A holds the slot labels; Monday starts at B.
pub fn weekday_column(weekday: Weekday) -> char {
    match weekday {
        Weekday::Mon => 'B',
        Weekday::Tue => 'C',
        Weekday::Wed => 'D',
        Weekday::Thu => 'E',
        Weekday::Fri => 'F',
        Weekday::Sat => 'G',
        Weekday::Sun => 'H',
    }
}

/// Row 1 is the header row.
pub fn slot_row(slot_index: usize) -> u32 {
    slot_index as u32 + 2
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use super::{slot_row, weekday_column, CellRef};

    #[test]
    fn wednesday_second_slot_is_d3() {
        let cell = CellRef::new("Agenda", weekday_column(Weekday::Wed), slot_row(1));
        assert_eq!(cell.a1(), "Agenda!D3");
        assert_eq!(cell.to_string(), "Agenda!D3");
    }

    #[test]
    fn sheet_names_with_spaces_or_punctuation_are_quoted() {
        assert_eq!(CellRef::new("Mi Agenda", 'C', 4).a1(), "'Mi Agenda'!C4");
        assert_eq!(CellRef::new("Citas-2026", 'B', 2).a1(), "'Citas-2026'!B2");
        assert_eq!(CellRef::new("Agenda de Ana's", 'B', 2).a1(), "'Agenda de Ana''s'!B2");
        assert_eq!(CellRef::new("Agenda_1", 'H', 11).a1(), "Agenda_1!H11");
    }

    #[test]
    fn week_spans_columns_b_through_h() {
        assert_eq!(weekday_column(Weekday::Mon), 'B');
        assert_eq!(weekday_column(Weekday::Sun), 'H');
        assert_eq!(slot_row(0), 2);
    }
}
