use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::fmt;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Day zero of the 1900 date system as serial numbers count it.
fn excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// A single cell of a loaded sheet.
///
/// Integers and floats both land in `Number`; the workbook format does not
/// distinguish them once written. Dates and durations keep their serial
/// number so they are written back as dates, not text.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// Days since 1899-12-30, fraction is the time of day.
    DateTime(f64),
    /// Elapsed time in days.
    Duration(f64),
}

impl CellValue {
    /// Builds a text cell, mapping blank input to `Empty`.
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value)
        }
    }

    pub fn from_datetime(at: NaiveDateTime) -> Self {
        let millis = (at - excel_epoch()).num_milliseconds();
        CellValue::DateTime(millis as f64 / MILLIS_PER_DAY)
    }

    pub fn from_duration(elapsed: TimeDelta) -> Self {
        CellValue::Duration(elapsed.num_milliseconds() as f64 / MILLIS_PER_DAY)
    }

    /// Calendar value of a date cell.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            CellValue::DateTime(serial) => {
                let millis = (serial * MILLIS_PER_DAY).round() as i64;
                excel_epoch().checked_add_signed(TimeDelta::milliseconds(millis))
            }
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Interprets the cell as a row index, accepting whole non-negative
    /// numbers and numeric text.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            CellValue::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
            CellValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            // Whole numbers render without a trailing ".0"
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            CellValue::Number(n) => write!(f, "{}", n),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::DateTime(serial) => match self.as_datetime() {
                Some(at) if serial.fract() == 0.0 => write!(f, "{}", at.format("%Y-%m-%d")),
                Some(at) => write!(f, "{}", at.format("%Y-%m-%d %H:%M:%S")),
                None => write!(f, "{}", serial),
            },
            CellValue::Duration(days) => {
                let secs = (days * 86_400.0).round() as i64;
                let sign = if secs < 0 { "-" } else { "" };
                let secs = secs.abs();
                write!(f, "{}{}:{:02}:{:02}", sign, secs / 3600, secs / 60 % 60, secs % 60)
            }
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::text(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<usize> for CellValue {
    fn from(value: usize) -> Self {
        CellValue::Number(value as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_empty() {
        assert_eq!(CellValue::text(""), CellValue::Empty);
        assert!(CellValue::Text("   ".into()).is_empty());
        assert!(!CellValue::Number(0.0).is_empty());
    }

    #[test]
    fn whole_numbers_display_without_fraction() {
        assert_eq!(CellValue::Number(12.0).to_string(), "12");
        assert_eq!(CellValue::Number(1.5).to_string(), "1.5");
        assert_eq!(CellValue::Empty.to_string(), "");
    }

    #[test]
    fn index_from_number_or_text() {
        assert_eq!(CellValue::Number(3.0).as_index(), Some(3));
        assert_eq!(CellValue::Text(" 7 ".into()).as_index(), Some(7));
        assert_eq!(CellValue::Number(-1.0).as_index(), None);
        assert_eq!(CellValue::Number(2.5).as_index(), None);
        assert_eq!(CellValue::Bool(true).as_index(), None);
        assert_eq!(CellValue::DateTime(3.0).as_index(), None);
    }

    #[test]
    fn dates_display_as_calendar_values() {
        assert_eq!(CellValue::DateTime(45360.0).to_string(), "2024-03-09");
        assert_eq!(CellValue::DateTime(45360.5).to_string(), "2024-03-09 12:00:00");
        assert_eq!(CellValue::Duration(1.5).to_string(), "36:00:00");
        assert!(!CellValue::DateTime(0.0).is_empty());
    }

    #[test]
    fn datetime_serials_convert_both_ways() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(6, 0, 0)
            .unwrap();
        let cell = CellValue::from_datetime(at);
        assert_eq!(cell, CellValue::DateTime(45360.25));
        assert_eq!(cell.as_datetime(), Some(at));
        assert_eq!(
            CellValue::from_duration(TimeDelta::hours(36)),
            CellValue::Duration(1.5)
        );
    }
}
