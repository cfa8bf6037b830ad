use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A look-back window, identified by the calendar year it starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Window(i32);

impl Window {
    pub fn starting(year: i32) -> Self {
        Self(year)
    }

    pub fn start_year(&self) -> i32 {
        self.0
    }

    /// January 1st of the start year. Falls back to the earliest representable
    /// date for years chrono cannot express.
    pub fn start_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.0, 1, 1).unwrap_or(NaiveDate::MIN)
    }

    pub fn start_datetime(&self) -> NaiveDateTime {
        self.start_date().and_time(NaiveTime::MIN)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Window {
    type Err = std::num::ParseIntError;

    /// Accepts `2023` or a full date such as `2023-01-01` (only the year is kept).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let year = s.trim().split('-').next().unwrap_or_default();
        year.parse().map(Self)
    }
}

/// The default window set used when a run names none.
pub fn default_windows() -> Vec<Window> {
    vec![Window(2023), Window(2022), Window(2021)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_year_and_date_forms() {
        assert_eq!("2022".parse::<Window>().unwrap(), Window::starting(2022));
        assert_eq!("2021-01-01".parse::<Window>().unwrap(), Window::starting(2021));
        assert!("twenty".parse::<Window>().is_err());
    }

    #[test]
    fn start_date_is_new_year() {
        let w = Window::starting(2023);
        assert_eq!(w.start_date(), NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(w.to_string(), "2023");
    }
}
