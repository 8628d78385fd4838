//! Runtime macros.
//!
//! Macros are named string values substituted into query text. Values that
//! look like date expressions are normalized to `YYYY-MM-DD`:
//!
//! | Expression     | Meaning                                   |
//! |----------------|-------------------------------------------|
//! | `2024-01-31`   | The literal date                          |
//! | `:YYYYMMDD`    | Today                                     |
//! | `:YYYYMMDD-N`  | N days ago                                |
//! | `:YYYYMM-N`    | First day of the month N months ago       |
//! | `:YYYY-N`      | January 1st, N years ago                  |

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{Datelike, Days, Months, NaiveDate};
use regex::Regex;
use thiserror::Error;

/// Macro key for the first day of the reporting window.
pub const START_DATE: &str = "start_date";

/// Macro key for the last day of the reporting window.
pub const END_DATE: &str = "end_date";

/// Errors raised while resolving macros.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacroError {
    /// A value could not be read as a date expression.
    #[error("invalid date expression for '{key}': '{value}'")]
    InvalidDate { key: String, value: String },

    /// Query text references a macro nobody supplied.
    #[error("unresolved macro '{{{0}}}'")]
    Unresolved(String),

    /// `end_date` precedes `start_date`.
    #[error("end date {end} is before start date {start}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
}

/// Named macro values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Macros {
    values: BTreeMap<String, String>,
}

impl Macros {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a macro value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The `start_date`/`end_date` window, when both are supplied.
    pub fn date_range(&self, today: NaiveDate) -> Result<Option<DateRange>, MacroError> {
        let (Some(start), Some(end)) = (self.get(START_DATE), self.get(END_DATE)) else {
            return Ok(None);
        };
        let start = convert_date(START_DATE, start, today)?;
        let end = convert_date(END_DATE, end, today)?;
        if end < start {
            return Err(MacroError::InvertedRange { start, end });
        }
        Ok(Some(DateRange { start, end }))
    }

    /// Replace `{name}` placeholders in `text`.
    ///
    /// # Errors
    /// - [`MacroError::Unresolved`] for the first placeholder without a value.
    /// - [`MacroError::InvalidDate`] when a `:`-prefixed value is not a date expression.
    pub fn substitute(&self, text: &str, today: NaiveDate) -> Result<String, MacroError> {
        let re = placeholder_regex();

        let mut resolved = BTreeMap::new();
        for caps in re.captures_iter(text) {
            let key = &caps[1];
            if resolved.contains_key(key) {
                continue;
            }
            let value = self
                .get(key)
                .ok_or_else(|| MacroError::Unresolved(key.to_string()))?;
            resolved.insert(key.to_string(), normalize_value(key, value, today)?);
        }

        Ok(re
            .replace_all(text, |caps: &regex::Captures| resolved[&caps[1]].clone())
            .into_owned())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Macros {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Inclusive reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Number of days in the window, both ends included.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("failed to compile placeholder regex")
    })
}

fn relative_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^:(YYYYMMDD|YYYYMM|YYYY)(?:-(\d+))?$")
            .expect("failed to compile relative date regex")
    })
}

fn normalize_value(key: &str, value: &str, today: NaiveDate) -> Result<String, MacroError> {
    if value.starts_with(':') || NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() {
        convert_date(key, value, today).map(|d| d.format("%Y-%m-%d").to_string())
    } else {
        Ok(value.to_string())
    }
}

/// Convert a date expression relative to `today`.
///
/// # Errors
/// Returns [`MacroError::InvalidDate`] if the value is neither `YYYY-MM-DD`
/// nor one of the relative forms.
pub fn convert_date(key: &str, value: &str, today: NaiveDate) -> Result<NaiveDate, MacroError> {
    let invalid = || MacroError::InvalidDate {
        key: key.to_string(),
        value: value.to_string(),
    };
    let value = value.trim();

    if !value.starts_with(':') {
        return NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| invalid());
    }

    let caps = relative_date_regex().captures(value).ok_or_else(invalid)?;
    let offset: u32 = match caps.get(2) {
        Some(n) => n.as_str().parse().map_err(|_| invalid())?,
        None => 0,
    };

    let date = match &caps[1] {
        "YYYYMMDD" => today.checked_sub_days(Days::new(u64::from(offset))),
        "YYYYMM" => today
            .with_day(1)
            .and_then(|d| d.checked_sub_months(Months::new(offset))),
        _ => today
            .year()
            .checked_sub(i32::try_from(offset).map_err(|_| invalid())?)
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1)),
    };
    date.ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_convert_date_forms() {
        assert_eq!(convert_date("k", "2024-01-31", today()).unwrap(), date(2024, 1, 31));
        assert_eq!(convert_date("k", ":YYYYMMDD", today()).unwrap(), today());
        assert_eq!(convert_date("k", ":YYYYMMDD-7", today()).unwrap(), date(2024, 3, 8));
        assert_eq!(convert_date("k", ":YYYYMM-1", today()).unwrap(), date(2024, 2, 1));
        assert_eq!(convert_date("k", ":YYYYMM", today()).unwrap(), date(2024, 3, 1));
        assert_eq!(convert_date("k", ":YYYY-1", today()).unwrap(), date(2023, 1, 1));
    }

    #[test]
    fn test_convert_date_invalid() {
        assert!(convert_date("k", ":YESTERDAY", today()).is_err());
        assert!(convert_date("k", "2024-13-01", today()).is_err());
        let err = convert_date("start_date", "soon", today()).unwrap_err();
        assert_eq!(err.to_string(), "invalid date expression for 'start_date': 'soon'");
    }

    #[test]
    fn test_date_range() {
        let macros = Macros::new()
            .with(START_DATE, ":YYYYMMDD-6")
            .with(END_DATE, ":YYYYMMDD");
        let range = macros.date_range(today()).unwrap().unwrap();
        assert_eq!(range.start, date(2024, 3, 9));
        assert_eq!(range.days(), 7);

        let only_start = Macros::new().with(START_DATE, "2024-01-01");
        assert!(only_start.date_range(today()).unwrap().is_none());
    }

    #[test]
    fn test_date_range_inverted() {
        let macros = Macros::new()
            .with(START_DATE, "2024-03-10")
            .with(END_DATE, "2024-03-01");
        assert!(matches!(
            macros.date_range(today()),
            Err(MacroError::InvertedRange { .. })
        ));
    }

    #[test]
    fn test_substitute() {
        let macros: Macros = [("threshold", "10"), ("day", ":YYYYMMDD-1")]
            .into_iter()
            .collect();
        let text = macros
            .substitute("clicks > {threshold} AND date = '{day}' AND x < {threshold}", today())
            .unwrap();
        assert_eq!(text, "clicks > 10 AND date = '2024-03-14' AND x < 10");
    }

    #[test]
    fn test_substitute_unresolved() {
        let err = Macros::new().substitute("a = {missing}", today()).unwrap_err();
        assert_eq!(err, MacroError::Unresolved("missing".to_string()));
        assert_eq!(err.to_string(), "unresolved macro '{missing}'");
    }
}
