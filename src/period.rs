// 📅 Period Model - monthly buckets for period-keyed aggregation
//
// Event dates arrive as free text, day-first ("02-03-2025" is 2 March 2025).
// Everything downstream works on start-of-month aligned YearMonth values.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Accepted date layouts, tried in order. Day-first comes before ISO.
const DATE_FORMATS: [&str; 4] = ["%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y", "%Y-%m-%d"];

// ============================================================================
// YEAR MONTH
// ============================================================================

/// A calendar month. Field order matters: derived `Ord` sorts by year, then month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Build a period; `None` unless `month` is in 1..=12
    pub fn new(year: i32, month: u32) -> Option<Self> {
        if (1..=12).contains(&month) {
            Some(YearMonth { year, month })
        } else {
            None
        }
    }

    pub fn from_date(date: NaiveDate) -> Self {
        YearMonth {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Months since year 0, used for contiguous-period arithmetic
    fn index(&self) -> i64 {
        self.year as i64 * 12 + (self.month as i64 - 1)
    }

    fn from_index(index: i64) -> Self {
        YearMonth {
            year: index.div_euclid(12) as i32,
            month: index.rem_euclid(12) as u32 + 1,
        }
    }

    /// The month immediately after this one
    pub fn succ(&self) -> Self {
        self.add_months(1)
    }

    pub fn add_months(&self, months: i64) -> Self {
        YearMonth::from_index(self.index() + months)
    }

    /// Signed number of months from `self` to `other`
    pub fn months_until(&self, other: YearMonth) -> i64 {
        other.index() - self.index()
    }

    /// Start-of-month date, `None` only outside chrono's supported range
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got {:?}", s))?;
        let year: i32 = year
            .parse()
            .map_err(|_| format!("invalid year in {:?}", s))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("invalid month in {:?}", s))?;
        YearMonth::new(year, month).ok_or_else(|| format!("month out of range in {:?}", s))
    }
}

impl Serialize for YearMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for YearMonth {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// PARSING
// ============================================================================

/// Parse a raw event date. `None` means the row is an UnparseableDate.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// Parse a raw event date straight to its month bucket
pub fn parse_period(raw: &str) -> Option<YearMonth> {
    parse_date(raw).map(YearMonth::from_date)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth::new(year, month).unwrap()
    }

    #[test]
    fn test_day_first_parsing() {
        assert_eq!(
            parse_date("02-03-2025"),
            NaiveDate::from_ymd_opt(2025, 3, 2)
        );
        assert_eq!(
            parse_date(" 15/11/2024 "),
            NaiveDate::from_ymd_opt(2024, 11, 15)
        );
        assert_eq!(
            parse_date("2025-01-31"),
            NaiveDate::from_ymd_opt(2025, 1, 31)
        );
    }

    #[test]
    fn test_unparseable_dates() {
        assert_eq!(parse_date(""), None);
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date("31-02-2025"), None);
        assert_eq!(parse_period("13/13/2025"), None);
    }

    #[test]
    fn test_month_arithmetic_crosses_years() {
        assert_eq!(ym(2024, 12).succ(), ym(2025, 1));
        assert_eq!(ym(2025, 1).add_months(-1), ym(2024, 12));
        assert_eq!(ym(2023, 6).add_months(30), ym(2025, 12));
        assert_eq!(ym(2024, 11).months_until(ym(2025, 2)), 3);
        assert_eq!(ym(2025, 2).months_until(ym(2024, 11)), -3);
    }

    #[test]
    fn test_ordering_and_display() {
        assert!(ym(2024, 12) < ym(2025, 1));
        assert!(ym(2025, 2) > ym(2025, 1));
        assert_eq!(ym(2025, 3).to_string(), "2025-03");
        assert_eq!("2025-03".parse::<YearMonth>().unwrap(), ym(2025, 3));
        assert!("2025-13".parse::<YearMonth>().is_err());
        assert!("202503".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_first_day_is_month_aligned() {
        assert_eq!(ym(2025, 7).first_day(), NaiveDate::from_ymd_opt(2025, 7, 1));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&ym(2025, 4)).unwrap();
        assert_eq!(json, "\"2025-04\"");
        let back: YearMonth = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ym(2025, 4));
    }
}
