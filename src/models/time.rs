//! Calendar breakdown of event timestamps for the time dimension

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use super::value::{FieldValue, RawRow};

/// Text form used for `start_time` literals and for timestamps read back
pub const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// One time-dimension row derived from an epoch-millisecond timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRow {
    /// Original epoch milliseconds
    pub epoch_millis: i64,
    /// UTC timestamp
    pub start_time: NaiveDateTime,
    pub hour: u32,
    pub day: u32,
    /// ISO 8601 week number
    pub week: u32,
    pub month: u32,
    pub year: i32,
    /// Day of week, Monday = 0
    pub weekday: u32,
}

impl TimeRow {
    /// Derive calendar fields from epoch milliseconds.
    ///
    /// Returns `None` when the value is outside the representable range.
    pub fn from_epoch_millis(epoch_millis: i64) -> Option<Self> {
        let start_time = DateTime::from_timestamp_millis(epoch_millis)?.naive_utc();

        Some(Self {
            epoch_millis,
            start_time,
            hour: start_time.hour(),
            day: start_time.day(),
            week: start_time.iso_week().week(),
            month: start_time.month(),
            year: start_time.year(),
            weekday: start_time.weekday().num_days_from_monday(),
        })
    }

    /// `start_time` rendered the way it is embedded in statements
    pub fn start_time_text(&self) -> String {
        self.start_time.format(START_TIME_FORMAT).to_string()
    }

    /// Column mapping for the time table insert
    pub fn to_raw_row(&self) -> RawRow {
        let mut row = RawRow::new();
        row.insert("start_time".to_string(), FieldValue::Text(self.start_time_text()));
        row.insert("hour".to_string(), self.hour.into());
        row.insert("day".to_string(), self.day.into());
        row.insert("week".to_string(), self.week.into());
        row.insert("month".to_string(), self.month.into());
        row.insert("year".to_string(), self.year.into());
        row.insert("weekday".to_string(), self.weekday.into());
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calendar_fields() {
        // 2018-11-12 02:36:57.796 UTC, a Monday
        let row = TimeRow::from_epoch_millis(1541990217796).unwrap();
        assert_eq!(row.start_time_text(), "2018-11-12 02:36:57.796");
        assert_eq!(row.hour, 2);
        assert_eq!(row.day, 12);
        assert_eq!(row.week, 46);
        assert_eq!(row.month, 11);
        assert_eq!(row.year, 2018);
        assert_eq!(row.weekday, 0);
    }

    #[test]
    fn test_iso_week_at_year_boundary() {
        // 2018-12-31 is in ISO week 1 of 2019
        let row = TimeRow::from_epoch_millis(1546214400000).unwrap();
        assert_eq!(row.day, 31);
        assert_eq!(row.week, 1);
        assert_eq!(row.year, 2018);
    }

    #[test]
    fn test_out_of_range() {
        assert!(TimeRow::from_epoch_millis(i64::MAX).is_none());
    }

    #[test]
    fn test_raw_row_columns() {
        let row = TimeRow::from_epoch_millis(1541990217796).unwrap().to_raw_row();
        assert_eq!(row.len(), 7);
        assert_eq!(row["weekday"], FieldValue::Integer(0));
        assert_eq!(
            row["start_time"],
            FieldValue::Text("2018-11-12 02:36:57.796".to_string())
        );
    }
}
