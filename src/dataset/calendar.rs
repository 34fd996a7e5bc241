//! Wall-clock decomposition of time attributes.
//!
//! Time values are stored as seconds since the Unix epoch (UTC). Histograms,
//! labels and decision trees look at three cyclic views of them: hour of day,
//! day of week (0 = Sunday) and month (0 = January).

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Number of buckets in the hour-of-day cycle.
pub const HOURS_PER_DAY: usize = 24;
/// Number of buckets in the day-of-week cycle.
pub const DAYS_PER_WEEK: usize = 7;
/// Number of buckets in the month cycle.
pub const MONTHS_PER_YEAR: usize = 12;

const DOW_NAMES: [&str; DAYS_PER_WEEK] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
const MONTH_NAMES: [&str; MONTHS_PER_YEAR] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// One of the three cyclic views of a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CalendarUnit {
    /// Hour of day, 0..24.
    Hour,
    /// Day of week, 0..7 with 0 = Sunday.
    DayOfWeek,
    /// Month, 0..12 with 0 = January.
    Month,
}

impl CalendarUnit {
    /// Length of the cycle.
    pub fn period(self) -> usize {
        match self {
            CalendarUnit::Hour => HOURS_PER_DAY,
            CalendarUnit::DayOfWeek => DAYS_PER_WEEK,
            CalendarUnit::Month => MONTHS_PER_YEAR,
        }
    }

    /// Human-readable name of a 0-based value in this cycle.
    pub fn value_name(self, value: usize) -> String {
        match self {
            CalendarUnit::Hour => value.to_string(),
            CalendarUnit::DayOfWeek => DOW_NAMES[value % DAYS_PER_WEEK].to_string(),
            CalendarUnit::Month => MONTH_NAMES[value % MONTHS_PER_YEAR].to_string(),
        }
    }
}

/// Hour, weekday and month of a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarParts {
    /// 0..24
    pub hour: usize,
    /// 0..7, 0 = Sunday
    pub day_of_week: usize,
    /// 0..12, 0 = January
    pub month: usize,
}

impl CalendarParts {
    /// Decompose seconds since the epoch (fractional part ignored).
    pub fn from_epoch_seconds(secs: f64) -> Self {
        let dt = to_datetime(secs);
        Self {
            hour: dt.hour() as usize,
            day_of_week: dt.weekday().num_days_from_sunday() as usize,
            month: dt.month0() as usize,
        }
    }

    /// Value of this timestamp in the given cycle.
    pub fn get(&self, unit: CalendarUnit) -> usize {
        match unit {
            CalendarUnit::Hour => self.hour,
            CalendarUnit::DayOfWeek => self.day_of_week,
            CalendarUnit::Month => self.month,
        }
    }
}

/// Format seconds since the epoch with a strftime-style pattern.
pub fn format_epoch_seconds(secs: f64, format: &str) -> String {
    to_datetime(secs).format(format).to_string()
}

fn to_datetime(secs: f64) -> DateTime<Utc> {
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).clamp(0.0, 999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_is_thursday_january_midnight() {
        let parts = CalendarParts::from_epoch_seconds(0.0);
        assert_eq!(parts.hour, 0);
        assert_eq!(parts.day_of_week, 4);
        assert_eq!(parts.month, 0);
    }

    #[test]
    fn test_decomposition_of_known_timestamp() {
        // 2021-03-14 15:09:26 UTC, a Sunday.
        let parts = CalendarParts::from_epoch_seconds(1_615_734_566.0);
        assert_eq!(parts.hour, 15);
        assert_eq!(parts.day_of_week, 0);
        assert_eq!(parts.month, 2);
        assert_eq!(CalendarUnit::Month.value_name(parts.month), "Mar");
        assert_eq!(CalendarUnit::DayOfWeek.value_name(parts.day_of_week), "Sun");
    }

    #[test]
    fn test_format_round_trips_pattern() {
        let s = format_epoch_seconds(1_615_734_566.0, "%Y-%m-%d %H:%M:%S");
        assert_eq!(s, "2021-03-14 15:09:26");
    }
}
