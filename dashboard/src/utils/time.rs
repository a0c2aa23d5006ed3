//! Time utility functions

use chrono::{DateTime, Local, Utc};

/// Wall-clock label stamped on each step (`HH:MM:SS`, 24-hour)
pub fn clock_timestamp() -> String {
    format_clock(&Local::now())
}

fn format_clock<Tz: chrono::TimeZone>(dt: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    dt.format("%H:%M:%S").to_string()
}

/// Milliseconds since the Unix epoch
pub fn unix_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_clock_is_24_hour() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 1, 21, 5, 9).unwrap();
        assert_eq!(format_clock(&dt), "21:05:09");
    }

    #[test]
    fn test_clock_timestamp_shape() {
        let ts = clock_timestamp();
        assert_eq!(ts.len(), 8);
        assert_eq!(ts.as_bytes()[2], b':');
        assert_eq!(ts.as_bytes()[5], b':');
    }

    #[test]
    fn test_unix_millis_is_recent() {
        assert!(unix_millis() > 1_700_000_000_000);
    }
}
