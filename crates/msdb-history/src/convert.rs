//! Conversions of the packed integer encodings msdb uses for dates, times and
//! durations, and of raw byte counts into report units.
use chrono::{NaiveDate, NaiveTime};

/// Decodes a `YYYYMMDD` integer. Zero and otherwise invalid dates are `None`.
pub fn msdb_date(run_date: i32) -> Option<NaiveDate> {
    if run_date <= 0 {
        return None;
    }
    let (year, month, day) = (run_date / 10_000, (run_date / 100) % 100, run_date % 100);
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

/// Decodes an `HHMMSS` time of day.
pub fn msdb_time(run_time: i32) -> Option<NaiveTime> {
    if run_time < 0 {
        return None;
    }
    let (hours, minutes, seconds) = split_hhmmss(run_time);
    NaiveTime::from_hms_opt(hours as u32, minutes as u32, seconds as u32)
}

/// Formats an `HHMMSS` duration as `HH:MM:SS`. Hours are not capped at 99:
/// a run of 123 hours is packed as `1230000` and formats as `123:00:00`.
pub fn msdb_duration(run_duration: i32) -> Option<String> {
    if run_duration < 0 {
        return None;
    }
    let (hours, minutes, seconds) = split_hhmmss(run_duration);
    Some(format!("{hours:02}:{minutes:02}:{seconds:02}"))
}

fn split_hhmmss(value: i32) -> (i32, i32, i32) {
    (value / 10_000, (value / 100) % 100, value % 100)
}

const MB: f64 = 1024.0 * 1024.0;
const GB: f64 = MB * 1024.0;

/// Converts a byte count to megabytes, rounded to two decimals.
/// Absent and NaN sizes stay absent; a zero size is `Some(0.0)`.
pub fn bytes_to_mb(bytes: Option<f64>) -> Option<f64> {
    scale_bytes(bytes, MB)
}

/// Converts a byte count to gigabytes, rounded to two decimals.
pub fn bytes_to_gb(bytes: Option<f64>) -> Option<f64> {
    scale_bytes(bytes, GB)
}

fn scale_bytes(bytes: Option<f64>, unit: f64) -> Option<f64> {
    let bytes = bytes.filter(|b| b.is_finite())?;
    Some((bytes.trunc() / unit * 100.0).round() / 100.0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_packed_dates() {
        assert_eq!(msdb_date(20240131), NaiveDate::from_ymd_opt(2024, 1, 31));
        assert_eq!(msdb_date(0), None);
        assert_eq!(msdb_date(20241331), None);
        assert_eq!(msdb_date(-1), None);
    }

    #[test]
    fn decodes_packed_times_and_durations() {
        assert_eq!(msdb_time(93005), NaiveTime::from_hms_opt(9, 30, 5));
        assert_eq!(msdb_time(0), NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(msdb_time(250000), None);

        assert_eq!(msdb_duration(0).as_deref(), Some("00:00:00"));
        assert_eq!(msdb_duration(10203).as_deref(), Some("01:02:03"));
        assert_eq!(msdb_duration(1230000).as_deref(), Some("123:00:00"));
        assert_eq!(msdb_duration(-5), None);
    }

    #[test]
    fn byte_conversions_are_null_and_nan_safe() {
        assert_eq!(bytes_to_mb(None), None);
        assert_eq!(bytes_to_mb(Some(f64::NAN)), None);
        assert_eq!(bytes_to_gb(Some(f64::NAN)), None);
        assert_eq!(bytes_to_mb(Some(0.0)), Some(0.0));
        assert_eq!(bytes_to_gb(Some(0.0)), Some(0.0));

        assert_eq!(bytes_to_mb(Some(1_572_864.0)), Some(1.5));
        assert_eq!(bytes_to_mb(Some(1_000_000.0)), Some(0.95));
        assert_eq!(bytes_to_gb(Some(5_368_709_120.0)), Some(5.0));
        assert_eq!(bytes_to_gb(Some(1_000_000.0)), Some(0.0));
    }
}
