use chrono::{DateTime, NaiveDateTime, Utc};

pub fn parse_datetime(dt_str: &str) -> Option<DateTime<Utc>> {
    // Try ISO 8601 format first
    if let Ok(dt) = DateTime::parse_from_rfc3339(dt_str) {
        return Some(dt.with_timezone(&Utc));
    }

    // Try common formats
    let formats = [
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y:%m:%d %H:%M:%S",
        "%Y-%m-%d",
    ];

    let clean_str = dt_str.replace("Z", "");
    for fmt in &formats {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&clean_str, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }

    None
}

pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_rfc3339_and_sqlite_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(parse_datetime("2024-05-01T12:30:00Z"), Some(expected));
        assert_eq!(parse_datetime("2024-05-01T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_datetime("2024-05-01 12:30:00"), Some(expected));
        assert_eq!(parse_datetime("not a date"), None);
    }

    #[test]
    fn test_format_round_trips_through_parse() {
        let now = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_datetime(&format_datetime(&now)), Some(now));
    }
}
