use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::error::ProrepResult;

const DATE_FORMAT: &str = "%Y-%m-%d";
const NAIVE_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

pub fn parse_date(s: &str) -> ProrepResult<NaiveDate> {
    Ok(NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)?)
}

/// Parses an ISO-8601 timestamp, with or without offset, into UTC.
///
/// Timestamps without an offset are taken to be UTC already.
pub fn parse_timestamp_utc(s: &str) -> ProrepResult<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(s) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    let timestamp = NAIVE_DATETIME_FORMATS[1..].iter().fold(
        NaiveDateTime::parse_from_str(s, NAIVE_DATETIME_FORMATS[0]),
        |parsed, format| parsed.or_else(|_| NaiveDateTime::parse_from_str(s, format)),
    )?;

    Ok(timestamp.and_utc())
}

/// Parses an ISO-8601 timestamp and drops the zone after normalizing to UTC.
pub fn parse_timestamp(s: &str) -> ProrepResult<NaiveDateTime> {
    Ok(parse_timestamp_utc(s)?.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn offsets_are_normalized_to_utc() {
        let timestamp = parse_timestamp("2023-11-14T12:00:00+02:00").unwrap();

        assert_eq!(timestamp.to_string(), "2023-11-14 10:00:00");
    }

    #[test]
    fn naive_timestamps_are_kept() {
        let timestamp = parse_timestamp("2023-11-14T12:00:00.250").unwrap();

        assert_eq!(timestamp.to_string(), "2023-11-14 12:00:00.250");
        assert!(parse_timestamp("2023-11-14 12:00:00").is_ok());
    }

    #[test]
    fn dates_require_iso_format() {
        assert_eq!(parse_date("2023-11-14").unwrap().to_string(), "2023-11-14");

        let err = parse_date("11/14/2023").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConversionError);
    }
}
