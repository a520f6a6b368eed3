use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;

#[derive(Debug, thiserror::Error)]
#[error("unknown time zone: {0}")]
pub struct ZoneError(pub String);

/// Parse an IANA zone name such as `Europe/Moscow`.
pub fn parse_zone(name: &str) -> Result<Tz, ZoneError> {
    let name = name.trim();
    name.parse::<Tz>().map_err(|_| ZoneError(name.to_string()))
}

/// Interpret a wall-clock time in `zone`.
///
/// Ambiguous times (clocks going back) take the earlier instant. Times that fall into a gap
/// (clocks going forward) move forward in 15 minute steps until they exist.
pub fn localize(zone: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let mut shifted = naive;
            for _ in 0..96 {
                let Some(next) = shifted.checked_add_signed(Duration::minutes(15)) else {
                    break;
                };
                shifted = next;
                if let Some(dt) = zone.from_local_datetime(&shifted).earliest() {
                    return dt;
                }
            }
            zone.from_utc_datetime(&naive)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    #[test]
    fn parses_known_zone_and_rejects_unknown() {
        assert_eq!(parse_zone(" Europe/Moscow ").unwrap(), Tz::Europe__Moscow);
        assert_eq!(parse_zone("UTC").unwrap(), Tz::UTC);
        let err = parse_zone("Mars/Olympus").unwrap_err();
        assert_eq!(err.to_string(), "unknown time zone: Mars/Olympus");
    }

    #[test]
    fn gap_moves_forward() {
        // 2025-03-30 02:30 does not exist in Berlin.
        let naive = NaiveDate::from_ymd_opt(2025, 3, 30)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let dt = localize(Tz::Europe__Berlin, naive);
        assert_eq!(dt.hour(), 3);
        assert!(dt.naive_local() > naive);
    }

    #[test]
    fn ambiguous_takes_earlier() {
        // 2025-10-26 02:30 happens twice in Berlin.
        let naive = NaiveDate::from_ymd_opt(2025, 10, 26)
            .unwrap()
            .and_hms_opt(2, 30, 0)
            .unwrap();
        let dt = localize(Tz::Europe__Berlin, naive);
        assert_eq!(dt.to_rfc3339(), "2025-10-26T02:30:00+02:00");
    }
}
