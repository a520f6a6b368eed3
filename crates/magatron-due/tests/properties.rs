//! Property tests for the resolver's invariants.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc, Weekday};
use proptest::prelude::*;

use magatron_due::{resolve, Resolver, Tz};

const FIVE_YEARS: i64 = 5 * 365 * 24 * 3600;

fn reference() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

fn arb_zone() -> impl Strategy<Value = Tz> {
    prop::sample::select(vec![
        Tz::UTC,
        Tz::Europe__Moscow,
        Tz::Europe__Berlin,
        Tz::America__New_York,
        Tz::Asia__Kolkata,
    ])
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

proptest! {
    /// Candidates at or after the reference instant come back as the same instant.
    #[test]
    fn future_candidates_are_returned_unchanged(secs in 0i64..FIVE_YEARS, zone in arb_zone()) {
        let now = reference();
        let due = now + Duration::seconds(secs);
        let got = resolve("", Some(&due.to_rfc3339()), now, zone);
        prop_assert_eq!(got.map(|d| d.with_timezone(&Utc)), Some(due));
    }

    /// Past-year candidates keep month, day and time and land in the nearest year not before now.
    #[test]
    fn past_year_candidates_are_repaired(
        years_back in 1i32..=5,
        month in 1u32..=12,
        day in 1u32..=28,
        hour in 0u32..24,
        minute in 0u32..60,
    ) {
        let year = 2025 - years_back;
        let raw = format!("{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:00");
        let due = resolve("", Some(&raw), reference(), Tz::UTC).unwrap();

        let expected_year = if (month, day, hour, minute) >= (6, 1, 0, 0) { 2025 } else { 2026 };
        prop_assert_eq!(due.year(), expected_year);
        prop_assert_eq!((due.month(), due.day()), (month, day));
        prop_assert_eq!((due.hour(), due.minute()), (hour, minute));
    }

    /// "tomorrow" is the next calendar day at the default time of day.
    #[test]
    fn tomorrow_is_next_day(secs in 0i64..FIVE_YEARS) {
        let now = reference() + Duration::seconds(secs);
        let due = resolve("do it tomorrow", None, now, Tz::UTC).unwrap();
        prop_assert_eq!(due.date_naive(), now.date_naive() + Duration::days(1));
        prop_assert_eq!((due.hour(), due.minute()), (9, 0));
    }

    /// Naming today's weekday means a week from today, never today.
    #[test]
    fn own_weekday_rolls_a_week(secs in 0i64..FIVE_YEARS, zone in arb_zone()) {
        let now = (reference() + Duration::seconds(secs)).with_timezone(&zone);
        let text = format!("on {}", weekday_name(now.weekday()));
        let due = resolve(&text, None, now.with_timezone(&Utc), zone).unwrap();
        prop_assert_eq!(due.date_naive(), now.date_naive() + Duration::days(7));
    }

    /// Text without temporal vocabulary and no candidate resolves to nothing.
    #[test]
    fn no_cues_no_due(text in "[bcfghjklqvxz ]{0,30}", secs in 0i64..FIVE_YEARS) {
        let now = reference() + Duration::seconds(secs);
        prop_assert_eq!(resolve(&text, None, now, Tz::UTC), None);
    }

    /// Decimal quantities are not calendar dates.
    #[test]
    fn quantities_are_not_dates(
        whole in 0u32..100,
        frac in 0u32..100,
        unit in prop::sample::select(vec!["кг", "л", "usd", "%", "km", "руб"]),
        secs in 0i64..FIVE_YEARS,
    ) {
        let now = reference() + Duration::seconds(secs);
        let text = format!("купить {whole}.{frac:02} {unit}");
        prop_assert_eq!(resolve(&text, None, now, Tz::UTC), None);
    }

    /// Same inputs, same output.
    #[test]
    fn resolution_is_idempotent(
        text in prop::sample::select(vec![
            "",
            "напомни завтра в 15:00",
            "on friday at 5pm",
            "через 3 дня",
            "до 15.02",
            "buy milk",
        ]),
        candidate in proptest::option::of(prop::sample::select(vec![
            "2022-03-01T10:00:00",
            "2030-01-01",
            "garbage",
            "2025-06-01T00:00:00Z",
        ])),
        secs in 0i64..FIVE_YEARS,
        zone in arb_zone(),
    ) {
        let resolver = Resolver::default();
        let now = reference() + Duration::seconds(secs);
        let first = resolver.resolve_detailed(text, candidate, now, zone);
        let second = resolver.resolve_detailed(text, candidate, now, zone);
        prop_assert_eq!(first, second);
    }

    /// Nothing resolved under the default policy lies before the reference instant.
    #[test]
    fn never_before_now(
        text in prop::sample::select(vec![
            "сегодня",
            "today at 01:00",
            "в 8:00",
            "к 05.01",
            "monday",
        ]),
        candidate in proptest::option::of(prop::sample::select(vec![
            "2022-03-01T10:00:00",
            "2024-02-29",
            "2025-05-31T23:59:59Z",
        ])),
        secs in 0i64..FIVE_YEARS,
        zone in arb_zone(),
    ) {
        let now = reference() + Duration::seconds(secs);
        if let Some(due) = resolve(text, candidate, now, zone) {
            prop_assert!(due >= now);
        }
    }
}
