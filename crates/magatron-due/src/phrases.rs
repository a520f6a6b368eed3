//! Relative-date vocabulary (English and Russian) matched against the user's own text.
//!
//! Used only when the extracted candidate is missing or unusable. Every rule is evaluated
//! against a reference instant, never the system clock.

use chrono::{DateTime, Datelike, Days, Duration, NaiveDate, NaiveTime, Weekday};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::zone::localize;

const MONTHS: &str = "january|february|march|april|may|june|july|august|september|october|november|december|\
jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec|\
января|февраля|марта|апреля|мая|июня|июля|августа|сентября|октября|ноября|декабря";

/// A four-digit year written as part of a date, not a bare number such as an amount.
static YEAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(?:19|20)\d{{2}}-\d{{1,2}}-\d{{1,2}}\b|\b\d{{1,2}}[./]\d{{1,2}}[./](?:19|20)\d{{2}}\b|\b(?:{MONTHS})\s+(?:\d{{1,2}}(?:st|nd|rd|th)?,?\s+)?(?:19|20)\d{{2}}\b|\b(?:in|в)\s+(?:19|20)\d{{2}}\b|\b(?:19|20)\d{{2}}\s*(?:года|году|год|г\.)"
    ))
    .expect("regex")
});

static ISO_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("regex"));

static NUMERIC_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:\b(до|к|by|on|until|till|due|на|from|с|в|at)\s+)?\b(\d{1,2})\.(\d{1,2})(?:\.(\d{4}|\d{2}))?\b",
    )
    .expect("regex")
});

/// What may follow a decimal number: more digits, a unit or a currency.
static QUANTITY_TAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[.,]\d|\s*(?:%|[$€₽]|(?:кг|гр?|л|мл|км|см|мм|м|т|руб|р|ч|час\w*|мин\w*|шт|kg|g|lbs?|l|ml|km|cm|mm|m|usd|eur|rub|h|hrs?|hours?|mins?|minutes?|pcs|k|x)\b))",
    )
    .expect("regex")
});

static DAY_MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTHS})\b(?:\s+(\d{{4}}))?"
    ))
    .expect("regex")
});

static MONTH_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b({MONTHS})\s+(\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(\d{{4}}))?"
    ))
    .expect("regex")
});

static DAY_AFTER_TOMORROW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:day after tomorrow|послезавтра)\b").expect("regex"));

static TOMORROW_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:tomorrow|tmrw|завтра)\b").expect("regex"));

static TONIGHT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:tonight|сегодня\s+вечером)\b").expect("regex"));

static TODAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(?:today|сегодня)\b").expect("regex"));

static IN_HOURS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:in\s+(\d{1,3}|an?|one)\s+hours?|через\s+(\d{1,3})?\s*час(?:а|ов)?)\b")
        .expect("regex")
});

static IN_DAYS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:in\s+(\d{1,3})\s+days?|через\s+(\d{1,3})\s+(?:день|дня|дней))\b")
        .expect("regex")
});

static IN_WEEK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:in\s+(?:a|one)\s+week|next\s+week|через\s+неделю|на\s+следующей\s+неделе)\b",
    )
    .expect("regex")
});

static WEEKDAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday|понедельник[а-я]*|вторник[а-я]*|сред[ауы]|четверг[а-я]*|пятниц[аеуы]|суббот[аеуы]|воскресень[ея])\b",
    )
    .expect("regex")
});

static TIME12_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(1[0-2]|0?[1-9])(?::([0-5]\d))?\s*(am|pm)\b").expect("regex")
});

static TIME_RU_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bв\s+(\d{1,2})(?:[:.]([0-5]\d))?\s*(утра|дня|вечера|ночи)\b").expect("regex")
});

static TIME24_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("regex"));

/// "в 15.00" / "at 15.00": a dotted time only counts after a preposition.
static TIME_DOTTED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:в|at)\s+([01]?\d|2[0-3])\.([0-5]\d)\b").expect("regex")
});

const TONIGHT_HOUR: u32 = 20;

/// True when the text spells out a four-digit year (1900-2099) as part of a date.
pub fn mentions_year(text: &str) -> bool {
    YEAR_RE.is_match(&text.to_lowercase())
}

/// Match relative-date vocabulary in `raw_text` against `now`.
///
/// Rules are tried in a fixed priority order: explicit calendar date, day after tomorrow,
/// tomorrow, tonight, today, "in N hours", "in N days"/"in a week", weekday name, bare time of day.
/// Day-level rules use the time of day written in the text, else `default_time`. The result
/// is never earlier than `now`.
pub fn match_phrase(
    raw_text: &str,
    now: DateTime<Tz>,
    default_time: NaiveTime,
) -> Option<DateTime<Tz>> {
    let text = raw_text.to_lowercase();
    let zone = now.timezone();
    let today = now.date_naive();
    let time = explicit_time(&text);
    let at = move |date: NaiveDate| localize(zone, date.and_time(time.unwrap_or(default_time)));
    let days_ahead = move |days: u64| today.checked_add_days(Days::new(days));

    let found = calendar_date(&text, today)
        .map(at)
        .or_else(|| {
            DAY_AFTER_TOMORROW_RE
                .is_match(&text)
                .then(|| days_ahead(2).map(at))
                .flatten()
        })
        .or_else(|| {
            TOMORROW_RE
                .is_match(&text)
                .then(|| days_ahead(1).map(at))
                .flatten()
        })
        .or_else(|| {
            TONIGHT_RE
                .is_match(&text)
                .then(|| {
                    let evening = NaiveTime::from_hms_opt(TONIGHT_HOUR, 0, 0)?;
                    Some(localize(zone, today.and_time(time.unwrap_or(evening))))
                })
                .flatten()
        })
        .or_else(|| TODAY_RE.is_match(&text).then(|| at(today)))
        .or_else(|| {
            in_hours(&text).and_then(|hours| now.checked_add_signed(Duration::hours(hours)))
        })
        .or_else(|| in_days(&text).and_then(days_ahead).map(at))
        .or_else(|| next_weekday(&text, today).map(at))
        .or_else(|| {
            let t = time?;
            let same_day = localize(zone, today.and_time(t));
            if same_day >= now {
                Some(same_day)
            } else {
                days_ahead(1).map(|d| localize(zone, d.and_time(t)))
            }
        })?;

    Some(found.max(now))
}

fn explicit_time(text: &str) -> Option<NaiveTime> {
    if let Some(c) = TIME12_RE.captures(text) {
        let hour: u32 = c[1].parse().ok()?;
        let minute = minutes(&c, 2)?;
        let hour = match (&c[3], hour) {
            ("am", 12) => 0,
            ("am", h) => h,
            ("pm", 12) => 12,
            (_, h) => h + 12,
        };
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    if let Some(c) = TIME_RU_RE.captures(text) {
        let hour: u32 = c[1].parse().ok()?;
        let minute = minutes(&c, 2)?;
        let hour = match (&c[3], hour) {
            ("утра", 12) => 0,
            ("утра", h) => h,
            ("дня" | "вечера", h) if h < 12 => h + 12,
            ("ночи", 12) => 0,
            ("ночи", h) if (9..12).contains(&h) => h + 12,
            (_, h) => h,
        };
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    let c = TIME24_RE
        .captures(text)
        .or_else(|| TIME_DOTTED_RE.captures(text))?;
    NaiveTime::from_hms_opt(c[1].parse().ok()?, c[2].parse().ok()?, 0)
}

fn minutes(c: &Captures<'_>, idx: usize) -> Option<u32> {
    match c.get(idx) {
        Some(m) => m.as_str().parse().ok(),
        None => Some(0),
    }
}

fn calendar_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let iso = || {
        let c = ISO_DATE_RE.captures(text)?;
        let year = parse_year(&c[1])?;
        on_or_after(today, c[3].parse().ok()?, c[2].parse().ok()?, Some(year))
    };
    let numeric = || numeric_date(text, today);
    let day_month = || {
        let c = DAY_MONTH_RE.captures(text)?;
        let year = c.get(3).and_then(|m| parse_year(m.as_str()));
        on_or_after(today, c[1].parse().ok()?, month_from_name(&c[2])?, year)
    };
    let month_day = || {
        let c = MONTH_DAY_RE.captures(text)?;
        let year = c.get(3).and_then(|m| parse_year(m.as_str()));
        on_or_after(today, c[2].parse().ok()?, month_from_name(&c[1])?, year)
    };

    iso()
        .or_else(numeric)
        .or_else(day_month)
        .or_else(month_day)
}

/// `DD.MM[.YYYY]`. Without a year the match needs some date context: a two-digit month or a
/// preposition such as "до" or "by". Decimal quantities ("1.5 кг", "2.10 usd") never count,
/// and "в 10.30" is a time of day.
fn numeric_date(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    NUMERIC_DATE_RE.captures_iter(text).find_map(|c| {
        let whole = c.get(0)?;
        let prefix = c.get(1).map(|m| m.as_str());
        let month = c.get(3)?.as_str();
        let year = c.get(4).and_then(|m| parse_year(m.as_str()));

        if year.is_none() {
            if matches!(prefix, Some("в" | "at")) {
                return None;
            }
            if prefix.is_none() && month.len() < 2 {
                return None;
            }
            let before = &text[..whole.start()];
            if QUANTITY_TAIL_RE.is_match(&text[whole.end()..])
                || before.ends_with(['.', ',', '$', '€', '₽'])
            {
                return None;
            }
        }

        on_or_after(today, c[2].parse().ok()?, month.parse().ok()?, year)
    })
}

/// A calendar date no earlier than `today`. Without a year the nearest such occurrence wins;
/// with a year, a past date is no answer at all.
fn on_or_after(today: NaiveDate, day: u32, month: u32, year: Option<i32>) -> Option<NaiveDate> {
    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day).filter(|d| *d >= today),
        None => (today.year()..=today.year() + 8)
            .filter_map(|y| NaiveDate::from_ymd_opt(y, month, day))
            .find(|d| *d >= today),
    }
}

fn parse_year(s: &str) -> Option<i32> {
    let year: i32 = s.parse().ok()?;
    Some(if s.len() == 2 { 2000 + year } else { year })
}

fn month_from_name(name: &str) -> Option<u32> {
    const STEMS: [(&str, u32); 24] = [
        ("jan", 1),
        ("feb", 2),
        ("mar", 3),
        ("apr", 4),
        ("may", 5),
        ("jun", 6),
        ("jul", 7),
        ("aug", 8),
        ("sep", 9),
        ("oct", 10),
        ("nov", 11),
        ("dec", 12),
        ("янв", 1),
        ("фев", 2),
        ("мар", 3),
        ("апр", 4),
        ("ма", 5),
        ("июн", 6),
        ("июл", 7),
        ("авг", 8),
        ("сен", 9),
        ("окт", 10),
        ("ноя", 11),
        ("дек", 12),
    ];
    STEMS
        .iter()
        .find(|(stem, _)| name.starts_with(stem))
        .map(|(_, month)| *month)
}

fn weekday_from_name(name: &str) -> Option<Weekday> {
    const STEMS: [(&str, Weekday); 14] = [
        ("mon", Weekday::Mon),
        ("tue", Weekday::Tue),
        ("wed", Weekday::Wed),
        ("thu", Weekday::Thu),
        ("fri", Weekday::Fri),
        ("sat", Weekday::Sat),
        ("sun", Weekday::Sun),
        ("пон", Weekday::Mon),
        ("вто", Weekday::Tue),
        ("сре", Weekday::Wed),
        ("чет", Weekday::Thu),
        ("пят", Weekday::Fri),
        ("суб", Weekday::Sat),
        ("вос", Weekday::Sun),
    ];
    STEMS
        .iter()
        .find(|(stem, _)| name.starts_with(stem))
        .map(|(_, day)| *day)
}

fn in_hours(text: &str) -> Option<i64> {
    let c = IN_HOURS_RE.captures(text)?;
    match c.get(1).or_else(|| c.get(2)) {
        Some(m) => Some(m.as_str().parse().unwrap_or(1)),
        None => Some(1),
    }
}

fn in_days(text: &str) -> Option<u64> {
    if let Some(c) = IN_DAYS_RE.captures(text) {
        let m = c.get(1).or_else(|| c.get(2))?;
        return m.as_str().parse().ok();
    }
    IN_WEEK_RE.is_match(text).then_some(7)
}

/// Next occurrence strictly after `today`; today's own weekday means a week from now.
fn next_weekday(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let c = WEEKDAY_RE.captures(text)?;
    let target = weekday_from_name(&c[1])?;
    let ahead = (7 + u64::from(target.num_days_from_monday())
        - u64::from(today.weekday().num_days_from_monday()))
        % 7;
    let ahead = if ahead == 0 { 7 } else { ahead };
    today.checked_add_days(Days::new(ahead))
}
