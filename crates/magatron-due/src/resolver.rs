use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::phrases;
use crate::zone::localize;

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// What to do with a candidate that parses but lies before the reference instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PastCandidatePolicy {
    /// Move the year forward when the text never named one; otherwise ignore the candidate.
    #[default]
    Repair,
    /// Return any plausible parsed candidate unchanged, past or not.
    Honor,
    /// Ignore past candidates and fall back to phrase matching.
    Discard,
}

impl PastCandidatePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            PastCandidatePolicy::Repair => "repair",
            PastCandidatePolicy::Honor => "honor",
            PastCandidatePolicy::Discard => "discard",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown past-candidate policy: {0} (expected repair, honor or discard)")]
pub struct UnknownPolicy(String);

impl FromStr for PastCandidatePolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "repair" => Ok(PastCandidatePolicy::Repair),
            "honor" | "honour" => Ok(PastCandidatePolicy::Honor),
            "discard" => Ok(PastCandidatePolicy::Discard),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverPolicy {
    /// Time of day given to bare dates and day-level phrases.
    pub default_time: NaiveTime,
    pub past_candidate: PastCandidatePolicy,
    /// Candidates more than this many years before the reference year are implausible.
    pub max_year_lag: i32,
    /// Years known to be placeholders from the extractor; always implausible.
    pub sentinel_years: Vec<i32>,
}

impl Default for ResolverPolicy {
    fn default() -> Self {
        Self {
            default_time: NaiveTime::from_hms_opt(9, 0, 0).expect("09:00 is a valid time"),
            past_candidate: PastCandidatePolicy::default(),
            max_year_lag: 10,
            sentinel_years: Vec::new(),
        }
    }
}

/// Which strategy produced a due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueSource {
    StructuredCandidate,
    HeuristicPhrase,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub due: Option<DateTime<Tz>>,
    pub source: DueSource,
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    StructuredCandidate,
    HeuristicPhrase,
}

const STRATEGIES: [Strategy; 2] = [Strategy::StructuredCandidate, Strategy::HeuristicPhrase];

impl Strategy {
    fn source(self) -> DueSource {
        match self {
            Strategy::StructuredCandidate => DueSource::StructuredCandidate,
            Strategy::HeuristicPhrase => DueSource::HeuristicPhrase,
        }
    }
}

struct Inputs<'a> {
    raw_text: &'a str,
    candidate_due: Option<&'a str>,
    now: DateTime<Tz>,
    zone: Tz,
}

/// Due-date resolver: a structured candidate first, then phrase matching, then nothing.
///
/// Pure with respect to its inputs. The reference instant is always passed in, so the same
/// call always yields the same answer.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    policy: ResolverPolicy,
}

impl Resolver {
    pub fn new(policy: ResolverPolicy) -> Self {
        Self { policy }
    }

    pub fn resolve(
        &self,
        raw_text: &str,
        candidate_due: Option<&str>,
        reference_now: DateTime<Utc>,
        zone: Tz,
    ) -> Option<DateTime<Tz>> {
        self.resolve_detailed(raw_text, candidate_due, reference_now, zone)
            .due
    }

    pub fn resolve_detailed(
        &self,
        raw_text: &str,
        candidate_due: Option<&str>,
        reference_now: DateTime<Utc>,
        zone: Tz,
    ) -> Resolution {
        let inputs = Inputs {
            raw_text,
            candidate_due,
            now: reference_now.with_timezone(&zone),
            zone,
        };

        for strategy in STRATEGIES {
            if let Some(due) = self.apply(strategy, &inputs) {
                debug!(?strategy, due = %due.to_rfc3339(), "due date resolved");
                return Resolution {
                    due: Some(due),
                    source: strategy.source(),
                };
            }
            trace!(?strategy, "strategy had no opinion");
        }

        Resolution {
            due: None,
            source: DueSource::None,
        }
    }

    fn apply(&self, strategy: Strategy, inputs: &Inputs<'_>) -> Option<DateTime<Tz>> {
        match strategy {
            Strategy::StructuredCandidate => self.from_candidate(inputs),
            Strategy::HeuristicPhrase => {
                phrases::match_phrase(inputs.raw_text, inputs.now, self.policy.default_time)
            }
        }
    }

    fn from_candidate(&self, inputs: &Inputs<'_>) -> Option<DateTime<Tz>> {
        let raw = inputs.candidate_due.map(str::trim).filter(|s| !s.is_empty())?;
        let Some(parsed) = parse_candidate_due(raw, inputs.zone, self.policy.default_time) else {
            debug!(candidate = raw, "unparseable candidate due date");
            return None;
        };

        if self.is_implausible_year(parsed.year(), inputs.now.year()) {
            debug!(candidate = raw, year = parsed.year(), "implausible candidate year");
            return None;
        }

        if self.policy.past_candidate == PastCandidatePolicy::Honor {
            return Some(parsed);
        }

        if parsed >= inputs.now {
            return Some(parsed);
        }

        match self.policy.past_candidate {
            PastCandidatePolicy::Repair if !phrases::mentions_year(inputs.raw_text) => {
                let repaired = advance_year(parsed, inputs.now, inputs.zone);
                if let Some(due) = &repaired {
                    debug!(
                        candidate = raw,
                        repaired = %due.to_rfc3339(),
                        "advanced past candidate year"
                    );
                }
                repaired
            }
            _ => {
                debug!(candidate = raw, "past candidate ignored");
                None
            }
        }
    }

    fn is_implausible_year(&self, year: i32, reference_year: i32) -> bool {
        self.policy.sentinel_years.contains(&year)
            || year < reference_year - self.policy.max_year_lag
    }
}

/// Resolve with [`ResolverPolicy::default`].
pub fn resolve(
    raw_text: &str,
    candidate_due: Option<&str>,
    reference_now: DateTime<Utc>,
    zone: Tz,
) -> Option<DateTime<Tz>> {
    Resolver::default().resolve(raw_text, candidate_due, reference_now, zone)
}

/// Parse the extractor's due-date string. Values without an offset are wall-clock times in
/// `zone`; a bare date gets `default_time`.
pub fn parse_candidate_due(raw: &str, zone: Tz, default_time: NaiveTime) -> Option<DateTime<Tz>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&zone));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&zone));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(localize(zone, naive));
        }
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(localize(zone, date.and_time(default_time)))
}

/// Same wall-clock month, day and time in the first later year that is not before `now`.
/// Years where the date does not exist (29 February) are skipped.
fn advance_year(parsed: DateTime<Tz>, now: DateTime<Tz>, zone: Tz) -> Option<DateTime<Tz>> {
    let wall = parsed.naive_local();
    let last_year = now.year() + 8;
    (wall.year() + 1..=last_year)
        .filter_map(|year| wall.with_year(year))
        .map(|shifted| localize(zone, shifted))
        .find(|candidate| *candidate >= now)
}
