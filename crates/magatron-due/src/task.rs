use chrono::{DateTime, FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::candidate::{CandidateError, TaskCandidate};
use crate::resolver::{DueSource, Resolver};

/// A validated task with its due date resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTask {
    pub title: String,
    pub description: String,
    /// RFC 3339 in the zone the task was resolved in.
    pub due: Option<DateTime<FixedOffset>>,
    pub due_source: DueSource,
    pub labels: Vec<String>,
}

impl ResolvedTask {
    pub fn assemble(
        candidate: TaskCandidate,
        raw_text: &str,
        reference_now: DateTime<Utc>,
        zone: Tz,
        resolver: &Resolver,
    ) -> Result<Self, CandidateError> {
        let candidate = candidate.normalize();
        candidate.validate()?;

        let resolution = resolver.resolve_detailed(
            raw_text,
            candidate.due_raw.as_deref(),
            reference_now,
            zone,
        );

        Ok(Self {
            title: candidate.title,
            description: candidate.description,
            due: resolution
                .due
                .map(|due| due.with_timezone(&due.offset().fix())),
            due_source: resolution.source,
            labels: candidate.labels,
        })
    }
}
