//! Turns loosely extracted task fields into a task with a trustworthy due date.
//!
//! The [`Resolver`] prefers the due date proposed by an extraction step, repairs the usual
//! "wrong year" defect, and otherwise falls back to relative-date phrases in the user's own
//! text. Everything is evaluated against an explicit reference instant.

pub mod candidate;
pub mod phrases;
pub mod resolver;
pub mod task;
pub mod zone;

pub use candidate::{parse_candidate, CandidateError, TaskCandidate};
pub use chrono_tz::Tz;
pub use resolver::{
    parse_candidate_due, resolve, DueSource, PastCandidatePolicy, Resolution, Resolver,
    ResolverPolicy, UnknownPolicy,
};
pub use task::ResolvedTask;
pub use zone::{localize, parse_zone, ZoneError};
