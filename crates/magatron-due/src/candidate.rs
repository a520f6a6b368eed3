use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum CandidateError {
    #[error("empty extraction output")]
    Empty,
    #[error("extraction output contained no JSON object")]
    NoJsonObject,
    #[error("invalid task JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("task has no title")]
    MissingTitle,
}

/// Task fields as proposed by the extraction step, before the due date is resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCandidate {
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(
        default,
        rename = "due_date",
        alias = "due",
        deserialize_with = "loose_string"
    )]
    pub due_raw: Option<String>,
    #[serde(default, deserialize_with = "loose_labels")]
    pub labels: Vec<String>,
}

impl TaskCandidate {
    /// Trim every field, drop placeholder due dates and blank or repeated labels.
    pub fn normalize(self) -> Self {
        let due_raw = self
            .due_raw
            .map(|s| s.trim().to_string())
            .filter(|s| !is_placeholder(s));

        let mut seen = HashSet::new();
        let labels = self
            .labels
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .filter(|l| seen.insert(l.to_lowercase()))
            .collect();

        Self {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            due_raw,
            labels,
        }
    }

    pub fn validate(&self) -> Result<(), CandidateError> {
        if self.title.trim().is_empty() {
            return Err(CandidateError::MissingTitle);
        }
        Ok(())
    }
}

/// Parse a model reply into a normalized candidate.
///
/// Accepts bare JSON, JSON inside Markdown code fences, or JSON surrounded by prose (the
/// outermost `{...}` span is used). The title is not checked here; see
/// [`TaskCandidate::validate`].
pub fn parse_candidate(text: &str) -> Result<TaskCandidate, CandidateError> {
    let t = strip_code_fences(text).trim();
    if t.is_empty() {
        return Err(CandidateError::Empty);
    }

    if let Ok(v) = serde_json::from_str::<TaskCandidate>(t) {
        return Ok(v.normalize());
    }

    let (Some(start), Some(end)) = (t.find('{'), t.rfind('}')) else {
        return Err(CandidateError::NoJsonObject);
    };
    if end <= start {
        return Err(CandidateError::NoJsonObject);
    }
    let candidate: TaskCandidate = serde_json::from_str(&t[start..=end])?;
    Ok(candidate.normalize())
}

fn strip_code_fences(s: &str) -> &str {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        return rest.trim().trim_end_matches("```").trim();
    }
    if let Some(rest) = s.strip_prefix("```") {
        return rest.trim().trim_end_matches("```").trim();
    }
    s
}

fn is_placeholder(s: &str) -> bool {
    matches!(
        s.to_ascii_lowercase().as_str(),
        "" | "null" | "none" | "n/a" | "-"
    )
}

fn null_as_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

// Models return labels as an array, a comma-separated string or null.
fn loose_labels<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Value::String(s) => s.split(',').map(str::to_string).collect(),
        _ => Vec::new(),
    })
}
