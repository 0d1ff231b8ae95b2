use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::ImportError;

/// Redmine rejects time entry comments longer than this many UTF-16 code units.
pub const MAX_COMMENTS_LEN: usize = 1024;

/// Reconciliation state of a draft entry.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Existence {
    /// Not reconciled yet.
    #[default]
    Unknown,
    /// A matching entry already exists on the server.
    Exists,
    /// No matching entry was found.
    Absent,
}

impl Existence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Existence::Unknown => "unknown",
            Existence::Exists => "exists",
            Existence::Absent => "new",
        }
    }
}

/// One parsed, not yet submitted unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DraftEntry {
    pub category: String,
    pub task_id: Option<u64>,
    pub description: String,
    pub hours: f64,
    pub date: NaiveDate,
    pub existence: Existence,
}

impl DraftEntry {
    /// Description as it is sent to (and compared against) the server.
    pub fn comments(&self) -> &str {
        truncate_comments(&self.description)
    }

    pub fn spent_on(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }

    /// Same entry with the reconciliation state replaced.
    pub fn with_existence(&self, existence: Existence) -> Self {
        Self {
            existence,
            ..self.clone()
        }
    }
}

/// Cut `text` to at most [`MAX_COMMENTS_LEN`] UTF-16 code units without
/// splitting a character.
pub fn truncate_comments(text: &str) -> &str {
    let mut units = 0;
    for (idx, ch) in text.char_indices() {
        units += ch.len_utf16();
        if units > MAX_COMMENTS_LEN {
            return &text[..idx];
        }
    }
    text
}

/// Entries produced by one paste, tagged with an id so a superseded
/// reconciliation can be told apart from the current one.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub id: Uuid,
    pub entries: Vec<DraftEntry>,
}

impl Batch {
    pub fn new(entries: Vec<DraftEntry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            entries,
        }
    }

    pub fn is_reconciled(&self) -> bool {
        self.entries
            .iter()
            .all(|e| e.existence != Existence::Unknown)
    }
}

/// A time entry as returned by `GET /time_entries.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteTimeEntry {
    #[serde(default)]
    pub id: Option<u64>,
    pub hours: f64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub comments: String,
    pub spent_on: NaiveDate,
}

/// Redmine sends `"comments": null` for entries saved without one.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Body of `POST /time_entries.json`, wrapped in `{"time_entry": ...}` on the wire.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewTimeEntry {
    pub issue_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<u64>,
    pub spent_on: String,
    pub hours: f64,
    pub comments: String,
    pub activity_id: u64,
}

impl NewTimeEntry {
    /// `project_id` is only sent when the entry is not charged to an issue.
    pub fn from_draft(entry: &DraftEntry, project_id: u64, activity_id: u64) -> Self {
        Self {
            issue_id: entry.task_id,
            project_id: entry.task_id.is_none().then_some(project_id),
            spent_on: entry.spent_on(),
            hours: entry.hours,
            comments: entry.comments().to_string(),
            activity_id,
        }
    }
}

/// A project from `GET /projects.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: u64,
    pub identifier: String,
    #[serde(default)]
    pub name: String,
}

/// One label/value pair of the activity select on the entry form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityOption {
    pub name: String,
    pub id: u64,
}

#[derive(Debug)]
pub enum SubmissionOutcome {
    Created { remote_id: Option<u64> },
    Skipped,
    Failed(ImportError),
}

#[derive(Debug)]
pub struct EntryReport {
    pub entry: DraftEntry,
    pub outcome: SubmissionOutcome,
}

/// Per-entry results of one submission, in batch order.
#[derive(Debug, Default)]
pub struct SubmitReport {
    pub outcomes: Vec<EntryReport>,
}

impl SubmitReport {
    pub fn created(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|r| matches!(r.outcome, SubmissionOutcome::Created { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|r| matches!(r.outcome, SubmissionOutcome::Skipped))
            .count()
    }

    pub fn failed(&self) -> Vec<(&DraftEntry, &ImportError)> {
        self.outcomes
            .iter()
            .filter_map(|r| match &r.outcome {
                SubmissionOutcome::Failed(err) => Some((&r.entry, err)),
                _ => None,
            })
            .collect()
    }
}
