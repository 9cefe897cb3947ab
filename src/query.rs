//! Filtering and ordering over the session index.

use std::cmp::Ordering;
use std::fmt;

use crate::index::SessionIndexEntry;

/// How to select sessions from the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    /// Every entry, newest first
    All,
    /// The N most recently archived entries
    Last(usize),
    /// Entries whose `archivedAt` starts with the given prefix (e.g. `2026-03-01`)
    Date(String),
    /// Entries whose project id contains the text, ignoring case
    Project(String),
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::All => write!(f, "all sessions"),
            Query::Last(n) => write!(f, "last {n} sessions"),
            Query::Date(d) => write!(f, "sessions archived on {d}"),
            Query::Project(p) => write!(f, "sessions in projects matching '{p}'"),
        }
    }
}

/// Newest first; ties broken by device, project and uuid so output is stable
fn newest_first(a: &SessionIndexEntry, b: &SessionIndexEntry) -> Ordering {
    b.archived_at
        .cmp(&a.archived_at)
        .then_with(|| a.device.cmp(&b.device))
        .then_with(|| a.project_id.cmp(&b.project_id))
        .then_with(|| a.uuid.cmp(&b.uuid))
}

/// Run `query` over `entries`, returning the full filtered and sorted result.
pub fn run(entries: &[SessionIndexEntry], query: &Query) -> Vec<SessionIndexEntry> {
    let mut selected: Vec<SessionIndexEntry> = match query {
        Query::All | Query::Last(_) => entries.to_vec(),
        Query::Date(prefix) => entries
            .iter()
            .filter(|e| e.archived_at.starts_with(prefix.as_str()))
            .cloned()
            .collect(),
        Query::Project(needle) => {
            let needle = needle.to_lowercase();
            entries
                .iter()
                .filter(|e| e.project_id.to_lowercase().contains(&needle))
                .cloned()
                .collect()
        }
    };

    selected.sort_by(newest_first);

    if let Query::Last(n) = query {
        selected.truncate(*n);
    }
    selected
}
