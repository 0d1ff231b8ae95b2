use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::ImportError;
use crate::model::{DraftEntry, Existence, RemoteTimeEntry};
use crate::redmine::{TimeEntryQuery, MAX_PAGE_SIZE};
use crate::session::RemoteSession;

/// Inclusive range of dates covered by `entries`.
pub fn date_span(entries: &[DraftEntry]) -> Option<(NaiveDate, NaiveDate)> {
    let min = entries.iter().map(|e| e.date).min()?;
    let max = entries.iter().map(|e| e.date).max()?;
    Some((min, max))
}

/// An entry already exists when the server has one with the same hours,
/// comments and day. Comments are compared after truncation.
pub fn matches(entry: &DraftEntry, remote: &RemoteTimeEntry) -> bool {
    remote.hours == entry.hours && remote.comments == entry.comments() && remote.spent_on == entry.date
}

/// Label every entry against a fixed list of server entries.
pub fn classify(entries: &[DraftEntry], remote: &[RemoteTimeEntry]) -> Vec<DraftEntry> {
    entries
        .iter()
        .map(|entry| {
            let existence = if remote.iter().any(|r| matches(entry, r)) {
                Existence::Exists
            } else {
                Existence::Absent
            };
            entry.with_existence(existence)
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct ReconcileOptions {
    pub page_size: u32,
    pub max_pages: u32,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            page_size: MAX_PAGE_SIZE,
            max_pages: 10,
        }
    }
}

pub struct Reconciler {
    session: Arc<RemoteSession>,
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(session: Arc<RemoteSession>, options: ReconcileOptions) -> Self {
        Self { session, options }
    }

    /// Entries of the current user in the current project between `from` and `to`.
    #[instrument(skip(self))]
    pub async fn fetch_remote(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<RemoteTimeEntry>, ImportError> {
        let key = self.session.api_key().await?;
        let project_id = self.session.project_id().await?;
        let user_id = self.session.current_user_id()?;

        let limit = self.options.page_size.clamp(1, MAX_PAGE_SIZE);
        let mut remote = Vec::new();
        for page in 0..self.options.max_pages.max(1) {
            let query = TimeEntryQuery {
                from,
                to,
                project_id,
                user_id,
                limit,
                offset: page * limit,
            };
            let result = self.session.api().list_time_entries(key, &query).await?;
            let received = result.time_entries.len() as u32;
            remote.extend(result.time_entries);

            let more = match result.total_count {
                Some(total) => query.offset + received < total,
                // Without a total only a short page is known to be the last one.
                None => received == limit,
            };
            if received == 0 || !more {
                return Ok(remote);
            }
        }
        warn!(
            fetched = remote.len(),
            max_pages = self.options.max_pages,
            "page limit reached; existing entries may be missed"
        );
        Ok(remote)
    }

    /// Annotated copy of `entries`; the input is left untouched.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn reconcile(
        &self,
        entries: &[DraftEntry],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DraftEntry>, ImportError> {
        let remote = self.fetch_remote(from, to).await?;
        let annotated = classify(entries, &remote);
        let existing = annotated
            .iter()
            .filter(|e| e.existence == Existence::Exists)
            .count();
        info!(remote = remote.len(), existing, "reconciled batch");
        Ok(annotated)
    }

    /// Reconcile over the span the batch itself covers.
    pub async fn reconcile_batch(&self, entries: &[DraftEntry]) -> Result<Vec<DraftEntry>, ImportError> {
        match date_span(entries) {
            Some((from, to)) => self.reconcile(entries, from, to).await,
            None => Ok(Vec::new()),
        }
    }
}
