use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::error::ImportError;
use crate::model::{
    DraftEntry, EntryReport, Existence, NewTimeEntry, SubmissionOutcome, SubmitReport,
};
use crate::session::RemoteSession;

/// Creates the new entries of a reconciled batch on the server.
///
/// One submission runs at a time. With `concurrency` 1 entries are created
/// strictly one after another; higher values keep up to that many requests in
/// flight. Either way the report follows batch order and a failed entry never
/// stops the others.
pub struct SubmissionController {
    session: Arc<RemoteSession>,
    concurrency: usize,
    busy: AtomicBool,
}

/// Clears the busy flag however the submission ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SubmissionController {
    pub fn new(session: Arc<RemoteSession>, concurrency: usize) -> Self {
        Self {
            session,
            concurrency: concurrency.max(1),
            busy: AtomicBool::new(false),
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn acquire(&self) -> Result<BusyGuard<'_>, ImportError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| BusyGuard(&self.busy))
            .map_err(|_| ImportError::Busy)
    }

    #[instrument(skip_all, fields(entries = entries.len()))]
    pub async fn submit(&self, entries: &[DraftEntry]) -> Result<SubmitReport, ImportError> {
        let _guard = self.acquire()?;
        if entries.iter().any(|e| e.existence == Existence::Unknown) {
            return Err(ImportError::ReconcileRequired);
        }

        let api_key = self.session.api_key().await?;
        let project_id = self.session.project_id().await?;
        let activities = self.session.activity_ids().await?;

        // Collected before awaiting so the returned future stays `Send`.
        let pending: Vec<_> = entries
            .iter()
            .map(|entry| self.submit_one(entry, api_key, project_id, activities))
            .collect();
        let outcomes = stream::iter(pending)
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let report = SubmitReport { outcomes };
        info!(
            created = report.created(),
            skipped = report.skipped(),
            failed = report.failed().len(),
            "submission finished"
        );
        Ok(report)
    }

    async fn submit_one(
        &self,
        entry: &DraftEntry,
        api_key: &str,
        project_id: u64,
        activities: &HashMap<String, u64>,
    ) -> EntryReport {
        let outcome = if entry.existence == Existence::Exists {
            SubmissionOutcome::Skipped
        } else {
            match activities.get(&entry.category) {
                None => SubmissionOutcome::Failed(ImportError::UnknownCategory(
                    entry.category.clone(),
                )),
                Some(&activity_id) => {
                    let body = NewTimeEntry::from_draft(entry, project_id, activity_id);
                    match self.session.api().create_time_entry(api_key, &body).await {
                        Ok(remote_id) => SubmissionOutcome::Created { remote_id },
                        Err(err) => SubmissionOutcome::Failed(err),
                    }
                }
            }
        };
        if let SubmissionOutcome::Failed(err) = &outcome {
            warn!(%err, date = %entry.date, category = %entry.category, "entry not created");
        }
        EntryReport {
            entry: entry.clone(),
            outcome,
        }
    }
}
