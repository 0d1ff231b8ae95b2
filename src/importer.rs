//! Sequencing of import, reconcile and submit for one page session.
//!
//! A new import replaces the current batch immediately. A reconciliation only
//! lands if its batch is still the current one when it completes, so results
//! for a replaced batch are dropped instead of merged. After a submission the
//! batch must be reconciled again before it can be submitted a second time, and
//! a reconciliation that started before the submission finished is dropped too.
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ImportError;
use crate::model::{Batch, DraftEntry, Existence, SubmitReport};
use crate::parser;
use crate::reconcile::{ReconcileOptions, Reconciler};
use crate::session::RemoteSession;
use crate::submit::SubmissionController;

/// Receives the batch every time its contents or reconciliation state change.
pub trait Renderer: Send + Sync {
    fn render(&self, batch: &Batch);
}

/// Renderer that draws nothing.
pub struct NoopRenderer;

impl Renderer for NoopRenderer {
    fn render(&self, _batch: &Batch) {}
}

struct Current {
    batch: Batch,
    /// Set until a reconciliation for this batch lands, and again after a submission.
    needs_reconcile: bool,
    /// Bumped by every finished submission. A reconciliation only lands on the
    /// generation it read the server for.
    generation: u64,
}

pub struct Importer {
    reconciler: Reconciler,
    controller: SubmissionController,
    renderer: Arc<dyn Renderer>,
    current: Mutex<Option<Current>>,
}

impl Importer {
    pub fn new(
        session: Arc<RemoteSession>,
        options: ReconcileOptions,
        concurrency: usize,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(session.clone(), options),
            controller: SubmissionController::new(session, concurrency),
            renderer,
            current: Mutex::new(None),
        }
    }

    pub async fn current_batch(&self) -> Option<Batch> {
        self.current.lock().await.as_ref().map(|c| c.batch.clone())
    }

    pub fn is_submitting(&self) -> bool {
        self.controller.is_busy()
    }

    /// Parse `raw`, make it the current batch and reconcile it.
    ///
    /// A parse failure leaves the previous batch in place.
    #[instrument(skip_all)]
    pub async fn import(&self, raw: &str) -> Result<Batch, ImportError> {
        let batch = Batch::new(parser::parse(raw)?);
        info!(batch = %batch.id, entries = batch.entries.len(), "parsed timesheet");
        *self.current.lock().await = Some(Current {
            batch: batch.clone(),
            needs_reconcile: true,
            generation: 0,
        });
        self.renderer.render(&batch);

        let result = self.reconciler.reconcile_batch(&batch.entries).await;
        self.land_reconciliation(batch.id, 0, result).await
    }

    /// Check the current batch against the server again.
    ///
    /// The result is dropped with `Superseded` if a submission of the batch
    /// finishes while the check is running.
    #[instrument(skip_all)]
    pub async fn reconcile_current(&self) -> Result<Batch, ImportError> {
        let (batch, generation) = {
            let mut current = self.current.lock().await;
            let current = current.as_mut().ok_or(ImportError::NoBatch)?;
            current.needs_reconcile = true;
            (current.batch.clone(), current.generation)
        };
        let result = self.reconciler.reconcile_batch(&batch.entries).await;
        self.land_reconciliation(batch.id, generation, result).await
    }

    async fn land_reconciliation(
        &self,
        id: Uuid,
        generation: u64,
        result: Result<Vec<DraftEntry>, ImportError>,
    ) -> Result<Batch, ImportError> {
        let mut current = self.current.lock().await;
        let current = match current.as_mut() {
            Some(current) if current.batch.id == id && current.generation == generation => {
                current
            }
            Some(current) if current.batch.id == id => {
                info!(batch = %id, "dropping reconciliation that overlapped a submission");
                return Err(ImportError::Superseded);
            }
            _ => {
                info!(batch = %id, "dropping reconciliation of a replaced batch");
                return Err(ImportError::Superseded);
            }
        };
        current.batch.entries = result?;
        current.needs_reconcile = false;
        let batch = current.batch.clone();
        self.renderer.render(&batch);
        Ok(batch)
    }

    /// Submit the entries of the current batch that do not exist yet.
    #[instrument(skip_all)]
    pub async fn submit_current(&self) -> Result<SubmitReport, ImportError> {
        let batch = {
            let current = self.current.lock().await;
            match current.as_ref() {
                None => return Err(ImportError::NoBatch),
                Some(c) if c.needs_reconcile || !c.batch.is_reconciled() => {
                    return Err(ImportError::ReconcileRequired)
                }
                Some(c) => c.batch.clone(),
            }
        };

        let report = self.controller.submit(&batch.entries).await?;

        let mut current = self.current.lock().await;
        if let Some(c) = current.as_mut().filter(|c| c.batch.id == batch.id) {
            c.needs_reconcile = true;
            c.generation += 1;
            for entry in c.batch.entries.iter_mut() {
                entry.existence = Existence::Unknown;
            }
            self.renderer.render(&c.batch);
        }
        Ok(report)
    }
}
