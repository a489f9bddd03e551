//! Aggregate use-case services.
//!
//! # Responsibility
//! - Turn request objects into reconciliation lifecycles.
//! - Keep transport layers decoupled from storage and batch details.
//!
//! # Invariants
//! - Services hold no per-request state; each call starts its own
//!   `Reconciliation` and drops it before returning.

use crate::reconcile::error::{ReconcileResult, CODE_STORAGE};
use crate::reconcile::orchestrator::ReconcileConfig;
use crate::repo::store::{EntityStore, WriteBatch};
use log::{error, info};
use std::time::Instant;
use uuid::Uuid;

pub mod author_service;
pub mod endpoint_service;
pub mod faq_service;

/// Commits a create or delete batch outside the update lifecycle.
pub(crate) fn commit_batch<S: EntityStore + ?Sized>(
    store: &S,
    config: &ReconcileConfig,
    batch: WriteBatch,
    id: Uuid,
) -> ReconcileResult<()> {
    let started_at = Instant::now();
    let batch = batch.with_deadline(config.deadline());
    match store.run_atomic(&batch) {
        Ok(receipt) => {
            info!(
                "event={} module=service status=ok id={} statements={} duration_ms={}",
                batch.name(),
                id,
                receipt.statements,
                started_at.elapsed().as_millis()
            );
            Ok(())
        }
        Err(failure) => {
            error!(
                "event={} module=service status=error id={} error_code={} duration_ms={}",
                batch.name(),
                id,
                CODE_STORAGE,
                started_at.elapsed().as_millis()
            );
            Err(failure.into())
        }
    }
}
