//! Reconciliation lifecycle driver.
//!
//! # Responsibility
//! - Enforce the stage order of one update:
//!   `Start -> Validated -> Loaded -> DependentsResolved -> Diffed -> Committed`,
//!   with `Aborted` reachable from any non-terminal stage.
//! - Diff association slots against rows loaded at diff time.
//! - Assemble the commit batch: removals, then additions, then the root update.
//!
//! # Invariants
//! - No statement reaches the store before `Diffed`.
//! - One `Reconciliation` serves exactly one request and is dropped after it;
//!   nothing is shared across requests.

use crate::reconcile::differ::{diff_associations, AssociationDiff};
use crate::reconcile::error::{FailureKind, ReconcileError, ReconcileResult};
use crate::repo::store::{
    AssociationRow, AssociationSlot, EntityKind, EntityStore, WriteBatch, WriteStatement,
};
use log::{debug, error, info, warn};
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use uuid::Uuid;

const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Stage reached by one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReconcileStage {
    Start,
    Validated,
    Loaded,
    DependentsResolved,
    Diffed,
    Committed,
    Aborted,
}

impl ReconcileStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Validated => "validated",
            Self::Loaded => "loaded",
            Self::DependentsResolved => "dependents_resolved",
            Self::Diffed => "diffed",
            Self::Committed => "committed",
            Self::Aborted => "aborted",
        }
    }

    fn successor(self) -> Option<Self> {
        match self {
            Self::Start => Some(Self::Validated),
            Self::Validated => Some(Self::Loaded),
            Self::Loaded => Some(Self::DependentsResolved),
            Self::DependentsResolved => Some(Self::Diffed),
            Self::Diffed => Some(Self::Committed),
            Self::Committed | Self::Aborted => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

/// Per-service reconciliation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Upper bound for the commit batch, measured from the start of commit.
    /// `None` waits as long as the connection busy timeout allows.
    pub commit_timeout: Option<Duration>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            commit_timeout: Some(DEFAULT_COMMIT_TIMEOUT),
        }
    }
}

impl ReconcileConfig {
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.commit_timeout.map(|timeout| Instant::now() + timeout)
    }
}

/// Planned changes for one association slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPlan {
    pub slot: AssociationSlot,
    pub diff: AssociationDiff<Uuid>,
    /// Join rows to insert, one per `diff.to_add` entry.
    pub additions: Vec<AssociationRow>,
}

/// One update lifecycle for one aggregate root.
pub struct Reconciliation<'s, S: EntityStore + ?Sized> {
    store: &'s S,
    config: ReconcileConfig,
    entity: EntityKind,
    root_id: Uuid,
    stage: ReconcileStage,
    slots: Vec<SlotPlan>,
    started_at: Instant,
}

impl<'s, S: EntityStore + ?Sized> Reconciliation<'s, S> {
    pub fn start(store: &'s S, config: ReconcileConfig, entity: EntityKind, root_id: Uuid) -> Self {
        debug!(
            "event=reconcile module=reconcile status=start entity={} id={}",
            entity.label(),
            root_id
        );
        Self {
            store,
            config,
            entity,
            root_id,
            stage: ReconcileStage::Start,
            slots: Vec::new(),
            started_at: Instant::now(),
        }
    }

    pub fn stage(&self) -> ReconcileStage {
        self.stage
    }

    pub fn root_id(&self) -> Uuid {
        self.root_id
    }

    pub fn slot_plans(&self) -> &[SlotPlan] {
        &self.slots
    }

    /// Moves to `next`, which must be the immediate successor stage.
    pub fn advance(&mut self, next: ReconcileStage) -> ReconcileResult<()> {
        if self.stage.successor() != Some(next) {
            return Err(ReconcileError::InvalidTransition {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        debug!(
            "event=reconcile module=reconcile status=progress entity={} id={} stage={}",
            self.entity.label(),
            self.root_id,
            next.as_str()
        );
        Ok(())
    }

    /// Accepts the loaded root, or fails with not-found.
    pub fn require_root<T>(&mut self, loaded: Option<T>) -> ReconcileResult<T> {
        let root = loaded.ok_or(ReconcileError::RootNotFound {
            entity: self.entity,
            id: self.root_id,
        })?;
        self.advance(ReconcileStage::Loaded)?;
        Ok(root)
    }

    /// Diffs one slot against its rows as they are persisted right now.
    pub fn diff_slot(
        &mut self,
        slot: AssociationSlot,
        desired: &BTreeSet<Uuid>,
    ) -> ReconcileResult<&SlotPlan> {
        if self.stage != ReconcileStage::DependentsResolved {
            return Err(ReconcileError::InvalidTransition {
                from: self.stage,
                to: ReconcileStage::Diffed,
            });
        }

        let current = self.store.list_association_ids(self.root_id, slot)?;
        let diff = diff_associations(&current, desired);
        let additions = diff
            .to_add
            .iter()
            .map(|child_id| AssociationRow::new(self.root_id, *child_id))
            .collect();
        debug!(
            "event=reconcile_diff module=reconcile entity={} id={} slot={} current={} desired={} added={} removed={}",
            self.entity.label(),
            self.root_id,
            slot.label(),
            current.len(),
            desired.len(),
            diff.to_add.len(),
            diff.to_remove.len()
        );

        self.slots.push(SlotPlan {
            slot,
            diff,
            additions,
        });
        Ok(&self.slots[self.slots.len() - 1])
    }

    /// Builds the commit batch: every removal, then every addition, then the
    /// root update.
    pub fn build_batch(&self, root_update: WriteStatement) -> WriteBatch {
        let mut batch = WriteBatch::new(self.entity.label());
        for plan in &self.slots {
            batch.extend(
                plan.diff
                    .to_remove
                    .iter()
                    .map(|child_id| plan.slot.delete_row(self.root_id, *child_id)),
            );
        }
        for plan in &self.slots {
            batch.extend(plan.additions.iter().map(|row| plan.slot.insert_row(row)));
        }
        batch.push(root_update);
        batch.with_deadline(self.config.deadline())
    }

    /// Commits the planned batch atomically and returns the root id.
    pub fn commit(&mut self, root_update: WriteStatement) -> ReconcileResult<Uuid> {
        if self.stage != ReconcileStage::Diffed {
            return Err(ReconcileError::InvalidTransition {
                from: self.stage,
                to: ReconcileStage::Committed,
            });
        }
        let batch = self.build_batch(root_update);
        self.store.run_atomic(&batch)?;
        self.advance(ReconcileStage::Committed)?;
        Ok(self.root_id)
    }

    /// Closes the lifecycle: logs the outcome and marks failures as aborted.
    pub fn finish<T>(mut self, result: ReconcileResult<T>) -> ReconcileResult<T> {
        let duration_ms = self.started_at.elapsed().as_millis();
        match &result {
            Ok(_) => {
                let (added, removed) = self.slots.iter().fold((0, 0), |(a, r), plan| {
                    (a + plan.diff.to_add.len(), r + plan.diff.to_remove.len())
                });
                info!(
                    "event=reconcile module=reconcile status=ok entity={} id={} stage={} added={} removed={} duration_ms={}",
                    self.entity.label(),
                    self.root_id,
                    self.stage.as_str(),
                    added,
                    removed,
                    duration_ms
                );
            }
            Err(err) => {
                let reached = self.stage;
                self.stage = ReconcileStage::Aborted;
                match err.kind() {
                    FailureKind::Business => warn!(
                        "event=reconcile module=reconcile status=aborted entity={} id={} stage={} error_code={} duration_ms={}",
                        self.entity.label(),
                        self.root_id,
                        reached.as_str(),
                        err.code(),
                        duration_ms
                    ),
                    FailureKind::Technical => error!(
                        "event=reconcile module=reconcile status=aborted entity={} id={} stage={} error_code={} duration_ms={} error={}",
                        self.entity.label(),
                        self.root_id,
                        reached.as_str(),
                        err.code(),
                        duration_ms,
                        err
                    ),
                }
            }
        }
        result
    }
}
