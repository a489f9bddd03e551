//! Transactional entity-relationship reconciliation.
//!
//! # Responsibility
//! - Resolve dependents, diff association slots and commit an aggregate as
//!   one atomic batch.
//!
//! # Invariants
//! - Validation and resolution failures abort before any write.
//! - Commit failures roll back the whole batch and are never retried here.
//! - Dependent auto-creation happens outside the batch (see `resolver`).

pub mod differ;
pub mod error;
pub mod orchestrator;
pub mod resolver;
