//! Uniform response envelope for transport adapters.
//!
//! # Responsibility
//! - Wrap every operation result as `{ payload, exception }`.
//! - Map reconciliation failures to a stable `{code, description, category}`.
//! - Turn panics into the unclassified failure instead of unwinding into the
//!   caller.
//!
//! # Invariants
//! - Exactly one of `payload` / `exception` is set.
//! - Descriptions never expose storage internals.

use crate::logging::sanitize_message;
use crate::reconcile::error::{FailureKind, ReconcileResult, CODE_UNCLASSIFIED};
use log::error;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use uuid::Uuid;

const UNCLASSIFIED_DESCRIPTION: &str =
    "A technical exception has occurred, please contact your system administrator";

/// Failure payload embedded in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseException {
    /// Correlates the response with its log line.
    pub id: Uuid,
    pub code: String,
    pub description: String,
    pub category: FailureKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response<T> {
    pub payload: Option<T>,
    pub exception: Option<ResponseException>,
}

impl<T> Response<T> {
    pub fn ok(payload: T) -> Self {
        Self {
            payload: Some(payload),
            exception: None,
        }
    }

    pub fn failed(exception: ResponseException) -> Self {
        Self {
            payload: None,
            exception: Some(exception),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.exception.is_none()
    }
}

/// Runs `op`, mapping its error or panic into the envelope.
pub fn execute_safely<T>(op: impl FnOnce() -> ReconcileResult<T>) -> Response<T> {
    match catch_unwind(AssertUnwindSafe(op)) {
        Ok(Ok(payload)) => Response::ok(payload),
        Ok(Err(err)) => {
            let exception = ResponseException {
                id: Uuid::new_v4(),
                code: err.code().to_string(),
                description: err.description(),
                category: err.kind(),
            };
            if exception.category == FailureKind::Technical {
                error!(
                    "event=execute module=envelope status=error exception_id={} error_code={} error={}",
                    exception.id, exception.code, err
                );
            }
            Response::failed(exception)
        }
        Err(panic) => {
            let exception = ResponseException {
                id: Uuid::new_v4(),
                code: CODE_UNCLASSIFIED.to_string(),
                description: UNCLASSIFIED_DESCRIPTION.to_string(),
                category: FailureKind::Technical,
            };
            let payload = panic
                .downcast_ref::<&str>()
                .map(|message| (*message).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            error!(
                "event=execute module=envelope status=panic exception_id={} error_code={} payload={}",
                exception.id,
                exception.code,
                sanitize_message(&payload, 160)
            );
            Response::failed(exception)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::validation::ValidationError;
    use crate::reconcile::error::ReconcileError;

    #[test]
    fn success_carries_payload_only() {
        let response = execute_safely(|| Ok(7));
        assert!(response.is_ok());
        assert_eq!(response.payload, Some(7));
    }

    #[test]
    fn business_failure_keeps_its_code_and_category() {
        let response: Response<()> = execute_safely(|| {
            Err(ReconcileError::from(ValidationError::MissingField("status")))
        });
        let exception = response.exception.unwrap();
        assert_eq!(exception.code, "DP-422");
        assert_eq!(exception.category, FailureKind::Business);
        assert!(response.payload.is_none());
    }

    #[test]
    fn panic_becomes_unclassified_failure() {
        let response: Response<()> = execute_safely(|| panic!("boom"));
        let exception = response.exception.unwrap();
        assert_eq!(exception.code, CODE_UNCLASSIFIED);
        assert_eq!(exception.description, UNCLASSIFIED_DESCRIPTION);
        assert_eq!(exception.category, FailureKind::Technical);
    }
}
