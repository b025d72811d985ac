//! Error types for the evaluator runtime

use thiserror::Error;

use crate::context::ContextError;

/// Evaluator runtime errors.
///
/// Every variant ends up in a FAILED status report; `kind()` is the coarse
/// classification carried in the failure payload.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Control message addressed to a different evaluator
    #[error("Identifier mismatch: message for evaluator id [{target}] sent to evaluator id [{own}]")]
    IdentityMismatch { target: String, own: String },

    /// Instruction received in a state that does not accept it
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Context stack rejected a dispatched control payload
    #[error("Context dispatch failed: {0}")]
    Dispatch(#[from] ContextError),

    /// Runtime stop signal arrived while work was still in progress
    #[error("Abnormal stop: {0}")]
    AbnormalStop(String),

    /// Fault escaping all other handlers, captured by the process-wide hook
    #[error("Unhandled fault: {0}")]
    Fault(String),

    /// Local IO failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Coarse classification for the failure payload
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeError::IdentityMismatch { .. } => "identity_mismatch",
            RuntimeError::ProtocolViolation(_) => "protocol_violation",
            RuntimeError::Dispatch(_) => "dispatch",
            RuntimeError::AbnormalStop(_) => "abnormal_stop",
            RuntimeError::Fault(_) => "unhandled_fault",
            RuntimeError::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        let err = RuntimeError::IdentityMismatch {
            target: "eval-2".to_string(),
            own: "eval-1".to_string(),
        };
        assert_eq!(err.kind(), "identity_mismatch");
        assert!(err.to_string().contains("eval-2"));
        assert!(err.to_string().contains("eval-1"));

        assert_eq!(
            RuntimeError::ProtocolViolation("x".to_string()).kind(),
            "protocol_violation"
        );
    }

    #[test]
    fn test_dispatch_source_chain() {
        let err = RuntimeError::from(ContextError::NoSuchContext("ctx-9".to_string()));
        assert_eq!(err.kind(), "dispatch");
        assert!(std::error::Error::source(&err).is_some());
    }
}
