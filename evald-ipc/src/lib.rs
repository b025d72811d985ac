//! Driver/evaluator communication for evald
//!
//! This crate provides the wire protocol spoken between the driver and an
//! evaluator process, the failure-payload encoding with its guaranteed
//! fallback, and the stdio transport used when the evaluator is driven over
//! a process pipe.

pub mod error;
pub mod failure;
pub mod protocol;
pub mod transport;

// Re-export commonly used types
pub use error::IpcError;
pub use failure::{encode_with_fallback, FailureEncoder, FailureFallback, FailureReport, JsonFailureEncoder};
pub use protocol::{
    ContextControl, ControlInstruction, EvaluatorState, MessageEnvelope, StatusReport,
    PROTOCOL_VERSION,
};
pub use transport::{stdio_split, ControlSource, StatusSink, StdioControlSource, StdioStatusSink};
