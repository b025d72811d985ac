//! Evaluator-side runtime for evald
//!
//! One evaluator process hosts exactly one [`EvaluatorRuntime`]: the state
//! machine that validates and dispatches driver control instructions, owns
//! the evaluator's externally visible state, and reports failure even when
//! the failure itself cannot be serialized cleanly. The runtime consumes a
//! single inbound event channel; everything that can mutate state (control
//! messages, lifecycle signals, uncaught faults) is funneled through it, so
//! handling is totally ordered by construction.

pub mod context;
pub mod error;
pub mod events;
pub mod fault;
pub mod heartbeat;
pub mod runtime;

// Re-export main types
pub use context::{ContextError, ContextStack, ContextStackManager};
pub use error::RuntimeError;
pub use events::{EventSender, RuntimeEvent};
pub use fault::install_fault_hook;
pub use heartbeat::{HeartbeatManager, StatusChannel};
pub use runtime::{EvaluatorRuntime, SharedState};
