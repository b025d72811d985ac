//! Inbound event channel for the evaluator runtime
//!
//! The runtime consumes one tagged union of lifecycle signals, driver
//! control messages and captured faults. Feeding everything through a
//! single channel gives the state machine a total order over all inputs
//! without any locking.

use tokio::sync::mpsc;
use tracing::{error, warn};

use evald_ipc::ControlInstruction;

/// Everything that can reach the evaluator runtime
#[derive(Debug)]
pub enum RuntimeEvent {
    /// Fired once at process boot
    Start,

    /// Fired on shutdown request, optionally carrying an originating error
    Stop { error: Option<String> },

    /// Deserialized control instruction from the driver
    Control(ControlInstruction),

    /// A fault that escaped all other handlers (panic hook, pump crash)
    Fault { description: String },
}

/// Clonable handle for feeding events into the runtime loop
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl EventSender {
    /// Create the event channel; the receiver goes to
    /// [`EvaluatorRuntime::run`](crate::runtime::EvaluatorRuntime::run).
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RuntimeEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Send an event, waiting for channel capacity.
    ///
    /// Returns `false` if the runtime loop has already shut down.
    pub async fn send(&self, event: RuntimeEvent) -> bool {
        if self.tx.send(event).await.is_err() {
            warn!("Runtime event dropped, loop has shut down");
            return false;
        }
        true
    }

    /// Non-blocking send for synchronous callers (the panic hook).
    pub fn send_fault(&self, description: String) {
        if let Err(e) = self.tx.try_send(RuntimeEvent::Fault { description }) {
            // Nothing left to do; the loop is gone or saturated
            error!("Failed to forward fault into runtime loop: {}", e);
        }
    }
}
