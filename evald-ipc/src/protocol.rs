//! Protocol definitions and message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u32 = 1;

/// Externally visible state of an evaluator process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluatorState {
    Init,
    Running,
    Done,
    Failed,
    Killed,
}

impl EvaluatorState {
    /// Whether this state accepts no further work.
    ///
    /// `Done` is terminal for work but still accepts exactly one
    /// acknowledgment from the driver.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EvaluatorState::Done | EvaluatorState::Failed | EvaluatorState::Killed
        )
    }
}

impl fmt::Display for EvaluatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvaluatorState::Init => "INIT",
            EvaluatorState::Running => "RUNNING",
            EvaluatorState::Done => "DONE",
            EvaluatorState::Failed => "FAILED",
            EvaluatorState::Killed => "KILLED",
        };
        write!(f, "{}", name)
    }
}

/// A control message from the driver addressed to a specific evaluator.
///
/// At most one of `kill_evaluator` / `done_evaluator` is meaningful per
/// message; `context_control` and `kill_evaluator` may both be present and
/// are applied in that order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlInstruction {
    /// Identity of the evaluator this message is addressed to
    pub target_id: String,

    /// Opaque payload forwarded verbatim to the context stack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_control: Option<JsonValue>,

    /// Instructs the evaluator to terminate immediately
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub kill_evaluator: bool,

    /// Acknowledges a DONE report; the evaluator may shut down
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub done_evaluator: bool,

    pub correlation_id: Uuid,
}

impl ControlInstruction {
    /// Create a context-control instruction
    pub fn context_control(target_id: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            target_id: target_id.into(),
            context_control: Some(payload),
            kill_evaluator: false,
            done_evaluator: false,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Create a kill instruction
    pub fn kill(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            context_control: None,
            kill_evaluator: true,
            done_evaluator: false,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Create a final-acknowledgment instruction
    pub fn done_ack(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            context_control: None,
            kill_evaluator: false,
            done_evaluator: true,
            correlation_id: Uuid::new_v4(),
        }
    }

    /// Check the target identity against this evaluator's identity
    pub fn targets(&self, evaluator_id: &str) -> bool {
        self.target_id.eq_ignore_ascii_case(evaluator_id)
    }
}

/// Context/task control payload understood by the context stack.
///
/// The evaluator runtime never interprets this; it travels inside
/// [`ControlInstruction::context_control`] as an opaque value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContextControl {
    /// Push a new context on top of the stack
    AddContext { context_id: String },

    /// Pop the named context; it must be topmost and idle
    RemoveContext { context_id: String },

    /// Start a task inside the topmost context
    StartTask { context_id: String, task_id: String },

    /// Stop the running task
    StopTask { task_id: String },
}

/// Status report sent from evaluator to driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub evaluator_id: String,
    pub state: EvaluatorState,

    /// Serialized failure payload, present only when state is FAILED
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Vec<u8>>,

    pub timestamp: DateTime<Utc>,
}

impl StatusReport {
    /// Create a report without an error payload
    pub fn healthy(evaluator_id: impl Into<String>, state: EvaluatorState) -> Self {
        Self {
            evaluator_id: evaluator_id.into(),
            state,
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a FAILED report carrying an encoded failure payload
    pub fn failed(evaluator_id: impl Into<String>, error: Vec<u8>) -> Self {
        Self {
            evaluator_id: evaluator_id.into(),
            state: EvaluatorState::Failed,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

/// Message envelope for all driver/evaluator communications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope<T> {
    pub protocol_version: u32,
    pub timestamp: DateTime<Utc>,
    pub message: T,
}

impl<T> MessageEnvelope<T> {
    /// Create a new message envelope
    pub fn new(message: T) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            timestamp: Utc::now(),
            message,
        }
    }

    /// Check if protocol version is compatible
    pub fn is_compatible(&self) -> bool {
        self.protocol_version == PROTOCOL_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_terminal() {
        assert!(!EvaluatorState::Init.is_terminal());
        assert!(!EvaluatorState::Running.is_terminal());
        assert!(EvaluatorState::Done.is_terminal());
        assert!(EvaluatorState::Failed.is_terminal());
        assert!(EvaluatorState::Killed.is_terminal());
    }

    #[test]
    fn test_state_wire_format() {
        let json = serde_json::to_string(&EvaluatorState::Running).unwrap();
        assert_eq!(json, "\"RUNNING\"");
        let state: EvaluatorState = serde_json::from_str("\"KILLED\"").unwrap();
        assert_eq!(state, EvaluatorState::Killed);
    }

    #[test]
    fn test_identity_check_is_case_insensitive() {
        let instruction = ControlInstruction::kill("Eval-1");
        assert!(instruction.targets("eval-1"));
        assert!(instruction.targets("EVAL-1"));
        assert!(!instruction.targets("eval-2"));
    }

    #[test]
    fn test_control_instruction_markers_default_off() {
        let payload = serde_json::json!({"type": "add_context", "context_id": "root"});
        let instruction = ControlInstruction::context_control("eval-1", payload);
        assert!(!instruction.kill_evaluator);
        assert!(!instruction.done_evaluator);
        assert!(instruction.context_control.is_some());

        // Markers absent from the wire when unset
        let json = serde_json::to_string(&instruction).unwrap();
        assert!(!json.contains("kill_evaluator"));
        assert!(!json.contains("done_evaluator"));
    }

    #[test]
    fn test_context_control_round_trip() {
        let control = ContextControl::StartTask {
            context_id: "root".to_string(),
            task_id: "task-1".to_string(),
        };
        let value = serde_json::to_value(&control).unwrap();
        assert_eq!(value["type"], "start_task");
        let parsed: ContextControl = serde_json::from_value(value).unwrap();
        match parsed {
            ContextControl::StartTask { context_id, task_id } => {
                assert_eq!(context_id, "root");
                assert_eq!(task_id, "task-1");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_status_report_error_presence() {
        let healthy = StatusReport::healthy("eval-1", EvaluatorState::Running);
        assert!(healthy.error.is_none());

        let failed = StatusReport::failed("eval-1", b"boom".to_vec());
        assert_eq!(failed.state, EvaluatorState::Failed);
        assert_eq!(failed.error.as_deref(), Some(b"boom".as_ref()));
    }

    #[test]
    fn test_message_envelope() {
        let envelope = MessageEnvelope::new(ControlInstruction::done_ack("eval-1"));
        assert_eq!(envelope.protocol_version, PROTOCOL_VERSION);
        assert!(envelope.is_compatible());

        let json = serde_json::to_string(&envelope).unwrap();
        let deserialized: MessageEnvelope<ControlInstruction> =
            serde_json::from_str(&json).unwrap();
        assert!(deserialized.message.done_evaluator);
    }
}
