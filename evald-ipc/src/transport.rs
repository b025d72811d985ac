//! Transport implementations for the evaluator side of the driver channel
//!
//! The channel has two independent halves: status reports flow out, control
//! instructions flow in. They are split so the heartbeat ticker and the
//! control pump can run concurrently without sharing a lock.

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

use crate::error::IpcError;
use crate::protocol::{ControlInstruction, MessageEnvelope, StatusReport, PROTOCOL_VERSION};

/// Outbound half: delivers status reports to the driver
#[async_trait]
pub trait StatusSink: Send {
    async fn send_status(&mut self, report: &StatusReport) -> Result<(), IpcError>;
}

/// Inbound half: yields control instructions as the driver pushes them
#[async_trait]
pub trait ControlSource: Send {
    async fn recv_control(&mut self) -> Result<MessageEnvelope<ControlInstruction>, IpcError>;
}

/// Create both halves over stdin/stdout for evaluators launched as child
/// processes. Newline-delimited JSON; log output must go to stderr to keep
/// the channel clean.
pub fn stdio_split() -> (StdioStatusSink, StdioControlSource) {
    (
        StdioStatusSink {
            stdout: tokio::io::stdout(),
        },
        StdioControlSource {
            stdin: tokio::io::BufReader::new(tokio::io::stdin()),
        },
    )
}

/// Status reports out over stdout
pub struct StdioStatusSink {
    stdout: tokio::io::Stdout,
}

#[async_trait]
impl StatusSink for StdioStatusSink {
    async fn send_status(&mut self, report: &StatusReport) -> Result<(), IpcError> {
        let envelope = MessageEnvelope::new(report);
        let json = serde_json::to_string(&envelope)
            .map_err(|e| IpcError::SerializationError(e.to_string()))?;

        // Send with newline delimiter
        let line = format!("{}\n", json);
        self.stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| IpcError::IoError(e.to_string()))?;
        self.stdout
            .flush()
            .await
            .map_err(|e| IpcError::IoError(e.to_string()))?;

        Ok(())
    }
}

/// Control instructions in over stdin
pub struct StdioControlSource {
    stdin: tokio::io::BufReader<tokio::io::Stdin>,
}

#[async_trait]
impl ControlSource for StdioControlSource {
    async fn recv_control(&mut self) -> Result<MessageEnvelope<ControlInstruction>, IpcError> {
        let mut line = String::new();
        let read = self
            .stdin
            .read_line(&mut line)
            .await
            .map_err(|e| IpcError::IoError(e.to_string()))?;

        if read == 0 {
            return Err(IpcError::ConnectionClosed);
        }

        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            return Err(IpcError::InvalidMessage("empty control line".to_string()));
        }

        let envelope: MessageEnvelope<ControlInstruction> = serde_json::from_str(trimmed)
            .map_err(|e| IpcError::DeserializationError(e.to_string()))?;

        if !envelope.is_compatible() {
            return Err(IpcError::ProtocolVersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: envelope.protocol_version,
            });
        }

        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::EvaluatorState;

    #[test]
    fn test_status_envelope_line_format() {
        let report = StatusReport::healthy("eval-1", EvaluatorState::Running);
        let envelope = MessageEnvelope::new(&report);
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(!json.contains('\n'));

        let parsed: MessageEnvelope<StatusReport> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.message.evaluator_id, "eval-1");
        assert_eq!(parsed.message.state, EvaluatorState::Running);
    }

    #[test]
    fn test_control_version_check() {
        let mut envelope = MessageEnvelope::new(ControlInstruction::kill("eval-1"));
        envelope.protocol_version = 99;
        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: MessageEnvelope<ControlInstruction> = serde_json::from_str(&json).unwrap();
        assert!(!parsed.is_compatible());
    }
}
