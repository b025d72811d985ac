//! Failure payload encoding with a guaranteed fallback
//!
//! Failure reporting must never itself fail: if the structured encoding of
//! an error cannot be produced, a fixed fallback envelope carrying the
//! error's description and the encode error is produced instead. The
//! outcome is always a non-empty payload.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::error::IpcError;

/// Structured description of an arbitrary runtime failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureReport {
    /// Top-level error message
    pub message: String,

    /// Coarse classification, e.g. "protocol_violation" or "dispatch"
    pub kind: String,

    /// Optional structured detail attached by the failure site
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<JsonValue>,

    /// Source chain, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<String>,
}

impl FailureReport {
    /// Build a report from any std error, walking its source chain
    pub fn from_error(kind: impl Into<String>, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        Self {
            message: error.to_string(),
            kind: kind.into(),
            context: None,
            chain,
        }
    }

    /// Attach structured detail to the report
    pub fn with_context(mut self, context: JsonValue) -> Self {
        self.context = Some(context);
        self
    }
}

/// Fixed envelope produced when the primary encoding fails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureFallback {
    pub original_description: String,
    pub encode_error: String,
}

/// Encodes a [`FailureReport`] into the wire payload.
///
/// A trait seam so the fallback path can be exercised in tests; production
/// code uses [`JsonFailureEncoder`].
pub trait FailureEncoder: Send + Sync {
    fn encode(&self, report: &FailureReport) -> Result<Vec<u8>, IpcError>;
}

/// Default JSON encoder
#[derive(Debug, Clone, Default)]
pub struct JsonFailureEncoder;

impl FailureEncoder for JsonFailureEncoder {
    fn encode(&self, report: &FailureReport) -> Result<Vec<u8>, IpcError> {
        Ok(serde_json::to_vec(report)?)
    }
}

/// Encode a failure report, falling back to [`FailureFallback`] if the
/// primary encoding fails. Never returns an error and never produces an
/// empty payload.
pub fn encode_with_fallback(encoder: &dyn FailureEncoder, report: &FailureReport) -> Vec<u8> {
    match encoder.encode(report) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => {
            warn!("Failure encoder produced an empty payload, using fallback");
            encode_fallback(&report.message, "encoder produced empty payload")
        }
        Err(e) => {
            warn!("Failure encoding failed ({}), using fallback envelope", e);
            encode_fallback(&report.message, &e.to_string())
        }
    }
}

fn encode_fallback(original_description: &str, encode_error: &str) -> Vec<u8> {
    let fallback = FailureFallback {
        original_description: original_description.to_string(),
        encode_error: encode_error.to_string(),
    };
    // The fallback struct is two plain strings; serialization cannot fail
    // on data grounds, but the last resort is hand-formatted JSON.
    serde_json::to_vec(&fallback).unwrap_or_else(|_| {
        format!(
            "{{\"original_description\":{:?},\"encode_error\":{:?}}}",
            original_description, encode_error
        )
        .into_bytes()
    })
}
