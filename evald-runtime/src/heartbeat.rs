//! Heartbeat management
//!
//! The heartbeat manager owns the evaluator identity, the periodic ticker
//! and the status channel back to the driver. The runtime asks it to push;
//! it never mutates runtime state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use evald_ipc::{IpcError, StatusReport};

use crate::runtime::SharedState;

/// Delivers a status report to the driver
#[async_trait]
pub trait StatusChannel: Send + Sync {
    async fn push(&self, report: StatusReport) -> Result<(), IpcError>;
}

/// Builds and sends status reports, periodically and on demand
pub struct HeartbeatManager {
    evaluator_id: String,
    state: SharedState,
    channel: Arc<dyn StatusChannel>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl HeartbeatManager {
    pub fn new(
        evaluator_id: impl Into<String>,
        state: SharedState,
        channel: Arc<dyn StatusChannel>,
        interval: Duration,
    ) -> Self {
        Self {
            evaluator_id: evaluator_id.into(),
            state,
            channel,
            interval,
            shutdown: CancellationToken::new(),
        }
    }

    /// Identity of the evaluator this manager reports for
    pub fn evaluator_id(&self) -> &str {
        &self.evaluator_id
    }

    /// Token that stops the ticker; cancelling it is the only cancellation
    /// primitive in the runtime.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Build a status report from the current runtime state and send it
    pub async fn push_current(&self) {
        let report = StatusReport::healthy(self.evaluator_id.clone(), self.state.get());
        self.push(report).await;
    }

    /// Send an explicit status report (completion and failure paths).
    ///
    /// Delivery failures are logged and swallowed; heartbeating must never
    /// take the runtime down.
    pub async fn push(&self, report: StatusReport) {
        debug!("Pushing status: {}", report.state);
        if let Err(e) = self.channel.push(report).await {
            warn!("Failed to push status report to driver: {}", e);
        }
    }

    /// Start the periodic ticker. Runs until the shutdown token fires.
    pub fn spawn_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.interval);
            // The immediate first tick doubles as the boot-time heartbeat
            loop {
                tokio::select! {
                    _ = manager.shutdown.cancelled() => {
                        info!("Heartbeat ticker stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        manager.push_current().await;
                    }
                }
            }
        })
    }
}
