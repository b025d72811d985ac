//! The evaluator lifecycle state machine
//!
//! One [`EvaluatorRuntime`] per process. It owns the externally visible
//! [`EvaluatorState`], validates and dispatches every driver instruction,
//! detects completion, and converts every failure into a FAILED transition
//! plus a status push. It never lets an error escape outward.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use evald_config::EvaluatorConfig;
use evald_ipc::{
    encode_with_fallback, ControlInstruction, EvaluatorState, FailureEncoder, FailureReport,
    JsonFailureEncoder, StatusReport,
};

use crate::context::ContextStack;
use crate::error::RuntimeError;
use crate::events::RuntimeEvent;
use crate::heartbeat::HeartbeatManager;

/// Shared handle on the evaluator state.
///
/// Written only by the runtime loop; the heartbeat ticker reads it to build
/// periodic reports.
#[derive(Clone)]
pub struct SharedState(Arc<RwLock<EvaluatorState>>);

impl SharedState {
    pub fn new() -> Self {
        Self(Arc::new(RwLock::new(EvaluatorState::Init)))
    }

    pub fn get(&self) -> EvaluatorState {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, state: EvaluatorState) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// The evaluator runtime state machine
pub struct EvaluatorRuntime {
    evaluator_id: String,
    state: SharedState,
    context: Box<dyn ContextStack>,
    heartbeat: Arc<HeartbeatManager>,
    shutdown: CancellationToken,
    encoder: Box<dyn FailureEncoder>,
    teardown_failures_fatal: bool,
    pid_file_dir: Option<PathBuf>,
}

impl EvaluatorRuntime {
    pub fn new(
        config: &EvaluatorConfig,
        state: SharedState,
        context: Box<dyn ContextStack>,
        heartbeat: Arc<HeartbeatManager>,
    ) -> Self {
        let shutdown = heartbeat.shutdown_token();
        Self {
            evaluator_id: config.evaluator_id.clone(),
            state,
            context,
            heartbeat,
            shutdown,
            encoder: Box::new(JsonFailureEncoder),
            teardown_failures_fatal: config.teardown_failures_fatal,
            pid_file_dir: config.pid_file_dir.clone(),
        }
    }

    /// Replace the failure encoder (used to exercise the fallback path)
    pub fn with_encoder(mut self, encoder: Box<dyn FailureEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// Current state, read-only
    pub fn state(&self) -> EvaluatorState {
        self.state.get()
    }

    /// On-demand status snapshot
    pub fn status(&self) -> StatusReport {
        StatusReport::healthy(self.evaluator_id.clone(), self.state.get())
    }

    /// Consume the inbound event stream until shutdown.
    ///
    /// This loop is the single mutual-exclusion domain for the evaluator's
    /// state: control handling and failure reporting run here and nowhere
    /// else, strictly ordered. Returns the final state.
    pub async fn run(mut self, mut events: mpsc::Receiver<RuntimeEvent>) -> EvaluatorState {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                }
            }
        }

        // Loop exit via the token (done ack, kill, failure) takes the same
        // clean-shutdown path as an explicit stop in a non-running state.
        if self.state.get() != EvaluatorState::Running {
            self.dispose_context().await;
        }

        let final_state = self.state.get();
        info!("Evaluator runtime shutdown complete in state {}", final_state);
        final_state
    }

    /// Apply one inbound event
    pub async fn handle_event(&mut self, event: RuntimeEvent) {
        match event {
            RuntimeEvent::Start => self.on_start().await,
            RuntimeEvent::Stop { error } => self.on_stop(error).await,
            RuntimeEvent::Control(instruction) => self.handle_control(instruction).await,
            RuntimeEvent::Fault { description } => {
                self.report_failure(RuntimeError::Fault(description)).await;
            }
        }
    }

    async fn on_start(&mut self) {
        info!("Runtime start");
        if let Err(e) = self.try_start().await {
            error!("Runtime start failed: {}", e);
            self.report_failure(e).await;
        }
    }

    async fn try_start(&mut self) -> Result<(), RuntimeError> {
        self.write_pid_marker();
        if self.state.get() != EvaluatorState::Init {
            return Err(RuntimeError::ProtocolViolation(format!(
                "runtime start received but state is {} instead of {}",
                self.state.get(),
                EvaluatorState::Init
            )));
        }
        self.state.set(EvaluatorState::Running);
        self.context.start().await?;
        self.heartbeat.push_current().await;
        Ok(())
    }

    async fn on_stop(&mut self, error: Option<String>) {
        info!("Runtime stop");
        if self.state.get() == EvaluatorState::Running {
            // Work was not complete; a stop here is itself abnormal
            let message = match error {
                Some(cause) => format!("stop signal received in state RUNNING: {}", cause),
                None => "stop signal received in state RUNNING".to_string(),
            };
            self.report_failure(RuntimeError::AbnormalStop(message)).await;
        } else {
            self.dispose_context().await;
            self.shutdown.cancel();
        }
    }

    /// Validate and apply one driver control instruction.
    ///
    /// Never returns an error; every failure becomes a FAILED transition
    /// plus a status push.
    pub async fn handle_control(&mut self, instruction: ControlInstruction) {
        debug!(
            "Handling control message {} for {}",
            instruction.correlation_id, instruction.target_id
        );

        // Identity check precedes everything else
        if !instruction.targets(&self.evaluator_id) {
            self.report_failure(RuntimeError::IdentityMismatch {
                target: instruction.target_id.clone(),
                own: self.evaluator_id.clone(),
            })
            .await;
            return;
        }

        match self.state.get() {
            EvaluatorState::Done => {
                if instruction.done_evaluator {
                    info!("Received final acknowledgment from driver, shutting down");
                    self.shutdown.cancel();
                } else {
                    self.report_failure(RuntimeError::ProtocolViolation(
                        "received a control message from driver after evaluator is done"
                            .to_string(),
                    ))
                    .await;
                }
            }
            EvaluatorState::Running => {
                if let Some(payload) = instruction.context_control.as_ref() {
                    debug!("Forwarding context control to the context stack");
                    match self.context.dispatch(payload).await {
                        Ok(()) => {
                            // Check-after-dispatch decides the DONE
                            // transition; serialized with dispatch by the
                            // loop itself
                            if self.context.is_empty()
                                && self.state.get() == EvaluatorState::Running
                            {
                                info!("Context stack is empty, evaluator done");
                                self.state.set(EvaluatorState::Done);
                                self.heartbeat
                                    .push(StatusReport::healthy(
                                        self.evaluator_id.clone(),
                                        EvaluatorState::Done,
                                    ))
                                    .await;
                            }
                        }
                        Err(e) => {
                            error!("Context dispatch failed: {}", e);
                            self.report_failure(RuntimeError::Dispatch(e)).await;
                            return;
                        }
                    }
                }
                if instruction.kill_evaluator {
                    info!("Evaluator {} has been killed by the driver", self.evaluator_id);
                    self.state.set(EvaluatorState::Killed);
                    self.shutdown.cancel();
                }
            }
            other => {
                self.report_failure(RuntimeError::ProtocolViolation(format!(
                    "received control message while in state {}",
                    other
                )))
                .await;
            }
        }
    }

    /// Convert an error into a FAILED transition and a status push.
    ///
    /// Idempotent with respect to payload presence: every invocation
    /// produces a report with a non-empty error field. Runs only on the
    /// loop task, so it cannot race another report for the same evaluator.
    pub async fn report_failure(&mut self, error: RuntimeError) {
        error!("Evaluator {} failed: {}", self.evaluator_id, error);
        self.state.set(EvaluatorState::Failed);

        let report = FailureReport::from_error(error.kind(), &error);
        let payload = encode_with_fallback(self.encoder.as_ref(), &report);
        self.heartbeat
            .push(StatusReport::failed(self.evaluator_id.clone(), payload))
            .await;

        self.dispose_context().await;
    }

    async fn dispose_context(&mut self) {
        if let Err(e) = self.context.dispose().await {
            if self.teardown_failures_fatal {
                error!("Context teardown failed: {}", e);
                self.state.set(EvaluatorState::Failed);
                let report = FailureReport::from_error("teardown", &e);
                let payload = encode_with_fallback(self.encoder.as_ref(), &report);
                self.heartbeat
                    .push(StatusReport::failed(self.evaluator_id.clone(), payload))
                    .await;
            } else {
                warn!("Ignoring failure during context teardown: {}", e);
            }
        }
    }

    /// Write the local process-id marker for external liveness probing.
    /// Write-once, never read back; failures are logged, not fatal.
    fn write_pid_marker(&self) {
        let Some(dir) = &self.pid_file_dir else {
            return;
        };
        let path = dir.join(format!("{}.pid", self.evaluator_id));
        match std::fs::write(&path, format!("{}\n", std::process::id())) {
            Ok(()) => debug!("Wrote pid marker to {}", path.display()),
            Err(e) => warn!("Failed to write pid marker {}: {}", path.display(), e),
        }
    }
}
