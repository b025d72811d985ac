//! Context stack management
//!
//! Contexts form a stack of nested execution scopes; tasks run inside the
//! topmost context. The evaluator runtime forwards driver payloads here
//! verbatim and only observes `is_empty()` afterwards to detect completion.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info, warn};

use evald_ipc::ContextControl;

/// Context stack errors
#[derive(Debug, Error)]
pub enum ContextError {
    /// Payload did not parse as a context control message
    #[error("Malformed context control payload: {0}")]
    MalformedPayload(String),

    /// Named context does not exist
    #[error("No such context: {0}")]
    NoSuchContext(String),

    /// Named task is not running
    #[error("No such task: {0}")]
    NoSuchTask(String),

    /// Operation requires the context to be topmost
    #[error("Context {0} is not the topmost context")]
    NotTopmost(String),

    /// Context id already present on the stack
    #[error("Context {0} already exists")]
    DuplicateContext(String),

    /// Topmost context already has a running task
    #[error("Context {0} already has a running task")]
    TaskAlreadyRunning(String),

    /// Stack used before `start()` or after `dispose()`
    #[error("Context stack is not active")]
    NotActive,

    /// `start()` called twice
    #[error("Context stack already started")]
    AlreadyStarted,

    /// Failure while releasing contexts
    #[error("Context teardown failed: {0}")]
    TeardownFailed(String),
}

/// The context/task stack contract consumed by the evaluator runtime.
///
/// `dispose()` must be idempotent; the runtime calls it on every failure
/// path and once more on clean shutdown.
#[async_trait]
pub trait ContextStack: Send {
    /// Begin the root context
    async fn start(&mut self) -> Result<(), ContextError>;

    /// Apply a driver-originated context control payload
    async fn dispatch(&mut self, payload: &JsonValue) -> Result<(), ContextError>;

    /// Whether the stack has been drained
    fn is_empty(&self) -> bool;

    /// Release all contexts top-down
    async fn dispose(&mut self) -> Result<(), ContextError>;
}

/// A context on the stack, holding at most one running task
#[derive(Debug, Clone)]
struct ContextEntry {
    id: String,
    running_task: Option<String>,
}

/// Default [`ContextStack`] implementation.
///
/// Parses the opaque payload into [`ContextControl`] and maintains the
/// stack invariants: contexts are added and removed only at the top, a task
/// runs only in the topmost context.
pub struct ContextStackManager {
    root_context_id: String,
    stack: Vec<ContextEntry>,
    active: bool,
}

impl ContextStackManager {
    /// Create a manager whose root context gets the given id
    pub fn new(root_context_id: impl Into<String>) -> Self {
        Self {
            root_context_id: root_context_id.into(),
            stack: Vec::new(),
            active: false,
        }
    }

    fn top_mut(&mut self) -> Option<&mut ContextEntry> {
        self.stack.last_mut()
    }

    fn apply(&mut self, control: ContextControl) -> Result<(), ContextError> {
        match control {
            ContextControl::AddContext { context_id } => {
                if self.stack.iter().any(|c| c.id == context_id) {
                    return Err(ContextError::DuplicateContext(context_id));
                }
                debug!("Adding context {}", context_id);
                self.stack.push(ContextEntry {
                    id: context_id,
                    running_task: None,
                });
                Ok(())
            }
            ContextControl::RemoveContext { context_id } => {
                let top = self
                    .stack
                    .last()
                    .ok_or_else(|| ContextError::NoSuchContext(context_id.clone()))?;
                if top.id != context_id {
                    return if self.stack.iter().any(|c| c.id == context_id) {
                        Err(ContextError::NotTopmost(context_id))
                    } else {
                        Err(ContextError::NoSuchContext(context_id))
                    };
                }
                if let Some(task) = &top.running_task {
                    return Err(ContextError::TaskAlreadyRunning(format!(
                        "{} (task {})",
                        context_id, task
                    )));
                }
                debug!("Removing context {}", context_id);
                self.stack.pop();
                Ok(())
            }
            ContextControl::StartTask { context_id, task_id } => {
                let top = self
                    .top_mut()
                    .ok_or_else(|| ContextError::NoSuchContext(context_id.clone()))?;
                if top.id != context_id {
                    return Err(ContextError::NotTopmost(context_id));
                }
                if top.running_task.is_some() {
                    return Err(ContextError::TaskAlreadyRunning(context_id));
                }
                debug!("Starting task {} in context {}", task_id, context_id);
                top.running_task = Some(task_id);
                Ok(())
            }
            ContextControl::StopTask { task_id } => {
                let top = self
                    .top_mut()
                    .ok_or_else(|| ContextError::NoSuchTask(task_id.clone()))?;
                match &top.running_task {
                    Some(running) if *running == task_id => {
                        debug!("Stopping task {}", task_id);
                        top.running_task = None;
                        Ok(())
                    }
                    _ => Err(ContextError::NoSuchTask(task_id)),
                }
            }
        }
    }
}

#[async_trait]
impl ContextStack for ContextStackManager {
    async fn start(&mut self) -> Result<(), ContextError> {
        if self.active {
            return Err(ContextError::AlreadyStarted);
        }
        info!("Starting root context {}", self.root_context_id);
        self.stack.push(ContextEntry {
            id: self.root_context_id.clone(),
            running_task: None,
        });
        self.active = true;
        Ok(())
    }

    async fn dispatch(&mut self, payload: &JsonValue) -> Result<(), ContextError> {
        if !self.active {
            return Err(ContextError::NotActive);
        }
        let control: ContextControl = serde_json::from_value(payload.clone())
            .map_err(|e| ContextError::MalformedPayload(e.to_string()))?;
        self.apply(control)
    }

    fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    async fn dispose(&mut self) -> Result<(), ContextError> {
        if !self.active && self.stack.is_empty() {
            return Ok(());
        }
        // Release top-down; running tasks are stopped with their context
        while let Some(context) = self.stack.pop() {
            if let Some(task) = context.running_task {
                warn!("Disposing context {} with running task {}", context.id, task);
            } else {
                debug!("Disposing context {}", context.id);
            }
        }
        self.active = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(control: &ContextControl) -> JsonValue {
        serde_json::to_value(control).unwrap()
    }

    #[tokio::test]
    async fn test_start_pushes_root() {
        let mut stack = ContextStackManager::new("root");
        stack.start().await.unwrap();
        assert!(!stack.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_before_start_rejected() {
        let mut stack = ContextStackManager::new("root");
        let err = stack
            .dispatch(&payload(&ContextControl::RemoveContext {
                context_id: "root".to_string(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::NotActive));
    }

    #[tokio::test]
    async fn test_remove_root_drains_stack() {
        let mut stack = ContextStackManager::new("root");
        stack.start().await.unwrap();
        stack
            .dispatch(&payload(&ContextControl::RemoveContext {
                context_id: "root".to_string(),
            }))
            .await
            .unwrap();
        assert!(stack.is_empty());
    }

    #[tokio::test]
    async fn test_remove_non_topmost_rejected() {
        let mut stack = ContextStackManager::new("root");
        stack.start().await.unwrap();
        stack
            .dispatch(&payload(&ContextControl::AddContext {
                context_id: "child".to_string(),
            }))
            .await
            .unwrap();

        let err = stack
            .dispatch(&payload(&ContextControl::RemoveContext {
                context_id: "root".to_string(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::NotTopmost(_)));
    }

    #[tokio::test]
    async fn test_task_lifecycle() {
        let mut stack = ContextStackManager::new("root");
        stack.start().await.unwrap();

        stack
            .dispatch(&payload(&ContextControl::StartTask {
                context_id: "root".to_string(),
                task_id: "task-1".to_string(),
            }))
            .await
            .unwrap();

        // Second task in the same context is rejected
        let err = stack
            .dispatch(&payload(&ContextControl::StartTask {
                context_id: "root".to_string(),
                task_id: "task-2".to_string(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::TaskAlreadyRunning(_)));

        // Context with a running task cannot be removed
        let err = stack
            .dispatch(&payload(&ContextControl::RemoveContext {
                context_id: "root".to_string(),
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::TaskAlreadyRunning(_)));

        stack
            .dispatch(&payload(&ContextControl::StopTask {
                task_id: "task-1".to_string(),
            }))
            .await
            .unwrap();
        stack
            .dispatch(&payload(&ContextControl::RemoveContext {
                context_id: "root".to_string(),
            }))
            .await
            .unwrap();
        assert!(stack.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let mut stack = ContextStackManager::new("root");
        stack.start().await.unwrap();
        let err = stack
            .dispatch(&json!({"type": "reticulate_splines"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ContextError::MalformedPayload(_)));
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let mut stack = ContextStackManager::new("root");
        stack.start().await.unwrap();
        stack
            .dispatch(&payload(&ContextControl::AddContext {
                context_id: "child".to_string(),
            }))
            .await
            .unwrap();

        stack.dispose().await.unwrap();
        assert!(stack.is_empty());
        stack.dispose().await.unwrap();
        assert!(stack.is_empty());
    }
}
