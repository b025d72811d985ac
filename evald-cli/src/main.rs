//! evald: evaluator process entry point
//!
//! Wires the stdio driver channel, the heartbeat ticker, the signal
//! handler and the fault hook into the runtime event loop, then runs the
//! loop to completion.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use evald_config::domains::logging::{LogFormat, LoggingConfig};
use evald_config::ConfigLoader;
use evald_ipc::{stdio_split, ControlSource, EvaluatorState, IpcError, StatusReport, StatusSink, StdioStatusSink};
use evald_runtime::{
    install_fault_hook, ContextStackManager, EvaluatorRuntime, EventSender, HeartbeatManager,
    RuntimeEvent, SharedState, StatusChannel,
};

mod cli;
use cli::Cli;

/// Root context id for the evaluator's context stack
const ROOT_CONTEXT_ID: &str = "root";

/// Adapts the outbound stdio half to the runtime's status channel
struct SinkStatusChannel {
    sink: Mutex<StdioStatusSink>,
}

#[async_trait::async_trait]
impl StatusChannel for SinkStatusChannel {
    async fn push(&self, report: StatusReport) -> Result<(), IpcError> {
        self.sink.lock().await.send_status(&report).await
    }
}

/// Initialize tracing; output goes to stderr to avoid conflicts with the
/// status channel on stdout.
fn init_tracing(logging: &LoggingConfig, override_level: Option<&str>) {
    let directive = override_level.unwrap_or_else(|| logging.level.as_filter());
    let env_filter = EnvFilter::try_new(directive).unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', falling back to 'info'", directive);
        EnvFilter::new("info")
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Read control instructions from the driver and feed them into the loop
async fn pump_control(
    mut source: impl ControlSource,
    events: EventSender,
    shutdown: tokio_util::sync::CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = source.recv_control() => match received {
                Ok(envelope) => {
                    if !events.send(RuntimeEvent::Control(envelope.message)).await {
                        break;
                    }
                }
                Err(IpcError::ConnectionClosed) => {
                    info!("Driver closed the control channel");
                    events.send(RuntimeEvent::Stop { error: None }).await;
                    break;
                }
                Err(e) if e.is_fatal() => {
                    // A driver message we cannot decode is unrecoverable
                    events
                        .send(RuntimeEvent::Fault {
                            description: format!("control channel: {}", e),
                        })
                        .await;
                    break;
                }
                Err(e) => {
                    warn!("Failed to read control message: {}", e);
                }
            }
        }
    }
}

/// Translate SIGTERM/SIGINT into a runtime stop event
async fn watch_signals(events: EventSender) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to install SIGINT handler: {}", e);
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, stopping runtime"),
        _ = sigint.recv() => info!("Received SIGINT, stopping runtime"),
    }
    events.send(RuntimeEvent::Stop { error: None }).await;
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // The identity flag maps onto the loader's environment override
    if let Some(id) = &args.evaluator_id {
        std::env::set_var("EVALD_EVALUATOR_ID", id);
    }

    let config = ConfigLoader::new()
        .load(args.config.as_ref())
        .context("Failed to load configuration")?;

    init_tracing(&config.logging, args.log_level.as_deref());
    info!("Starting evaluator {}", config.evaluator.evaluator_id);

    let (status_sink, control_source) = stdio_split();
    let channel = Arc::new(SinkStatusChannel {
        sink: Mutex::new(status_sink),
    });

    let state = SharedState::new();
    let heartbeat = Arc::new(HeartbeatManager::new(
        config.evaluator.evaluator_id.clone(),
        state.clone(),
        channel,
        config.evaluator.heartbeat_interval,
    ));
    let shutdown = heartbeat.shutdown_token();

    let runtime = EvaluatorRuntime::new(
        &config.evaluator,
        state,
        Box::new(ContextStackManager::new(ROOT_CONTEXT_ID)),
        Arc::clone(&heartbeat),
    );

    let (events, receiver) = EventSender::channel(64);
    install_fault_hook(events.clone());

    let ticker = heartbeat.spawn_ticker();
    tokio::spawn(pump_control(control_source, events.clone(), shutdown.clone()));
    tokio::spawn(watch_signals(events.clone()));

    events.send(RuntimeEvent::Start).await;
    let final_state = runtime.run(receiver).await;

    // The loop may have exited without the token firing; stop the ticker
    shutdown.cancel();
    let _ = ticker.await;

    match final_state {
        EvaluatorState::Done | EvaluatorState::Killed => Ok(()),
        state => {
            error!("Evaluator exited in state {}", state);
            std::process::exit(1);
        }
    }
}
