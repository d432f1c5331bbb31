//! Session controller — owns the session lifecycle and dispatches messages.
//!
//! State machine:
//!
//! ```text
//! Disconnected → AwaitingPairing → Authenticated → Ready ⇄ Reconnecting
//!                                                    ↓
//!                                                 ShutDown
//! ```
//!
//! Each `message_received` notification while `Ready` becomes one task on a
//! `JoinSet`. Tasks suspend only at I/O, so pipeline runs may interleave, and
//! a semaphore bounds how many run at once. Runs are never cancelled:
//! shutdown stops accepting notifications, then waits for in-flight runs.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::SessionError;
use crate::pipeline::types::{InboundMessage, SessionContext};
use crate::pipeline::{MessagePipeline, PipelineOutcome};
use crate::session::transport::{SessionEvent, Transport};

/// Lifecycle state of the messaging session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    AwaitingPairing,
    Authenticated,
    Ready,
    Reconnecting,
    ShutDown,
}

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunResult {
    Dropped,
    Delivered,
    Fallback,
    Lost,
}

/// Tally of what happened during [`SessionController::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub delivered: usize,
    pub fallback: usize,
    pub dropped: usize,
    pub lost: usize,
    /// Messages that arrived while the session was not ready.
    pub ignored: usize,
    pub reconnects: u32,
}

impl RunSummary {
    fn record(&mut self, result: RunResult) {
        match result {
            RunResult::Dropped => self.dropped += 1,
            RunResult::Delivered => self.delivered += 1,
            RunResult::Fallback => self.fallback += 1,
            RunResult::Lost => self.lost += 1,
        }
    }
}

/// Drives the pipeline from transport notifications.
pub struct SessionController {
    transport: Arc<dyn Transport>,
    pipeline: Arc<MessagePipeline>,
    state: SessionState,
    session: Option<SessionContext>,
    reconnect_attempts: u32,
    limiter: Arc<Semaphore>,
    tasks: JoinSet<RunResult>,
    summary: RunSummary,
}

impl SessionController {
    pub fn new(
        transport: Arc<dyn Transport>,
        pipeline: Arc<MessagePipeline>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            transport,
            pipeline,
            state: SessionState::Disconnected,
            session: None,
            reconnect_attempts: 0,
            limiter: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tasks: JoinSet::new(),
            summary: RunSummary::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of pipeline runs not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Run until `shutdown` resolves or the transport's stream ends.
    pub async fn run<F>(&mut self, shutdown: F) -> crate::error::Result<RunSummary>
    where
        F: Future<Output = ()>,
    {
        let mut events = self.transport.start().await?;
        info!(transport = self.transport.name(), "Starting WhatsApp watcher");

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                event = events.next() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        info!("Session notification stream ended");
                        break;
                    }
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.reap(joined).await;
                }
            }
        }

        self.shutdown().await;
        Ok(self.summary.clone())
    }

    /// Apply one notification to the state machine.
    pub async fn handle_event(&mut self, event: SessionEvent) {
        debug!(event = event.label(), state = ?self.state, "Session notification");

        match event {
            SessionEvent::Pairing { code } => {
                self.state = SessionState::AwaitingPairing;
                info!(
                    code = %code,
                    "Pairing required: open WhatsApp > Linked Devices > Link a Device"
                );
            }
            SessionEvent::Authenticated => {
                self.state = SessionState::Authenticated;
                info!("WhatsApp authenticated");
            }
            SessionEvent::AuthFailed { reason } => {
                self.state = SessionState::Disconnected;
                self.session = None;
                let err = SessionError::AuthFailed { reason };
                error!(
                    error = %err,
                    "Clear the stored session and pair the device again"
                );
                self.record_error(&err.to_string()).await;
            }
            SessionEvent::Connected { own_id } => {
                self.state = SessionState::Ready;
                self.reconnect_attempts = 0;
                self.session = Some(SessionContext::new(own_id));
                info!(
                    inbox = %self.pipeline.vault().inbox_dir().display(),
                    "WhatsApp watcher connected, monitoring for new messages"
                );
            }
            SessionEvent::Disconnected { reason } => {
                self.state = SessionState::Reconnecting;
                self.reconnect_attempts += 1;
                self.summary.reconnects += 1;
                let err = SessionError::Disconnected {
                    name: self.transport.name().to_string(),
                    reason,
                };
                warn!(
                    error = %err,
                    attempt = self.reconnect_attempts,
                    "Attempting to reconnect"
                );
            }
            SessionEvent::MessageReceived(inbound) => self.dispatch(*inbound),
        }
    }

    /// Spawn one independent pipeline run for `inbound`.
    fn dispatch(&mut self, inbound: InboundMessage) {
        let session = match (&self.state, &self.session) {
            (SessionState::Ready, Some(session)) => session.clone(),
            _ => {
                warn!(
                    state = ?self.state,
                    from = %inbound.message.from,
                    "Ignoring message received while session is not ready"
                );
                self.summary.ignored += 1;
                return;
            }
        };

        let pipeline = Arc::clone(&self.pipeline);
        let limiter = Arc::clone(&self.limiter);

        self.tasks.spawn(async move {
            // Waiting for a permit happens inside the task so the
            // notification loop keeps running.
            let _permit = limiter.acquire_owned().await;
            match pipeline.process(inbound, &session).await {
                Ok(PipelineOutcome::Dropped(_)) => RunResult::Dropped,
                Ok(PipelineOutcome::Delivered(_)) => RunResult::Delivered,
                Ok(PipelineOutcome::FallbackSaved { path, .. }) => {
                    info!(path = %path.display(), "Saved fallback data");
                    RunResult::Fallback
                }
                Err(e) => {
                    error!(error = %e, "Error processing message");
                    RunResult::Lost
                }
            }
        });
    }

    async fn reap(&mut self, joined: Result<RunResult, tokio::task::JoinError>) {
        match joined {
            Ok(result) => self.summary.record(result),
            Err(e) => {
                error!(error = %e, "Pipeline task panicked");
                self.summary.lost += 1;
                self.record_error(&format!("Pipeline task panicked: {e}"))
                    .await;
            }
        }
    }

    async fn record_error(&self, message: &str) {
        self.pipeline.vault().record_error(message).await;
    }

    /// Tear down the session and wait for in-flight runs.
    async fn shutdown(&mut self) {
        info!(in_flight = self.tasks.len(), "Shutting down WhatsApp watcher");

        if let Err(e) = self.transport.shutdown().await {
            warn!(error = %e, "Transport shutdown failed");
        }
        self.state = SessionState::ShutDown;
        self.session = None;

        while let Some(joined) = self.tasks.join_next().await {
            self.reap(joined).await;
        }
        info!("WhatsApp watcher stopped");
    }
}
