//! Subprocess handoff to the external processor.
//!
//! One process per event:
//! - the event is written to stdin as JSON, then stdin is closed
//! - stdout and stderr are collected in full
//! - exit code 0 and a JSON stdout make a successful handoff
//!
//! The vault root is passed as the final command-line argument.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::WatcherConfig;
use crate::error::HandoffError;
use crate::pipeline::types::{CanonicalEvent, HandoffResult};

/// Maximum stderr/stdout echoed into an error before truncation (64KB).
const MAX_DIAGNOSTIC_SIZE: usize = 64 * 1024;

/// Delivery seam for canonical events.
#[async_trait]
pub trait Handoff: Send + Sync {
    /// Deliver one event. Called exactly once per event.
    async fn deliver(&self, event: &CanonicalEvent) -> Result<HandoffResult, HandoffError>;
}

/// Invokes the processor as a child process per event.
#[derive(Debug, Clone)]
pub struct SubprocessHandoff {
    program: String,
    args: Vec<String>,
    vault_root: PathBuf,
    timeout: Option<Duration>,
}

impl SubprocessHandoff {
    pub fn new(program: impl Into<String>, args: Vec<String>, vault_root: PathBuf) -> Self {
        Self {
            program: program.into(),
            args,
            vault_root,
            timeout: None,
        }
    }

    pub fn from_config(config: &WatcherConfig) -> Self {
        Self::new(
            config.processor_cmd.clone(),
            config.processor_args.clone(),
            config.vault_path.clone(),
        )
        .with_timeout(config.handoff_timeout)
    }

    /// Bound the wait for the processor; `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, body: Vec<u8>) -> Result<std::process::Output, HandoffError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&self.vault_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| HandoffError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let stdin = child.stdin.take();
        let write = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            stdin.write_all(&body).await?;
            stdin.shutdown().await
        };

        // Writing and collecting run together so a chatty child can't
        // deadlock on a full pipe while we are still writing.
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output?;

        if let Err(e) = written {
            // A child that exits without reading stdin is judged by its exit code.
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                warn!(program = %self.program, "Processor closed stdin before reading the event");
            } else {
                return Err(HandoffError::Io(e));
            }
        }

        Ok(output)
    }
}

#[async_trait]
impl Handoff for SubprocessHandoff {
    async fn deliver(&self, event: &CanonicalEvent) -> Result<HandoffResult, HandoffError> {
        let body = serde_json::to_vec(event)?;
        let start = Instant::now();

        // Dropping the run future on timeout kills the child (kill_on_drop).
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(body))
                .await
                .map_err(|_| HandoffError::Timeout(limit))??,
            None => self.run(body).await?,
        };

        debug!(
            program = %self.program,
            code = ?output.status.code(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Processor exited"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(HandoffError::NonZeroExit {
                code: output.status.code(),
                stderr: truncate_diagnostic(stderr.trim()),
            });
        }

        serde_json::from_slice::<serde_json::Value>(&output.stdout)
            .map(HandoffResult)
            .map_err(|_| HandoffError::InvalidOutput {
                raw: truncate_diagnostic(&String::from_utf8_lossy(&output.stdout)),
            })
    }
}

/// Truncate diagnostics to fit within limits (UTF-8 safe).
fn truncate_diagnostic(s: &str) -> String {
    if s.len() <= MAX_DIAGNOSTIC_SIZE {
        return s.to_string();
    }
    let mut end = MAX_DIAGNOSTIC_SIZE;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated {} bytes]", &s[..end], s.len() - end)
}
