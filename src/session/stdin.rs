//! JSON-lines transport — reads session notifications from a line feed.
//!
//! A bridge process speaking the WhatsApp Web protocol writes one JSON
//! notification per line to our stdin. Malformed lines are logged and skipped.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::SessionError;
use crate::session::transport::{EventStream, SessionEvent, Transport};

type LineReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Transport fed by newline-delimited JSON notifications.
pub struct JsonLinesTransport {
    reader: Mutex<Option<LineReader>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl JsonLinesTransport {
    /// Read notifications from the process's stdin.
    pub fn from_stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    /// Read notifications from any buffered reader.
    pub fn from_reader(reader: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        Self {
            reader: Mutex::new(Some(Box::new(reader))),
            reader_task: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Transport for JsonLinesTransport {
    fn name(&self) -> &str {
        "json-lines"
    }

    async fn start(&self) -> Result<EventStream, SessionError> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| startup_failed("reader lock poisoned"))?
            .take()
            .ok_or_else(|| startup_failed("already started"))?;

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            let mut lines = reader.lines();
            let mut line_no = 0usize;

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        line_no += 1;
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<SessionEvent>(line) {
                            Ok(event) => {
                                if tx.send(event).is_err() {
                                    tracing::info!("Session feed receiver closed");
                                    break;
                                }
                            }
                            Err(e) => {
                                tracing::warn!(line = line_no, error = %e, "Skipping malformed notification");
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Session feed reached end of input");
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Error reading session feed: {}", e);
                        break;
                    }
                }
            }
        });

        if let Ok(mut slot) = self.reader_task.lock() {
            *slot = Some(handle);
        }

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn shutdown(&self) -> Result<(), SessionError> {
        let handle = self
            .reader_task
            .lock()
            .map_err(|_| SessionError::ShutdownFailed {
                name: self.name().to_string(),
                reason: "reader task lock poisoned".into(),
            })?
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        tracing::info!("Session transport shut down");
        Ok(())
    }
}

fn startup_failed(reason: &str) -> SessionError {
    SessionError::StartupFailed {
        name: "json-lines".into(),
        reason: reason.into(),
    }
}
