//! Message pipeline — classifies inbound messages and hands them off.
//!
//! **Core invariant: an accepted message is never silently dropped.**
//! Every accepted message ends in a successful handoff, a fallback file,
//! or a logged `EventLost` error.
//!
//! Flow:
//! 1. Classifier (pure) → may drop
//! 2. Media extraction → failures degrade to "no media"
//! 3. Normalization → canonical event
//! 4. Handoff → exactly one attempt
//! 5. Fallback → exactly one write iff the handoff failed

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::WatcherConfig;
use crate::error::{HandoffError, PipelineError};
use crate::pipeline::fallback::FallbackPersister;
use crate::pipeline::handoff::{Handoff, SubprocessHandoff};
use crate::pipeline::media::MediaExtractor;
use crate::pipeline::normalize::normalize;
use crate::pipeline::rules::{Classifier, Rule};
use crate::pipeline::types::{HandoffResult, InboundMessage, SessionContext};
use crate::vault::Vault;

/// How a single message left the pipeline.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// Classifier declined the message.
    Dropped(Rule),
    /// Processor accepted the event.
    Delivered(HandoffResult),
    /// Handoff failed; the event was written to disk instead.
    FallbackSaved { path: PathBuf, error: HandoffError },
}

impl PipelineOutcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Dropped(_) => "dropped",
            Self::Delivered(_) => "delivered",
            Self::FallbackSaved { .. } => "fallback",
        }
    }
}

/// Runs one message through classify → extract → normalize → handoff.
pub struct MessagePipeline {
    classifier: Classifier,
    extractor: MediaExtractor,
    handoff: Arc<dyn Handoff>,
    fallback: FallbackPersister,
    vault: Vault,
}

impl MessagePipeline {
    pub fn new(classifier: Classifier, handoff: Arc<dyn Handoff>, vault: Vault) -> Self {
        Self {
            classifier,
            extractor: MediaExtractor::new(&vault),
            handoff,
            fallback: FallbackPersister::new(vault.inbox_dir()),
            vault,
        }
    }

    /// Pipeline wired to the subprocess processor described by `config`.
    pub fn from_config(config: &WatcherConfig) -> Self {
        Self::new(
            Classifier::new(config.classifier.clone()),
            Arc::new(SubprocessHandoff::from_config(config)),
            Vault::new(config.vault_path.clone()),
        )
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// Process a single inbound message through the full pipeline.
    pub async fn process(
        &self,
        inbound: InboundMessage,
        session: &SessionContext,
    ) -> Result<PipelineOutcome, PipelineError> {
        let InboundMessage {
            message,
            sender,
            conversation,
        } = inbound;

        let verdict = self
            .classifier
            .evaluate(&message, conversation.as_ref(), session);
        let Some(conversation) = conversation.filter(|_| verdict.is_forward()) else {
            debug!(
                from = %message.from,
                rule = verdict.rule().label(),
                "Message dropped"
            );
            return Ok(PipelineOutcome::Dropped(verdict.rule().clone()));
        };

        info!(
            from = %sender.label(),
            chat_type = conversation.chat_type().as_str(),
            rule = verdict.rule().label(),
            "New WhatsApp message accepted"
        );

        let artifact = self.extractor.extract(&message).await;

        let event = normalize(&message, &sender, &conversation, artifact.as_ref(), session);

        match self.handoff.deliver(&event).await {
            Ok(result) => {
                if result.success() == Some(false) {
                    warn!(from = %event.from, "Processor reported an unsuccessful result");
                } else {
                    info!(from = %event.from, "Message processed successfully");
                }
                Ok(PipelineOutcome::Delivered(result))
            }
            Err(handoff_err) => {
                warn!(from = %event.from, error = %handoff_err, "Handoff failed, writing fallback");
                self.vault
                    .record_error(&format!("Processor handoff failed: {handoff_err}"))
                    .await;

                match self.fallback.persist_fallback(&event).await {
                    Ok(path) => Ok(PipelineOutcome::FallbackSaved {
                        path,
                        error: handoff_err,
                    }),
                    Err(fallback_err) => {
                        let lost = PipelineError::EventLost {
                            handoff: handoff_err,
                            fallback: fallback_err,
                        };
                        error!(from = %event.from, error = %lost, "Event lost");
                        self.vault.record_error(&lost.to_string()).await;
                        Err(lost)
                    }
                }
            }
        }
    }
}
