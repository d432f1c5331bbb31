//! Message ingestion pipeline.
//!
//! Every inbound message from the session flows through:
//! 1. `Classifier::evaluate()` — keyword rules, no I/O
//! 2. `MediaExtractor::try_extract()` — attachment download into the inbox
//! 3. `normalize()` — canonical event assembly
//! 4. `Handoff::deliver()` — one subprocess request/response
//! 5. `FallbackPersister::persist_fallback()` — only when the handoff failed

pub mod fallback;
pub mod handoff;
pub mod media;
pub mod normalize;
pub mod processor;
pub mod rules;
pub mod types;

pub use processor::{MessagePipeline, PipelineOutcome};
