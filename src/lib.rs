//! WhatsApp watcher — forwards important messages to an offline processor.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod vault;
