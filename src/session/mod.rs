//! Messaging-session lifecycle and transports.

pub mod controller;
pub mod stdin;
pub mod transport;

pub use controller::{RunSummary, SessionController, SessionState};
pub use stdin::JsonLinesTransport;
pub use transport::{EventStream, SessionEvent, Transport};
