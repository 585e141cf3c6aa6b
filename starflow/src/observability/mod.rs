//! Observability utilities.
//!
//! Logging goes through `tracing`; this module installs the subscriber,
//! times spans, and scrubs credentials out of statements before they reach
//! a log line or an error message.

mod redact;
mod subscriber;
mod timer;

pub use redact::redact_credentials;
pub use subscriber::{init_tracing, LogFormat};
pub use timer::TaskTimer;
