//! # klangwerk-observability
//!
//! Structured Logging fuer Server und Client via tracing-subscriber.

pub mod logging;

pub use logging::{logging_initialisieren, LogFormat, LoggingError};
