//! klangwerk-streaming – Session-Transport
//!
//! Verbindet das Wire-Protokoll mit den Streaming-Sitzungen:
//!
//! - [`OutboundQueue`] puffert Frames, die der Socket nicht sofort annimmt
//! - [`StreamingSessionRegistry`] verwaltet Sitzungen, Audioverbindungen und Audioquellen
//! - [`ConnectionMultiplexer`] nimmt Verbindungen an und treibt Lesen/Schreiben
//! - [`RequestHandler`] ist die Schnittstelle zur Befehlsausfuehrung
//!
//! Jede Sitzung besteht aus einer Steuerverbindung und optional einer
//! zweiten, per `musicConnect` verknuepften Audioverbindung.

pub mod audio;
pub mod connection;
pub mod error;
pub mod handler;
pub mod multiplexer;
pub mod outbound;
pub mod registry;

pub use audio::{AudioError, AudioOpener, AudioSource, SymphoniaOpener};
pub use connection::{Attachment, ConnectionHandle, ConnectionMailbox, Interesse, Steuerbefehl};
pub use error::{StreamingError, StreamingResult};
pub use handler::{RequestContext, RequestHandler};
pub use multiplexer::{ConnectionMultiplexer, MultiplexerConfig};
pub use outbound::{OutboundQueue, SchreibZiel};
pub use registry::{NaechstesFragment, SessionInfo, StreamPhase, StreamingSessionRegistry};
