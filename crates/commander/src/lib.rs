//! klangwerk-commander – Befehle fuer den Klangwerk Server
//!
//! - [`parse_request`] zerlegt eine Client-Anfrage in eine [`Request`]
//! - [`RequestExecutor`] fuehrt Anfragen aus und dient dem Multiplexer als Handler
//! - [`OperatorConsole`] verwaltet Katalog und Server ueber die Standardeingabe

pub mod commands;
pub mod console;
pub mod error;

pub use commands::{parse_request, Request, RequestExecutor};
pub use console::{KonsolenAntwort, OperatorConsole};
pub use error::{CommanderError, CommanderResult};
