//! klangwerk-client – Streaming-Client fuer Klangwerk
//!
//! - [`StreamClient`] haelt die Steuerverbindung und steuert den Ablauf
//! - [`AudioVerbindung`] empfaengt die Audiofragmente eines Songs
//! - [`PlaybackSink`] nimmt die Rohdaten entgegen (WAV-Datei oder Speicher)

pub mod audio;
pub mod client;
pub mod error;
pub mod sink;

pub use audio::{AudioVerbindung, WiedergabeBericht, NACHLAUF};
pub use client::{antwort_text, StreamClient};
pub use error::{ClientError, ClientResult};
pub use sink::{Aufnahme, PlaybackSink, SinkFabrik, SpeicherSink, WavDateiSink, WavVerzeichnisFabrik};
