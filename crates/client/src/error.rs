//! Fehlertypen des Streaming-Clients

use klangwerk_core::FehlerKategorie;
use klangwerk_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtocolError),

    #[error("Verbindung vom Server getrennt")]
    VerbindungGetrennt,

    /// Audioverbindung wurde vom Server nicht bestaetigt
    #[error("Audioverbindung abgelehnt: {0}")]
    AudioAbgelehnt(String),

    #[error("Nicht angemeldet")]
    NichtAngemeldet,

    #[error("Wiedergabe fehlgeschlagen: {0}")]
    Wiedergabe(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    pub fn kategorie(&self) -> FehlerKategorie {
        match self {
            Self::Protokoll(_) => FehlerKategorie::Protokoll,
            Self::AudioAbgelehnt(_) | Self::NichtAngemeldet => FehlerKategorie::Benutzer,
            Self::Io(_) | Self::VerbindungGetrennt => FehlerKategorie::Verbindung,
            Self::Wiedergabe(_) => FehlerKategorie::Intern,
        }
    }
}
