//! Fehlertypen fuer Sitzungen und Transport

use klangwerk_core::FehlerKategorie;
use klangwerk_protocol::ProtocolError;
use thiserror::Error;

use crate::audio::AudioError;

/// Fehler der Streaming-Sitzungsverwaltung und des Transports
#[derive(Debug, Error)]
pub enum StreamingError {
    /// Benutzer hat bereits eine Sitzung
    #[error("Benutzer {0} ist bereits online")]
    BereitsOnline(String),

    /// Verbindung gehoert bereits zu einer Sitzung
    #[error("Diese Verbindung ist bereits als {0} angemeldet")]
    BereitsAngemeldet(String),

    #[error("Benutzer {0} ist nicht online")]
    NichtOnline(String),

    #[error("Fuer {0} ist kein Song vorbereitet")]
    NichtVorbereitet(String),

    #[error("Fuer {0} ist keine Audioverbindung verknuepft")]
    KeineAudioverbindung(String),

    #[error("Fuer {0} laeuft keine Wiedergabe")]
    KeineWiedergabe(String),

    #[error("Audiodatei konnte nicht geoeffnet werden: {0}")]
    AudioOeffnen(#[source] AudioError),

    #[error("Audiodaten fuer {benutzer} nicht lesbar: {quelle}")]
    AudioLesen {
        benutzer: String,
        #[source]
        quelle: AudioError,
    },

    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtocolError),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamingError {
    /// Ordnet den Fehler einer Fehlerkategorie zu
    pub fn kategorie(&self) -> FehlerKategorie {
        match self {
            Self::BereitsOnline(_)
            | Self::BereitsAngemeldet(_)
            | Self::NichtOnline(_)
            | Self::NichtVorbereitet(_)
            | Self::KeineAudioverbindung(_)
            | Self::KeineWiedergabe(_) => FehlerKategorie::Benutzer,
            Self::AudioOeffnen(_) => FehlerKategorie::Intern,
            Self::AudioLesen { .. } | Self::Io(_) => FehlerKategorie::Verbindung,
            Self::Protokoll(e) => e.kategorie(),
        }
    }
}

/// Result-Typ fuer die Streaming-Schicht
pub type StreamingResult<T> = Result<T, StreamingError>;
