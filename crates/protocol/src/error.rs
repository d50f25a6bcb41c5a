//! Fehlertypen fuer das Wire-Protokoll

use klangwerk_core::FehlerKategorie;
use thiserror::Error;

/// Fehler beim Kodieren oder Dekodieren von Frames
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Typ-Byte ausserhalb von FRAGMENT/MESSAGE
    #[error("Unbekannter Frame-Typ: {0}")]
    UnbekannterFrameTyp(u8),

    /// Laengenfeld 0: dem Frame fehlt das Typ-Byte
    #[error("Leerer Frame ohne Typ-Byte")]
    LeererFrame,

    /// Payload uebersteigt die konfigurierte Frame-Groesse
    #[error("Frame zu gross: {groesse} Bytes (Maximum: {maximum} Bytes)")]
    FrameZuGross { groesse: usize, maximum: usize },

    /// Eingangspuffer waechst ueber das erlaubte Limit
    #[error("Eingangspuffer uebergelaufen: {0} Bytes")]
    PufferUeberlauf(usize),

    /// MESSAGE-Payload ist kein UTF-8
    #[error("Nachricht ist kein gueltiges UTF-8: {0}")]
    UngueltigesUtf8(#[from] std::str::Utf8Error),

    /// JSON-Antwort nicht (de)serialisierbar
    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    /// IO-Fehler beim Lesen/Schreiben (nur ueber `tokio_util::codec`)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Ordnet den Fehler einer Fehlerkategorie zu
    pub fn kategorie(&self) -> FehlerKategorie {
        match self {
            Self::Io(_) => FehlerKategorie::Verbindung,
            _ => FehlerKategorie::Protokoll,
        }
    }
}

/// Result-Typ fuer das Wire-Protokoll
pub type ProtocolResult<T> = Result<T, ProtocolError>;
