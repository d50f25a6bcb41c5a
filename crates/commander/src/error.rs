//! Fehlertypen fuer den Klangwerk Commander

use klangwerk_catalog::CatalogError;
use klangwerk_core::FehlerKategorie;
use klangwerk_streaming::StreamingError;
use thiserror::Error;

/// Alle moeglichen Fehler im Commander-Crate
#[derive(Debug, Error)]
pub enum CommanderError {
    /// Unbekannter Befehl oder falsche Argumente; enthaelt den Hilfetext
    #[error("{0}")]
    UngueltigeEingabe(String),

    #[error("Bitte zuerst anmelden.")]
    NichtAngemeldet,

    #[error("Bereits angemeldet als {0}. Bitte zuerst abmelden.")]
    BereitsAngemeldet(String),

    /// Befehl ist auf dieser Verbindung nicht erlaubt (z.B. `beginStreaming` fuer fremden Benutzer)
    #[error("Nicht erlaubt: {0}")]
    NichtErlaubt(String),

    #[error(transparent)]
    Katalog(#[from] CatalogError),

    #[error(transparent)]
    Streaming(#[from] StreamingError),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}

pub type CommanderResult<T> = Result<T, CommanderError>;

impl CommanderError {
    /// Ordnet den Fehler einer Fehlerkategorie zu
    pub fn kategorie(&self) -> FehlerKategorie {
        match self {
            Self::UngueltigeEingabe(_)
            | Self::NichtAngemeldet
            | Self::BereitsAngemeldet(_)
            | Self::NichtErlaubt(_) => FehlerKategorie::Benutzer,
            Self::Katalog(e) => e.kategorie(),
            Self::Streaming(e) => e.kategorie(),
            Self::Io(_) => FehlerKategorie::Intern,
        }
    }

    /// Text fuer den Client; interne Details bleiben im Log
    pub fn client_nachricht(&self) -> String {
        match self.kategorie() {
            FehlerKategorie::Benutzer => self.to_string(),
            _ => "Interner Serverfehler.".to_string(),
        }
    }
}
