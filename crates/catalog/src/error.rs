//! Fehlertypen fuer Katalog, Benutzer und Playlists

use klangwerk_core::FehlerKategorie;
use thiserror::Error;

/// Fehler der Katalog-Speicher
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Song nicht gefunden: {0}")]
    SongNichtGefunden(String),

    #[error("Playlist nicht gefunden: {0}")]
    PlaylistNichtGefunden(String),

    #[error("Playlist existiert bereits: {0}")]
    PlaylistExistiert(String),

    #[error("{song} von {artist} ist bereits in der Playlist")]
    SongBereitsInPlaylist { song: String, artist: String },

    #[error("Benutzername ist bereits vergeben: {0}")]
    BenutzerExistiert(String),

    #[error("Benutzername oder Passwort falsch")]
    UngueltigeAnmeldedaten,

    #[error("Ungueltiges Argument: {0}")]
    UngueltigesArgument(String),

    #[error("Ungueltige Audiodatei: {0}")]
    UngueltigerPfad(String),

    #[error("Passwort-Hashing fehlgeschlagen: {0}")]
    PasswortHashing(String),

    #[error("Datei beschaedigt ({datei}, Zeile {zeile}): {grund}")]
    Beschaedigt {
        datei: String,
        zeile: usize,
        grund: String,
    },

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),
}

impl CatalogError {
    /// Ordnet den Fehler einer Fehlerkategorie zu
    pub fn kategorie(&self) -> FehlerKategorie {
        match self {
            Self::PasswortHashing(_) | Self::Beschaedigt { .. } | Self::Io(_) | Self::Json(_) => {
                FehlerKategorie::Intern
            }
            _ => FehlerKategorie::Benutzer,
        }
    }
}

/// Result-Typ fuer die Katalog-Speicher
pub type CatalogResult<T> = Result<T, CatalogError>;
