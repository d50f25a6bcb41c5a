//! Operator-Konsole
//!
//! Zeilenbasierte Verwaltung auf der Standardeingabe des Servers:
//!
//! ```text
//! add-song <name> <kuenstler> <pfad>
//! remove-song <name> <kuenstler>
//! online
//! quit
//! ```
//!
//! `quit` speichert den Katalog, schliesst alle Audioquellen und loest das
//! Herunterfahren aus.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use klangwerk_catalog::{audiodatei_pruefen, Song, SongCatalog};
use klangwerk_streaming::StreamingSessionRegistry;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use crate::commands::parser::tokenize;
use crate::error::{CommanderError, CommanderResult};

/// Ergebnis eines Konsolenbefehls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KonsolenAntwort {
    Text(String),
    /// Server soll herunterfahren
    Beenden(String),
}

/// Fuehrt Operator-Befehle gegen Katalog und Registry aus
pub struct OperatorConsole {
    katalog: Arc<SongCatalog>,
    registry: StreamingSessionRegistry,
    songs_datei: PathBuf,
}

impl OperatorConsole {
    pub fn neu(
        katalog: Arc<SongCatalog>,
        registry: StreamingSessionRegistry,
        songs_datei: impl Into<PathBuf>,
    ) -> Self {
        Self {
            katalog,
            registry,
            songs_datei: songs_datei.into(),
        }
    }

    /// Fuehrt eine Konsolenzeile aus
    pub fn befehl_ausfuehren(&self, zeile: &str) -> CommanderResult<KonsolenAntwort> {
        let tokens = tokenize(zeile.trim());
        let Some((befehl, args)) = tokens.split_first() else {
            return Ok(KonsolenAntwort::Text(String::new()));
        };

        match (befehl.as_str(), args) {
            ("add-song", [name, artist, pfad]) => self.song_hinzufuegen(name, artist, Path::new(pfad)),
            ("add-song", _) => Err(konsolen_verwendung("add-song <name> <kuenstler> <pfad>")),
            ("remove-song", [name, artist]) => {
                let song = self.katalog.entfernen(name, artist)?;
                tracing::info!(song = %song, "Song aus dem Katalog entfernt");
                Ok(KonsolenAntwort::Text(format!("{song} entfernt.")))
            }
            ("remove-song", _) => Err(konsolen_verwendung("remove-song <name> <kuenstler>")),
            ("online", []) => Ok(KonsolenAntwort::Text(self.online())),
            ("quit", []) => self.beenden(),
            (unbekannt, _) => Err(CommanderError::UngueltigeEingabe(format!(
                "Unbekannter Konsolenbefehl: {unbekannt}\nBefehle: add-song, remove-song, online, quit"
            ))),
        }
    }

    fn song_hinzufuegen(&self, name: &str, artist: &str, pfad: &Path) -> CommanderResult<KonsolenAntwort> {
        audiodatei_pruefen(pfad)?;
        let song = Song::neu(name, artist, pfad);
        let text = match self.katalog.hinzufuegen(song.clone()) {
            Some(alt) => format!("{song} ersetzt (vorher {}).", alt.path.display()),
            None => format!("{song} hinzugefuegt."),
        };
        tracing::info!(song = %song, pfad = %pfad.display(), "Song in den Katalog aufgenommen");
        Ok(KonsolenAntwort::Text(text))
    }

    fn online(&self) -> String {
        let sessions = self.registry.sessions();
        if sessions.is_empty() {
            return "Niemand online.".to_string();
        }

        let mut text = format!("{} online:", sessions.len());
        for info in sessions {
            text.push_str(&format!(
                "\n{} seit {} ({}",
                info.benutzer,
                info.angemeldet_am.format("%Y-%m-%d %H:%M:%S"),
                info.phase
            ));
            if let Some(song) = &info.song {
                text.push_str(&format!(": {song}"));
            }
            text.push(')');
        }
        text
    }

    fn beenden(&self) -> CommanderResult<KonsolenAntwort> {
        self.katalog.speichern(&self.songs_datei)?;
        let geschlossen = self.registry.alle_streams_schliessen();
        tracing::info!(
            songs = self.katalog.anzahl(),
            streams = geschlossen,
            "Katalog gespeichert, Server faehrt herunter"
        );
        Ok(KonsolenAntwort::Beenden(format!(
            "Katalog gespeichert, {geschlossen} Wiedergabe(n) beendet."
        )))
    }

    /// Liest Befehle bis `quit` oder Ende der Eingabe
    ///
    /// Bei `quit` wird `true` auf `shutdown_tx` gesendet. Ende der Eingabe
    /// beendet nur die Konsole, nicht den Server.
    pub async fn ausfuehren<R, W>(
        &self,
        eingabe: R,
        mut ausgabe: W,
        shutdown_tx: watch::Sender<bool>,
    ) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut zeilen = eingabe.lines();
        while let Some(zeile) = zeilen.next_line().await? {
            let (text, beenden) = match self.befehl_ausfuehren(&zeile) {
                Ok(KonsolenAntwort::Text(text)) => (text, false),
                Ok(KonsolenAntwort::Beenden(text)) => (text, true),
                Err(e) => {
                    tracing::warn!(fehler = %e, "Konsolenbefehl fehlgeschlagen");
                    (format!("Fehler: {e}"), false)
                }
            };

            if !text.is_empty() {
                ausgabe.write_all(text.as_bytes()).await?;
                ausgabe.write_all(b"\n").await?;
                ausgabe.flush().await?;
            }

            if beenden {
                let _ = shutdown_tx.send(true);
                return Ok(());
            }
        }

        tracing::debug!("Konsoleneingabe beendet");
        Ok(())
    }
}

fn konsolen_verwendung(syntax: &str) -> CommanderError {
    CommanderError::UngueltigeEingabe(format!("Verwendung: {syntax}"))
}
