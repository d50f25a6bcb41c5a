//! Playlist-Speicher
//!
//! Playlists sind global (nicht pro Benutzer). Jede Playlist liegt als
//! eigene Datei `<name>.txt` im Playlist-Verzeichnis, eine Zeile pro Song:
//!
//! ```text
//! "Intro" "Band"
//! ```
//!
//! Gespeichert werden nur Name und Kuenstler; aufgeloest wird beim Anzeigen
//! gegen den aktuellen Katalog.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{CatalogError, CatalogResult};
use crate::song::{Song, SongCatalog};

const PLAYLIST_ENDUNG: &str = "txt";

/// Verweis auf einen Song (Name, Kuenstler)
type SongVerweis = (String, String);

/// Thread-sicherer Playlist-Speicher
#[derive(Debug)]
pub struct PlaylistStore {
    playlists: RwLock<BTreeMap<String, Vec<SongVerweis>>>,
    verzeichnis: Option<PathBuf>,
}

impl PlaylistStore {
    /// Speicher ohne Verzeichnis (nur fuer die Laufzeit)
    pub fn im_speicher() -> Self {
        Self {
            playlists: RwLock::new(BTreeMap::new()),
            verzeichnis: None,
        }
    }

    /// Laedt alle Playlists aus dem Verzeichnis
    ///
    /// Eintraege, die nicht (mehr) im Katalog stehen, werden uebersprungen.
    pub fn laden(verzeichnis: &Path, katalog: &SongCatalog) -> CatalogResult<Self> {
        let mut playlists = BTreeMap::new();

        if verzeichnis.is_dir() {
            for eintrag in std::fs::read_dir(verzeichnis)? {
                let pfad = eintrag?.path();
                if pfad.extension().and_then(|e| e.to_str()) != Some(PLAYLIST_ENDUNG) {
                    continue;
                }
                let Some(name) = pfad.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };

                let mut songs = Vec::new();
                for (index, zeile) in std::fs::read_to_string(&pfad)?.lines().enumerate() {
                    if zeile.trim().is_empty() {
                        continue;
                    }
                    let (song, artist) =
                        zeile_parsen(zeile).ok_or_else(|| CatalogError::Beschaedigt {
                            datei: pfad.display().to_string(),
                            zeile: index + 1,
                            grund: "erwartet: \"song\" \"kuenstler\"".into(),
                        })?;

                    match katalog.song_von(&song, &artist) {
                        Ok(song) => songs.push((song.name, song.artist)),
                        Err(_) => tracing::warn!(
                            playlist = %name,
                            song = %song,
                            artist = %artist,
                            "Playlist-Eintrag nicht im Katalog, uebersprungen"
                        ),
                    }
                }
                playlists.insert(name.to_string(), songs);
            }
        }

        tracing::info!(verzeichnis = %verzeichnis.display(), anzahl = playlists.len(), "Playlists geladen");
        Ok(Self {
            playlists: RwLock::new(playlists),
            verzeichnis: Some(verzeichnis.to_path_buf()),
        })
    }

    /// Legt eine leere Playlist an
    pub fn erstellen(&self, name: &str) -> CatalogResult<()> {
        name_pruefen(name)?;

        let mut playlists = self.playlists.write();
        if playlists.contains_key(name) {
            return Err(CatalogError::PlaylistExistiert(name.to_string()));
        }

        if let Some(pfad) = self.datei_pfad(name) {
            if let Some(verzeichnis) = pfad.parent() {
                std::fs::create_dir_all(verzeichnis)?;
            }
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&pfad)?;
        }

        playlists.insert(name.to_string(), Vec::new());
        tracing::info!(playlist = %name, "Playlist erstellt");
        Ok(())
    }

    /// Fuegt einen Song an eine Playlist an
    pub fn song_hinzufuegen(&self, name: &str, song: &Song) -> CatalogResult<()> {
        let mut playlists = self.playlists.write();
        let eintraege = playlists
            .get_mut(name)
            .ok_or_else(|| CatalogError::PlaylistNichtGefunden(name.to_string()))?;

        let schon_drin = eintraege.iter().any(|(s, a)| {
            s.eq_ignore_ascii_case(&song.name) && a.eq_ignore_ascii_case(&song.artist)
        });
        if schon_drin {
            return Err(CatalogError::SongBereitsInPlaylist {
                song: song.name.clone(),
                artist: song.artist.clone(),
            });
        }

        if let Some(pfad) = self.datei_pfad(name) {
            let mut datei = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&pfad)?;
            writeln!(datei, "\"{}\" \"{}\"", song.name, song.artist)?;
        }

        eintraege.push((song.name.clone(), song.artist.clone()));
        Ok(())
    }

    /// Loest die Songs einer Playlist gegen den Katalog auf
    pub fn anzeigen(&self, name: &str, katalog: &SongCatalog) -> CatalogResult<Vec<Song>> {
        let playlists = self.playlists.read();
        let eintraege = playlists
            .get(name)
            .ok_or_else(|| CatalogError::PlaylistNichtGefunden(name.to_string()))?;

        Ok(eintraege
            .iter()
            .filter_map(|(song, artist)| katalog.song_von(song, artist).ok())
            .collect())
    }

    /// Namen aller Playlists
    pub fn namen(&self) -> Vec<String> {
        self.playlists.read().keys().cloned().collect()
    }

    fn datei_pfad(&self, name: &str) -> Option<PathBuf> {
        self.verzeichnis
            .as_ref()
            .map(|v| v.join(format!("{name}.{PLAYLIST_ENDUNG}")))
    }
}

/// Playlist-Namen werden zu Dateinamen und duerfen das Verzeichnis nicht verlassen
fn name_pruefen(name: &str) -> CatalogResult<()> {
    let ungueltig = name.trim().is_empty()
        || name.contains(['/', '\\'])
        || name.starts_with('.')
        || name.chars().any(char::is_control);
    if ungueltig {
        return Err(CatalogError::UngueltigesArgument(format!(
            "Ungueltiger Playlist-Name: {name:?}"
        )));
    }
    Ok(())
}

/// Zerlegt `"song" "kuenstler"` in seine zwei Teile
fn zeile_parsen(zeile: &str) -> Option<(String, String)> {
    let teile: Vec<&str> = zeile
        .split('"')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, teil)| teil)
        .collect();
    match teile.as_slice() {
        [song, artist] => Some((song.to_string(), artist.to_string())),
        _ => None,
    }
}
