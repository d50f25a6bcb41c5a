//! Songkatalog
//!
//! Songs werden case-insensitiv ueber Name und Kuenstler gefunden. Der
//! Katalog wird als JSON-Lines-Datei gespeichert, eine Zeile pro Song:
//!
//! ```text
//! {"name":"Intro","artist":"Band","streams":3,"path":"songs/intro.wav"}
//! ```

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Dateiendungen die der Audio-Decoder verarbeiten kann
pub const UNTERSTUETZTE_ENDUNGEN: &[&str] = &["wav", "mp3"];

// ---------------------------------------------------------------------------
// Song
// ---------------------------------------------------------------------------

/// Ein Song im Katalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub name: String,
    pub artist: String,
    #[serde(default)]
    pub streams: u32,
    pub path: PathBuf,
}

impl Song {
    pub fn neu(name: impl Into<String>, artist: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            artist: artist.into(),
            streams: 0,
            path: path.into(),
        }
    }

    fn schluessel(&self) -> (String, String) {
        (self.name.to_lowercase(), self.artist.to_lowercase())
    }
}

impl std::fmt::Display for Song {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} von {}", self.name, self.artist)
    }
}

/// Prueft ob ein Pfad auf eine abspielbare Audiodatei zeigt
pub fn audiodatei_pruefen(pfad: &Path) -> CatalogResult<()> {
    let endung_ok = pfad
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| UNTERSTUETZTE_ENDUNGEN.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false);

    if !endung_ok {
        return Err(CatalogError::UngueltigerPfad(format!(
            "{} (erlaubt: {})",
            pfad.display(),
            UNTERSTUETZTE_ENDUNGEN.join(", ")
        )));
    }
    if !pfad.is_file() {
        return Err(CatalogError::UngueltigerPfad(format!(
            "{} existiert nicht",
            pfad.display()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// SongCatalog
// ---------------------------------------------------------------------------

/// Thread-sicherer Songkatalog
///
/// Name (klein) -> Kuenstler (klein) -> Song. Die innere `BTreeMap` macht
/// die Suche nach Name ohne Kuenstler deterministisch.
#[derive(Debug, Default)]
pub struct SongCatalog {
    songs: RwLock<HashMap<String, BTreeMap<String, Song>>>,
}

impl SongCatalog {
    /// Erstellt einen leeren Katalog
    pub fn neu() -> Self {
        Self::default()
    }

    /// Laedt den Katalog aus einer JSON-Lines-Datei
    ///
    /// Existiert die Datei nicht, wird ein leerer Katalog zurueckgegeben.
    /// Jeder Eintrag muss auf eine vorhandene Audiodatei zeigen.
    pub fn laden(pfad: &Path) -> CatalogResult<Self> {
        let katalog = Self::neu();

        let inhalt = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => inhalt,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(pfad = %pfad.display(), "Songdatei nicht gefunden, starte mit leerem Katalog");
                return Ok(katalog);
            }
            Err(e) => return Err(e.into()),
        };

        for (index, zeile) in inhalt.lines().enumerate() {
            if zeile.trim().is_empty() {
                continue;
            }
            let song: Song = serde_json::from_str(zeile).map_err(|e| CatalogError::Beschaedigt {
                datei: pfad.display().to_string(),
                zeile: index + 1,
                grund: e.to_string(),
            })?;
            audiodatei_pruefen(&song.path)?;
            katalog.hinzufuegen(song);
        }

        tracing::info!(pfad = %pfad.display(), anzahl = katalog.anzahl(), "Songkatalog geladen");
        Ok(katalog)
    }

    /// Schreibt den Katalog atomar (Temp-Datei + Rename)
    pub fn speichern(&self, pfad: &Path) -> CatalogResult<()> {
        let songs = self.alle_sortiert();

        let verzeichnis = pfad.parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(verzeichnis) = verzeichnis {
            std::fs::create_dir_all(verzeichnis)?;
        }

        let temp_pfad = pfad.with_extension("tmp");
        {
            let mut datei = std::io::BufWriter::new(std::fs::File::create(&temp_pfad)?);
            for song in &songs {
                serde_json::to_writer(&mut datei, song)?;
                datei.write_all(b"\n")?;
            }
            datei.flush()?;
        }
        std::fs::rename(&temp_pfad, pfad)?;

        tracing::info!(pfad = %pfad.display(), anzahl = songs.len(), "Songkatalog gespeichert");
        Ok(())
    }

    /// Sucht einen Song nach Name (beliebiger Kuenstler)
    pub fn song(&self, name: &str) -> CatalogResult<Song> {
        self.songs
            .read()
            .get(&name.to_lowercase())
            .and_then(|kuenstler| kuenstler.values().next())
            .cloned()
            .ok_or_else(|| CatalogError::SongNichtGefunden(name.to_string()))
    }

    /// Sucht einen Song nach Name und Kuenstler
    pub fn song_von(&self, name: &str, artist: &str) -> CatalogResult<Song> {
        self.songs
            .read()
            .get(&name.to_lowercase())
            .and_then(|kuenstler| kuenstler.get(&artist.to_lowercase()))
            .cloned()
            .ok_or_else(|| CatalogError::SongNichtGefunden(format!("{name} von {artist}")))
    }

    /// Fuegt einen Song hinzu und gibt einen ersetzten Eintrag zurueck
    pub fn hinzufuegen(&self, song: Song) -> Option<Song> {
        let (name, artist) = song.schluessel();
        self.songs
            .write()
            .entry(name)
            .or_default()
            .insert(artist, song)
    }

    /// Entfernt einen Song
    pub fn entfernen(&self, name: &str, artist: &str) -> CatalogResult<Song> {
        let mut songs = self.songs.write();
        let name_klein = name.to_lowercase();

        let entfernt = songs
            .get_mut(&name_klein)
            .and_then(|kuenstler| kuenstler.remove(&artist.to_lowercase()))
            .ok_or_else(|| CatalogError::SongNichtGefunden(format!("{name} von {artist}")))?;

        if songs.get(&name_klein).is_some_and(|k| k.is_empty()) {
            songs.remove(&name_klein);
        }
        Ok(entfernt)
    }

    /// Zaehlt einen Stream und gibt den neuen Zaehlerstand zurueck
    pub fn stream_zaehlen(&self, name: &str, artist: &str) -> CatalogResult<u32> {
        let mut songs = self.songs.write();
        let song = songs
            .get_mut(&name.to_lowercase())
            .and_then(|kuenstler| kuenstler.get_mut(&artist.to_lowercase()))
            .ok_or_else(|| CatalogError::SongNichtGefunden(format!("{name} von {artist}")))?;
        song.streams = song.streams.saturating_add(1);
        Ok(song.streams)
    }

    /// Die `n` meistgestreamten Songs
    pub fn top(&self, n: usize) -> CatalogResult<Vec<Song>> {
        if n == 0 {
            return Err(CatalogError::UngueltigesArgument(
                "Anzahl muss positiv sein".into(),
            ));
        }
        let mut songs = self.alle_sortiert();
        songs.truncate(n);
        Ok(songs)
    }

    /// Songs deren Name oder Kuenstler jedes Stichwort enthaelt
    pub fn suchen(&self, stichwoerter: &[&str]) -> Vec<Song> {
        let stichwoerter: Vec<String> = stichwoerter.iter().map(|s| s.to_lowercase()).collect();

        let mut treffer: Vec<Song> = self
            .songs
            .read()
            .values()
            .flat_map(|kuenstler| kuenstler.values())
            .filter(|song| {
                let name = song.name.to_lowercase();
                let artist = song.artist.to_lowercase();
                stichwoerter
                    .iter()
                    .all(|wort| name.contains(wort.as_str()) || artist.contains(wort.as_str()))
            })
            .cloned()
            .collect();

        treffer.sort_by_key(|song| song.schluessel());
        treffer
    }

    /// Anzahl der Songs im Katalog
    pub fn anzahl(&self) -> usize {
        self.songs.read().values().map(|k| k.len()).sum()
    }

    /// Alle Songs, nach Streams absteigend, bei Gleichstand Name und Kuenstler absteigend
    fn alle_sortiert(&self) -> Vec<Song> {
        let mut songs: Vec<Song> = self
            .songs
            .read()
            .values()
            .flat_map(|kuenstler| kuenstler.values().cloned())
            .collect();
        songs.sort_by(|a, b| {
            b.streams
                .cmp(&a.streams)
                .then_with(|| b.name.cmp(&a.name))
                .then_with(|| b.artist.cmp(&a.artist))
        });
        songs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn katalog() -> SongCatalog {
        let katalog = SongCatalog::neu();
        katalog.hinzufuegen(Song::neu("Intro", "Band", "a.wav"));
        katalog.hinzufuegen(Song::neu("Outro", "Band", "b.wav"));
        katalog.hinzufuegen(Song::neu("Intro", "Andere Band", "c.wav"));
        katalog.hinzufuegen(Song::neu("Ballade", "Solo", "d.wav"));
        katalog
    }

    #[test]
    fn song_suche_ist_case_insensitiv() {
        let katalog = katalog();
        assert_eq!(katalog.song_von("intro", "BAND").unwrap().path, PathBuf::from("a.wav"));
        assert!(katalog.song("BALLADE").is_ok());
        assert!(matches!(
            katalog.song("Unbekannt"),
            Err(CatalogError::SongNichtGefunden(_))
        ));
    }

    #[test]
    fn song_ohne_kuenstler_ist_deterministisch() {
        let katalog = katalog();
        // "andere band" < "band"
        assert_eq!(katalog.song("Intro").unwrap().artist, "Andere Band");
    }

    #[test]
    fn hinzufuegen_ersetzt_gleichen_song() {
        let katalog = katalog();
        let alt = katalog.hinzufuegen(Song::neu("INTRO", "band", "neu.wav"));
        assert!(alt.is_some());
        assert_eq!(katalog.anzahl(), 4);
        assert_eq!(katalog.song_von("Intro", "Band").unwrap().path, PathBuf::from("neu.wav"));
    }

    #[test]
    fn entfernen() {
        let katalog = katalog();
        katalog.entfernen("Ballade", "Solo").unwrap();
        assert_eq!(katalog.anzahl(), 3);
        assert!(katalog.song("Ballade").is_err());
        assert!(katalog.entfernen("Ballade", "Solo").is_err());
    }

    #[test]
    fn top_sortiert_nach_streams() {
        let katalog = katalog();
        katalog.stream_zaehlen("Outro", "Band").unwrap();
        katalog.stream_zaehlen("Outro", "Band").unwrap();
        katalog.stream_zaehlen("Ballade", "Solo").unwrap();

        let top = katalog.top(3).unwrap();
        assert_eq!(top[0].name, "Outro");
        assert_eq!(top[0].streams, 2);
        assert_eq!(top[1].name, "Ballade");
        // Gleichstand bei 0 Streams: Kuenstler absteigend
        assert_eq!(top[2].artist, "Band");
        assert_eq!(katalog.top(100).unwrap().len(), 4);
    }

    #[test]
    fn top_null_ist_ungueltig() {
        assert!(matches!(
            katalog().top(0),
            Err(CatalogError::UngueltigesArgument(_))
        ));
    }

    #[test]
    fn suche_verlangt_alle_stichwoerter() {
        let katalog = katalog();
        let treffer = katalog.suchen(&["intro"]);
        assert_eq!(treffer.len(), 2);

        let treffer = katalog.suchen(&["intro", "andere"]);
        assert_eq!(treffer.len(), 1);
        assert_eq!(treffer[0].artist, "Andere Band");

        assert!(katalog.suchen(&["intro", "solo"]).is_empty());
        assert_eq!(katalog.suchen(&["BAND"]).len(), 3);
    }

    #[test]
    fn speichern_und_laden() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("intro.wav");
        std::fs::write(&audio, b"RIFF").unwrap();

        let katalog = SongCatalog::neu();
        katalog.hinzufuegen(Song::neu("Intro", "Band", &audio));
        katalog.stream_zaehlen("Intro", "Band").unwrap();

        let datei = dir.path().join("daten").join("songs.jsonl");
        katalog.speichern(&datei).unwrap();

        let geladen = SongCatalog::laden(&datei).unwrap();
        assert_eq!(geladen.anzahl(), 1);
        assert_eq!(geladen.song("intro").unwrap().streams, 1);
    }

    #[test]
    fn laden_ohne_datei_gibt_leeren_katalog() {
        let dir = tempfile::tempdir().unwrap();
        let katalog = SongCatalog::laden(&dir.path().join("fehlt.jsonl")).unwrap();
        assert_eq!(katalog.anzahl(), 0);
    }

    #[test]
    fn laden_mit_fehlender_audiodatei_schlaegt_fehl() {
        let dir = tempfile::tempdir().unwrap();
        let datei = dir.path().join("songs.jsonl");
        std::fs::write(
            &datei,
            r#"{"name":"Intro","artist":"Band","streams":0,"path":"/gibt/es/nicht.wav"}"#,
        )
        .unwrap();
        assert!(matches!(
            SongCatalog::laden(&datei),
            Err(CatalogError::UngueltigerPfad(_))
        ));
    }

    #[test]
    fn laden_mit_kaputter_zeile_meldet_zeilennummer() {
        let dir = tempfile::tempdir().unwrap();
        let datei = dir.path().join("songs.jsonl");
        std::fs::write(&datei, "\n{kaputt").unwrap();
        match SongCatalog::laden(&datei) {
            Err(CatalogError::Beschaedigt { zeile, .. }) => assert_eq!(zeile, 2),
            anderes => panic!("Beschaedigt erwartet, erhalten: {anderes:?}"),
        }
    }

    #[test]
    fn audiodatei_pruefen_endung() {
        let dir = tempfile::tempdir().unwrap();
        let txt = dir.path().join("song.txt");
        std::fs::write(&txt, b"x").unwrap();
        assert!(audiodatei_pruefen(&txt).is_err());

        let wav = dir.path().join("song.WAV");
        std::fs::write(&wav, b"x").unwrap();
        assert!(audiodatei_pruefen(&wav).is_ok());
    }
}
