//! Wiedergabe-Senken
//!
//! Eine [`PlaybackSink`] nimmt die Rohdaten der Audiofragmente eines Songs
//! entgegen. Fuer jeden `play` erzeugt eine [`SinkFabrik`] eine neue Senke
//! passend zum angekuendigten Format.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use klangwerk_protocol::AudioFormat;
use parking_lot::Mutex;

use crate::error::{ClientError, ClientResult};

/// Empfaenger der Audiodaten eines Songs
pub trait PlaybackSink: Send {
    fn schreiben(&mut self, daten: &[u8]) -> ClientResult<()>;

    /// Wiedergabe ist vorbei (Songende oder Abbruch)
    fn beenden(&mut self) -> ClientResult<()>;
}

/// Erzeugt eine Senke pro Song
pub trait SinkFabrik: Send + Sync {
    fn erstellen(&self, format: &AudioFormat) -> ClientResult<Box<dyn PlaybackSink>>;
}

// ---------------------------------------------------------------------------
// WAV-Datei
// ---------------------------------------------------------------------------

/// Schreibt PCM-Daten mit WAV-Kopf in eine Datei
///
/// Der Kopf wird beim Anlegen mit Laenge 0 geschrieben und in
/// [`PlaybackSink::beenden`] auf die tatsaechliche Datenmenge korrigiert.
pub struct WavDateiSink {
    datei: BufWriter<File>,
    format: AudioFormat,
    pfad: PathBuf,
    daten_bytes: u64,
}

impl WavDateiSink {
    pub fn anlegen(pfad: &Path, format: &AudioFormat) -> ClientResult<Self> {
        let mut datei = BufWriter::new(File::create(pfad)?);
        datei.write_all(&format.wav_kopf(0))?;
        Ok(Self {
            datei,
            format: format.clone(),
            pfad: pfad.to_path_buf(),
            daten_bytes: 0,
        })
    }

    pub fn pfad(&self) -> &Path {
        &self.pfad
    }
}

impl PlaybackSink for WavDateiSink {
    fn schreiben(&mut self, daten: &[u8]) -> ClientResult<()> {
        self.datei.write_all(daten)?;
        self.daten_bytes += daten.len() as u64;
        Ok(())
    }

    fn beenden(&mut self) -> ClientResult<()> {
        let laenge = u32::try_from(self.daten_bytes).map_err(|_| {
            ClientError::Wiedergabe(format!(
                "{} Bytes passen nicht in einen WAV-Kopf",
                self.daten_bytes
            ))
        })?;
        self.datei.flush()?;

        let datei = self.datei.get_mut();
        datei.seek(SeekFrom::Start(0))?;
        datei.write_all(&self.format.wav_kopf(laenge))?;
        datei.seek(SeekFrom::End(0))?;
        datei.sync_data()?;

        tracing::info!(pfad = %self.pfad.display(), bytes = self.daten_bytes, "Aufnahme abgeschlossen");
        Ok(())
    }
}

/// Legt pro Song eine neue WAV-Datei im Verzeichnis an
#[derive(Debug)]
pub struct WavVerzeichnisFabrik {
    verzeichnis: PathBuf,
    zaehler: AtomicU32,
}

impl WavVerzeichnisFabrik {
    pub fn neu(verzeichnis: impl Into<PathBuf>) -> Self {
        Self {
            verzeichnis: verzeichnis.into(),
            zaehler: AtomicU32::new(0),
        }
    }
}

impl SinkFabrik for WavVerzeichnisFabrik {
    fn erstellen(&self, format: &AudioFormat) -> ClientResult<Box<dyn PlaybackSink>> {
        std::fs::create_dir_all(&self.verzeichnis)?;
        let nummer = self.zaehler.fetch_add(1, Ordering::Relaxed) + 1;
        let pfad = self.verzeichnis.join(format!("wiedergabe-{nummer:03}.wav"));
        Ok(Box::new(WavDateiSink::anlegen(&pfad, format)?))
    }
}

// ---------------------------------------------------------------------------
// Speicher
// ---------------------------------------------------------------------------

/// Sammelt alle Songs im Speicher, ein Eintrag pro Wiedergabe
#[derive(Debug, Clone, Default)]
pub struct SpeicherSink {
    aufnahmen: Arc<Mutex<Vec<Aufnahme>>>,
}

/// Eine im Speicher gesammelte Wiedergabe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aufnahme {
    pub format: AudioFormat,
    pub daten: Vec<u8>,
    pub beendet: bool,
}

impl SpeicherSink {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn aufnahmen(&self) -> Vec<Aufnahme> {
        self.aufnahmen.lock().clone()
    }
}

struct SpeicherSchreiber {
    aufnahmen: Arc<Mutex<Vec<Aufnahme>>>,
    index: usize,
}

impl PlaybackSink for SpeicherSchreiber {
    fn schreiben(&mut self, daten: &[u8]) -> ClientResult<()> {
        if let Some(aufnahme) = self.aufnahmen.lock().get_mut(self.index) {
            aufnahme.daten.extend_from_slice(daten);
        }
        Ok(())
    }

    fn beenden(&mut self) -> ClientResult<()> {
        if let Some(aufnahme) = self.aufnahmen.lock().get_mut(self.index) {
            aufnahme.beendet = true;
        }
        Ok(())
    }
}

impl SinkFabrik for SpeicherSink {
    fn erstellen(&self, format: &AudioFormat) -> ClientResult<Box<dyn PlaybackSink>> {
        let mut aufnahmen = self.aufnahmen.lock();
        aufnahmen.push(Aufnahme {
            format: format.clone(),
            daten: Vec::new(),
            beendet: false,
        });
        Ok(Box::new(SpeicherSchreiber {
            aufnahmen: Arc::clone(&self.aufnahmen),
            index: aufnahmen.len() - 1,
        }))
    }
}
