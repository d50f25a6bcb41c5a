//! Audioquellen
//!
//! Eine [`AudioSource`] liefert die Rohdaten eines Songs in Stuecken.
//! Der Transport ruft nur `read` und `close` auf; wie die Datei dekodiert
//! wird, entscheidet der [`AudioOpener`].
//!
//! [`SymphoniaOpener`] dekodiert WAV/MP3 mit symphonia und gibt verschraenkte
//! Samples als signed 16 Bit little-endian aus.

use std::fs::File;
use std::path::Path;

use klangwerk_protocol::AudioFormat;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

/// Fehler beim Oeffnen oder Lesen einer Audiodatei
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Format nicht unterstuetzt: {0}")]
    NichtUnterstuetzt(String),

    #[error("Datei enthaelt keine Audiospur")]
    KeineSpur,

    #[error("Dekodierung fehlgeschlagen: {0}")]
    Dekodierung(String),
}

impl From<SymphoniaError> for AudioError {
    fn from(e: SymphoniaError) -> Self {
        match e {
            SymphoniaError::IoError(io) => Self::Io(io),
            SymphoniaError::Unsupported(was) => Self::NichtUnterstuetzt(was.to_string()),
            andere => Self::Dekodierung(andere.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Ein geoeffneter, lesbarer Audiostrom
pub trait AudioSource: Send {
    /// Format der gelieferten Rohdaten
    fn format(&self) -> &AudioFormat;

    /// Fuellt `puffer` so weit wie moeglich; `Ok(0)` bedeutet Ende der Daten
    fn read(&mut self, puffer: &mut [u8]) -> Result<usize, AudioError>;

    /// Gibt Dateihandles und Dekoderzustand frei
    fn close(&mut self);
}

/// Oeffnet Audioquellen fuer Songdateien
pub trait AudioOpener: Send + Sync {
    fn open(&self, pfad: &Path) -> Result<Box<dyn AudioSource>, AudioError>;
}

// ---------------------------------------------------------------------------
// symphonia
// ---------------------------------------------------------------------------

/// Oeffnet Songs ueber symphonia
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaOpener;

impl AudioOpener for SymphoniaOpener {
    fn open(&self, pfad: &Path) -> Result<Box<dyn AudioSource>, AudioError> {
        Ok(Box::new(SymphoniaQuelle::oeffnen(pfad)?))
    }
}

/// Dekodierender Audiostrom ueber eine Datei
pub struct SymphoniaQuelle {
    format: AudioFormat,
    leser: Box<dyn FormatReader>,
    dekoder: Box<dyn Decoder>,
    spur_id: u32,
    /// Dekodierte, noch nicht ausgelieferte Bytes
    ausstehend: Vec<u8>,
    position: usize,
    ende: bool,
}

impl SymphoniaQuelle {
    /// Oeffnet die Datei und bereitet den Dekoder vor
    pub fn oeffnen(pfad: &Path) -> Result<Self, AudioError> {
        let datei = File::open(pfad)?;
        let mss = MediaSourceStream::new(Box::new(datei), Default::default());

        let mut hint = Hint::new();
        if let Some(endung) = pfad.extension().and_then(|e| e.to_str()) {
            hint.with_extension(endung);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let leser = probed.format;

        let spur = leser
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(AudioError::KeineSpur)?;
        let spur_id = spur.id;
        let params = spur.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| AudioError::NichtUnterstuetzt("Samplerate unbekannt".into()))?;
        let kanaele = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| AudioError::NichtUnterstuetzt("Kanalanzahl unbekannt".into()))?;

        let dekoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

        tracing::debug!(
            pfad = %pfad.display(),
            sample_rate,
            kanaele,
            "Audioquelle geoeffnet"
        );

        Ok(Self {
            format: AudioFormat::pcm_s16le(sample_rate, kanaele),
            leser,
            dekoder,
            spur_id,
            ausstehend: Vec::new(),
            position: 0,
            ende: false,
        })
    }

    /// Dekodiert das naechste Paket der Spur; `false` am Dateiende
    fn naechstes_paket(&mut self) -> Result<bool, AudioError> {
        loop {
            let paket = match self.leser.next_packet() {
                Ok(paket) => paket,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => return Err(e.into()),
            };

            if paket.track_id() != self.spur_id {
                continue;
            }

            match self.dekoder.decode(&paket) {
                Ok(dekodiert) => {
                    let spec = *dekodiert.spec();
                    let mut samples = SampleBuffer::<i16>::new(dekodiert.capacity() as u64, spec);
                    samples.copy_interleaved_ref(dekodiert);

                    self.ausstehend.clear();
                    self.position = 0;
                    for sample in samples.samples() {
                        self.ausstehend.extend_from_slice(&sample.to_le_bytes());
                    }
                    if !self.ausstehend.is_empty() {
                        return Ok(true);
                    }
                }
                // Einzelne kaputte Pakete ueberspringen
                Err(SymphoniaError::DecodeError(grund)) => {
                    tracing::warn!(grund, "Audiopaket nicht dekodierbar, uebersprungen");
                }
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl AudioSource for SymphoniaQuelle {
    fn format(&self) -> &AudioFormat {
        &self.format
    }

    fn read(&mut self, puffer: &mut [u8]) -> Result<usize, AudioError> {
        let mut geschrieben = 0;

        while geschrieben < puffer.len() {
            let verfuegbar = self.ausstehend.len() - self.position;
            if verfuegbar > 0 {
                let n = verfuegbar.min(puffer.len() - geschrieben);
                puffer[geschrieben..geschrieben + n]
                    .copy_from_slice(&self.ausstehend[self.position..self.position + n]);
                self.position += n;
                geschrieben += n;
                continue;
            }

            if self.ende {
                break;
            }
            if !self.naechstes_paket()? {
                self.ende = true;
            }
        }

        Ok(geschrieben)
    }

    fn close(&mut self) {
        self.ende = true;
        self.ausstehend = Vec::new();
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_erzeugen(pfad: &Path, daten: &[u8]) -> AudioFormat {
        let format = AudioFormat::pcm_s16le(8_000, 2);
        let mut datei = format.wav_kopf(daten.len() as u32);
        datei.extend_from_slice(daten);
        std::fs::write(pfad, datei).unwrap();
        format
    }

    fn testdaten(laenge: usize) -> Vec<u8> {
        (0..laenge).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[test]
    fn wav_wird_byteweise_identisch_geliefert() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("song.wav");
        let daten = testdaten(40_000);
        let format = wav_erzeugen(&pfad, &daten);

        let mut quelle = SymphoniaOpener.open(&pfad).unwrap();
        assert_eq!(quelle.format(), &format);

        let mut gelesen = Vec::new();
        let mut puffer = [0u8; 8187];
        loop {
            let n = quelle.read(&mut puffer).unwrap();
            if n == 0 {
                break;
            }
            gelesen.extend_from_slice(&puffer[..n]);
        }
        assert_eq!(gelesen, daten);
    }

    #[test]
    fn stuecke_haben_feste_groesse_bis_zum_ende() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("song.wav");
        wav_erzeugen(&pfad, &testdaten(10_000));

        let mut quelle = SymphoniaOpener.open(&pfad).unwrap();
        let mut puffer = [0u8; 4096];
        assert_eq!(quelle.read(&mut puffer).unwrap(), 4096);
        assert_eq!(quelle.read(&mut puffer).unwrap(), 4096);
        assert_eq!(quelle.read(&mut puffer).unwrap(), 10_000 - 8192);
        assert_eq!(quelle.read(&mut puffer).unwrap(), 0);
    }

    #[test]
    fn nach_close_kommen_keine_daten_mehr() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("song.wav");
        wav_erzeugen(&pfad, &testdaten(20_000));

        let mut quelle = SymphoniaOpener.open(&pfad).unwrap();
        let mut puffer = [0u8; 100];
        assert_eq!(quelle.read(&mut puffer).unwrap(), 100);
        quelle.close();
        assert_eq!(quelle.read(&mut puffer).unwrap(), 0);
    }

    #[test]
    fn fehlende_datei_ist_io_fehler() {
        let ergebnis = SymphoniaOpener.open(Path::new("/gibt/es/nicht.wav"));
        assert!(matches!(ergebnis, Err(AudioError::Io(_))));
    }

    #[test]
    fn keine_audiodatei_wird_abgelehnt() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("text.wav");
        std::fs::write(&pfad, b"das ist kein audio, nur text").unwrap();
        assert!(SymphoniaOpener.open(&pfad).is_err());
    }
}
