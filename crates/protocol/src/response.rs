//! Antwort-Nachrichten des Servers
//!
//! Jede MESSAGE vom Server an den Client ist ein JSON-Objekt
//! `{status, message, song_format?}`. Das Audioformat begleitet die Antwort
//! auf `play`, damit der Client seine Wiedergabe vorbereiten kann.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolResult;
use crate::wire::Frame;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Status einer Server-Antwort
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error,
    /// Audioverbindung verknuepft, Client darf `beginStreaming` senden
    ReadyToStream,
    SuccessfullyLoggedIn,
    LoggedOut,
    /// Wiedergabe beendet (gestoppt, Songende oder Lesefehler)
    StopStreaming,
}

// ---------------------------------------------------------------------------
// Audioformat
// ---------------------------------------------------------------------------

/// Kodierung der Samples in den Audiofragmenten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioEncoding {
    PcmSigned,
    PcmUnsigned,
    PcmFloat,
}

/// Beschreibung der Rohdaten, die als FRAGMENT-Frames gesendet werden
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub encoding: AudioEncoding,
    pub sample_rate: u32,
    pub sample_size_in_bits: u16,
    pub channels: u16,
    /// Bytes pro Frame (alle Kanaele eines Zeitpunkts)
    pub frame_size: u16,
    pub frame_rate: u32,
    pub big_endian: bool,
}

impl AudioFormat {
    /// Signed 16 Bit little-endian, verschraenkte Kanaele
    pub fn pcm_s16le(sample_rate: u32, channels: u16) -> Self {
        Self {
            encoding: AudioEncoding::PcmSigned,
            sample_rate,
            sample_size_in_bits: 16,
            channels,
            frame_size: channels * 2,
            frame_rate: sample_rate,
            big_endian: false,
        }
    }

    /// Datenrate in Bytes pro Sekunde
    pub fn bytes_pro_sekunde(&self) -> u64 {
        u64::from(self.frame_size) * u64::from(self.frame_rate)
    }

    /// 44-Byte RIFF/WAVE-Kopf fuer `daten_bytes` Rohdaten in diesem Format
    pub fn wav_kopf(&self, daten_bytes: u32) -> Vec<u8> {
        let format_tag: u16 = match self.encoding {
            AudioEncoding::PcmFloat => 3,
            AudioEncoding::PcmSigned | AudioEncoding::PcmUnsigned => 1,
        };
        let byte_rate = self.sample_rate * u32::from(self.frame_size);

        let mut kopf = Vec::with_capacity(44);
        kopf.extend_from_slice(b"RIFF");
        kopf.extend_from_slice(&(36 + daten_bytes).to_le_bytes());
        kopf.extend_from_slice(b"WAVE");
        kopf.extend_from_slice(b"fmt ");
        kopf.extend_from_slice(&16u32.to_le_bytes());
        kopf.extend_from_slice(&format_tag.to_le_bytes());
        kopf.extend_from_slice(&self.channels.to_le_bytes());
        kopf.extend_from_slice(&self.sample_rate.to_le_bytes());
        kopf.extend_from_slice(&byte_rate.to_le_bytes());
        kopf.extend_from_slice(&self.frame_size.to_le_bytes());
        kopf.extend_from_slice(&self.sample_size_in_bits.to_le_bytes());
        kopf.extend_from_slice(b"data");
        kopf.extend_from_slice(&daten_bytes.to_le_bytes());
        kopf
    }
}

// ---------------------------------------------------------------------------
// ServerResponse
// ---------------------------------------------------------------------------

/// Antwort des Servers auf eine Anfrage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerResponse {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub song_format: Option<AudioFormat>,
}

impl ServerResponse {
    /// Erstellt eine Antwort ohne Audioformat
    pub fn neu(status: ResponseStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            song_format: None,
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self::neu(ResponseStatus::Ok, message)
    }

    pub fn fehler(message: impl Into<String>) -> Self {
        Self::neu(ResponseStatus::Error, message)
    }

    /// Haengt ein Audioformat an
    pub fn mit_format(mut self, format: AudioFormat) -> Self {
        self.song_format = Some(format);
        self
    }

    /// Serialisiert die Antwort als MESSAGE-Frame
    pub fn als_frame(&self) -> ProtocolResult<Frame> {
        Ok(Frame::message(serde_json::to_vec(self)?))
    }

    /// Liest eine Antwort aus der Payload eines MESSAGE-Frames
    pub fn aus_frame(frame: &Frame) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(&frame.payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wird_snake_case_serialisiert() {
        let json = serde_json::to_string(&ResponseStatus::ReadyToStream).unwrap();
        assert_eq!(json, "\"ready_to_stream\"");
        let json = serde_json::to_string(&ResponseStatus::SuccessfullyLoggedIn).unwrap();
        assert_eq!(json, "\"successfully_logged_in\"");
    }

    #[test]
    fn antwort_ohne_format_laesst_feld_weg() {
        let json = serde_json::to_string(&ServerResponse::ok("Song gestoppt.")).unwrap();
        assert!(!json.contains("song_format"));
        assert!(json.contains("\"status\":\"ok\""));
    }

    #[test]
    fn antwort_mit_format_ueber_frame() {
        let antwort = ServerResponse::ok("Jetzt laeuft: Intro von Band")
            .mit_format(AudioFormat::pcm_s16le(44_100, 2));
        let frame = antwort.als_frame().unwrap();
        assert_eq!(frame.frame_type, crate::FrameType::Message);

        let zurueck = ServerResponse::aus_frame(&frame).unwrap();
        assert_eq!(zurueck, antwort);
        let format = zurueck.song_format.unwrap();
        assert_eq!(format.frame_size, 4);
        assert_eq!(format.bytes_pro_sekunde(), 176_400);
    }

    #[test]
    fn wav_kopf_felder() {
        let kopf = AudioFormat::pcm_s16le(8_000, 1).wav_kopf(100);
        assert_eq!(kopf.len(), 44);
        assert_eq!(&kopf[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes([kopf[4], kopf[5], kopf[6], kopf[7]]), 136);
        assert_eq!(u16::from_le_bytes([kopf[22], kopf[23]]), 1);
        assert_eq!(u32::from_le_bytes([kopf[24], kopf[25], kopf[26], kopf[27]]), 8_000);
        assert_eq!(u32::from_le_bytes([kopf[40], kopf[41], kopf[42], kopf[43]]), 100);
    }

    #[test]
    fn ungueltiges_json_ist_fehler() {
        let frame = Frame::message("kein json");
        assert!(ServerResponse::aus_frame(&frame).is_err());
    }
}
