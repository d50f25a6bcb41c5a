//! Wire-Format fuer TCP-Verbindungen
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + Typ-Byte + Payload.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE)                   | Typ    | Payload   |
//! +--------+--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge zaehlt das Typ-Byte und die Payload-Bytes (ohne die 4
//! Laengen-Bytes). Typ 0 ist ein Audiofragment (FRAGMENT), Typ 1 eine
//! UTF-8-Steuernachricht (MESSAGE). Die Payload wird nicht escaped.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ProtocolError, ProtocolResult};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Laengenfeld + Typ-Byte
pub const HEADER_SIZE: usize = LENGTH_FIELD_SIZE + 1;

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Typ eines Frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Rohe Audiodaten
    Fragment = 0,
    /// UTF-8-Steuernachricht
    Message = 1,
}

impl FrameType {
    /// Typ-Byte auf dem Draht
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Wandelt ein Typ-Byte um
    pub fn from_tag(tag: u8) -> ProtocolResult<Self> {
        match tag {
            0 => Ok(Self::Fragment),
            1 => Ok(Self::Message),
            andere => Err(ProtocolError::UnbekannterFrameTyp(andere)),
        }
    }
}

/// Ein vollstaendig empfangener Frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Bytes,
}

impl Frame {
    /// Erstellt eine Steuernachricht
    pub fn message(payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type: FrameType::Message,
            payload: payload.into(),
        }
    }

    /// Erstellt ein Audiofragment
    pub fn fragment(payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type: FrameType::Fragment,
            payload: payload.into(),
        }
    }

    /// Payload einer MESSAGE als Text
    pub fn text(&self) -> ProtocolResult<&str> {
        Ok(std::str::from_utf8(&self.payload)?)
    }

    /// Groesse des Frames auf dem Draht
    pub fn kodierte_laenge(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// Codec fuer das Klangwerk-Frame-Format
///
/// Reine Datentransformation ohne IO. Implementiert zusaetzlich
/// `Encoder<Frame>` und `Decoder` fuer `tokio_util::codec::Framed`
/// (wird vom Client verwendet).
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Maximale erlaubte Payload-Groesse in Bytes
    max_frame_size: usize,
}

impl FrameCodec {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Erstellt einen `FrameCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Kodiert Typ und Payload in einen neuen Buffer
    pub fn encode(&self, frame_type: FrameType, payload: &[u8]) -> ProtocolResult<Bytes> {
        let mut dst = BytesMut::with_capacity(HEADER_SIZE + payload.len());
        self.encode_into(frame_type, payload, &mut dst)?;
        Ok(dst.freeze())
    }

    /// Haengt einen kodierten Frame an `dst` an
    pub fn encode_into(
        &self,
        frame_type: FrameType,
        payload: &[u8],
        dst: &mut BytesMut,
    ) -> ProtocolResult<()> {
        if payload.len() > self.max_frame_size {
            return Err(ProtocolError::FrameZuGross {
                groesse: payload.len(),
                maximum: self.max_frame_size,
            });
        }

        // Laenge zaehlt das Typ-Byte mit
        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_u32((payload.len() + 1) as u32);
        dst.put_u8(frame_type.tag());
        dst.put_slice(payload);
        Ok(())
    }

    /// Liest Laenge und Typ-Byte ohne den Buffer zu veraendern
    ///
    /// Gibt `(typ_byte, gesamtlaenge)` nur zurueck wenn der Frame komplett
    /// im Buffer liegt. Ein unplausibel grosses Laengenfeld gilt als
    /// unvollstaendig.
    pub fn kopf_lesen(&self, src: &[u8]) -> ProtocolResult<Option<(u8, usize)>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let laenge = deklarierte_laenge(src);
        if laenge == 0 {
            return Err(ProtocolError::LeererFrame);
        }
        if laenge - 1 > self.max_frame_size {
            return Ok(None);
        }

        let gesamt = LENGTH_FIELD_SIZE + laenge;
        if src.len() < gesamt {
            return Ok(None);
        }

        Ok(Some((src[LENGTH_FIELD_SIZE], gesamt)))
    }

    /// Gibt true zurueck wenn der naechste Frame laut Laengenfeld das Limit sprengt
    pub fn laenge_unplausibel(&self, src: &[u8]) -> bool {
        src.len() >= LENGTH_FIELD_SIZE && deklarierte_laenge(src) > self.max_frame_size + 1
    }

    /// Entnimmt den aeltesten vollstaendigen Frame
    ///
    /// `Ok(None)` heisst unvollstaendig; dabei werden keine Bytes verbraucht.
    pub fn decode_frame(&self, src: &mut BytesMut) -> ProtocolResult<Option<Frame>> {
        let (tag, gesamt) = match self.kopf_lesen(src)? {
            Some(kopf) => kopf,
            None => {
                // Speicher vorbelegen wenn die Laenge plausibel ist
                if src.len() >= LENGTH_FIELD_SIZE && !self.laenge_unplausibel(src) {
                    let gesamt = LENGTH_FIELD_SIZE + deklarierte_laenge(src);
                    src.reserve(gesamt.saturating_sub(src.len()));
                }
                return Ok(None);
            }
        };

        let frame_type = FrameType::from_tag(tag)?;

        let mut frame_bytes = src.split_to(gesamt);
        frame_bytes.advance(HEADER_SIZE);

        Ok(Some(Frame {
            frame_type,
            payload: frame_bytes.freeze(),
        }))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Laengenfeld (u32 BE) als usize, ohne Vorzeichenerweiterung
fn deklarierte_laenge(src: &[u8]) -> usize {
    u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize
}

// ---------------------------------------------------------------------------
// tokio-util Decoder/Encoder
// ---------------------------------------------------------------------------

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.laenge_unplausibel(src) {
            return Err(ProtocolError::FrameZuGross {
                groesse: deklarierte_laenge(src).saturating_sub(1),
                maximum: self.max_frame_size,
            });
        }
        self.decode_frame(src)
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.encode_into(item.frame_type, &item.payload, dst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
