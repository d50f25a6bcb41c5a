//! Reassembly-Puffer fuer eingehende Bytes
//!
//! TCP liefert einen Bytestrom ohne Frame-Grenzen. Der Puffer sammelt die
//! gelesenen Bytes und gibt vollstaendige Frames einzeln heraus. Ein
//! einzelner `read()` kann mehrere Frames enthalten, deshalb muss
//! `next_frame()` in einer Schleife aufgerufen werden bis `None` kommt.

use bytes::{Bytes, BytesMut};

use crate::error::ProtocolResult;
use crate::wire::{Frame, FrameCodec, FrameType, HEADER_SIZE};

/// Standard-Anfangskapazitaet (entspricht einem Lesepuffer)
pub const DEFAULT_KAPAZITAET: usize = 8192;

/// Sammelt Bytes einer Verbindung und liefert vollstaendige Frames
#[derive(Debug)]
pub struct ReassemblyBuffer {
    puffer: BytesMut,
    codec: FrameCodec,
}

impl ReassemblyBuffer {
    /// Erstellt einen leeren Puffer mit Standard-Codec
    pub fn new() -> Self {
        Self::with_codec(FrameCodec::new())
    }

    /// Erstellt einen leeren Puffer mit eigenem Codec (z.B. anderem Frame-Limit)
    pub fn with_codec(codec: FrameCodec) -> Self {
        Self {
            puffer: BytesMut::with_capacity(DEFAULT_KAPAZITAET),
            codec,
        }
    }

    /// Haengt gelesene Bytes an das Ende an
    pub fn append(&mut self, bytes: &[u8]) {
        self.puffer.extend_from_slice(bytes);
    }

    /// Schiebt Bytes an den Anfang zurueck
    ///
    /// Wird benoetigt wenn bereits gelesene Bytes von einem anderen
    /// Verbraucher erneut verarbeitet werden muessen.
    pub fn prepend(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut neu = BytesMut::with_capacity(bytes.len() + self.puffer.len());
        neu.extend_from_slice(bytes);
        neu.extend_from_slice(&self.puffer);
        self.puffer = neu;
    }

    /// Entnimmt den aeltesten vollstaendigen Frame
    pub fn next_frame(&mut self) -> ProtocolResult<Option<Frame>> {
        self.codec.decode_frame(&mut self.puffer)
    }

    /// Liest den aeltesten vollstaendigen Frame ohne ihn zu entfernen
    pub fn peek_frame(&self) -> ProtocolResult<Option<Frame>> {
        let Some((tag, gesamt)) = self.codec.kopf_lesen(&self.puffer)? else {
            return Ok(None);
        };
        let frame_type = FrameType::from_tag(tag)?;
        Ok(Some(Frame {
            frame_type,
            payload: Bytes::copy_from_slice(&self.puffer[HEADER_SIZE..gesamt]),
        }))
    }

    /// Typ des aeltesten vollstaendigen Frames
    pub fn peek_type(&self) -> ProtocolResult<Option<FrameType>> {
        match self.codec.kopf_lesen(&self.puffer)? {
            Some((tag, _)) => FrameType::from_tag(tag).map(Some),
            None => Ok(None),
        }
    }

    /// Verwirft den naechsten vollstaendigen Frame ohne die Payload zu kopieren
    ///
    /// Das Typ-Byte wird nicht geprueft. Gibt `false` zurueck wenn kein
    /// vollstaendiger Frame vorliegt.
    pub fn skip_frame(&mut self) -> bool {
        match self.codec.kopf_lesen(&self.puffer) {
            Ok(Some((_, gesamt))) => {
                let _ = self.puffer.split_to(gesamt);
                true
            }
            _ => false,
        }
    }

    /// Gibt true zurueck wenn das naechste Laengenfeld das Frame-Limit sprengt
    ///
    /// Der Puffer meldet solche Frames nur als unvollstaendig; der Aufrufer
    /// entscheidet, ob er die Verbindung schliesst.
    pub fn laenge_unplausibel(&self) -> bool {
        self.codec.laenge_unplausibel(&self.puffer)
    }

    /// Entnimmt alle gepufferten Bytes (fuer die Uebergabe an einen anderen Verbraucher)
    pub fn take_remaining(&mut self) -> BytesMut {
        self.puffer.split()
    }

    /// Anzahl gepufferter Bytes
    pub fn len(&self) -> usize {
        self.puffer.len()
    }

    /// Gibt true zurueck wenn keine Bytes gepuffert sind
    pub fn is_empty(&self) -> bool {
        self.puffer.is_empty()
    }

    /// Verwirft alle gepufferten Bytes
    pub fn clear(&mut self) {
        self.puffer.clear();
    }
}

impl Default for ReassemblyBuffer {
    fn default() -> Self {
        Self::new()
    }
}
