//! Ausgangs-Queue pro Verbindung
//!
//! Nicht-blockierende Sockets nehmen oft nur einen Teil eines Frames an.
//! Die Queue haelt kodierte Frames in Reihenfolge; ein teilweise
//! gesendeter Frame bleibt mit seinem Rest am Kopf stehen, bis er komplett
//! raus ist. Bytes verschiedener Frames werden nie verschraenkt.

use std::collections::VecDeque;
use std::io;

use bytes::{Buf, Bytes};
use tokio::net::TcpStream;

/// Ziel fuer nicht-blockierende Schreibversuche
///
/// `WouldBlock` bedeutet: Socket-Puffer voll, spaeter erneut versuchen.
pub trait SchreibZiel {
    fn try_write_some(&mut self, daten: &[u8]) -> io::Result<usize>;
}

impl SchreibZiel for TcpStream {
    fn try_write_some(&mut self, daten: &[u8]) -> io::Result<usize> {
        self.try_write(daten)
    }
}

/// FIFO-Queue noch nicht geschriebener Frames
#[derive(Debug, Default)]
pub struct OutboundQueue {
    frames: VecDeque<Bytes>,
    ausstehende_bytes: usize,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reiht einen Frame ein
    ///
    /// Ist die Queue leer, wird sofort geschrieben. Sonst wird hinten
    /// angehaengt, damit der laufende Frame zuerst fertig wird. Gibt
    /// `true` zurueck wenn danach alles gesendet ist.
    pub fn enqueue<W>(&mut self, ziel: &mut W, frame: Bytes) -> io::Result<bool>
    where
        W: SchreibZiel + ?Sized,
    {
        let war_leer = self.frames.is_empty();
        self.push(frame);
        if war_leer {
            self.flush(ziel)
        } else {
            Ok(false)
        }
    }

    /// Haengt einen Frame an ohne zu schreiben
    pub fn push(&mut self, frame: Bytes) {
        if frame.is_empty() {
            return;
        }
        self.ausstehende_bytes += frame.len();
        self.frames.push_back(frame);
    }

    /// Schreibt so viel wie der Socket annimmt
    ///
    /// Gibt `true` zurueck wenn die Queue danach leer ist. Bei `false`
    /// muss der Aufrufer auf Schreibbereitschaft warten.
    pub fn flush<W>(&mut self, ziel: &mut W) -> io::Result<bool>
    where
        W: SchreibZiel + ?Sized,
    {
        while let Some(kopf) = self.frames.front_mut() {
            match ziel.try_write_some(kopf) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "Socket nimmt keine Daten mehr an",
                    ));
                }
                Ok(n) if n >= kopf.len() => {
                    self.ausstehende_bytes -= kopf.len();
                    self.frames.pop_front();
                }
                Ok(n) => {
                    // Rest bleibt am Kopf stehen
                    kopf.advance(n);
                    self.ausstehende_bytes -= n;
                    return Ok(false);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    /// Verwirft alle ausstehenden Frames (Verbindung wird geschlossen)
    pub fn clear(&mut self) {
        self.frames.clear();
        self.ausstehende_bytes = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Anzahl ausstehender Frames (ein angefangener zaehlt mit)
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Noch nicht geschriebene Bytes
    pub fn ausstehende_bytes(&self) -> usize {
        self.ausstehende_bytes
    }
}
