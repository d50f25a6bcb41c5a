//! Verbindungs-Handles und Attachments
//!
//! Jede TCP-Verbindung gehoert genau einem Verbindungs-Task im
//! Multiplexer. Andere Stellen (Registry, Befehlsausfuehrung) sprechen die
//! Verbindung nur ueber ein [`ConnectionHandle`] an: Bytes einreihen,
//! Schreibinteresse umschalten oder das Schliessen anfordern. Der Task
//! fuehrt diese Auftraege in seiner eigenen Schleife aus, sodass nie zwei
//! Stellen gleichzeitig die Puffer einer Verbindung anfassen.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use klangwerk_core::ConnectionId;
use klangwerk_protocol::{FrameCodec, ServerResponse};
use tokio::sync::{mpsc, watch};

use crate::error::StreamingResult;

// ---------------------------------------------------------------------------
// Auftraege an den Verbindungs-Task
// ---------------------------------------------------------------------------

/// Auftrag an den Task, der die Verbindung besitzt
#[derive(Debug)]
pub enum Steuerbefehl {
    /// Kodierten Frame in die Ausgangs-Queue einreihen
    Senden(Bytes),
    /// Verbindung schliessen, ausstehende Bytes verwerfen
    Schliessen,
}

/// Readiness-Interesse einer Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interesse {
    Lesen,
    /// Lesen und Schreiben; auf Audioverbindungen heisst das: Fragmente ziehen
    LesenSchreiben,
}

// ---------------------------------------------------------------------------
// ConnectionHandle
// ---------------------------------------------------------------------------

/// Klonbarer Verweis auf eine Verbindung
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer: SocketAddr,
    steuer_tx: mpsc::UnboundedSender<Steuerbefehl>,
    interesse_tx: Arc<watch::Sender<Interesse>>,
    /// Kodiert Nachrichten von ausserhalb des Verbindungs-Tasks
    codec: FrameCodec,
}

/// Empfangsseite der Auftraege, gehoert dem Verbindungs-Task
#[derive(Debug)]
pub struct ConnectionMailbox {
    pub steuer_rx: mpsc::UnboundedReceiver<Steuerbefehl>,
    pub interesse_rx: watch::Receiver<Interesse>,
}

impl ConnectionHandle {
    /// Erstellt Handle und Mailbox fuer eine neue Verbindung
    pub fn neu(peer: SocketAddr) -> (Self, ConnectionMailbox) {
        Self::mit_codec(peer, FrameCodec::new())
    }

    /// Wie [`ConnectionHandle::neu`], mit dem Frame-Limit des Multiplexers
    pub fn mit_codec(peer: SocketAddr, codec: FrameCodec) -> (Self, ConnectionMailbox) {
        let (steuer_tx, steuer_rx) = mpsc::unbounded_channel();
        let (interesse_tx, interesse_rx) = watch::channel(Interesse::Lesen);
        let handle = Self {
            id: ConnectionId::new(),
            peer,
            steuer_tx,
            interesse_tx: Arc::new(interesse_tx),
            codec,
        };
        (
            handle,
            ConnectionMailbox {
                steuer_rx,
                interesse_rx,
            },
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Reiht kodierte Bytes ein; `false` wenn die Verbindung schon weg ist
    pub fn senden(&self, bytes: Bytes) -> bool {
        self.steuer_tx.send(Steuerbefehl::Senden(bytes)).is_ok()
    }

    /// Kodiert eine Antwort als MESSAGE-Frame und reiht sie ein
    pub fn nachricht_senden(&self, antwort: &ServerResponse) -> StreamingResult<bool> {
        let frame = antwort.als_frame()?;
        let bytes = self.codec.encode(frame.frame_type, &frame.payload)?;
        Ok(self.senden(bytes))
    }

    /// Fordert das Schliessen der Verbindung an
    pub fn schliessen(&self) {
        let _ = self.steuer_tx.send(Steuerbefehl::Schliessen);
    }

    pub fn interesse_setzen(&self, interesse: Interesse) {
        self.interesse_tx.send_replace(interesse);
    }

    pub fn interesse(&self) -> Interesse {
        *self.interesse_tx.borrow()
    }

    /// Gibt true zurueck solange der Verbindungs-Task laeuft
    pub fn ist_offen(&self) -> bool {
        !self.steuer_tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Attachment
// ---------------------------------------------------------------------------

/// Rolle einer Verbindung, gehalten vom Verbindungs-Task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Attachment {
    /// Noch keine Anmeldung und keine Verknuepfung
    #[default]
    Unauthentifiziert,
    /// Steuerverbindung einer Sitzung
    Steuerung { benutzer: String },
    /// Per `musicConnect` verknuepfte Audioverbindung
    Audio { benutzer: String },
}

impl Attachment {
    /// Benutzer, zu dem die Verbindung gehoert
    pub fn benutzer(&self) -> Option<&str> {
        match self {
            Self::Unauthentifiziert => None,
            Self::Steuerung { benutzer } | Self::Audio { benutzer } => Some(benutzer),
        }
    }

    pub fn ist_audio(&self) -> bool {
        matches!(self, Self::Audio { .. })
    }

    pub fn ist_steuerung(&self) -> bool {
        matches!(self, Self::Steuerung { .. })
    }
}

impl std::fmt::Display for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthentifiziert => f.write_str("unauthentifiziert"),
            Self::Steuerung { benutzer } => write!(f, "steuerung:{benutzer}"),
            Self::Audio { benutzer } => write!(f, "audio:{benutzer}"),
        }
    }
}
