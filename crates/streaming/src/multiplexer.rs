//! Connection-Multiplexer – Nimmt Verbindungen an und treibt Lesen/Schreiben
//!
//! Jede TCP-Verbindung bekommt einen eigenen tokio-Task, der als einziger
//! ihre Puffer anfasst. Der Task wartet per `select!` auf Lese- oder
//! Schreibbereitschaft des Sockets, auf Auftraege aus dem
//! [`ConnectionHandle`] und auf das Shutdown-Signal.
//!
//! ## Zustaende einer Verbindung
//! ```text
//! Offen -> Schliessend -> Geschlossen
//!   |                        ^
//!   +------------------------+   (Peer weg, Protokollfehler, Schliessen-Auftrag)
//! ```
//! Im Zustand `Schliessend` wird nichts mehr gelesen; die Ausgangs-Queue
//! wird noch geleert (z.B. die Antwort auf `disconnect`).
//!
//! ## Audioverbindungen
//! Steht das Schreibinteresse einer Audioverbindung auf
//! [`Interesse::LesenSchreiben`], zieht der Task bei jeder leeren
//! Ausgangs-Queue das naechste Fragment aus der Registry. Es liegt also nie
//! mehr als ein Fragment ausserhalb des Socket-Puffers bereit.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use klangwerk_core::ConnectionId;
use klangwerk_protocol::wire::{DEFAULT_MAX_FRAME_SIZE, HEADER_SIZE};
use klangwerk_protocol::{
    FrameCodec, FrameType, ProtocolError, ReassemblyBuffer, ResponseStatus, ServerResponse,
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::connection::{Attachment, ConnectionHandle, ConnectionMailbox, Interesse, Steuerbefehl};
use crate::error::StreamingError;
use crate::handler::{RequestContext, RequestHandler};
use crate::outbound::OutboundQueue;
use crate::registry::{NaechstesFragment, StreamingSessionRegistry};

/// Obergrenze fuer Fragmente pro Schreibbereitschaft, damit ein schneller
/// Client andere Tasks nicht aushungert
const FRAGMENTE_PRO_RUNDE: usize = 16;

/// Nachricht an die Steuerverbindung, wenn ein Song zu Ende ist
pub const SONG_BEENDET: &str = "Song beendet.";

const INTERNER_FEHLER: &str = "Interner Serverfehler.";

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Einstellungen des Multiplexers
#[derive(Debug, Clone)]
pub struct MultiplexerConfig {
    /// Gleichzeitig offene Verbindungen (Steuer- und Audioverbindungen)
    pub max_verbindungen: usize,
    /// Groesse eines einzelnen Socket-Reads
    pub lese_puffer: usize,
    /// Groesste erlaubte Frame-Payload
    pub max_frame_groesse: usize,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            max_verbindungen: 512,
            lese_puffer: 8192,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VerbindungsZustand {
    Offen,
    /// Nur noch Ausgangs-Queue leeren, dann schliessen
    Schliessend,
}

/// Grund fuer das Ende einer Verbindung
#[derive(Debug)]
enum Ende {
    PeerGeschlossen,
    /// Schliessen-Auftrag oder Antwort mit Schliessen-Flag gesendet
    Angefordert,
    Herunterfahren,
    Protokoll(ProtocolError),
    Verbindung(io::Error),
}

/// Alles, was nur der Verbindungs-Task selbst anfasst
struct Verbindung {
    handle: ConnectionHandle,
    attachment: Attachment,
    zustand: VerbindungsZustand,
    eingang: ReassemblyBuffer,
    ausgang: OutboundQueue,
    lese_puffer: Vec<u8>,
}

impl Verbindung {
    fn will_schreiben(&self) -> bool {
        !self.ausgang.is_empty()
            || (self.attachment.ist_audio() && self.handle.interesse() == Interesse::LesenSchreiben)
    }
}

// ---------------------------------------------------------------------------
// ConnectionMultiplexer
// ---------------------------------------------------------------------------

/// Nimmt Verbindungen an und verteilt Lese-/Schreibereignisse
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct ConnectionMultiplexer {
    inner: Arc<MultiplexerInner>,
}

struct MultiplexerInner {
    registry: StreamingSessionRegistry,
    handler: Arc<dyn RequestHandler>,
    config: MultiplexerConfig,
    codec: FrameCodec,
    verbindungen: DashMap<ConnectionId, ConnectionHandle>,
}

impl ConnectionMultiplexer {
    pub fn neu(
        registry: StreamingSessionRegistry,
        handler: Arc<dyn RequestHandler>,
        config: MultiplexerConfig,
    ) -> Self {
        let codec = FrameCodec::with_max_size(config.max_frame_groesse);
        Self {
            inner: Arc::new(MultiplexerInner {
                registry,
                handler,
                config,
                codec,
                verbindungen: DashMap::new(),
            }),
        }
    }

    pub fn registry(&self) -> &StreamingSessionRegistry {
        &self.inner.registry
    }

    /// Anzahl offener Verbindungen
    pub fn verbindungs_anzahl(&self) -> usize {
        self.inner.verbindungen.len()
    }

    /// Accept-Loop
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt und wartet danach
    /// auf das Ende aller Verbindungs-Tasks.
    pub async fn starten(
        self,
        listener: TcpListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> io::Result<()> {
        let lokale_addr = listener.local_addr()?;
        tracing::info!(adresse = %lokale_addr, "Streaming-Server gestartet");

        let mut treiber = JoinSet::new();

        while !*shutdown_rx.borrow() {
            tokio::select! {
                ergebnis = listener.accept() => {
                    match ergebnis {
                        Ok((stream, peer_addr)) => {
                            if let Some(task) = self.annehmen(stream, peer_addr, shutdown_rx.clone()) {
                                treiber.spawn(task);
                            }
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }

                Some(beendet) = treiber.join_next(), if !treiber.is_empty() => {
                    if let Err(e) = beendet {
                        tracing::error!(fehler = %e, "Verbindungs-Task abgebrochen");
                    }
                }

                ergebnis = shutdown_rx.changed() => {
                    if ergebnis.is_err() {
                        break;
                    }
                }
            }
        }

        drop(listener);
        tracing::info!(offen = treiber.len(), "Shutdown – warte auf Verbindungs-Tasks");
        while treiber.join_next().await.is_some() {}

        tracing::info!("Streaming-Server gestoppt");
        Ok(())
    }

    /// Registriert eine neue Verbindung und liefert ihren Task
    fn annehmen(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Option<impl std::future::Future<Output = ()> + Send + 'static> {
        if self.verbindungs_anzahl() >= self.inner.config.max_verbindungen {
            tracing::warn!(
                peer = %peer_addr,
                max = self.inner.config.max_verbindungen,
                "Server voll – Verbindung abgelehnt"
            );
            return None;
        }

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
        }

        let (handle, mailbox) = ConnectionHandle::mit_codec(peer_addr, self.inner.codec.clone());
        self.inner.verbindungen.insert(handle.id(), handle.clone());
        tracing::debug!(peer = %peer_addr, verbindung = %handle.id(), "Verbindung akzeptiert");

        let mux = self.clone();
        Some(async move { mux.verbindung_treiben(stream, handle, mailbox, shutdown_rx).await })
    }

    // -----------------------------------------------------------------------
    // Verbindungs-Task
    // -----------------------------------------------------------------------

    async fn verbindung_treiben(
        self,
        mut stream: TcpStream,
        handle: ConnectionHandle,
        mut mailbox: ConnectionMailbox,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let id = handle.id();
        let peer = handle.peer();
        let mut v = Verbindung {
            handle,
            attachment: Attachment::default(),
            zustand: VerbindungsZustand::Offen,
            eingang: ReassemblyBuffer::with_codec(self.inner.codec.clone()),
            ausgang: OutboundQueue::new(),
            lese_puffer: vec![0u8; self.inner.config.lese_puffer.max(1)],
        };

        let ende = self
            .schleife(&mut stream, &mut v, &mut mailbox, &mut shutdown_rx)
            .await;

        match &ende {
            Ende::PeerGeschlossen => {
                tracing::info!(peer = %peer, rolle = %v.attachment, "Verbindung vom Client getrennt");
            }
            Ende::Angefordert | Ende::Herunterfahren => {
                tracing::debug!(peer = %peer, rolle = %v.attachment, grund = ?ende, "Verbindung geschlossen");
            }
            Ende::Protokoll(e) => {
                tracing::warn!(peer = %peer, fehler = %e, "Protokollfehler – Verbindung wird geschlossen");
            }
            Ende::Verbindung(e) => {
                tracing::warn!(peer = %peer, fehler = %e, "Verbindungsfehler");
            }
        }

        // Aufraeumen: ausstehende Bytes verwerfen, Sitzung bzw. Stream freigeben
        v.ausgang.clear();
        if let Some(benutzer) = self.inner.registry.logout_verbindung(id) {
            tracing::info!(benutzer = %benutzer, "Sitzung nach Verbindungsende abgemeldet");
        }
        self.inner.registry.audio_verbindung_geschlossen(id);
        self.inner.verbindungen.remove(&id);
    }

    async fn schleife(
        &self,
        stream: &mut TcpStream,
        v: &mut Verbindung,
        mailbox: &mut ConnectionMailbox,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Ende {
        loop {
            if v.zustand == VerbindungsZustand::Schliessend && v.ausgang.is_empty() {
                return Ende::Angefordert;
            }
            let lesen = v.zustand == VerbindungsZustand::Offen;
            let schreiben = v.will_schreiben();

            tokio::select! {
                biased;

                ergebnis = shutdown_rx.changed() => {
                    if ergebnis.is_err() || *shutdown_rx.borrow() {
                        // Best effort, nichts wird mehr nachgereicht
                        let _ = v.ausgang.flush(stream);
                        return Ende::Herunterfahren;
                    }
                }

                befehl = mailbox.steuer_rx.recv() => {
                    match befehl {
                        Some(Steuerbefehl::Senden(bytes)) => {
                            if let Err(e) = v.ausgang.enqueue(stream, bytes) {
                                return Ende::Verbindung(e);
                            }
                        }
                        Some(Steuerbefehl::Schliessen) | None => return Ende::Angefordert,
                    }
                }

                // Interesse hat sich geaendert, Bedingungen neu auswerten
                ergebnis = mailbox.interesse_rx.changed() => {
                    if ergebnis.is_err() {
                        return Ende::Angefordert;
                    }
                }

                bereit = stream.readable(), if lesen => {
                    if let Err(e) = bereit {
                        return Ende::Verbindung(e);
                    }
                    if let Err(ende) = self.lesen(stream, v) {
                        return ende;
                    }
                }

                bereit = stream.writable(), if schreiben => {
                    if let Err(e) = bereit {
                        return Ende::Verbindung(e);
                    }
                    if let Err(ende) = self.schreiben(stream, v) {
                        return ende;
                    }
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lesen
    // -----------------------------------------------------------------------

    fn lesen(&self, stream: &mut TcpStream, v: &mut Verbindung) -> Result<(), Ende> {
        match stream.try_read(&mut v.lese_puffer) {
            Ok(0) => return Err(Ende::PeerGeschlossen),
            Ok(n) => v.eingang.append(&v.lese_puffer[..n]),
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::Interrupted =>
            {
                return Ok(());
            }
            Err(e) => return Err(Ende::Verbindung(e)),
        }

        self.frames_verarbeiten(stream, v)?;

        let grenze = self.inner.config.max_frame_groesse + HEADER_SIZE;
        if v.eingang.laenge_unplausibel() || v.eingang.len() > grenze {
            return Err(Ende::Protokoll(ProtocolError::PufferUeberlauf(
                v.eingang.len(),
            )));
        }
        Ok(())
    }

    /// Arbeitet alle vollstaendigen Frames im Eingangspuffer ab
    fn frames_verarbeiten(&self, stream: &mut TcpStream, v: &mut Verbindung) -> Result<(), Ende> {
        loop {
            if v.zustand == VerbindungsZustand::Schliessend {
                v.eingang.clear();
                return Ok(());
            }

            // Nach musicConnect sendet der Client auf der Audioverbindung nichts mehr
            if v.attachment.ist_audio() {
                let mut verworfen = 0usize;
                while v.eingang.skip_frame() {
                    verworfen += 1;
                }
                if verworfen > 0 {
                    tracing::debug!(verbindung = %v.handle.id(), verworfen, "Frames auf Audioverbindung verworfen");
                }
                return v.eingang.peek_type().map(|_| ()).map_err(Ende::Protokoll);
            }

            match v.eingang.peek_type() {
                Ok(None) => return Ok(()),
                Ok(Some(FrameType::Fragment)) => {
                    v.eingang.skip_frame();
                    tracing::warn!(verbindung = %v.handle.id(), "FRAGMENT vom Client ignoriert");
                    continue;
                }
                Ok(Some(FrameType::Message)) => {}
                Err(e) => return Err(Ende::Protokoll(e)),
            }

            let frame = match v.eingang.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(()),
                Err(e) => return Err(Ende::Protokoll(e)),
            };
            let anfrage = frame.text().map_err(Ende::Protokoll)?;

            let mut ctx = RequestContext::neu(&v.handle, &mut v.attachment);
            let antwort = self.inner.handler.handle(anfrage, &mut ctx);
            let schliessen = ctx.soll_schliessen();

            let bytes = self.antwort_kodieren(&antwort)?;
            v.ausgang.enqueue(stream, bytes).map_err(Ende::Verbindung)?;

            if schliessen {
                v.zustand = VerbindungsZustand::Schliessend;
            }
        }
    }

    fn antwort_kodieren(&self, antwort: &ServerResponse) -> Result<Bytes, Ende> {
        let kodiert = antwort
            .als_frame()
            .and_then(|frame| self.inner.codec.encode(frame.frame_type, &frame.payload));
        match kodiert {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::error!(fehler = %e, "Antwort nicht kodierbar");
                let ersatz = ServerResponse::fehler(INTERNER_FEHLER)
                    .als_frame()
                    .and_then(|frame| self.inner.codec.encode(frame.frame_type, &frame.payload))
                    .map_err(Ende::Protokoll)?;
                Ok(ersatz)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Schreiben
    // -----------------------------------------------------------------------

    fn schreiben(&self, stream: &mut TcpStream, v: &mut Verbindung) -> Result<(), Ende> {
        let mut alles_raus = v.ausgang.flush(stream).map_err(Ende::Verbindung)?;

        let mut runden = 0;
        while alles_raus
            && runden < FRAGMENTE_PRO_RUNDE
            && v.attachment.ist_audio()
            && v.handle.interesse() == Interesse::LesenSchreiben
        {
            runden += 1;
            match self.inner.registry.next_fragment(v.handle.id()) {
                Ok(NaechstesFragment::Fragment(daten)) => {
                    let bytes = self
                        .inner
                        .codec
                        .encode(FrameType::Fragment, &daten)
                        .map_err(Ende::Protokoll)?;
                    alles_raus = v.ausgang.enqueue(stream, bytes).map_err(Ende::Verbindung)?;
                }
                Ok(NaechstesFragment::EndOfStream { benutzer }) => {
                    self.steuerung_benachrichtigen(
                        &benutzer,
                        ServerResponse::neu(ResponseStatus::StopStreaming, SONG_BEENDET),
                    );
                    break;
                }
                Err(StreamingError::AudioLesen { benutzer, quelle }) => {
                    self.steuerung_benachrichtigen(
                        &benutzer,
                        ServerResponse::neu(
                            ResponseStatus::StopStreaming,
                            format!("Wiedergabe abgebrochen: {quelle}"),
                        ),
                    );
                    break;
                }
                Err(e) => {
                    // Stream wurde zwischenzeitlich beendet
                    tracing::debug!(verbindung = %v.handle.id(), fehler = %e, "Kein Fragment verfuegbar");
                    v.handle.interesse_setzen(Interesse::Lesen);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Reiht eine Nachricht auf der Steuerverbindung von `benutzer` ein
    fn steuerung_benachrichtigen(&self, benutzer: &str, nachricht: ServerResponse) {
        let Some(steuerung) = self.inner.registry.steuerung(benutzer) else {
            return;
        };
        if let Err(e) = steuerung.nachricht_senden(&nachricht) {
            tracing::error!(benutzer = %benutzer, fehler = %e, "Benachrichtigung nicht kodierbar");
        }
    }
}

impl std::fmt::Debug for ConnectionMultiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMultiplexer")
            .field("verbindungen", &self.verbindungs_anzahl())
            .field("config", &self.inner.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_konfiguration() {
        let config = MultiplexerConfig::default();
        assert_eq!(config.lese_puffer, 8192);
        assert_eq!(config.max_frame_groesse, DEFAULT_MAX_FRAME_SIZE);
        assert!(config.max_verbindungen > 0);
    }

    #[test]
    fn verbindung_will_nur_bei_bedarf_schreiben() {
        let (handle, _mailbox) = ConnectionHandle::neu("127.0.0.1:1".parse().unwrap());
        let mut v = Verbindung {
            handle: handle.clone(),
            attachment: Attachment::default(),
            zustand: VerbindungsZustand::Offen,
            eingang: ReassemblyBuffer::new(),
            ausgang: OutboundQueue::new(),
            lese_puffer: Vec::new(),
        };
        assert!(!v.will_schreiben());

        // Schreibinteresse zaehlt nur auf Audioverbindungen
        handle.interesse_setzen(Interesse::LesenSchreiben);
        assert!(!v.will_schreiben());
        v.attachment = Attachment::Audio {
            benutzer: "alice".into(),
        };
        assert!(v.will_schreiben());

        handle.interesse_setzen(Interesse::Lesen);
        assert!(!v.will_schreiben());
        v.ausgang.push(Bytes::from_static(b"rest"));
        assert!(v.will_schreiben());
    }
}
