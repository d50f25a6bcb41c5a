//! Streaming-Sitzungsverwaltung
//!
//! Die Registry ist die einzige Stelle, die weiss wer online ist, welche
//! Audioverbindung zu welcher Sitzung gehoert und in welchem Zustand die
//! Wiedergabe gerade ist.
//!
//! ## Locks
//! - Die Tabellen (Sitzungen und Verbindungs-Indizes) liegen hinter einem
//!   gemeinsamen Lock, der nur fuer Nachschlagen und Eintragen gehalten wird.
//! - Jede Sitzung hat einen eigenen Lock. Alles, was Steuer- und
//!   Audioverbindung derselben Sitzung betrifft (Logout, Vorbereiten,
//!   Fragment-Abruf), laeuft darunter nacheinander ab. Dekodieren und
//!   Oeffnen von Audiodateien halten nur diesen Lock.
//!
//! Reihenfolge: ein Sitzungs-Lock darf den Tabellen-Lock nehmen, nie
//! umgekehrt.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use klangwerk_catalog::{Song, SongCatalog};
use klangwerk_core::ConnectionId;
use klangwerk_protocol::AudioFormat;
use parking_lot::Mutex;

use crate::audio::{AudioOpener, AudioSource};
use crate::connection::{ConnectionHandle, Interesse};
use crate::error::{StreamingError, StreamingResult};

// ---------------------------------------------------------------------------
// Oeffentliche Typen
// ---------------------------------------------------------------------------

/// Wiedergabephase einer Sitzung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Prepared,
    Streaming,
}

impl std::fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Idle => "idle",
            Self::Prepared => "vorbereitet",
            Self::Streaming => "streamt",
        };
        f.write_str(text)
    }
}

/// Momentaufnahme einer Sitzung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub benutzer: String,
    pub steuerung: ConnectionId,
    pub audio: Option<ConnectionId>,
    pub phase: StreamPhase,
    pub angemeldet_am: DateTime<Utc>,
    /// Zuletzt vorbereiteter Song, solange eine Quelle offen ist
    pub song: Option<Song>,
}

/// Ergebnis eines Fragment-Abrufs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NaechstesFragment {
    Fragment(Bytes),
    /// Quelle erschoepft; die Sitzung ist wieder idle
    EndOfStream { benutzer: String },
}

// ---------------------------------------------------------------------------
// Interner Zustand
// ---------------------------------------------------------------------------

#[derive(Default)]
enum StreamZustand {
    #[default]
    Idle,
    Prepared(Box<dyn AudioSource>),
    Streaming {
        quelle: Box<dyn AudioSource>,
        audio: ConnectionId,
    },
}

impl StreamZustand {
    fn phase(&self) -> StreamPhase {
        match self {
            Self::Idle => StreamPhase::Idle,
            Self::Prepared(_) => StreamPhase::Prepared,
            Self::Streaming { .. } => StreamPhase::Streaming,
        }
    }

    /// Schliesst eine offene Quelle und setzt auf Idle zurueck
    fn beenden(&mut self) -> StreamPhase {
        let vorher = self.phase();
        match std::mem::take(self) {
            Self::Idle => {}
            Self::Prepared(mut quelle) | Self::Streaming { mut quelle, .. } => quelle.close(),
        }
        vorher
    }
}

struct Session {
    benutzer: String,
    steuerung: ConnectionHandle,
    audio: Option<ConnectionHandle>,
    zustand: StreamZustand,
    angemeldet_am: DateTime<Utc>,
    song: Option<Song>,
    /// `false` sobald die Sitzung aus den Tabellen entfernt wurde
    aktiv: bool,
}

type SessionZelle = Arc<Mutex<Session>>;

impl Session {
    fn info(&self) -> SessionInfo {
        SessionInfo {
            benutzer: self.benutzer.clone(),
            steuerung: self.steuerung.id(),
            audio: self.audio.as_ref().map(ConnectionHandle::id),
            phase: self.zustand.phase(),
            angemeldet_am: self.angemeldet_am,
            song: self.song.clone(),
        }
    }

    /// Quelle schliessen, Audioverbindung zurueck auf Nur-Lesen
    fn wiedergabe_beenden(&mut self) -> StreamPhase {
        let vorher = self.zustand.beenden();
        self.song = None;
        if let Some(audio) = &self.audio {
            audio.interesse_setzen(Interesse::Lesen);
        }
        vorher
    }
}

#[derive(Default)]
struct Tabellen {
    sessions: HashMap<String, SessionZelle>,
    /// Steuerverbindung -> Benutzer
    steuerung_index: HashMap<ConnectionId, String>,
    /// Audioverbindung -> Benutzer
    audio_index: HashMap<ConnectionId, String>,
}

impl Tabellen {
    fn session(&self, benutzer: &str) -> StreamingResult<SessionZelle> {
        self.sessions
            .get(benutzer)
            .cloned()
            .ok_or_else(|| StreamingError::NichtOnline(benutzer.to_string()))
    }

    fn verbindung_belegt(&self, id: &ConnectionId) -> Option<&String> {
        self.steuerung_index
            .get(id)
            .or_else(|| self.audio_index.get(id))
    }
}

// ---------------------------------------------------------------------------
// StreamingSessionRegistry
// ---------------------------------------------------------------------------

/// Verwaltet alle Sitzungen und ihre Audioquellen
///
/// Clone teilt den inneren Zustand.
#[derive(Clone)]
pub struct StreamingSessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    tabellen: Mutex<Tabellen>,
    katalog: Arc<SongCatalog>,
    oeffner: Arc<dyn AudioOpener>,
    /// Bytes pro Audiofragment
    fragment_groesse: usize,
}

impl StreamingSessionRegistry {
    pub fn neu(
        katalog: Arc<SongCatalog>,
        oeffner: Arc<dyn AudioOpener>,
        fragment_groesse: usize,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                tabellen: Mutex::new(Tabellen::default()),
                katalog,
                oeffner,
                fragment_groesse: fragment_groesse.max(1),
            }),
        }
    }

    pub fn fragment_groesse(&self) -> usize {
        self.inner.fragment_groesse
    }

    /// Sitzung von `benutzer`; der Tabellen-Lock ist danach wieder frei
    fn session_zelle(&self, benutzer: &str) -> StreamingResult<SessionZelle> {
        self.inner.tabellen.lock().session(benutzer)
    }

    fn alle_zellen(&self) -> Vec<SessionZelle> {
        self.inner.tabellen.lock().sessions.values().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Anmeldung
    // -----------------------------------------------------------------------

    /// Legt eine Sitzung fuer `benutzer` mit `steuerung` als Steuerverbindung an
    pub fn login(&self, benutzer: &str, steuerung: &ConnectionHandle) -> StreamingResult<SessionInfo> {
        let mut tabellen = self.inner.tabellen.lock();

        if let Some(vorhanden) = tabellen.verbindung_belegt(&steuerung.id()) {
            return Err(StreamingError::BereitsAngemeldet(vorhanden.clone()));
        }
        if tabellen.sessions.contains_key(benutzer) {
            return Err(StreamingError::BereitsOnline(benutzer.to_string()));
        }

        let session = Session {
            benutzer: benutzer.to_string(),
            steuerung: steuerung.clone(),
            audio: None,
            zustand: StreamZustand::Idle,
            angemeldet_am: Utc::now(),
            song: None,
            aktiv: true,
        };
        let info = session.info();
        tabellen
            .steuerung_index
            .insert(steuerung.id(), benutzer.to_string());
        tabellen
            .sessions
            .insert(benutzer.to_string(), Arc::new(Mutex::new(session)));

        tracing::info!(benutzer = %benutzer, verbindung = %steuerung.id(), "Benutzer angemeldet");
        Ok(info)
    }

    /// Beendet die Sitzung, schliesst Quelle und Audioverbindung
    pub fn logout(&self, benutzer: &str) -> StreamingResult<()> {
        let zelle = {
            let mut tabellen = self.inner.tabellen.lock();
            let zelle = tabellen
                .sessions
                .remove(benutzer)
                .ok_or_else(|| StreamingError::NichtOnline(benutzer.to_string()))?;
            tabellen.steuerung_index.retain(|_, b| b != benutzer);
            tabellen.audio_index.retain(|_, b| b != benutzer);
            zelle
        };

        let mut session = zelle.lock();
        session.aktiv = false;
        session.zustand.beenden();
        session.song = None;
        if let Some(audio) = session.audio.take() {
            audio.schliessen();
        }

        tracing::info!(benutzer = %benutzer, "Benutzer abgemeldet");
        Ok(())
    }

    /// Logout fuer eine geschlossene Steuerverbindung
    ///
    /// Gibt den abgemeldeten Benutzer zurueck, falls die Verbindung eine
    /// Sitzung hatte.
    pub fn logout_verbindung(&self, steuerung: ConnectionId) -> Option<String> {
        let benutzer = self
            .inner
            .tabellen
            .lock()
            .steuerung_index
            .get(&steuerung)
            .cloned()?;
        self.logout(&benutzer).ok()?;
        Some(benutzer)
    }

    // -----------------------------------------------------------------------
    // Wiedergabe
    // -----------------------------------------------------------------------

    /// Oeffnet eine Audioquelle fuer `song`
    ///
    /// Eine vorhandene Quelle wird vorher geschlossen, auch wenn sie gerade
    /// streamt. Der Client erfaehrt davon nichts ausser der neuen Antwort.
    pub fn prepare_stream(&self, benutzer: &str, song: &Song) -> StreamingResult<AudioFormat> {
        let zelle = self.session_zelle(benutzer)?;
        let format = {
            let mut session = zelle.lock();
            if !session.aktiv {
                return Err(StreamingError::NichtOnline(benutzer.to_string()));
            }

            let vorher = session.wiedergabe_beenden();
            if vorher == StreamPhase::Streaming {
                tracing::info!(benutzer = %benutzer, "Laufende Wiedergabe durch neuen Song ersetzt");
            }

            let quelle = self
                .inner
                .oeffner
                .open(&song.path)
                .map_err(StreamingError::AudioOeffnen)?;
            let format = quelle.format().clone();
            session.zustand = StreamZustand::Prepared(quelle);
            session.song = Some(song.clone());
            format
        };

        if let Err(e) = self.inner.katalog.stream_zaehlen(&song.name, &song.artist) {
            tracing::warn!(song = %song, fehler = %e, "Stream konnte nicht gezaehlt werden");
        }

        tracing::debug!(benutzer = %benutzer, song = %song, "Song vorbereitet");
        Ok(format)
    }

    /// Verknuepft `audio` als Audioverbindung der Sitzung von `benutzer`
    ///
    /// Eine zuvor verknuepfte Audioverbindung wird geschlossen. Lief darauf
    /// eine Wiedergabe, bleibt die Quelle offen und die Sitzung faellt
    /// zurueck auf vorbereitet.
    pub fn link_audio_connection(&self, benutzer: &str, audio: &ConnectionHandle) -> StreamingResult<()> {
        let zelle = {
            let mut tabellen = self.inner.tabellen.lock();
            if let Some(vorhanden) = tabellen.verbindung_belegt(&audio.id()) {
                return Err(StreamingError::BereitsAngemeldet(vorhanden.clone()));
            }
            let zelle = tabellen.session(benutzer)?;
            tabellen.audio_index.insert(audio.id(), benutzer.to_string());
            zelle
        };

        let alt = {
            let mut session = zelle.lock();
            if !session.aktiv {
                // Logout kam dazwischen
                self.inner.tabellen.lock().audio_index.remove(&audio.id());
                return Err(StreamingError::NichtOnline(benutzer.to_string()));
            }

            let alt = session.audio.replace(audio.clone());
            if alt.is_some() {
                session.zustand = match std::mem::take(&mut session.zustand) {
                    StreamZustand::Streaming { quelle, .. } => StreamZustand::Prepared(quelle),
                    anderer => anderer,
                };
            }
            audio.interesse_setzen(Interesse::Lesen);
            alt
        };

        if let Some(alt) = alt {
            self.inner.tabellen.lock().audio_index.remove(&alt.id());
            alt.schliessen();
        }

        tracing::info!(benutzer = %benutzer, verbindung = %audio.id(), "Audioverbindung verknuepft");
        Ok(())
    }

    /// Startet die Wiedergabe der vorbereiteten Quelle
    pub fn start_streaming(&self, benutzer: &str) -> StreamingResult<()> {
        let zelle = self.session_zelle(benutzer)?;
        let mut session = zelle.lock();

        if !matches!(session.zustand, StreamZustand::Prepared(_)) {
            return Err(StreamingError::NichtVorbereitet(benutzer.to_string()));
        }
        let audio = session
            .audio
            .clone()
            .ok_or_else(|| StreamingError::KeineAudioverbindung(benutzer.to_string()))?;

        session.zustand = match std::mem::take(&mut session.zustand) {
            StreamZustand::Prepared(quelle) => StreamZustand::Streaming {
                quelle,
                audio: audio.id(),
            },
            anderer => anderer,
        };
        audio.interesse_setzen(Interesse::LesenSchreiben);

        tracing::info!(benutzer = %benutzer, verbindung = %audio.id(), "Wiedergabe gestartet");
        Ok(())
    }

    /// Liest das naechste Fragment fuer die Audioverbindung `audio`
    ///
    /// Am Ende der Daten wird die Quelle geschlossen und genau einmal
    /// [`NaechstesFragment::EndOfStream`] geliefert. Lesefehler beenden die
    /// Wiedergabe ebenfalls, die Sitzung bleibt angemeldet.
    pub fn next_fragment(&self, audio: ConnectionId) -> StreamingResult<NaechstesFragment> {
        let (benutzer, zelle) = {
            let tabellen = self.inner.tabellen.lock();
            let benutzer = tabellen
                .audio_index
                .get(&audio)
                .cloned()
                .ok_or_else(|| StreamingError::KeineWiedergabe(audio.to_string()))?;
            let zelle = tabellen.session(&benutzer)?;
            (benutzer, zelle)
        };
        let mut session = zelle.lock();

        let mut puffer = vec![0u8; self.inner.fragment_groesse];
        let gelesen = match &mut session.zustand {
            StreamZustand::Streaming {
                quelle,
                audio: verbunden,
            } if *verbunden == audio => quelle.read(&mut puffer),
            _ => return Err(StreamingError::KeineWiedergabe(benutzer)),
        };

        match gelesen {
            Ok(0) => {
                session.wiedergabe_beenden();
                tracing::debug!(benutzer = %benutzer, "Song zu Ende");
                Ok(NaechstesFragment::EndOfStream { benutzer })
            }
            Ok(n) => {
                puffer.truncate(n);
                Ok(NaechstesFragment::Fragment(Bytes::from(puffer)))
            }
            Err(quelle) => {
                session.wiedergabe_beenden();
                tracing::warn!(benutzer = %benutzer, fehler = %quelle, "Audiodaten nicht lesbar, Wiedergabe beendet");
                Err(StreamingError::AudioLesen { benutzer, quelle })
            }
        }
    }

    /// Stoppt die Wiedergabe und schliesst die Quelle
    pub fn stop_streaming(&self, benutzer: &str) -> StreamingResult<()> {
        let zelle = self.session_zelle(benutzer)?;
        let mut session = zelle.lock();

        if session.zustand.phase() == StreamPhase::Idle {
            return Err(StreamingError::KeineWiedergabe(benutzer.to_string()));
        }
        session.wiedergabe_beenden();

        tracing::info!(benutzer = %benutzer, "Wiedergabe gestoppt");
        Ok(())
    }

    /// Aufraeumen nach dem Schliessen einer Audioverbindung
    pub fn audio_verbindung_geschlossen(&self, audio: ConnectionId) -> Option<String> {
        let (benutzer, zelle) = {
            let mut tabellen = self.inner.tabellen.lock();
            let benutzer = tabellen.audio_index.remove(&audio)?;
            let zelle = tabellen.sessions.get(&benutzer).cloned();
            (benutzer, zelle)
        };

        if let Some(zelle) = zelle {
            let mut session = zelle.lock();
            if session.audio.as_ref().is_some_and(|a| a.id() == audio) {
                session.audio = None;
            }
            if matches!(&session.zustand, StreamZustand::Streaming { audio: a, .. } if *a == audio) {
                session.zustand.beenden();
                session.song = None;
                tracing::info!(benutzer = %benutzer, "Audioverbindung waehrend der Wiedergabe getrennt");
            }
        }
        Some(benutzer)
    }

    /// Schliesst alle offenen Quellen (Server faehrt herunter)
    pub fn alle_streams_schliessen(&self) -> usize {
        self.alle_zellen()
            .iter()
            .filter(|zelle| zelle.lock().wiedergabe_beenden() != StreamPhase::Idle)
            .count()
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    /// Steuerverbindung eines Benutzers
    pub fn steuerung(&self, benutzer: &str) -> Option<ConnectionHandle> {
        let zelle = self.session_zelle(benutzer).ok()?;
        let steuerung = zelle.lock().steuerung.clone();
        Some(steuerung)
    }

    pub fn ist_online(&self, benutzer: &str) -> bool {
        self.inner.tabellen.lock().sessions.contains_key(benutzer)
    }

    pub fn online_anzahl(&self) -> usize {
        self.inner.tabellen.lock().sessions.len()
    }

    pub fn phase(&self, benutzer: &str) -> Option<StreamPhase> {
        let zelle = self.session_zelle(benutzer).ok()?;
        let phase = zelle.lock().zustand.phase();
        Some(phase)
    }

    pub fn session(&self, benutzer: &str) -> Option<SessionInfo> {
        let zelle = self.session_zelle(benutzer).ok()?;
        let info = zelle.lock().info();
        Some(info)
    }

    /// Alle Sitzungen, sortiert nach Benutzername
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut liste: Vec<SessionInfo> = self
            .alle_zellen()
            .iter()
            .map(|zelle| zelle.lock().info())
            .collect();
        liste.sort_by(|a, b| a.benutzer.cmp(&b.benutzer));
        liste
    }
}

impl std::fmt::Debug for StreamingSessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSessionRegistry")
            .field("online", &self.online_anzahl())
            .field("fragment_groesse", &self.inner.fragment_groesse)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioError;
    use crate::connection::{ConnectionMailbox, Steuerbefehl};
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    const FRAGMENT: usize = 8187;

    // -----------------------------------------------------------------------
    // Test-Quellen
    // -----------------------------------------------------------------------

    struct TestQuelle {
        format: AudioFormat,
        rest: usize,
        fehler_nach: Option<usize>,
        gelesen: usize,
        geschlossen: Arc<AtomicBool>,
        /// Meldet jeden Lesebeginn und wartet dann auf Freigabe
        bremse: Option<Bremse>,
    }

    struct Bremse {
        begonnen: mpsc::Sender<()>,
        freigabe: mpsc::Receiver<()>,
    }

    impl AudioSource for TestQuelle {
        fn format(&self) -> &AudioFormat {
            &self.format
        }

        fn read(&mut self, puffer: &mut [u8]) -> Result<usize, AudioError> {
            if self.fehler_nach.is_some_and(|grenze| self.gelesen >= grenze) {
                return Err(AudioError::Dekodierung("kaputtes Paket".into()));
            }
            if let Some(bremse) = &self.bremse {
                let _ = bremse.begonnen.send(());
                let _ = bremse.freigabe.recv();
            }
            let n = self.rest.min(puffer.len());
            puffer[..n].fill(0xAB);
            self.rest -= n;
            self.gelesen += n;
            Ok(n)
        }

        fn close(&mut self) {
            self.geschlossen.store(true, Ordering::SeqCst);
        }
    }

    /// Liefert pro Pfad eine Quelle mit `laenge` Bytes; Pfade mit "fehlt"
    /// lassen sich nicht oeffnen, Pfade mit "kaputt" brechen nach einem
    /// Fragment ab.
    struct TestOeffner {
        laenge: usize,
        geschlossen: Mutex<Vec<Arc<AtomicBool>>>,
        /// Geht an die naechste geoeffnete Quelle
        bremse: Mutex<Option<Bremse>>,
    }

    impl TestOeffner {
        fn neu(laenge: usize) -> Arc<Self> {
            Arc::new(Self {
                laenge,
                geschlossen: Mutex::new(Vec::new()),
                bremse: Mutex::new(None),
            })
        }

        fn geschlossen(&self, index: usize) -> bool {
            self.geschlossen.lock()[index].load(Ordering::SeqCst)
        }

        fn geoeffnet(&self) -> usize {
            self.geschlossen.lock().len()
        }
    }

    impl AudioOpener for TestOeffner {
        fn open(&self, pfad: &Path) -> Result<Box<dyn AudioSource>, AudioError> {
            let pfad = pfad.to_string_lossy();
            if pfad.contains("fehlt") {
                return Err(AudioError::Io(std::io::ErrorKind::NotFound.into()));
            }
            let flag = Arc::new(AtomicBool::new(false));
            self.geschlossen.lock().push(flag.clone());
            Ok(Box::new(TestQuelle {
                format: AudioFormat::pcm_s16le(44_100, 2),
                rest: self.laenge,
                fehler_nach: pfad.contains("kaputt").then_some(FRAGMENT),
                gelesen: 0,
                geschlossen: flag,
                bremse: self.bremse.lock().take(),
            }))
        }
    }

    struct Aufbau {
        registry: StreamingSessionRegistry,
        oeffner: Arc<TestOeffner>,
        katalog: Arc<SongCatalog>,
    }

    fn aufbau(laenge: usize) -> Aufbau {
        let katalog = Arc::new(SongCatalog::neu());
        katalog.hinzufuegen(Song::neu("Intro", "Band", "intro.wav"));
        katalog.hinzufuegen(Song::neu("Outro", "Band", "outro.wav"));
        katalog.hinzufuegen(Song::neu("Defekt", "Band", "kaputt.wav"));
        katalog.hinzufuegen(Song::neu("Verschwunden", "Band", "fehlt.wav"));
        let oeffner = TestOeffner::neu(laenge);
        Aufbau {
            registry: StreamingSessionRegistry::neu(katalog.clone(), oeffner.clone(), FRAGMENT),
            oeffner,
            katalog,
        }
    }

    fn verbindung() -> (ConnectionHandle, ConnectionMailbox) {
        ConnectionHandle::neu("127.0.0.1:5000".parse().unwrap())
    }

    fn song(a: &Aufbau, name: &str) -> Song {
        a.katalog.song(name).unwrap()
    }

    /// Angemeldet, Song vorbereitet, Audioverbindung verknuepft
    fn bereit(a: &Aufbau) -> (ConnectionHandle, ConnectionHandle, ConnectionMailbox) {
        let (steuerung, _) = verbindung();
        let (audio, audio_mailbox) = verbindung();
        a.registry.login("alice", &steuerung).unwrap();
        a.registry.prepare_stream("alice", &song(a, "intro")).unwrap();
        a.registry.link_audio_connection("alice", &audio).unwrap();
        (steuerung, audio, audio_mailbox)
    }

    // -----------------------------------------------------------------------
    // Anmeldung
    // -----------------------------------------------------------------------

    #[test]
    fn zweiter_login_ist_bereits_online() {
        let a = aufbau(100);
        let (erste, _m1) = verbindung();
        let (zweite, _m2) = verbindung();

        let info = a.registry.login("alice", &erste).unwrap();
        assert_eq!(info.phase, StreamPhase::Idle);
        assert!(a.registry.ist_online("alice"));

        assert!(matches!(
            a.registry.login("alice", &zweite),
            Err(StreamingError::BereitsOnline(_))
        ));
        assert!(matches!(
            a.registry.login("bob", &erste),
            Err(StreamingError::BereitsAngemeldet(b)) if b == "alice"
        ));
        assert_eq!(a.registry.online_anzahl(), 1);
    }

    #[test]
    fn logout_ohne_sitzung_ist_fehler() {
        let a = aufbau(100);
        assert!(matches!(
            a.registry.logout("niemand"),
            Err(StreamingError::NichtOnline(_))
        ));
    }

    #[test]
    fn logout_schliesst_quelle_und_audioverbindung() {
        let a = aufbau(100_000);
        let (steuerung, _audio, mut audio_mailbox) = bereit(&a);
        a.registry.start_streaming("alice").unwrap();

        a.registry.logout("alice").unwrap();
        assert!(!a.registry.ist_online("alice"));
        assert!(a.oeffner.geschlossen(0));
        assert!(matches!(
            audio_mailbox.steuer_rx.try_recv(),
            Ok(Steuerbefehl::Schliessen)
        ));

        // Verbindung ist wieder frei
        a.registry.login("bob", &steuerung).unwrap();
    }

    #[test]
    fn logout_ueber_verbindung() {
        let a = aufbau(100);
        let (steuerung, _m) = verbindung();
        let (fremd, _m2) = verbindung();
        a.registry.login("alice", &steuerung).unwrap();

        assert_eq!(a.registry.logout_verbindung(fremd.id()), None);
        assert_eq!(
            a.registry.logout_verbindung(steuerung.id()),
            Some("alice".to_string())
        );
        assert_eq!(a.registry.online_anzahl(), 0);
    }

    // -----------------------------------------------------------------------
    // Vorbereiten und Starten
    // -----------------------------------------------------------------------

    #[test]
    fn start_ohne_audioverbindung_und_danach_mit() {
        let a = aufbau(100);
        let (steuerung, _m) = verbindung();
        let (audio, audio_mailbox) = verbindung();
        a.registry.login("alice", &steuerung).unwrap();
        a.registry.prepare_stream("alice", &song(&a, "intro")).unwrap();

        assert!(matches!(
            a.registry.start_streaming("alice"),
            Err(StreamingError::KeineAudioverbindung(_))
        ));

        a.registry.link_audio_connection("alice", &audio).unwrap();
        a.registry.start_streaming("alice").unwrap();
        assert_eq!(a.registry.phase("alice"), Some(StreamPhase::Streaming));
        assert_eq!(
            *audio_mailbox.interesse_rx.borrow(),
            Interesse::LesenSchreiben
        );
    }

    #[test]
    fn start_ohne_vorbereitung() {
        let a = aufbau(100);
        let (steuerung, _m) = verbindung();
        let (audio, _am) = verbindung();
        a.registry.login("alice", &steuerung).unwrap();
        a.registry.link_audio_connection("alice", &audio).unwrap();

        assert!(matches!(
            a.registry.start_streaming("alice"),
            Err(StreamingError::NichtVorbereitet(_))
        ));
        assert_eq!(audio.interesse(), Interesse::Lesen);
    }

    #[test]
    fn operationen_ohne_sitzung_sind_nicht_online() {
        let a = aufbau(100);
        let (audio, _m) = verbindung();
        let intro = song(&a, "intro");

        assert!(matches!(
            a.registry.prepare_stream("alice", &intro),
            Err(StreamingError::NichtOnline(_))
        ));
        assert!(matches!(
            a.registry.link_audio_connection("alice", &audio),
            Err(StreamingError::NichtOnline(_))
        ));
        assert!(matches!(
            a.registry.start_streaming("alice"),
            Err(StreamingError::NichtOnline(_))
        ));
        assert_eq!(a.oeffner.geoeffnet(), 0);
    }

    #[test]
    fn vorbereiten_zaehlt_streams() {
        let a = aufbau(100);
        let (steuerung, _m) = verbindung();
        a.registry.login("alice", &steuerung).unwrap();

        let format = a.registry.prepare_stream("alice", &song(&a, "intro")).unwrap();
        assert_eq!(format, AudioFormat::pcm_s16le(44_100, 2));
        a.registry.prepare_stream("alice", &song(&a, "intro")).unwrap();

        assert_eq!(a.katalog.song("intro").unwrap().streams, 2);
        assert_eq!(a.registry.phase("alice"), Some(StreamPhase::Prepared));
        // Zweites prepare schliesst die erste Quelle
        assert!(a.oeffner.geschlossen(0));
        assert!(!a.oeffner.geschlossen(1));
    }

    #[test]
    fn nicht_oeffenbare_datei_laesst_sitzung_idle() {
        let a = aufbau(100);
        let (steuerung, _m) = verbindung();
        a.registry.login("alice", &steuerung).unwrap();
        a.registry.prepare_stream("alice", &song(&a, "intro")).unwrap();

        let ergebnis = a.registry.prepare_stream("alice", &song(&a, "verschwunden"));
        assert!(matches!(ergebnis, Err(StreamingError::AudioOeffnen(_))));
        assert_eq!(a.registry.phase("alice"), Some(StreamPhase::Idle));
        assert!(a.oeffner.geschlossen(0));
        assert_eq!(a.katalog.song("verschwunden").unwrap().streams, 0);
    }

    /// Ein neues `play` waehrend der Wiedergabe ersetzt die Quelle ohne
    /// gesonderte Meldung an den Client.
    #[test]
    fn vorbereiten_waehrend_wiedergabe_ersetzt_still() {
        let a = aufbau(100_000);
        let (steuerung, mut steuer_mailbox) = verbindung();
        let (audio, audio_mailbox) = verbindung();
        a.registry.login("alice", &steuerung).unwrap();
        a.registry.prepare_stream("alice", &song(&a, "intro")).unwrap();
        a.registry.link_audio_connection("alice", &audio).unwrap();
        a.registry.start_streaming("alice").unwrap();
        a.registry.next_fragment(audio.id()).unwrap();

        a.registry.prepare_stream("alice", &song(&a, "outro")).unwrap();

        assert!(a.oeffner.geschlossen(0));
        assert_eq!(a.registry.phase("alice"), Some(StreamPhase::Prepared));
        assert_eq!(*audio_mailbox.interesse_rx.borrow(), Interesse::Lesen);
        assert_eq!(
            a.registry.session("alice").unwrap().song.unwrap().name,
            "Outro"
        );
        assert!(steuer_mailbox.steuer_rx.try_recv().is_err());
        assert!(matches!(
            a.registry.next_fragment(audio.id()),
            Err(StreamingError::KeineWiedergabe(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Fragmente
    // -----------------------------------------------------------------------

    #[test]
    fn fragmente_bis_zum_ende_genau_einmal_eos() {
        let laenge = 2 * FRAGMENT + 1000;
        let a = aufbau(laenge);
        let (_steuerung, audio, audio_mailbox) = bereit(&a);
        a.registry.start_streaming("alice").unwrap();

        let mut groessen = Vec::new();
        let mut eos = 0;
        loop {
            match a.registry.next_fragment(audio.id()) {
                Ok(NaechstesFragment::Fragment(bytes)) => groessen.push(bytes.len()),
                Ok(NaechstesFragment::EndOfStream { benutzer }) => {
                    assert_eq!(benutzer, "alice");
                    eos += 1;
                }
                Err(StreamingError::KeineWiedergabe(_)) => break,
                Err(e) => panic!("unerwarteter Fehler: {e}"),
            }
        }

        assert_eq!(groessen, vec![FRAGMENT, FRAGMENT, 1000]);
        assert_eq!(eos, 1);
        assert_eq!(a.registry.phase("alice"), Some(StreamPhase::Idle));
        assert_eq!(*audio_mailbox.interesse_rx.borrow(), Interesse::Lesen);
        assert!(a.oeffner.geschlossen(0));
    }

    #[test]
    fn langsame_quelle_haelt_andere_sitzungen_nicht_auf() {
        let a = aufbau(100_000);
        let (begonnen_tx, begonnen_rx) = mpsc::channel();
        let (freigabe_tx, freigabe_rx) = mpsc::channel();
        *a.oeffner.bremse.lock() = Some(Bremse {
            begonnen: begonnen_tx,
            freigabe: freigabe_rx,
        });

        let (_alice, alice_audio, _am) = bereit(&a);
        a.registry.start_streaming("alice").unwrap();

        let (bob, _bm) = verbindung();
        let (bob_audio, _bam) = verbindung();
        a.registry.login("bob", &bob).unwrap();
        a.registry.prepare_stream("bob", &song(&a, "outro")).unwrap();
        a.registry.link_audio_connection("bob", &bob_audio).unwrap();
        a.registry.start_streaming("bob").unwrap();

        // alice haengt mitten im Dekodieren
        let registry = a.registry.clone();
        let alice_id = alice_audio.id();
        let langsam = std::thread::spawn(move || registry.next_fragment(alice_id));
        begonnen_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let registry = a.registry.clone();
        let bob_id = bob_audio.id();
        let (ergebnis_tx, ergebnis_rx) = mpsc::channel();
        std::thread::spawn(move || {
            let _ = ergebnis_tx.send(registry.next_fragment(bob_id));
        });
        let bob_fragment = ergebnis_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("bob wartet auf die Quelle von alice");
        assert!(matches!(bob_fragment, Ok(NaechstesFragment::Fragment(b)) if b.len() == FRAGMENT));
        assert!(a.registry.ist_online("bob"));
        assert_eq!(a.registry.online_anzahl(), 2);

        freigabe_tx.send(()).unwrap();
        drop(freigabe_tx);
        assert!(matches!(
            langsam.join().unwrap(),
            Ok(NaechstesFragment::Fragment(_))
        ));
        assert_eq!(a.registry.phase("alice"), Some(StreamPhase::Streaming));
    }

    #[test]
    fn logout_nach_fragment_abruf_derselben_sitzung() {
        let a = aufbau(100_000);
        let (begonnen_tx, begonnen_rx) = mpsc::channel();
        let (freigabe_tx, freigabe_rx) = mpsc::channel();
        *a.oeffner.bremse.lock() = Some(Bremse {
            begonnen: begonnen_tx,
            freigabe: freigabe_rx,
        });
        let (_steuerung, audio, _am) = bereit(&a);
        a.registry.start_streaming("alice").unwrap();

        let registry = a.registry.clone();
        let audio_id = audio.id();
        let abruf = std::thread::spawn(move || registry.next_fragment(audio_id));
        begonnen_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // Der Logout wartet, bis das laufende Fragment fertig ist
        let registry = a.registry.clone();
        let abmelden = std::thread::spawn(move || registry.logout("alice"));
        std::thread::sleep(Duration::from_millis(50));
        assert!(!a.oeffner.geschlossen(0));

        freigabe_tx.send(()).unwrap();
        drop(freigabe_tx);
        assert!(matches!(abruf.join().unwrap(), Ok(NaechstesFragment::Fragment(_))));
        abmelden.join().unwrap().unwrap();
        assert!(a.oeffner.geschlossen(0));
        assert!(a.registry.next_fragment(audio.id()).is_err());
    }

    #[test]
    fn fremde_verbindung_bekommt_keine_fragmente() {
        let a = aufbau(100_000);
        let (steuerung, _audio, _am) = bereit(&a);
        a.registry.start_streaming("alice").unwrap();

        assert!(matches!(
            a.registry.next_fragment(steuerung.id()),
            Err(StreamingError::KeineWiedergabe(_))
        ));
    }

    #[test]
    fn lesefehler_beendet_wiedergabe_sitzung_bleibt() {
        let a = aufbau(100_000);
        let (steuerung, _m) = verbindung();
        let (audio, _am) = verbindung();
        a.registry.login("alice", &steuerung).unwrap();
        a.registry.prepare_stream("alice", &song(&a, "defekt")).unwrap();
        a.registry.link_audio_connection("alice", &audio).unwrap();
        a.registry.start_streaming("alice").unwrap();

        assert!(matches!(
            a.registry.next_fragment(audio.id()),
            Ok(NaechstesFragment::Fragment(_))
        ));
        let fehler = a.registry.next_fragment(audio.id()).unwrap_err();
        assert!(matches!(fehler, StreamingError::AudioLesen { .. }));
        assert!(a.registry.ist_online("alice"));
        assert_eq!(a.registry.phase("alice"), Some(StreamPhase::Idle));
        assert!(a.oeffner.geschlossen(0));
    }

    // -----------------------------------------------------------------------
    // Stoppen und Trennen
    // -----------------------------------------------------------------------

    #[test]
    fn stoppen() {
        let a = aufbau(100_000);
        let (steuerung, _m) = verbindung();
        a.registry.login("alice", &steuerung).unwrap();
        assert!(matches!(
            a.registry.stop_streaming("alice"),
            Err(StreamingError::KeineWiedergabe(_))
        ));

        a.registry.prepare_stream("alice", &song(&a, "intro")).unwrap();
        a.registry.stop_streaming("alice").unwrap();
        assert!(a.oeffner.geschlossen(0));
        assert_eq!(a.registry.phase("alice"), Some(StreamPhase::Idle));
    }

    #[test]
    fn stoppen_waehrend_wiedergabe_schaltet_schreiben_ab() {
        let a = aufbau(100_000);
        let (_steuerung, audio, _am) = bereit(&a);
        a.registry.start_streaming("alice").unwrap();

        a.registry.stop_streaming("alice").unwrap();
        assert_eq!(audio.interesse(), Interesse::Lesen);
        assert!(a.registry.session("alice").unwrap().song.is_none());
    }

    #[test]
    fn audioverbindung_getrennt_waehrend_wiedergabe() {
        let a = aufbau(100_000);
        let (_steuerung, audio, _am) = bereit(&a);
        a.registry.start_streaming("alice").unwrap();

        assert_eq!(
            a.registry.audio_verbindung_geschlossen(audio.id()),
            Some("alice".to_string())
        );
        let info = a.registry.session("alice").unwrap();
        assert_eq!(info.phase, StreamPhase::Idle);
        assert_eq!(info.audio, None);
        assert!(a.oeffner.geschlossen(0));
        assert_eq!(a.registry.audio_verbindung_geschlossen(audio.id()), None);
    }

    #[test]
    fn neue_audioverbindung_ersetzt_alte() {
        let a = aufbau(100_000);
        let (_steuerung, alt, mut alt_mailbox) = bereit(&a);
        a.registry.start_streaming("alice").unwrap();

        let (neu, _nm) = verbindung();
        a.registry.link_audio_connection("alice", &neu).unwrap();

        assert!(matches!(
            alt_mailbox.steuer_rx.try_recv(),
            Ok(Steuerbefehl::Schliessen)
        ));
        assert_eq!(a.registry.phase("alice"), Some(StreamPhase::Prepared));
        assert!(!a.oeffner.geschlossen(0));

        a.registry.start_streaming("alice").unwrap();
        assert!(a.registry.next_fragment(neu.id()).is_ok());
        assert!(a.registry.next_fragment(alt.id()).is_err());
    }

    #[test]
    fn steuerverbindung_kann_nicht_audio_werden() {
        let a = aufbau(100);
        let (steuerung, _m) = verbindung();
        a.registry.login("alice", &steuerung).unwrap();
        assert!(matches!(
            a.registry.link_audio_connection("alice", &steuerung),
            Err(StreamingError::BereitsAngemeldet(_))
        ));
    }

    #[test]
    fn herunterfahren_schliesst_alle_quellen() {
        let a = aufbau(100_000);
        let (_steuerung, _audio, _am) = bereit(&a);
        let (bob, _bm) = verbindung();
        a.registry.login("bob", &bob).unwrap();

        assert_eq!(a.registry.alle_streams_schliessen(), 1);
        assert!(a.oeffner.geschlossen(0));
        let sitzungen = a.registry.sessions();
        assert_eq!(sitzungen.len(), 2);
        assert_eq!(sitzungen[0].benutzer, "alice");
        assert!(sitzungen.iter().all(|s| s.phase == StreamPhase::Idle));
    }
}
