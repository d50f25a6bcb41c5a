//! Steuerverbindung und Ablaufsteuerung des Clients
//!
//! Der [`StreamClient`] sendet Textanfragen als MESSAGE-Frames und reagiert
//! auf die Antworten des Servers:
//!
//! - `successfully_logged_in`: merkt sich den Benutzernamen
//! - `ok` mit `song_format`: oeffnet die Audioverbindung, sendet
//!   `beginStreaming` und startet den Empfang in eine neue Senke
//! - `stop_streaming`: die Wiedergabe laeuft aus; Fragmente, die noch
//!   unterwegs sind, landen weiter in der Senke
//! - `logged_out`: wartet, bis der Server die Audioverbindung schliesst
//!
//! Eine auslaufende Wiedergabe endet, sobald der Server ihre
//! Audioverbindung schliesst (Logout oder neue Audioverbindung beim
//! naechsten `play`).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use klangwerk_protocol::{AudioFormat, Frame, FrameCodec, FrameType, ResponseStatus, ServerResponse};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use crate::audio::{AudioVerbindung, WiedergabeBericht};
use crate::error::{ClientError, ClientResult};
use crate::sink::SinkFabrik;

/// Wie lange auf das Schliessen einer Audioverbindung durch den Server
/// gewartet wird, bevor der Empfang selbst gestoppt wird
const SCHLIESSEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Laufender Empfang auf der Audioverbindung
struct Wiedergabe {
    stopp: oneshot::Sender<()>,
    task: JoinHandle<ClientResult<WiedergabeBericht>>,
    /// Server hat `stop_streaming` gemeldet
    auslaufend: bool,
}

/// Client fuer einen Klangwerk-Server
pub struct StreamClient {
    adresse: SocketAddr,
    framed: Framed<TcpStream, FrameCodec>,
    fabrik: Arc<dyn SinkFabrik>,
    benutzer: Option<String>,
    wiedergabe: Option<Wiedergabe>,
    /// Nach `disconnect` endet die Schleife mit der naechsten `logged_out`-Antwort
    trennen_angefordert: bool,
}

impl StreamClient {
    /// Baut die Steuerverbindung auf
    pub async fn verbinden(adresse: SocketAddr, fabrik: Arc<dyn SinkFabrik>) -> ClientResult<Self> {
        let stream = TcpStream::connect(adresse).await?;
        stream.set_nodelay(true)?;
        tracing::info!(server = %adresse, "Steuerverbindung hergestellt");

        Ok(Self {
            adresse,
            framed: Framed::new(stream, FrameCodec::new()),
            fabrik,
            benutzer: None,
            wiedergabe: None,
            trennen_angefordert: false,
        })
    }

    pub fn benutzer(&self) -> Option<&str> {
        self.benutzer.as_deref()
    }

    /// `true` solange der Server fuer diesen Client streamt
    pub fn spielt(&self) -> bool {
        self.wiedergabe.as_ref().is_some_and(|w| !w.auslaufend)
    }

    /// Sendet eine Anfrage, ohne auf die Antwort zu warten
    pub async fn senden(&mut self, anfrage: &str) -> ClientResult<()> {
        let anfrage = anfrage.trim();
        if anfrage == "disconnect" {
            self.trennen_angefordert = true;
        }
        tracing::debug!(anfrage = %anfrage, "Anfrage senden");
        self.framed.send(Frame::message(anfrage.to_string())).await?;
        Ok(())
    }

    /// Wartet auf die naechste Antwort und reagiert darauf
    ///
    /// `None` wenn der Server die Verbindung geschlossen hat.
    pub async fn naechste_antwort(&mut self) -> ClientResult<Option<ServerResponse>> {
        let Some(antwort) = self.antwort_empfangen().await? else {
            return Ok(None);
        };
        self.reagieren(&antwort).await?;
        Ok(Some(antwort))
    }

    /// Sendet eine Anfrage und liefert die naechste Antwort
    pub async fn anfrage(&mut self, anfrage: &str) -> ClientResult<ServerResponse> {
        self.senden(anfrage).await?;
        self.naechste_antwort()
            .await?
            .ok_or(ClientError::VerbindungGetrennt)
    }

    /// Liest den naechsten MESSAGE-Frame; abbruchsicher
    async fn antwort_empfangen(&mut self) -> ClientResult<Option<ServerResponse>> {
        loop {
            match self.framed.next().await {
                Some(Ok(frame)) if frame.frame_type == FrameType::Message => {
                    let antwort = ServerResponse::aus_frame(&frame)?;
                    tracing::debug!(status = ?antwort.status, "Antwort empfangen");
                    return Ok(Some(antwort));
                }
                Some(Ok(_)) => {
                    tracing::warn!("Fragment auf der Steuerverbindung verworfen");
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Ok(None),
            }
        }
    }

    async fn reagieren(&mut self, antwort: &ServerResponse) -> ClientResult<()> {
        match antwort.status {
            ResponseStatus::SuccessfullyLoggedIn => {
                self.benutzer = Some(antwort.message.clone());
            }
            ResponseStatus::LoggedOut => {
                self.benutzer = None;
                self.wiedergabe_abschliessen().await;
            }
            ResponseStatus::StopStreaming => {
                if let Some(wiedergabe) = &mut self.wiedergabe {
                    wiedergabe.auslaufend = true;
                }
            }
            ResponseStatus::Ok => {
                if let Some(format) = &antwort.song_format {
                    self.wiedergabe_starten(format).await?;
                }
            }
            ResponseStatus::ReadyToStream | ResponseStatus::Error => {}
        }
        Ok(())
    }

    async fn wiedergabe_starten(&mut self, format: &AudioFormat) -> ClientResult<()> {
        let Some(benutzer) = self.benutzer.clone() else {
            self.wiedergabe_beenden().await;
            return Err(ClientError::NichtAngemeldet);
        };

        // Die neue Audioverbindung loest beim Server die alte ab
        let audio = match AudioVerbindung::verbinden(self.adresse, &benutzer).await {
            Ok(audio) => audio,
            Err(e) => {
                self.wiedergabe_beenden().await;
                return Err(e);
            }
        };
        self.wiedergabe_abschliessen().await;

        let mut sink = self.fabrik.erstellen(format)?;
        let (stopp, stopp_rx) = oneshot::channel();
        let task = tokio::spawn(async move { audio.empfangen(sink.as_mut(), stopp_rx).await });
        self.wiedergabe = Some(Wiedergabe {
            stopp,
            task,
            auslaufend: false,
        });

        tracing::info!(
            benutzer = %benutzer,
            sample_rate = format.sample_rate,
            kanaele = format.channels,
            "Wiedergabe startet"
        );
        self.senden(&format!("beginStreaming {benutzer}")).await
    }

    /// Wartet, bis der Server die Audioverbindung schliesst
    ///
    /// Alle bis dahin gesendeten Fragmente landen in der Senke. Schliesst
    /// der Server nicht innerhalb von [`SCHLIESSEN_TIMEOUT`], wird der
    /// Empfang wie bei [`StreamClient::wiedergabe_beenden`] gestoppt.
    pub async fn wiedergabe_abschliessen(&mut self) -> Option<WiedergabeBericht> {
        let mut wiedergabe = self.wiedergabe.take()?;
        match tokio::time::timeout(SCHLIESSEN_TIMEOUT, &mut wiedergabe.task).await {
            Ok(ergebnis) => bericht_auswerten(ergebnis),
            Err(_) => {
                tracing::warn!("Audioverbindung nicht vom Server geschlossen, Empfang wird gestoppt");
                let _ = wiedergabe.stopp.send(());
                bericht_auswerten(wiedergabe.task.await)
            }
        }
    }

    /// Stoppt den Empfang und wartet auf den Nachlauf
    pub async fn wiedergabe_beenden(&mut self) -> Option<WiedergabeBericht> {
        let wiedergabe = self.wiedergabe.take()?;
        let _ = wiedergabe.stopp.send(());
        bericht_auswerten(wiedergabe.task.await)
    }

    /// Interaktive Schleife: Zeilen aus `eingabe` senden, Antworten nach `ausgabe` schreiben
    pub async fn ausfuehren<R, W>(mut self, eingabe: R, mut ausgabe: W) -> ClientResult<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut zeilen = eingabe.lines();
        let mut eingabe_offen = true;

        loop {
            tokio::select! {
                zeile = zeilen.next_line(), if eingabe_offen => {
                    match zeile? {
                        Some(zeile) if zeile.trim().is_empty() => {}
                        Some(zeile) => self.senden(&zeile).await?,
                        None => eingabe_offen = false,
                    }
                }
                antwort = self.antwort_empfangen() => {
                    let Some(antwort) = antwort? else {
                        ausgabe.write_all(b"Verbindung vom Server getrennt.\n").await?;
                        break;
                    };
                    if let Err(e) = self.reagieren(&antwort).await {
                        tracing::warn!(fehler = %e, "Reaktion auf Antwort fehlgeschlagen");
                        ausgabe.write_all(format!("Fehler: {e}\n").as_bytes()).await?;
                    }
                    ausgabe.write_all(antwort_text(&antwort).as_bytes()).await?;
                    ausgabe.write_all(b"\n").await?;
                    ausgabe.flush().await?;

                    if antwort.status == ResponseStatus::LoggedOut && self.trennen_angefordert {
                        break;
                    }
                }
            }
        }

        self.wiedergabe_beenden().await;
        Ok(())
    }
}

fn bericht_auswerten(
    ergebnis: Result<ClientResult<WiedergabeBericht>, tokio::task::JoinError>,
) -> Option<WiedergabeBericht> {
    match ergebnis {
        Ok(Ok(bericht)) => Some(bericht),
        Ok(Err(e)) => {
            tracing::warn!(fehler = %e, "Wiedergabe mit Fehler beendet");
            None
        }
        Err(e) => {
            tracing::error!(fehler = %e, "Wiedergabe-Task abgebrochen");
            None
        }
    }
}

/// Text fuer die Ausgabe einer Antwort
pub fn antwort_text(antwort: &ServerResponse) -> String {
    match antwort.status {
        ResponseStatus::SuccessfullyLoggedIn => format!("Angemeldet als {}.", antwort.message),
        ResponseStatus::Error => format!("Fehler: {}", antwort.message),
        _ => antwort.message.clone(),
    }
}
