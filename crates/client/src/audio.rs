//! Audioverbindung des Clients
//!
//! Die Audioverbindung ist eine zweite TCP-Verbindung zum Server. Nach dem
//! Handshake (`musicConnect <benutzer>` -> `ready_to_stream`) liefert sie nur
//! noch FRAGMENT-Frames. Der Handshake laeuft ueber `Framed`; Bytes, die der
//! Codec dabei schon gelesen hat, wandern in den [`ReassemblyBuffer`] des
//! Empfangs.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use klangwerk_protocol::{
    Frame, FrameCodec, FrameType, ProtocolError, ReassemblyBuffer, ResponseStatus, ServerResponse,
};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_util::codec::Framed;

use crate::error::{ClientError, ClientResult};
use crate::sink::PlaybackSink;

/// Groesse eines einzelnen Socket-Reads
const LESE_PUFFER: usize = 16 * 1024;

/// Leerlauf, nach dem ein explizit gestoppter Empfang endet
///
/// Gilt nur fuer [`StreamClient::wiedergabe_beenden`](crate::StreamClient::wiedergabe_beenden);
/// nach `stop_streaming` liest der Client weiter, bis der Server die
/// Audioverbindung schliesst.
pub const NACHLAUF: Duration = Duration::from_millis(200);

/// Statistik einer beendeten Wiedergabe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WiedergabeBericht {
    pub fragmente: u64,
    pub bytes: u64,
}

/// Bestaetigte Audioverbindung
pub struct AudioVerbindung {
    stream: TcpStream,
    puffer: ReassemblyBuffer,
}

impl AudioVerbindung {
    /// Oeffnet eine Audioverbindung und verknuepft sie mit `benutzer`
    pub async fn verbinden(adresse: SocketAddr, benutzer: &str) -> ClientResult<Self> {
        let stream = TcpStream::connect(adresse).await?;
        stream.set_nodelay(true)?;

        let mut framed = Framed::new(stream, FrameCodec::new());
        framed
            .send(Frame::message(format!("musicConnect {benutzer}")))
            .await?;

        let antwort = loop {
            match framed.next().await {
                Some(Ok(frame)) if frame.frame_type == FrameType::Message => {
                    break ServerResponse::aus_frame(&frame)?;
                }
                Some(Ok(_)) => {
                    tracing::warn!("Fragment vor Bestaetigung der Audioverbindung verworfen");
                }
                Some(Err(e)) => return Err(e.into()),
                None => return Err(ClientError::VerbindungGetrennt),
            }
        };

        if antwort.status != ResponseStatus::ReadyToStream {
            return Err(ClientError::AudioAbgelehnt(antwort.message));
        }

        let teile = framed.into_parts();
        let mut puffer = ReassemblyBuffer::new();
        puffer.prepend(&teile.read_buf);

        tracing::debug!(benutzer = %benutzer, gepuffert = puffer.len(), "Audioverbindung bereit");
        Ok(Self {
            stream: teile.io,
            puffer,
        })
    }

    /// Schreibt empfangene Fragmente in `sink` bis `stopp` ausloest oder der Server trennt
    ///
    /// Nach dem Stopp wird noch [`NACHLAUF`] lang auf weitere Fragmente
    /// gewartet. Die Senke wird in jedem Fall beendet.
    pub async fn empfangen(
        mut self,
        sink: &mut dyn PlaybackSink,
        mut stopp: oneshot::Receiver<()>,
    ) -> ClientResult<WiedergabeBericht> {
        let mut bericht = WiedergabeBericht::default();
        let ergebnis = self.empfangen_bis_stopp(sink, &mut stopp, &mut bericht).await;
        let beendet = sink.beenden();

        ergebnis?;
        beendet?;
        tracing::debug!(fragmente = bericht.fragmente, bytes = bericht.bytes, "Wiedergabe beendet");
        Ok(bericht)
    }

    async fn empfangen_bis_stopp(
        &mut self,
        sink: &mut dyn PlaybackSink,
        stopp: &mut oneshot::Receiver<()>,
        bericht: &mut WiedergabeBericht,
    ) -> ClientResult<()> {
        let mut lese_puffer = vec![0u8; LESE_PUFFER];
        self.ausliefern(sink, bericht)?;

        loop {
            tokio::select! {
                gelesen = self.stream.read(&mut lese_puffer) => {
                    let n = gelesen?;
                    if n == 0 {
                        return Ok(());
                    }
                    self.puffer.append(&lese_puffer[..n]);
                    self.ausliefern(sink, bericht)?;
                }
                _ = &mut *stopp => break,
            }
        }

        // Nachlauf
        loop {
            match tokio::time::timeout(NACHLAUF, self.stream.read(&mut lese_puffer)).await {
                Err(_) | Ok(Ok(0)) => return Ok(()),
                Ok(Ok(n)) => {
                    self.puffer.append(&lese_puffer[..n]);
                    self.ausliefern(sink, bericht)?;
                }
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    fn ausliefern(
        &mut self,
        sink: &mut dyn PlaybackSink,
        bericht: &mut WiedergabeBericht,
    ) -> ClientResult<()> {
        if self.puffer.laenge_unplausibel() {
            return Err(ProtocolError::PufferUeberlauf(self.puffer.len()).into());
        }

        while let Some(typ) = self.puffer.peek_type()? {
            match typ {
                FrameType::Fragment => {
                    let Some(frame) = self.puffer.next_frame()? else {
                        break;
                    };
                    sink.schreiben(&frame.payload)?;
                    bericht.fragmente += 1;
                    bericht.bytes += frame.payload.len() as u64;
                }
                FrameType::Message => {
                    tracing::warn!("Unerwartete Nachricht auf der Audioverbindung verworfen");
                    self.puffer.skip_frame();
                }
            }
        }
        Ok(())
    }
}
