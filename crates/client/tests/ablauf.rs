//! Client gegen einen geskripteten Server

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use klangwerk_client::{ClientError, SpeicherSink, StreamClient, NACHLAUF};
use klangwerk_protocol::{
    AudioFormat, Frame, FrameCodec, FrameType, ResponseStatus, ServerResponse,
};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_util::codec::Framed;

type Verbindung = Framed<TcpStream, FrameCodec>;

async fn annehmen(listener: &TcpListener) -> Verbindung {
    let (stream, _) = listener.accept().await.unwrap();
    Framed::new(stream, FrameCodec::new())
}

async fn erwarten(verbindung: &mut Verbindung, text: &str) {
    let frame = verbindung.next().await.unwrap().unwrap();
    assert_eq!(frame.frame_type, FrameType::Message);
    assert_eq!(frame.text().unwrap(), text);
}

async fn antworten(verbindung: &mut Verbindung, antwort: ServerResponse) {
    verbindung.send(antwort.als_frame().unwrap()).await.unwrap();
}

fn format() -> AudioFormat {
    AudioFormat::pcm_s16le(8_000, 1)
}

async fn server_starten() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let adresse = listener.local_addr().unwrap();
    (listener, adresse)
}

#[tokio::test]
async fn wiedergabe_mit_fragmenten_im_handshake() {
    let (listener, adresse) = server_starten().await;
    let (fertig_tx, fertig_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let mut steuerung = annehmen(&listener).await;
        erwarten(&mut steuerung, "login alice pw").await;
        antworten(
            &mut steuerung,
            ServerResponse::neu(ResponseStatus::SuccessfullyLoggedIn, "alice"),
        )
        .await;

        erwarten(&mut steuerung, "play Intro").await;
        antworten(&mut steuerung, ServerResponse::ok("Bereit").mit_format(format())).await;

        // Bestaetigung und erste Fragmente in einem einzigen Write
        let mut audio = annehmen(&listener).await;
        erwarten(&mut audio, "musicConnect alice").await;
        let codec = FrameCodec::new();
        let mut bytes = Vec::new();
        let bereit = ServerResponse::neu(ResponseStatus::ReadyToStream, "bereit")
            .als_frame()
            .unwrap();
        bytes.extend_from_slice(&codec.encode(FrameType::Message, &bereit.payload).unwrap());
        bytes.extend_from_slice(&codec.encode(FrameType::Fragment, b"eins-").unwrap());
        bytes.extend_from_slice(&codec.encode(FrameType::Fragment, b"zwei-").unwrap());
        audio.get_mut().write_all(&bytes).await.unwrap();

        erwarten(&mut steuerung, "beginStreaming alice").await;
        antworten(&mut steuerung, ServerResponse::ok("Wiedergabe gestartet.")).await;
        audio.send(Frame::fragment(&b"drei"[..])).await.unwrap();
        antworten(
            &mut steuerung,
            ServerResponse::neu(ResponseStatus::StopStreaming, "Song beendet."),
        )
        .await;

        // Nachzuegler nach stop_streaming, laenger als der Nachlauf
        tokio::time::sleep(NACHLAUF * 2).await;
        audio.send(Frame::fragment(&b"-vier"[..])).await.unwrap();

        let _ = fertig_rx.await;
        drop((steuerung, audio));
    });

    let speicher = SpeicherSink::neu();
    let mut client = StreamClient::verbinden(adresse, Arc::new(speicher.clone()))
        .await
        .unwrap();

    let antwort = client.anfrage("login alice pw").await.unwrap();
    assert_eq!(antwort.status, ResponseStatus::SuccessfullyLoggedIn);
    assert_eq!(client.benutzer(), Some("alice"));

    let antwort = client.anfrage("play Intro").await.unwrap();
    assert_eq!(antwort.song_format, Some(format()));
    assert!(client.spielt());

    let antwort = client.naechste_antwort().await.unwrap().unwrap();
    assert_eq!(antwort.message, "Wiedergabe gestartet.");

    let antwort = client.naechste_antwort().await.unwrap().unwrap();
    assert_eq!(antwort.status, ResponseStatus::StopStreaming);
    assert!(!client.spielt());
    // Audioverbindung bleibt offen bis der Server sie schliesst
    assert!(!speicher.aufnahmen()[0].beendet);

    let _ = fertig_tx.send(());
    let bericht = client.wiedergabe_abschliessen().await.unwrap();
    assert_eq!(bericht.bytes, 19);

    let aufnahmen = speicher.aufnahmen();
    assert_eq!(aufnahmen.len(), 1);
    assert_eq!(aufnahmen[0].format, format());
    assert_eq!(aufnahmen[0].daten, b"eins-zwei-drei-vier");
    assert!(aufnahmen[0].beendet);

    server.await.unwrap();
}

#[tokio::test]
async fn abgelehnte_audioverbindung() {
    let (listener, adresse) = server_starten().await;

    let server = tokio::spawn(async move {
        let mut steuerung = annehmen(&listener).await;
        erwarten(&mut steuerung, "login bob pw").await;
        antworten(
            &mut steuerung,
            ServerResponse::neu(ResponseStatus::SuccessfullyLoggedIn, "bob"),
        )
        .await;
        erwarten(&mut steuerung, "play Intro").await;
        antworten(&mut steuerung, ServerResponse::ok("Bereit").mit_format(format())).await;

        let mut audio = annehmen(&listener).await;
        erwarten(&mut audio, "musicConnect bob").await;
        antworten(&mut audio, ServerResponse::fehler("Benutzer bob ist nicht online")).await;
        steuerung
    });

    let speicher = SpeicherSink::neu();
    let mut client = StreamClient::verbinden(adresse, Arc::new(speicher.clone()))
        .await
        .unwrap();
    client.anfrage("login bob pw").await.unwrap();

    let fehler = client.anfrage("play Intro").await.unwrap_err();
    assert!(matches!(fehler, ClientError::AudioAbgelehnt(ref m) if m.contains("nicht online")));
    assert!(!client.spielt());
    assert!(speicher.aufnahmen().is_empty());

    drop(server.await.unwrap());
}

#[tokio::test]
async fn interaktive_schleife_endet_nach_disconnect() {
    let (listener, adresse) = server_starten().await;

    let server = tokio::spawn(async move {
        let mut steuerung = annehmen(&listener).await;
        erwarten(&mut steuerung, "top 1").await;
        antworten(&mut steuerung, ServerResponse::fehler("Bitte zuerst anmelden.")).await;
        erwarten(&mut steuerung, "disconnect").await;
        antworten(
            &mut steuerung,
            ServerResponse::neu(ResponseStatus::LoggedOut, "Verbindung wird getrennt."),
        )
        .await;
        steuerung
    });

    let client = StreamClient::verbinden(adresse, Arc::new(SpeicherSink::neu()))
        .await
        .unwrap();

    // Das Ende der Eingabe beendet die Schleife nicht, erst die Antwort auf disconnect
    let eingabe: &[u8] = b"top 1\n\ndisconnect\n";
    let mut ausgabe = Vec::new();
    client.ausfuehren(eingabe, &mut ausgabe).await.unwrap();

    let ausgabe = String::from_utf8(ausgabe).unwrap();
    assert_eq!(
        ausgabe,
        "Fehler: Bitte zuerst anmelden.\nVerbindung wird getrennt.\n"
    );
    drop(server.await.unwrap());
}
