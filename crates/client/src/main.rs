//! Klangwerk Client – Einstiegspunkt
//!
//! Verwendung: `klangwerk-client [<server-adresse>] [<aufnahme-verzeichnis>]`
//!
//! Anfragen werden zeilenweise von der Standardeingabe gelesen. Gespielte
//! Songs landen als WAV-Dateien im Aufnahme-Verzeichnis.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use klangwerk_client::{StreamClient, WavVerzeichnisFabrik};
use tokio::io::BufReader;

const STANDARD_ADRESSE: &str = "127.0.0.1:7777";
const STANDARD_VERZEICHNIS: &str = "wiedergabe";

#[tokio::main]
async fn main() -> Result<()> {
    klangwerk_observability::logging_initialisieren("warn", "text")?;

    let mut args = std::env::args().skip(1);
    let adresse: SocketAddr = args
        .next()
        .unwrap_or_else(|| STANDARD_ADRESSE.to_string())
        .parse()
        .context("Ungueltige Server-Adresse")?;
    let verzeichnis = args.next().unwrap_or_else(|| STANDARD_VERZEICHNIS.to_string());

    let fabrik = Arc::new(WavVerzeichnisFabrik::neu(&verzeichnis));
    let client = StreamClient::verbinden(adresse, fabrik)
        .await
        .with_context(|| format!("Verbindung zu {adresse} fehlgeschlagen"))?;

    println!("Verbunden mit {adresse}. Aufnahmen unter {verzeichnis}/");
    client
        .ausfuehren(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;
    Ok(())
}
