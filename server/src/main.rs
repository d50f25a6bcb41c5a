//! Klangwerk Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.

use anyhow::Result;
use klangwerk_server::{config::ServerConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("KLANGWERK_CONFIG").unwrap_or_else(|_| "klangwerk.toml".into());

    let config = ServerConfig::laden(&config_pfad)?;
    klangwerk_observability::logging_initialisieren(&config.logging.level, &config.logging.format)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Klangwerk Server wird initialisiert"
    );

    Server::neu(config).starten().await
}
