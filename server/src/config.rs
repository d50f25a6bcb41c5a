//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use std::path::PathBuf;

use klangwerk_catalog::PasswortParameter;
use klangwerk_protocol::wire::HEADER_SIZE;
use klangwerk_streaming::MultiplexerConfig;
use serde::{Deserialize, Serialize};

/// Standard-Fragmentgroesse: ein Frame passt genau in 8 KiB
pub const STANDARD_FRAGMENT_GROESSE: usize = 8192 - HEADER_SIZE;

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerEinstellungen,
    pub netzwerk: NetzwerkEinstellungen,
    pub streaming: StreamingEinstellungen,
    /// Dateien fuer Songs, Benutzer und Playlists
    pub katalog: KatalogEinstellungen,
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers
    pub name: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen (Steuer- und Audioverbindungen)
    pub max_verbindungen: usize,
    /// Operator-Konsole auf der Standardeingabe
    pub konsole: bool,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Klangwerk".into(),
            max_verbindungen: 512,
            konsole: true,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    pub bind_adresse: String,
    pub port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            port: 7777,
        }
    }
}

/// Streaming-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingEinstellungen {
    /// Bytes Audiodaten pro FRAGMENT-Frame
    pub fragment_groesse: usize,
    /// Groesste erlaubte Frame-Payload; groessere Frames beenden die Verbindung
    pub max_frame_groesse: usize,
    /// Groesse eines einzelnen Socket-Reads
    pub lese_puffer: usize,
}

impl Default for StreamingEinstellungen {
    fn default() -> Self {
        let multiplexer = MultiplexerConfig::default();
        Self {
            fragment_groesse: STANDARD_FRAGMENT_GROESSE,
            max_frame_groesse: multiplexer.max_frame_groesse,
            lese_puffer: multiplexer.lese_puffer,
        }
    }
}

/// Speicherorte der Kataloge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KatalogEinstellungen {
    /// JSON-Lines-Datei mit allen Songs
    pub songs_datei: PathBuf,
    /// Zeilen `benutzername hash`
    pub benutzer_datei: PathBuf,
    /// Eine Datei pro Playlist
    pub playlist_verzeichnis: PathBuf,
    /// Argon2-Speicher in KiB
    pub passwort_speicher_kib: u32,
    pub passwort_iterationen: u32,
}

impl Default for KatalogEinstellungen {
    fn default() -> Self {
        let passwort = PasswortParameter::default();
        Self {
            songs_datei: PathBuf::from("daten/songs.jsonl"),
            benutzer_datei: PathBuf::from("daten/benutzer.txt"),
            playlist_verzeichnis: PathBuf::from("daten/playlists"),
            passwort_speicher_kib: passwort.speicher_kib,
            passwort_iterationen: passwort.iterationen,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level oder Filter-Direktiven
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config: Self = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    /// Prueft Werte, die sich gegenseitig beschraenken
    pub fn pruefen(&self) -> anyhow::Result<()> {
        let s = &self.streaming;
        if s.fragment_groesse == 0 {
            anyhow::bail!("streaming.fragment_groesse muss groesser als 0 sein");
        }
        if s.fragment_groesse > s.max_frame_groesse {
            anyhow::bail!(
                "streaming.fragment_groesse ({}) ueberschreitet streaming.max_frame_groesse ({})",
                s.fragment_groesse,
                s.max_frame_groesse
            );
        }
        if s.lese_puffer == 0 {
            anyhow::bail!("streaming.lese_puffer muss groesser als 0 sein");
        }
        if self.server.max_verbindungen == 0 {
            anyhow::bail!("server.max_verbindungen muss groesser als 0 sein");
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse zurueck
    pub fn bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.port)
    }

    pub fn multiplexer_config(&self) -> MultiplexerConfig {
        MultiplexerConfig {
            max_verbindungen: self.server.max_verbindungen,
            lese_puffer: self.streaming.lese_puffer,
            max_frame_groesse: self.streaming.max_frame_groesse,
        }
    }

    pub fn passwort_parameter(&self) -> PasswortParameter {
        PasswortParameter {
            speicher_kib: self.katalog.passwort_speicher_kib,
            iterationen: self.katalog.passwort_iterationen,
        }
    }
}
