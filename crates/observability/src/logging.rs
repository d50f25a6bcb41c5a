//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `KW_LOG_LEVEL`: Filter-Direktiven (z.B. `debug` oder `info,klangwerk_streaming=trace`)
//! - `KW_LOG_FORMAT`: Format (text/json)
//!
//! Die Umgebung hat Vorrang vor den Werten aus der Konfigurationsdatei.

use std::str::FromStr;

use thiserror::Error;
use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_LEVEL_ENV: &str = "KW_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "KW_LOG_FORMAT";

/// Dekoder-Interna sind auf `info` zu gespraechig
const LEISE_CRATES: &[&str] = &["symphonia=warn"];

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Ungueltiges Log-Format: {0} (erlaubt: text, json)")]
    UngueltigesFormat(String),

    #[error("Ungueltiger Log-Filter {filter:?}: {grund}")]
    UngueltigerFilter { filter: String, grund: String },

    #[error("Logging bereits initialisiert: {0}")]
    BereitsInitialisiert(String),
}

/// Ausgabeformat der Log-Zeilen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            anderes => Err(LoggingError::UngueltigesFormat(anderes.to_string())),
        }
    }
}

/// Initialisiert das globale Logging.
///
/// `level` und `format` stammen aus der Konfiguration; `KW_LOG_LEVEL` und
/// `KW_LOG_FORMAT` ueberschreiben sie. Ein zweiter Aufruf liefert
/// [`LoggingError::BereitsInitialisiert`].
pub fn logging_initialisieren(level: &str, format: &str) -> Result<(), LoggingError> {
    let level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| level.to_string());
    let format = std::env::var(LOG_FORMAT_ENV).unwrap_or_else(|_| format.to_string());

    let filter = filter_bauen(&level)?;
    let ergebnis = match format.parse::<LogFormat>()? {
        LogFormat::Json => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        LogFormat::Text => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    ergebnis.map_err(|e| LoggingError::BereitsInitialisiert(e.to_string()))
}

/// Baut den Filter aus Direktiven und haengt die Ruhe-Direktiven an
fn filter_bauen(direktiven: &str) -> Result<EnvFilter, LoggingError> {
    let mut alle = vec![direktiven.trim()];
    for leise in LEISE_CRATES {
        let krate = leise.split('=').next().unwrap_or_default();
        if !direktiven.contains(krate) {
            alle.push(leise);
        }
    }
    let text = alle.join(",");

    EnvFilter::try_new(&text).map_err(|e| LoggingError::UngueltigerFilter {
        filter: direktiven.to_string(),
        grund: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parsen() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("JSON".parse::<LogFormat>().is_err()); // Gross-/Kleinschreibung
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn filter_haengt_symphonia_an() {
        let filter = filter_bauen("debug").unwrap();
        assert!(filter.to_string().contains("symphonia=warn"));

        let filter = filter_bauen("info,symphonia=trace").unwrap();
        assert!(!filter.to_string().contains("symphonia=warn"));
    }

    #[test]
    fn filter_ungueltig() {
        assert!(matches!(
            filter_bauen("info,klangwerk=unsinn"),
            Err(LoggingError::UngueltigerFilter { .. })
        ));
    }
}
