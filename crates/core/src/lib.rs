//! klangwerk-core – Gemeinsame Typen und Fehlerkategorien
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Klangwerk-Crates gemeinsam genutzt werden.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::FehlerKategorie;
pub use types::ConnectionId;
