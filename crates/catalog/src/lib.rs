//! klangwerk-catalog – Katalog- und Benutzerdaten
//!
//! Dateibasierte Speicher fuer Songs, registrierte Benutzer und Playlists.
//! Alle Speicher sind intern synchronisiert und koennen ueber `Arc`
//! zwischen Verbindungen und Operator-Konsole geteilt werden.

pub mod error;
pub mod password;
pub mod playlist;
pub mod song;
pub mod users;

pub use error::{CatalogError, CatalogResult};
pub use password::PasswortParameter;
pub use playlist::PlaylistStore;
pub use song::{audiodatei_pruefen, Song, SongCatalog};
pub use users::UserStore;
