//! Typisierte Client-Anfragen

/// Alle Anfragen, die ein Client ueber eine MESSAGE stellen kann
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    // --- Konto ---
    Register { benutzer: String, passwort: String },
    Login { benutzer: String, passwort: String },
    Logout,
    /// Abmelden und Verbindung schliessen
    Disconnect,

    // --- Katalog ---
    Search { stichwoerter: Vec<String> },
    Top { anzahl: usize },

    // --- Wiedergabe ---
    Play { song: String, artist: Option<String> },
    Stop,

    // --- Playlists ---
    CreatePlaylist { name: String },
    AddSongTo {
        playlist: String,
        song: String,
        artist: Option<String>,
    },
    ShowPlaylist { name: String },

    // --- Audioverbindung ---
    /// Erste Nachricht auf einer neuen Verbindung: macht sie zur Audioverbindung
    MusicConnect { benutzer: String },
    /// Startet die Wiedergabe auf der verknuepften Audioverbindung
    BeginStreaming { benutzer: String },
}

impl Request {
    /// Name des Befehls wie er im Protokoll steht
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Login { .. } => "login",
            Self::Logout => "logout",
            Self::Disconnect => "disconnect",
            Self::Search { .. } => "search",
            Self::Top { .. } => "top",
            Self::Play { .. } => "play",
            Self::Stop => "stop",
            Self::CreatePlaylist { .. } => "create-playlist",
            Self::AddSongTo { .. } => "add-song-to",
            Self::ShowPlaylist { .. } => "show-playlist",
            Self::MusicConnect { .. } => "musicConnect",
            Self::BeginStreaming { .. } => "beginStreaming",
        }
    }

    /// Gibt true zurueck wenn die Anfrage eine angemeldete Steuerverbindung braucht
    pub fn braucht_anmeldung(&self) -> bool {
        !matches!(
            self,
            Self::Register { .. } | Self::Login { .. } | Self::MusicConnect { .. } | Self::Disconnect
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anmeldung_noetig() {
        assert!(!Request::Login {
            benutzer: "a".into(),
            passwort: "b".into()
        }
        .braucht_anmeldung());
        assert!(!Request::Disconnect.braucht_anmeldung());
        assert!(Request::Stop.braucht_anmeldung());
        assert!(Request::Top { anzahl: 3 }.braucht_anmeldung());
    }

    #[test]
    fn namen_wie_im_protokoll() {
        assert_eq!(
            Request::MusicConnect {
                benutzer: "a".into()
            }
            .name(),
            "musicConnect"
        );
        assert_eq!(
            Request::CreatePlaylist { name: "x".into() }.name(),
            "create-playlist"
        );
    }
}
