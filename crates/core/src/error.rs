//! Fehlerkategorien fuer Klangwerk
//!
//! Jedes Crate definiert einen eigenen Fehler-Enum. Ueber
//! `kategorie()` wird jeder Fehler einer der vier Kategorien zugeordnet,
//! die bestimmen wie der Multiplexer mit der Verbindung verfaehrt.

/// Kategorie eines Fehlers, entscheidet ueber das Verbindungsschicksal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FehlerKategorie {
    /// Ungueltiger Frame oder Typ-Tag: nur die betroffene Verbindung wird geschlossen
    Protokoll,
    /// Ungueltiger Befehl, Argumente oder Anmeldezustand: Antwort an den Client, Verbindung bleibt
    Benutzer,
    /// Lese-/Schreibfehler, Peer-Reset: Verbindung schliessen, Sitzung aufraeumen
    Verbindung,
    /// Unerwarteter Fehler eines Kollaborateurs: generische Antwort, Verbindung bleibt
    Intern,
}

impl FehlerKategorie {
    /// Gibt true zurueck wenn die Verbindung nach diesem Fehler geschlossen werden muss
    pub fn schliesst_verbindung(&self) -> bool {
        matches!(self, Self::Protokoll | Self::Verbindung)
    }

    /// Gibt true zurueck wenn die Fehlermeldung an den Client weitergegeben werden darf
    pub fn ist_fuer_client(&self) -> bool {
        matches!(self, Self::Benutzer)
    }
}

impl std::fmt::Display for FehlerKategorie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Protokoll => "protokoll",
            Self::Benutzer => "benutzer",
            Self::Verbindung => "verbindung",
            Self::Intern => "intern",
        };
        f.write_str(name)
    }
}
