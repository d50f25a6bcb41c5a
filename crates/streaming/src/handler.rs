//! Schnittstelle zur Befehlsausfuehrung
//!
//! Der Multiplexer weiss nichts ueber die Befehle selbst. Jede MESSAGE einer
//! Steuerverbindung (und die erste MESSAGE einer spaeteren Audioverbindung)
//! geht als Text an einen [`RequestHandler`]; dessen Antwort wird als
//! MESSAGE-Frame auf derselben Verbindung eingereiht.

use klangwerk_protocol::ServerResponse;

use crate::connection::{Attachment, ConnectionHandle};

/// Kontext einer einzelnen Anfrage
pub struct RequestContext<'a> {
    pub verbindung: &'a ConnectionHandle,
    /// Rolle der Verbindung; der Handler setzt sie bei Login, Logout und `musicConnect`
    pub attachment: &'a mut Attachment,
    schliessen: bool,
}

impl<'a> RequestContext<'a> {
    pub fn neu(verbindung: &'a ConnectionHandle, attachment: &'a mut Attachment) -> Self {
        Self {
            verbindung,
            attachment,
            schliessen: false,
        }
    }

    /// Verbindung nach dem Senden der Antwort schliessen
    pub fn verbindung_schliessen(&mut self) {
        self.schliessen = true;
    }

    pub fn soll_schliessen(&self) -> bool {
        self.schliessen
    }
}

/// Fuehrt eine Textanfrage aus und liefert die Antwort
///
/// Fehler werden vom Handler selbst in eine Antwort verwandelt; die
/// Verbindung bleibt offen, sofern der Handler nicht
/// [`RequestContext::verbindung_schliessen`] aufruft.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, anfrage: &str, ctx: &mut RequestContext<'_>) -> ServerResponse;
}
