//! Befehlsausfuehrer fuer Client-Anfragen
//!
//! Der [`RequestExecutor`] haelt Katalog, Benutzer, Playlists und die
//! Sitzungsregistry und beantwortet jede Anfrage mit genau einer
//! [`ServerResponse`]. Er wird dem Multiplexer als [`RequestHandler`] uebergeben.

use std::sync::Arc;

use klangwerk_catalog::{PlaylistStore, Song, SongCatalog, UserStore};
use klangwerk_core::FehlerKategorie;
use klangwerk_protocol::{ResponseStatus, ServerResponse};
use klangwerk_streaming::{Attachment, RequestContext, RequestHandler, StreamingSessionRegistry};

use crate::commands::parser::parse_request;
use crate::commands::types::Request;
use crate::error::{CommanderError, CommanderResult};

/// Fuehrt geparste Anfragen gegen die Server-Speicher aus
pub struct RequestExecutor {
    katalog: Arc<SongCatalog>,
    benutzer: Arc<UserStore>,
    playlists: Arc<PlaylistStore>,
    registry: StreamingSessionRegistry,
}

impl RequestExecutor {
    pub fn neu(
        katalog: Arc<SongCatalog>,
        benutzer: Arc<UserStore>,
        playlists: Arc<PlaylistStore>,
        registry: StreamingSessionRegistry,
    ) -> Arc<Self> {
        Arc::new(Self {
            katalog,
            benutzer,
            playlists,
            registry,
        })
    }

    /// Fuehrt eine Anfrage im Kontext ihrer Verbindung aus
    pub fn ausfuehren(
        &self,
        request: Request,
        ctx: &mut RequestContext<'_>,
    ) -> CommanderResult<ServerResponse> {
        if request.braucht_anmeldung() && !ctx.attachment.ist_steuerung() {
            return Err(CommanderError::NichtAngemeldet);
        }

        match request {
            // --- Konto ---
            Request::Register { benutzer, passwort } => self.registrieren(&benutzer, &passwort),
            Request::Login { benutzer, passwort } => self.anmelden(&benutzer, &passwort, ctx),
            Request::Logout => self.abmelden(ctx),
            Request::Disconnect => Ok(self.trennen(ctx)),

            // --- Katalog ---
            Request::Search { stichwoerter } => Ok(self.suchen(&stichwoerter)),
            Request::Top { anzahl } => self.top(anzahl),

            // --- Wiedergabe ---
            Request::Play { song, artist } => self.abspielen(ctx, &song, artist.as_deref()),
            Request::Stop => self.stoppen(ctx),

            // --- Playlists ---
            Request::CreatePlaylist { name } => {
                self.playlists.erstellen(&name)?;
                tracing::info!(playlist = %name, "Playlist erstellt");
                Ok(ServerResponse::ok(format!("Playlist {name} erstellt.")))
            }
            Request::AddSongTo {
                playlist,
                song,
                artist,
            } => {
                let song = self.song_finden(&song, artist.as_deref())?;
                self.playlists.song_hinzufuegen(&playlist, &song)?;
                Ok(ServerResponse::ok(format!(
                    "{song} zur Playlist {playlist} hinzugefuegt."
                )))
            }
            Request::ShowPlaylist { name } => self.playlist_anzeigen(&name),

            // --- Audioverbindung ---
            Request::MusicConnect { benutzer } => self.audio_verknuepfen(&benutzer, ctx),
            Request::BeginStreaming { benutzer } => self.streaming_beginnen(&benutzer, ctx),
        }
    }

    // -----------------------------------------------------------------------
    // Konto
    // -----------------------------------------------------------------------

    fn registrieren(&self, benutzer: &str, passwort: &str) -> CommanderResult<ServerResponse> {
        self.benutzer.registrieren(benutzer, passwort)?;
        tracing::info!(benutzer = %benutzer, "Benutzer registriert");
        Ok(ServerResponse::ok(format!(
            "Benutzer {benutzer} registriert. Bitte anmelden."
        )))
    }

    fn anmelden(
        &self,
        benutzer: &str,
        passwort: &str,
        ctx: &mut RequestContext<'_>,
    ) -> CommanderResult<ServerResponse> {
        match &*ctx.attachment {
            Attachment::Unauthentifiziert => {}
            Attachment::Steuerung { benutzer: aktuell } => {
                return Err(CommanderError::BereitsAngemeldet(aktuell.clone()))
            }
            Attachment::Audio { .. } => {
                return Err(CommanderError::NichtErlaubt(
                    "Audioverbindungen koennen sich nicht anmelden".into(),
                ))
            }
        }

        self.benutzer.anmeldung_pruefen(benutzer, passwort)?;
        self.registry.login(benutzer, ctx.verbindung)?;
        *ctx.attachment = Attachment::Steuerung {
            benutzer: benutzer.to_string(),
        };

        // Der Client braucht den Namen fuer musicConnect/beginStreaming
        Ok(ServerResponse::neu(ResponseStatus::SuccessfullyLoggedIn, benutzer))
    }

    fn abmelden(&self, ctx: &mut RequestContext<'_>) -> CommanderResult<ServerResponse> {
        if let Some(benutzer) = ctx.attachment.benutzer() {
            self.registry.logout(benutzer)?;
        }
        *ctx.attachment = Attachment::Unauthentifiziert;
        Ok(ServerResponse::neu(ResponseStatus::LoggedOut, "Abgemeldet."))
    }

    fn trennen(&self, ctx: &mut RequestContext<'_>) -> ServerResponse {
        if let Attachment::Steuerung { benutzer } = &*ctx.attachment {
            if let Err(e) = self.registry.logout(benutzer) {
                tracing::debug!(benutzer = %benutzer, fehler = %e, "Abmelden beim Trennen fehlgeschlagen");
            }
        }
        *ctx.attachment = Attachment::Unauthentifiziert;
        ctx.verbindung_schliessen();
        ServerResponse::neu(ResponseStatus::LoggedOut, "Verbindung wird getrennt.")
    }

    // -----------------------------------------------------------------------
    // Katalog
    // -----------------------------------------------------------------------

    fn suchen(&self, stichwoerter: &[String]) -> ServerResponse {
        let stichwoerter: Vec<&str> = stichwoerter.iter().map(String::as_str).collect();
        let treffer = self.katalog.suchen(&stichwoerter);
        if treffer.is_empty() {
            return ServerResponse::ok("Keine passenden Treffer gefunden.");
        }
        ServerResponse::ok(nummerieren(&treffer))
    }

    fn top(&self, anzahl: usize) -> CommanderResult<ServerResponse> {
        let songs = self.katalog.top(anzahl)?;
        if songs.is_empty() {
            return Ok(ServerResponse::ok("Der Katalog ist leer."));
        }
        Ok(ServerResponse::ok(nummerieren(&songs)))
    }

    fn song_finden(&self, name: &str, artist: Option<&str>) -> CommanderResult<Song> {
        let song = match artist {
            Some(artist) => self.katalog.song_von(name, artist)?,
            None => self.katalog.song(name)?,
        };
        Ok(song)
    }

    // -----------------------------------------------------------------------
    // Wiedergabe
    // -----------------------------------------------------------------------

    fn abspielen(
        &self,
        ctx: &RequestContext<'_>,
        name: &str,
        artist: Option<&str>,
    ) -> CommanderResult<ServerResponse> {
        let benutzer = angemeldeter_benutzer(ctx)?;
        let song = self.song_finden(name, artist)?;
        let format = self.registry.prepare_stream(benutzer, &song)?;

        tracing::info!(benutzer = %benutzer, song = %song, "Song vorbereitet");
        Ok(ServerResponse::ok(format!("Bereit zur Wiedergabe: {song}.")).mit_format(format))
    }

    fn stoppen(&self, ctx: &RequestContext<'_>) -> CommanderResult<ServerResponse> {
        let benutzer = angemeldeter_benutzer(ctx)?;
        self.registry.stop_streaming(benutzer)?;
        Ok(ServerResponse::neu(
            ResponseStatus::StopStreaming,
            "Wiedergabe gestoppt.",
        ))
    }

    // -----------------------------------------------------------------------
    // Playlists
    // -----------------------------------------------------------------------

    fn playlist_anzeigen(&self, name: &str) -> CommanderResult<ServerResponse> {
        let songs = self.playlists.anzeigen(name, &self.katalog)?;
        if songs.is_empty() {
            return Ok(ServerResponse::ok(format!("Playlist {name} ist leer.")));
        }
        Ok(ServerResponse::ok(format!(
            "Playlist {name}:\n{}",
            nummerieren(&songs)
        )))
    }

    // -----------------------------------------------------------------------
    // Audioverbindung
    // -----------------------------------------------------------------------

    fn audio_verknuepfen(
        &self,
        benutzer: &str,
        ctx: &mut RequestContext<'_>,
    ) -> CommanderResult<ServerResponse> {
        if !matches!(ctx.attachment, Attachment::Unauthentifiziert) {
            return Err(CommanderError::NichtErlaubt(format!(
                "Verbindung ist bereits als {} zugeordnet",
                ctx.attachment
            )));
        }

        self.registry.link_audio_connection(benutzer, ctx.verbindung)?;
        *ctx.attachment = Attachment::Audio {
            benutzer: benutzer.to_string(),
        };
        Ok(ServerResponse::neu(
            ResponseStatus::ReadyToStream,
            "Audioverbindung bereit.",
        ))
    }

    fn streaming_beginnen(
        &self,
        benutzer: &str,
        ctx: &RequestContext<'_>,
    ) -> CommanderResult<ServerResponse> {
        let angemeldet = angemeldeter_benutzer(ctx)?;
        if angemeldet != benutzer {
            return Err(CommanderError::NichtErlaubt(format!(
                "Wiedergabe fuer {benutzer} kann nur dessen Steuerverbindung starten"
            )));
        }

        self.registry.start_streaming(benutzer)?;
        Ok(ServerResponse::ok("Wiedergabe gestartet."))
    }
}

impl RequestHandler for RequestExecutor {
    fn handle(&self, anfrage: &str, ctx: &mut RequestContext<'_>) -> ServerResponse {
        let ergebnis = parse_request(anfrage).and_then(|request| {
            let name = request.name();
            tracing::debug!(
                verbindung = %ctx.verbindung.id(),
                befehl = name,
                "Anfrage ausfuehren"
            );
            self.ausfuehren(request, ctx)
        });

        match ergebnis {
            Ok(antwort) => antwort,
            Err(e) => {
                match e.kategorie() {
                    FehlerKategorie::Benutzer | FehlerKategorie::Protokoll => {
                        tracing::debug!(verbindung = %ctx.verbindung.id(), fehler = %e, "Anfrage abgelehnt");
                    }
                    FehlerKategorie::Verbindung | FehlerKategorie::Intern => {
                        tracing::error!(verbindung = %ctx.verbindung.id(), fehler = %e, "Anfrage fehlgeschlagen");
                    }
                }
                ServerResponse::fehler(e.client_nachricht())
            }
        }
    }
}

fn angemeldeter_benutzer<'a>(ctx: &'a RequestContext<'_>) -> CommanderResult<&'a str> {
    match &*ctx.attachment {
        Attachment::Steuerung { benutzer } => Ok(benutzer),
        _ => Err(CommanderError::NichtAngemeldet),
    }
}

/// `1: Name von Artist`, eine Zeile pro Song
fn nummerieren(songs: &[Song]) -> String {
    songs
        .iter()
        .enumerate()
        .map(|(i, song)| format!("{}: {song}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}
