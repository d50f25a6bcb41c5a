//! Parser fuer Client-Anfragen
//!
//! Anfragen sind eine Zeile Text, Woerter durch Leerzeichen getrennt:
//!   befehl arg1 "argument mit leerzeichen" arg3
//!
//! Anfuehrungszeichen fassen mehrere Woerter zu einem Argument zusammen,
//! `\"` und `\\` stehen fuer das Zeichen selbst.

use crate::commands::types::Request;
use crate::error::{CommanderError, CommanderResult};

/// Parst eine Anfragezeile in eine [`Request`]
pub fn parse_request(zeile: &str) -> CommanderResult<Request> {
    let tokens = tokenize(zeile.trim());
    let Some((befehl, args)) = tokens.split_first() else {
        return Err(CommanderError::UngueltigeEingabe("Leere Anfrage.".into()));
    };

    let request = match befehl.as_str() {
        "register" => match args {
            [benutzer, passwort] => Request::Register {
                benutzer: benutzer.clone(),
                passwort: passwort.clone(),
            },
            _ => return Err(verwendung("register <benutzername> <passwort>")),
        },
        "login" => match args {
            [benutzer, passwort] => Request::Login {
                benutzer: benutzer.clone(),
                passwort: passwort.clone(),
            },
            _ => return Err(verwendung("login <benutzername> <passwort>")),
        },
        "logout" => ohne_argumente(args, Request::Logout, "logout")?,
        "disconnect" => ohne_argumente(args, Request::Disconnect, "disconnect")?,
        "stop" => ohne_argumente(args, Request::Stop, "stop")?,
        "search" => {
            if args.is_empty() {
                return Err(verwendung("search <stichwort>..."));
            }
            Request::Search {
                stichwoerter: args.to_vec(),
            }
        }
        "top" => match args {
            [anzahl] => Request::Top {
                anzahl: anzahl_parsen(anzahl)?,
            },
            _ => return Err(verwendung("top <n>")),
        },
        "play" => match args {
            [song] => Request::Play {
                song: song.clone(),
                artist: None,
            },
            [song, artist] => Request::Play {
                song: song.clone(),
                artist: Some(artist.clone()),
            },
            _ => return Err(verwendung("play <song> [<kuenstler>]")),
        },
        "create-playlist" => match args {
            [name] => Request::CreatePlaylist { name: name.clone() },
            _ => return Err(verwendung("create-playlist <name>")),
        },
        "add-song-to" => match args {
            [playlist, song] => Request::AddSongTo {
                playlist: playlist.clone(),
                song: song.clone(),
                artist: None,
            },
            [playlist, song, artist] => Request::AddSongTo {
                playlist: playlist.clone(),
                song: song.clone(),
                artist: Some(artist.clone()),
            },
            _ => return Err(verwendung("add-song-to <playlist> <song> [<kuenstler>]")),
        },
        "show-playlist" => match args {
            [name] => Request::ShowPlaylist { name: name.clone() },
            _ => return Err(verwendung("show-playlist <name>")),
        },
        "musicConnect" => match args {
            [benutzer] => Request::MusicConnect {
                benutzer: benutzer.clone(),
            },
            _ => return Err(verwendung("musicConnect <benutzername>")),
        },
        "beginStreaming" => match args {
            [benutzer] => Request::BeginStreaming {
                benutzer: benutzer.clone(),
            },
            _ => return Err(verwendung("beginStreaming <benutzername>")),
        },
        unbekannt => {
            return Err(CommanderError::UngueltigeEingabe(format!(
                "Unbekannter Befehl: {unbekannt}"
            )))
        }
    };

    Ok(request)
}

fn verwendung(syntax: &str) -> CommanderError {
    CommanderError::UngueltigeEingabe(format!("Ungueltige Argumente.\nVerwendung: {syntax}"))
}

fn ohne_argumente(args: &[String], request: Request, syntax: &str) -> CommanderResult<Request> {
    if args.is_empty() {
        Ok(request)
    } else {
        Err(verwendung(syntax))
    }
}

fn anzahl_parsen(wert: &str) -> CommanderResult<usize> {
    match wert.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(CommanderError::UngueltigeEingabe(format!(
            "top <n> erwartet eine positive Zahl, nicht {wert:?}"
        ))),
    }
}

/// Zerlegt eine Zeile in Tokens, beachtet quoted Strings
///
/// `""` ergibt ein leeres Token.
pub(crate) fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut hat_token = false;
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                hat_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if hat_token {
                    tokens.push(std::mem::take(&mut current));
                    hat_token = false;
                }
            }
            '\\' => {
                match chars.next() {
                    Some(next @ ('"' | '\\')) => current.push(next),
                    Some(other) => {
                        current.push('\\');
                        current.push(other);
                    }
                    None => current.push('\\'),
                }
                hat_token = true;
            }
            _ => {
                current.push(c);
                hat_token = true;
            }
        }
    }

    if hat_token {
        tokens.push(current);
    }

    tokens
}
