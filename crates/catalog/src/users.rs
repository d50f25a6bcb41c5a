//! Benutzerspeicher
//!
//! Registrierte Benutzer werden zeilenweise als `benutzername hash`
//! gespeichert. Der Hash ist ein Argon2id-PHC-String.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{CatalogError, CatalogResult};
use crate::password::{passwort_hashen, passwort_verifizieren, PasswortParameter};

/// Thread-sicherer Speicher fuer registrierte Benutzer
#[derive(Debug)]
pub struct UserStore {
    benutzer: RwLock<HashMap<String, String>>,
    datei: Option<PathBuf>,
    parameter: PasswortParameter,
}

impl UserStore {
    /// Speicher ohne Datei (nur fuer die Laufzeit)
    pub fn im_speicher(parameter: PasswortParameter) -> Self {
        Self {
            benutzer: RwLock::new(HashMap::new()),
            datei: None,
            parameter,
        }
    }

    /// Laedt die Benutzerdatei; neue Registrierungen werden angehaengt
    pub fn laden(pfad: &Path, parameter: PasswortParameter) -> CatalogResult<Self> {
        let mut benutzer = HashMap::new();

        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                for (index, zeile) in inhalt.lines().enumerate() {
                    if zeile.trim().is_empty() {
                        continue;
                    }
                    let (name, hash) = zeile.split_once(' ').ok_or_else(|| {
                        CatalogError::Beschaedigt {
                            datei: pfad.display().to_string(),
                            zeile: index + 1,
                            grund: "erwartet: <benutzername> <hash>".into(),
                        }
                    })?;
                    benutzer.insert(name.to_string(), hash.trim().to_string());
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(pfad = %pfad.display(), "Benutzerdatei nicht gefunden, wird bei Registrierung angelegt");
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(pfad = %pfad.display(), anzahl = benutzer.len(), "Benutzer geladen");
        Ok(Self {
            benutzer: RwLock::new(benutzer),
            datei: Some(pfad.to_path_buf()),
            parameter,
        })
    }

    /// Registriert einen neuen Benutzer
    pub fn registrieren(&self, benutzername: &str, passwort: &str) -> CatalogResult<()> {
        anmeldedaten_pruefen(benutzername, passwort)?;

        if self.existiert(benutzername) {
            return Err(CatalogError::BenutzerExistiert(benutzername.to_string()));
        }

        // Hashing ausserhalb der Sperre
        let hash = passwort_hashen(passwort, self.parameter)?;

        let mut benutzer = self.benutzer.write();
        if benutzer.contains_key(benutzername) {
            return Err(CatalogError::BenutzerExistiert(benutzername.to_string()));
        }

        if let Some(ref datei) = self.datei {
            if let Some(verzeichnis) = datei.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(verzeichnis)?;
            }
            let mut datei = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(datei)?;
            writeln!(datei, "{benutzername} {hash}")?;
        }

        benutzer.insert(benutzername.to_string(), hash);
        tracing::info!(benutzer = %benutzername, "Benutzer registriert");
        Ok(())
    }

    /// Gibt true zurueck wenn der Benutzername registriert ist
    pub fn existiert(&self, benutzername: &str) -> bool {
        self.benutzer.read().contains_key(benutzername)
    }

    /// Prueft Benutzername und Passwort
    ///
    /// Unbekannte Benutzer und falsche Passwoerter liefern denselben Fehler.
    pub fn anmeldung_pruefen(&self, benutzername: &str, passwort: &str) -> CatalogResult<()> {
        let hash = self
            .benutzer
            .read()
            .get(benutzername)
            .cloned()
            .ok_or(CatalogError::UngueltigeAnmeldedaten)?;

        if passwort_verifizieren(passwort, &hash)? {
            Ok(())
        } else {
            Err(CatalogError::UngueltigeAnmeldedaten)
        }
    }

    /// Anzahl registrierter Benutzer
    pub fn anzahl(&self) -> usize {
        self.benutzer.read().len()
    }
}

fn anmeldedaten_pruefen(benutzername: &str, passwort: &str) -> CatalogResult<()> {
    if benutzername.is_empty() || benutzername.chars().any(char::is_whitespace) {
        return Err(CatalogError::UngueltigesArgument(
            "Benutzername darf nicht leer sein und keine Leerzeichen enthalten".into(),
        ));
    }
    if passwort.is_empty() || passwort.chars().any(char::is_whitespace) {
        return Err(CatalogError::UngueltigesArgument(
            "Passwort darf nicht leer sein und keine Leerzeichen enthalten".into(),
        ));
    }
    Ok(())
}
