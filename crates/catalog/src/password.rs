//! Passwort-Hashing mit Argon2id
//!
//! Die Kosten-Parameter kommen aus der Server-Konfiguration, damit Tests
//! und kleine Installationen guenstigere Werte verwenden koennen.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::error::{CatalogError, CatalogResult};

/// Argon2id-Kostenparameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswortParameter {
    /// Speicher in KiB
    pub speicher_kib: u32,
    pub iterationen: u32,
}

impl Default for PasswortParameter {
    /// OWASP-Empfehlung: 19 MiB, 2 Iterationen, 1 Thread
    fn default() -> Self {
        Self {
            speicher_kib: 19 * 1024,
            iterationen: 2,
        }
    }
}

fn argon2_instanz(parameter: PasswortParameter) -> CatalogResult<Argon2<'static>> {
    let params = Params::new(parameter.speicher_kib, parameter.iterationen, 1, None)
        .map_err(|e| CatalogError::PasswortHashing(format!("Argon2-Parameter ungueltig: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hasht ein Passwort mit Argon2id und einem zufaelligen Salt
///
/// Gibt den PHC-String zurueck (inkl. Algorithmus, Parameter und Salt).
pub fn passwort_hashen(passwort: &str, parameter: PasswortParameter) -> CatalogResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    argon2_instanz(parameter)?
        .hash_password(passwort.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CatalogError::PasswortHashing(e.to_string()))
}

/// Verifiziert ein Passwort gegen einen gespeicherten PHC-Hash
///
/// Die Parameter werden aus dem Hash gelesen, aeltere Hashes bleiben gueltig.
pub fn passwort_verifizieren(passwort: &str, hash: &str) -> CatalogResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| CatalogError::PasswortHashing(format!("Ungueltiges Hash-Format: {e}")))?;

    match Argon2::default().verify_password(passwort.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(CatalogError::PasswortHashing(e.to_string())),
    }
}
