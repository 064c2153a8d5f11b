//! Zugangsgeheimnisse fuer Raeume
//!
//! Ein Raum wird mit einem Geheimnis angelegt, das Zuhoerer beim Beitreten
//! angeben. Gespeichert wird nur der Argon2id-PHC-String.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::error::{AuthError, AuthResult};

/// Mindestlaenge eines Geheimnisses in Zeichen
pub const MIN_LAENGE: usize = 8;
/// Hoechstlaenge eines Geheimnisses in Zeichen
pub const MAX_LAENGE: usize = 128;

/// Argon2id mit 19 MiB Speicher, 2 Iterationen, 1 Thread
fn argon2_instanz() -> AuthResult<Argon2<'static>> {
    let params = Params::new(19 * 1024, 2, 1, None)
        .map_err(|e| AuthError::GeheimnisHashing(format!("Argon2-Parameter ungueltig: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Prueft Laenge und Zusammensetzung eines Geheimnisses
///
/// Verlangt mindestens einen Buchstaben und eine Ziffer.
pub fn geheimnis_pruefen(geheimnis: &str) -> AuthResult<()> {
    let laenge = geheimnis.chars().count();
    if laenge < MIN_LAENGE {
        return Err(AuthError::GeheimnisUngueltig(format!(
            "mindestens {MIN_LAENGE} Zeichen"
        )));
    }
    if laenge > MAX_LAENGE {
        return Err(AuthError::GeheimnisUngueltig(format!(
            "hoechstens {MAX_LAENGE} Zeichen"
        )));
    }
    if !geheimnis.chars().any(char::is_alphabetic) {
        return Err(AuthError::GeheimnisUngueltig("mindestens ein Buchstabe".into()));
    }
    if !geheimnis.chars().any(|c| c.is_ascii_digit()) {
        return Err(AuthError::GeheimnisUngueltig("mindestens eine Ziffer".into()));
    }
    Ok(())
}

/// Hasht ein Geheimnis mit zufaelligem Salt, liefert den PHC-String
pub fn geheimnis_hashen(geheimnis: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    argon2_instanz()?
        .hash_password(geheimnis.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::GeheimnisHashing(e.to_string()))
}

/// Verifiziert ein Geheimnis gegen einen gespeicherten PHC-Hash
pub fn geheimnis_verifizieren(geheimnis: &str, hash: &str) -> AuthResult<bool> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AuthError::GeheimnisHashing(format!("Ungueltiges Hash-Format: {e}")))?;

    match argon2_instanz()?.verify_password(geheimnis.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::GeheimnisHashing(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashen_und_verifizieren() {
        let hash = geheimnis_hashen("probe2024").expect("Hashing fehlgeschlagen");
        assert!(hash.starts_with("$argon2id$"), "PHC-String erwartet: {hash}");
        assert!(geheimnis_verifizieren("probe2024", &hash).unwrap());
        assert!(!geheimnis_verifizieren("probe2025", &hash).unwrap());
    }

    #[test]
    fn gleiche_geheimnisse_verschiedene_hashes() {
        let a = geheimnis_hashen("konzert77").unwrap();
        let b = geheimnis_hashen("konzert77").unwrap();
        assert_ne!(a, b, "Salt muss pro Hash neu sein");
    }

    #[test]
    fn ungueltiger_hash_gibt_fehler() {
        assert!(geheimnis_verifizieren("egal1234", "kein_hash").is_err());
    }

    #[test]
    fn regeln_fuer_geheimnisse() {
        assert!(geheimnis_pruefen("abc123xy").is_ok());
        assert!(geheimnis_pruefen("Buehne 42").is_ok());
        assert!(matches!(
            geheimnis_pruefen("ab12"),
            Err(AuthError::GeheimnisUngueltig(_))
        ));
        assert!(geheimnis_pruefen("nurbuchstaben").is_err());
        assert!(geheimnis_pruefen("1234567890").is_err());
        assert!(geheimnis_pruefen(&"a1".repeat(65)).is_err());
    }
}
