//! Raum-Codes
//!
//! Sechs Zeichen aus einem Alphabet ohne leicht verwechselbare Zeichen
//! (`I`, `O`, `0`, `1`), damit Codes vorgelesen werden koennen.

use rand::Rng;

pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LAENGE: usize = 6;

/// Quelle fuer Code-Kandidaten
pub trait CodeQuelle: Send + Sync {
    fn naechster_code(&self) -> String;
}

/// Zufaellige Codes aus [`CODE_ALPHABET`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ZufallsCodes;

impl CodeQuelle for ZufallsCodes {
    fn naechster_code(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..CODE_LAENGE)
            .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
            .collect()
    }
}

/// Bringt eine Benutzereingabe in die kanonische Form (Grossbuchstaben)
pub fn code_normalisieren(eingabe: &str) -> String {
    eingabe.trim().to_ascii_uppercase()
}
