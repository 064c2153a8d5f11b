//! Fehlertypen fuer den Auth-Service

use klangbruecke_core::Fehlerklasse;
use thiserror::Error;

/// Alle moeglichen Fehler im Auth-Service
#[derive(Debug, Error)]
pub enum AuthError {
    // --- Geheimnis ---
    #[error("Geheimnis-Hashing fehlgeschlagen: {0}")]
    GeheimnisHashing(String),

    #[error("Geheimnis erfuellt die Regeln nicht: {0}")]
    GeheimnisUngueltig(String),

    #[error("Geheimnis falsch")]
    FalschesGeheimnis,

    // --- Token ---
    #[error("Token ungueltig")]
    TokenUngueltig,

    #[error("Token abgelaufen")]
    TokenAbgelaufen,

    #[error("Token gilt nicht fuer {0}")]
    FalscherGeltungsbereich(String),

    // --- Anmeldedienst ---
    #[error("Anmeldedaten ungueltig")]
    UngueltigeAnmeldedaten,

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl AuthError {
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    pub fn klasse(&self) -> Fehlerklasse {
        match self {
            Self::GeheimnisUngueltig(_) => Fehlerklasse::Ungueltig,
            Self::FalschesGeheimnis
            | Self::TokenUngueltig
            | Self::TokenAbgelaufen
            | Self::FalscherGeltungsbereich(_)
            | Self::UngueltigeAnmeldedaten => Fehlerklasse::Authentifizierung,
            Self::GeheimnisHashing(_) | Self::Intern(_) => Fehlerklasse::Intern,
        }
    }
}

/// Result-Alias fuer den Auth-Service
pub type AuthResult<T> = Result<T, AuthError>;
