//! Fehlertypen fuer Klangbruecke
//!
//! `Fehlerklasse` ist die gemeinsame Taxonomie, auf die alle Crate-Fehler
//! abgebildet werden. Schnittstellen (Signaling, REST) leiten daraus
//! Fehlercodes und HTTP-Status ab.

use thiserror::Error;

/// Globaler Result-Alias fuer Klangbruecke
pub type Result<T> = std::result::Result<T, KlangError>;

/// Fehlerklassen des Relays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fehlerklasse {
    /// Token fehlt, ist ungueltig oder abgelaufen
    Authentifizierung,
    /// Aktion ist fuer diese Rolle nicht erlaubt
    Autorisierung,
    /// Raum hat bereits einen anderen Sender oder Code-Vergabe erschoepft
    Konflikt,
    /// Unbekannter Raum oder Code
    NichtGefunden,
    /// Pufferueberlauf (wird still verworfen)
    Kapazitaet,
    /// Senden an einen einzelnen Empfaenger fehlgeschlagen
    Senden,
    /// Nachricht oder Eingabe fehlerhaft
    Ungueltig,
    /// Alles andere
    Intern,
}

impl Fehlerklasse {
    /// HTTP-Statuscode fuer diese Klasse
    pub fn http_status(self) -> u16 {
        match self {
            Self::Authentifizierung => 401,
            Self::Autorisierung => 403,
            Self::Konflikt => 409,
            Self::NichtGefunden => 404,
            Self::Kapazitaet => 503,
            Self::Ungueltig => 400,
            Self::Senden | Self::Intern => 500,
        }
    }
}

/// Allgemeine Fehler, die keinem einzelnen Crate gehoeren
#[derive(Debug, Error)]
pub enum KlangError {
    #[error("Authentifizierung fehlgeschlagen: {0}")]
    Authentifizierung(String),

    #[error("Zugriff verweigert: {0}")]
    Autorisierung(String),

    #[error("Konflikt: {0}")]
    Konflikt(String),

    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    #[error("Kapazitaet erschoepft: {0}")]
    Kapazitaet(String),

    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    #[error("Audiofehler: {0}")]
    Audio(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl KlangError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    pub fn audio(msg: impl Into<String>) -> Self {
        Self::Audio(msg.into())
    }

    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }

    /// Ordnet den Fehler der gemeinsamen Taxonomie zu
    pub fn klasse(&self) -> Fehlerklasse {
        match self {
            Self::Authentifizierung(_) => Fehlerklasse::Authentifizierung,
            Self::Autorisierung(_) => Fehlerklasse::Autorisierung,
            Self::Konflikt(_) => Fehlerklasse::Konflikt,
            Self::NichtGefunden(_) => Fehlerklasse::NichtGefunden,
            Self::Kapazitaet(_) => Fehlerklasse::Kapazitaet,
            Self::UngueltigeNachricht(_) | Self::Audio(_) => Fehlerklasse::Ungueltig,
            Self::Konfiguration(_) | Self::Intern(_) | Self::Anyhow(_) => Fehlerklasse::Intern,
        }
    }
}
