//! Fehlertypen des Relays

use klangbruecke_auth::AuthError;
use klangbruecke_core::{ConnectionId, Fehlerklasse};
use klangbruecke_db::DbError;
use klangbruecke_protocol::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Raum hat bereits einen Sender")]
    BereitsBelegt,

    #[error("Kein freier Raum-Code nach {0} Versuchen")]
    CodesErschoepft(usize),

    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    #[error("Raum ist geschlossen")]
    Geschlossen,

    #[error("Nicht berechtigt: {0}")]
    NichtBerechtigt(String),

    #[error("Verbindung {0} ist bereits einem Raum zugeordnet")]
    VerbindungBelegt(ConnectionId),

    #[error("Ungueltig: {0}")]
    Ungueltig(String),

    #[error(transparent)]
    Datenbank(#[from] DbError),

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl RelayError {
    pub fn nicht_gefunden(msg: impl Into<String>) -> Self {
        Self::NichtGefunden(msg.into())
    }

    pub fn klasse(&self) -> Fehlerklasse {
        match self {
            Self::Auth(e) => e.klasse(),
            Self::BereitsBelegt | Self::CodesErschoepft(_) | Self::VerbindungBelegt(_) => {
                Fehlerklasse::Konflikt
            }
            Self::NichtGefunden(_) => Fehlerklasse::NichtGefunden,
            Self::NichtBerechtigt(_) => Fehlerklasse::Autorisierung,
            Self::Ungueltig(_) => Fehlerklasse::Ungueltig,
            Self::Datenbank(DbError::NichtGefunden(_)) => Fehlerklasse::NichtGefunden,
            Self::Geschlossen | Self::Datenbank(_) | Self::Intern(_) => Fehlerklasse::Intern,
        }
    }

    /// HTTP-Status fuer die REST-Schnittstelle
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Geschlossen => 410,
            andere => andere.klasse().http_status(),
        }
    }

    /// Fehlercode fuer `error`-Nachrichten auf dem Draht
    pub fn fehlercode(&self) -> ErrorCode {
        match self {
            Self::BereitsBelegt => ErrorCode::AlreadyBroadcasting,
            Self::Geschlossen => ErrorCode::RoomClosed,
            andere => match andere.klasse() {
                Fehlerklasse::Authentifizierung => ErrorCode::AuthenticationFailed,
                Fehlerklasse::Autorisierung => ErrorCode::Unauthorized,
                Fehlerklasse::Konflikt => ErrorCode::Conflict,
                Fehlerklasse::NichtGefunden => ErrorCode::NotFound,
                Fehlerklasse::Ungueltig => ErrorCode::InvalidMessage,
                Fehlerklasse::Kapazitaet | Fehlerklasse::Senden | Fehlerklasse::Intern => {
                    ErrorCode::InternalError
                }
            },
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
