//! Fehlertypen des Clients

use klangbruecke_core::KlangError;
use klangbruecke_protocol::{ErrorCode, ProtocolError};
use thiserror::Error;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Protokoll(#[from] ProtocolError),

    #[error("Verbindungsfehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Relay meldet {code:?}: {message}")]
    Relay { code: ErrorCode, message: String },

    #[error("Unerwartete Antwort: {0}")]
    UnerwarteteAntwort(String),

    #[error("Verbindung zum Relay getrennt")]
    Getrennt,

    #[error("Zeitueberschreitung: {0}")]
    Zeitueberschreitung(String),

    #[error("Ungueltig: {0}")]
    Ungueltig(String),

    #[error("Codec-Fehler: {0}")]
    Codec(#[from] KlangError),
}
