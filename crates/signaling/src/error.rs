//! Fehlertypen fuer den Signaling-Service

use klangbruecke_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Frame-Fehler, der den Stream unbrauchbar macht
    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtocolError),

    #[error("Ungueltige Konfiguration: {0}")]
    Konfiguration(String),
}

impl SignalingError {
    pub fn konfiguration(msg: impl Into<String>) -> Self {
        Self::Konfiguration(msg.into())
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;
