//! Fehlertypen fuer das Protokoll-Crate

use thiserror::Error;

pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Frame zu gross: {laenge} Bytes (Maximum: {max} Bytes)")]
    FrameZuGross { laenge: usize, max: usize },

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64-Fehler: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Nutzdaten passen nicht zur Kodierung: {0}")]
    Nutzdaten(String),

    #[error("Codec-Fehler: {0}")]
    Codec(#[from] klangbruecke_core::KlangError),

    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),
}
