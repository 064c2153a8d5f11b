//! Wire-Format fuer TCP-Verbindungen
//!
//! Frame-basiertes Protokoll: Laenge (u32 big-endian) + JSON-Nachricht.
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE), 4 Bytes          | JSON      |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Ein Frame mit ungueltigem JSON wird vollstaendig verbraucht und als
//! [`UngueltigerFrame`] geliefert, damit der Stream synchron bleibt und die
//! Verbindung weiterlaufen kann. Nur ein zu grosses Laengenfeld ist fatal.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::nachricht::Nachricht;

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

/// Frame, dessen Inhalt keine gueltige Nachricht war
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UngueltigerFrame {
    pub laenge: usize,
    pub grund: String,
}

/// Ergebnis eines dekodierten Frames
pub type Eingehend = Result<Nachricht, UngueltigerFrame>;

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer `Framed<TcpStream, FrameCodec>`
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Eingehend;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        // Laenge lesen ohne den Buffer zu veraendern
        let laenge = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if laenge > self.max_frame_size {
            return Err(ProtocolError::FrameZuGross {
                laenge,
                max: self.max_frame_size,
            });
        }

        let gesamt = LENGTH_FIELD_SIZE + laenge;
        if src.len() < gesamt {
            src.reserve(gesamt - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let payload = src.split_to(laenge);

        Ok(Some(serde_json::from_slice(&payload).map_err(|e| {
            UngueltigerFrame {
                laenge,
                grund: e.to_string(),
            }
        })))
    }
}

impl FrameCodec {
    fn frame_schreiben(&self, item: &Nachricht, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let json = serde_json::to_vec(item)?;
        if json.len() > self.max_frame_size {
            return Err(ProtocolError::FrameZuGross {
                laenge: json.len(),
                max: self.max_frame_size,
            });
        }

        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);
        Ok(())
    }
}

impl Encoder<Nachricht> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Nachricht, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.frame_schreiben(&item, dst)
    }
}

/// Fan-out: eine Nachricht wird einmal erzeugt und per `Arc` an alle
/// Verbindungen verteilt
impl Encoder<Arc<Nachricht>> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Arc<Nachricht>, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.frame_schreiben(&item, dst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
