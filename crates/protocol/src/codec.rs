//! Schnittstelle zum Audio-Codec
//!
//! Der eigentliche Codec (z.B. Opus) ist ein externer Baustein. Das Relay
//! und der Client sehen ihn nur als `kodieren(samples) -> bytes` bzw.
//! `dekodieren(bytes) -> samples`.

use klangbruecke_core::{KlangError, Result};

use crate::audio::Kodierung;

/// Opaker Audio-Codec
pub trait AudioCodec: Send {
    /// Kodierung, unter der die Bytes auf dem Draht markiert werden
    fn kodierung(&self) -> Kodierung;

    fn kodieren(&mut self, samples: &[f32]) -> Result<Vec<u8>>;

    fn dekodieren(&mut self, bytes: &[u8]) -> Result<Vec<f32>>;
}

/// Verlustfreier Codec: `f32` little-endian
///
/// Dient als Platzhalter fuer den echten Codec und in Tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct PcmCodec;

impl AudioCodec for PcmCodec {
    fn kodierung(&self) -> Kodierung {
        Kodierung::Opus
    }

    fn kodieren(&mut self, samples: &[f32]) -> Result<Vec<u8>> {
        Ok(samples.iter().flat_map(|s| s.to_le_bytes()).collect())
    }

    fn dekodieren(&mut self, bytes: &[u8]) -> Result<Vec<f32>> {
        if bytes.len() % 4 != 0 {
            return Err(KlangError::audio(format!(
                "Laenge {} ist kein Vielfaches von 4",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_codec_verlustfrei() {
        let mut codec = PcmCodec;
        let samples = [0.0, 1.0, -1.0, 0.123_456];
        let bytes = codec.kodieren(&samples).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(codec.dekodieren(&bytes).unwrap(), samples);
    }

    #[test]
    fn pcm_codec_ungerade_laenge() {
        let mut codec = PcmCodec;
        assert!(codec.dekodieren(&[1, 2, 3]).is_err());
    }
}
