//! Audio-Pakete
//!
//! Ein [`AudioPaket`] transportiert einen Batch Samples eines logischen
//! Kanals. Die Nutzdaten sind entweder rohe `f32`-Samples (`pcm`) oder
//! codec-kodierte Bytes als Base64-String (`opus`).
//!
//! ```text
//! {"channel":0,"data":[0.0,0.1],"encoding":"pcm","timestamp":1700000000000,
//!  "sequence":17,"bufferCount":4}
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::codec::AudioCodec;
use crate::error::{ProtocolError, ProtocolResult};

/// Kodierung der Nutzdaten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kodierung {
    Pcm,
    Opus,
}

/// Nutzdaten eines Pakets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Nutzdaten {
    /// Rohe Samples (Mono, ein Kanal)
    Samples(Vec<f32>),
    /// Codec-Bytes, Base64-kodiert
    Kodiert(String),
}

/// Ein Audio-Paket auf dem Draht
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioPaket {
    /// Logische Kanalnummer
    pub channel: u16,
    pub data: Nutzdaten,
    pub encoding: Kodierung,
    /// Aufnahmezeitpunkt in Millisekunden seit Unix-Epoche
    pub timestamp: u64,
    /// Sequenznummer (vom Sender vergeben, vom Relay neu gestempelt)
    pub sequence: u64,
    /// Anzahl zusammengefasster Capture-Frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_count: Option<u32>,
}

impl AudioPaket {
    /// Erstellt ein PCM-Paket
    pub fn pcm(channel: u16, samples: Vec<f32>, timestamp: u64, sequence: u64) -> Self {
        Self {
            channel,
            data: Nutzdaten::Samples(samples),
            encoding: Kodierung::Pcm,
            timestamp,
            sequence,
            buffer_count: None,
        }
    }

    /// Erstellt ein Paket mit codec-kodierten Bytes
    pub fn kodiert(channel: u16, bytes: &[u8], timestamp: u64, sequence: u64) -> Self {
        Self {
            channel,
            data: Nutzdaten::Kodiert(STANDARD.encode(bytes)),
            encoding: Kodierung::Opus,
            timestamp,
            sequence,
            buffer_count: None,
        }
    }

    pub fn mit_buffer_count(mut self, anzahl: u32) -> Self {
        self.buffer_count = Some(anzahl);
        self
    }

    /// Prueft ob Nutzdaten und Kodierung zusammenpassen
    pub fn validieren(&self) -> ProtocolResult<()> {
        match (&self.encoding, &self.data) {
            (Kodierung::Pcm, Nutzdaten::Samples(_)) => Ok(()),
            (Kodierung::Opus, Nutzdaten::Kodiert(s)) => {
                STANDARD.decode(s)?;
                Ok(())
            }
            (k, _) => Err(ProtocolError::Nutzdaten(format!(
                "Kodierung {k:?} mit falschem Nutzdatentyp"
            ))),
        }
    }

    /// Liefert die Samples des Pakets
    ///
    /// PCM wird direkt kopiert, kodierte Nutzdaten gehen durch `codec`.
    /// Ohne Codec schlaegt das Dekodieren von `opus` fehl.
    pub fn samples_dekodieren(
        &self,
        codec: Option<&mut dyn AudioCodec>,
    ) -> ProtocolResult<Vec<f32>> {
        match (&self.encoding, &self.data) {
            (Kodierung::Pcm, Nutzdaten::Samples(s)) => Ok(s.clone()),
            (Kodierung::Opus, Nutzdaten::Kodiert(b64)) => {
                let bytes = STANDARD.decode(b64)?;
                let codec = codec.ok_or_else(|| {
                    ProtocolError::Nutzdaten("kein Codec fuer kodierte Nutzdaten".into())
                })?;
                Ok(codec.dekodieren(&bytes)?)
            }
            (k, _) => Err(ProtocolError::Nutzdaten(format!(
                "Kodierung {k:?} mit falschem Nutzdatentyp"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::PcmCodec;

    #[test]
    fn pcm_paket_json_format() {
        let paket = AudioPaket::pcm(2, vec![0.5, -0.25], 1_700_000_000_000, 7).mit_buffer_count(4);
        let json = serde_json::to_value(&paket).unwrap();
        assert_eq!(json["channel"], 2);
        assert_eq!(json["encoding"], "pcm");
        assert_eq!(json["sequence"], 7);
        assert_eq!(json["bufferCount"], 4);
        assert_eq!(json["data"][0], 0.5);
    }

    #[test]
    fn buffer_count_optional() {
        let json = r#"{"channel":0,"data":[1.0],"encoding":"pcm","timestamp":5,"sequence":1}"#;
        let paket: AudioPaket = serde_json::from_str(json).unwrap();
        assert_eq!(paket.buffer_count, None);
        assert_eq!(paket.data, Nutzdaten::Samples(vec![1.0]));
    }

    #[test]
    fn kodiertes_paket_ueber_codec_dekodieren() {
        let mut codec = PcmCodec;
        let bytes = codec.kodieren(&[0.25, 0.75]).unwrap();
        let paket = AudioPaket::kodiert(0, &bytes, 10, 3);
        assert!(matches!(paket.data, Nutzdaten::Kodiert(_)));
        paket.validieren().unwrap();

        let samples = paket
            .samples_dekodieren(Some(&mut codec as &mut dyn AudioCodec))
            .unwrap();
        assert_eq!(samples, vec![0.25, 0.75]);
    }

    #[test]
    fn kodiert_ohne_codec_schlaegt_fehl() {
        let paket = AudioPaket::kodiert(0, &[1, 2, 3, 4], 10, 3);
        assert!(paket.samples_dekodieren(None).is_err());
    }

    #[test]
    fn falscher_nutzdatentyp_wird_erkannt() {
        let mut paket = AudioPaket::pcm(0, vec![0.0], 1, 1);
        paket.encoding = Kodierung::Opus;
        assert!(matches!(paket.validieren(), Err(ProtocolError::Nutzdaten(_))));

        let kaputt = AudioPaket {
            data: Nutzdaten::Kodiert("%%%".into()),
            ..AudioPaket::kodiert(0, &[], 1, 1)
        };
        assert!(matches!(kaputt.validieren(), Err(ProtocolError::Base64(_))));
    }
}
