//! Audio-Format des Senders
//!
//! Aus Abtastrate, Hardware-Puffergroesse und Batch-Faktor ergibt sich die
//! Dauer eines Pakets und damit der Relay-Takt.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Standard-Abtastrate
pub const STANDARD_ABTASTRATE: u32 = 48_000;
/// Standard-Puffergroesse der Capture-Hardware in Samples
pub const STANDARD_PUFFER_GROESSE: u32 = 4096;
/// Standard-Anzahl zusammengefasster Capture-Puffer pro Paket
pub const STANDARD_BATCH_FAKTOR: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub abtastrate: u32,
    pub puffer_groesse: u32,
    pub batch_faktor: u32,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            abtastrate: STANDARD_ABTASTRATE,
            puffer_groesse: STANDARD_PUFFER_GROESSE,
            batch_faktor: STANDARD_BATCH_FAKTOR,
        }
    }
}

impl AudioFormat {
    /// Samples pro Paket und Kanal
    pub fn samples_pro_paket(&self) -> u32 {
        self.puffer_groesse * self.batch_faktor
    }

    /// Dauer eines Pakets (entspricht dem Relay-Takt)
    pub fn paket_dauer(&self) -> Duration {
        if self.abtastrate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples_pro_paket() as f64 / self.abtastrate as f64)
    }

    /// Dauer von `samples` Samples in Sekunden
    pub fn dauer_sekunden(&self, samples: usize) -> f64 {
        if self.abtastrate == 0 {
            return 0.0;
        }
        samples as f64 / self.abtastrate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_paket_dauer_etwa_341ms() {
        let format = AudioFormat::default();
        assert_eq!(format.samples_pro_paket(), 16_384);
        let ms = format.paket_dauer().as_secs_f64() * 1000.0;
        assert!((ms - 341.33).abs() < 0.01, "Paketdauer {ms} ms");
    }

    #[test]
    fn abtastrate_null_ergibt_null() {
        let format = AudioFormat {
            abtastrate: 0,
            ..AudioFormat::default()
        };
        assert_eq!(format.paket_dauer(), Duration::ZERO);
        assert_eq!(format.dauer_sekunden(100), 0.0);
    }
}
