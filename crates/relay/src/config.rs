//! Laufzeit-Konfiguration des Relays

use std::time::Duration;

use klangbruecke_protocol::AudioFormat;

/// Groesse der Send-Queue pro Verbindung (Nachrichten)
pub const SEND_QUEUE_GROESSE: usize = 128;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Format der Sender, bestimmt den Relay-Takt
    pub format: AudioFormat,
    /// Hoechste Kanalanzahl pro Raum
    pub max_kanaele: u16,
    /// Vorlauf, der vor dem Start des Relays gepuffert wird
    pub vorlauf: Duration,
    /// Kapazitaet jeder Kanal-Queue in Paketen
    pub kanal_kapazitaet: usize,
    /// Wie lange ein Raum nach Senderverlust auf die Rueckkehr wartet
    pub gnadenfrist: Duration,
    pub bereinigungs_intervall: Duration,
    pub send_queue_groesse: usize,
    pub max_code_versuche: usize,
    /// Startet pro Raum einen Timer-Task. Tests schalten das ab und
    /// treiben `relay_tick` selbst.
    pub scheduler_automatisch: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            max_kanaele: 32,
            vorlauf: Duration::from_millis(500),
            kanal_kapazitaet: 64,
            gnadenfrist: Duration::from_secs(300),
            bereinigungs_intervall: Duration::from_secs(10),
            send_queue_groesse: SEND_QUEUE_GROESSE,
            max_code_versuche: 16,
            scheduler_automatisch: true,
        }
    }
}

impl RelayConfig {
    /// Intervall eines Relay-Zyklus (Dauer eines Sender-Batches)
    pub fn takt(&self) -> Duration {
        self.format.paket_dauer()
    }

    /// Mindestfuellstand aller Kanaele, ab dem weitergeleitet wird:
    /// `ceil(vorlauf / takt)`, mindestens 1
    pub fn vorlauf_schwelle(&self) -> usize {
        let takt = self.takt().as_secs_f64();
        if takt <= 0.0 {
            return 1;
        }
        ((self.vorlauf.as_secs_f64() / takt).ceil() as usize).max(1)
    }

    pub fn gnadenfrist_chrono(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.gnadenfrist).unwrap_or(chrono::Duration::minutes(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_takt_und_schwelle() {
        let config = RelayConfig::default();
        let takt_ms = config.takt().as_secs_f64() * 1000.0;
        assert!((takt_ms - 341.333).abs() < 0.01, "Takt {takt_ms} ms");
        // 500 ms / 341 ms aufgerundet
        assert_eq!(config.vorlauf_schwelle(), 2);
    }

    #[test]
    fn schwelle_mindestens_eins() {
        let config = RelayConfig {
            vorlauf: Duration::ZERO,
            ..RelayConfig::default()
        };
        assert_eq!(config.vorlauf_schwelle(), 1);

        let lang = RelayConfig {
            vorlauf: Duration::from_millis(1100),
            ..RelayConfig::default()
        };
        assert_eq!(lang.vorlauf_schwelle(), 4);
    }
}
