//! Konfiguration fuer den Signaling-Service

use std::time::Duration;

use klangbruecke_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use klangbruecke_relay::config::SEND_QUEUE_GROESSE;

use crate::error::{SignalingError, SignalingResult};

#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Abstand der Pings an jede Verbindung
    pub keepalive: Duration,
    /// Ohne eingehende Daten so lange gilt eine Verbindung als tot
    pub timeout: Duration,
    pub max_frame_size: usize,
    /// Groesse der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Gleichzeitig offene Verbindungen, weitere werden sofort geschlossen
    pub max_verbindungen: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_secs(30),
            timeout: Duration::from_secs(90),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            send_queue_groesse: SEND_QUEUE_GROESSE,
            max_verbindungen: 4096,
        }
    }
}

impl SignalingConfig {
    pub fn validieren(&self) -> SignalingResult<()> {
        if self.keepalive.is_zero() {
            return Err(SignalingError::konfiguration("keepalive muss groesser 0 sein"));
        }
        if self.timeout <= self.keepalive {
            return Err(SignalingError::konfiguration(
                "timeout muss groesser als keepalive sein",
            ));
        }
        if self.max_frame_size == 0 || self.send_queue_groesse == 0 || self.max_verbindungen == 0 {
            return Err(SignalingError::konfiguration(
                "max_frame_size, send_queue_groesse und max_verbindungen muessen groesser 0 sein",
            ));
        }
        Ok(())
    }
}
