//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! Standardwerte, der Server laeuft also auch ohne Konfigurationsdatei.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use klangbruecke_api::{ApiServerKonfig, RateLimitKonfig};
use klangbruecke_core::IdentityId;
use klangbruecke_db::DatabaseConfig;
use klangbruecke_protocol::AudioFormat;
use klangbruecke_relay::RelayConfig;
use klangbruecke_signaling::SignalingConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum KonfigFehler {
    #[error("Konfigurationsdatei '{pfad}' nicht lesbar: {quelle}")]
    Lesen {
        pfad: String,
        #[source]
        quelle: std::io::Error,
    },

    #[error("Konfigurationsfehler in '{pfad}': {quelle}")]
    Format {
        pfad: String,
        #[source]
        quelle: toml::de::Error,
    },

    #[error("Ungueltiger Wert fuer {feld}: {grund}")]
    Ungueltig { feld: &'static str, grund: String },
}

fn ungueltig(feld: &'static str, grund: impl Into<String>) -> KonfigFehler {
    KonfigFehler::Ungueltig {
        feld,
        grund: grund.into(),
    }
}

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KlangConfig {
    pub server: ServerEinstellungen,
    pub relay: RelayEinstellungen,
    pub auth: AuthEinstellungen,
    pub signaling: SignalingEinstellungen,
    pub api: ApiEinstellungen,
    pub database: DatenbankEinstellungen,
    pub logging: LoggingEinstellungen,
}

/// Allgemeine Server-Einstellungen und Ports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Servers (nur fuer Logs)
    pub name: String,
    pub bind: String,
    /// TCP-Port fuer Sender und Zuhoerer
    pub signaling_port: u16,
    pub api_port: u16,
    /// Port fuer `/metrics` und `/health`, 0 deaktiviert den Endpunkt
    pub metrics_port: u16,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "Klangbruecke".into(),
            bind: "0.0.0.0".into(),
            signaling_port: 9400,
            api_port: 9401,
            metrics_port: 9402,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    pub sample_rate: u32,
    /// Samples pro Kanal in einem Hardware-Puffer des Senders
    pub buffer_size: u32,
    /// Puffer pro Paket
    pub batch_factor: u32,
    pub max_channels: u16,
    pub preroll_ms: u64,
    pub channel_queue_capacity: usize,
    pub grace_period_secs: u64,
    pub sweep_interval_secs: u64,
    pub send_queue_size: usize,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            buffer_size: 4096,
            batch_factor: 4,
            max_channels: 32,
            preroll_ms: 500,
            channel_queue_capacity: 64,
            grace_period_secs: 300,
            sweep_interval_secs: 10,
            send_queue_size: 128,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthEinstellungen {
    pub token_ttl_secs: u64,
    pub token_cleanup_secs: u64,
    /// Statische Bearer-Nachweise und die Identitaet des Besitzers
    pub credentials: HashMap<String, IdentityId>,
}

impl Default for AuthEinstellungen {
    fn default() -> Self {
        Self {
            token_ttl_secs: 12 * 60 * 60,
            token_cleanup_secs: 300,
            credentials: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    pub keepalive_secs: u64,
    pub timeout_secs: u64,
    pub max_frame_size: usize,
    pub max_connections: usize,
}

impl Default for SignalingEinstellungen {
    fn default() -> Self {
        Self {
            keepalive_secs: 30,
            timeout_secs: 90,
            max_frame_size: 1024 * 1024,
            max_connections: 4096,
        }
    }
}

/// REST-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiEinstellungen {
    /// CORS-Origins (leer = alle erlaubt)
    pub cors_origins: Vec<String>,
    pub joins_per_minute: u32,
    pub creates_per_minute: u32,
}

impl Default for ApiEinstellungen {
    fn default() -> Self {
        Self {
            cors_origins: vec![],
            joins_per_minute: 30,
            creates_per_minute: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatenbankEinstellungen {
    /// `false` haelt die Raum-Datensaetze nur im Speicher
    pub enabled: bool,
    pub url: String,
    pub max_connections: u32,
    pub wal: bool,
}

impl Default for DatenbankEinstellungen {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "sqlite://klangbruecke.db".into(),
            max_connections: 5,
            wal: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Laden und Pruefen
// ---------------------------------------------------------------------------

impl KlangConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> Result<Self, KonfigFehler> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(pfad, &inhalt),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(quelle) => Err(KonfigFehler::Lesen {
                pfad: pfad.to_string(),
                quelle,
            }),
        }
    }

    fn aus_toml(pfad: &str, inhalt: &str) -> Result<Self, KonfigFehler> {
        toml::from_str(inhalt).map_err(|quelle| KonfigFehler::Format {
            pfad: pfad.to_string(),
            quelle,
        })
    }

    pub fn validieren(&self) -> Result<(), KonfigFehler> {
        let s = &self.server;
        if s.bind.parse::<IpAddr>().is_err() {
            return Err(ungueltig("server.bind", format!("'{}' ist keine IP-Adresse", s.bind)));
        }
        if s.signaling_port == 0 || s.api_port == 0 {
            return Err(ungueltig("server", "Ports duerfen nicht 0 sein"));
        }
        let ports = [s.signaling_port, s.api_port, s.metrics_port];
        if ports[0] == ports[1] || (ports[2] != 0 && ports[..2].contains(&ports[2])) {
            return Err(ungueltig("server", "Ports muessen verschieden sein"));
        }

        let r = &self.relay;
        if r.sample_rate == 0 || r.buffer_size == 0 || r.batch_factor == 0 {
            return Err(ungueltig(
                "relay",
                "sample_rate, buffer_size und batch_factor muessen groesser 0 sein",
            ));
        }
        if r.max_channels == 0 {
            return Err(ungueltig("relay.max_channels", "muss groesser 0 sein"));
        }
        if r.channel_queue_capacity == 0 || r.send_queue_size == 0 {
            return Err(ungueltig("relay", "Queue-Groessen muessen groesser 0 sein"));
        }
        if r.sweep_interval_secs == 0 {
            return Err(ungueltig("relay.sweep_interval_secs", "muss groesser 0 sein"));
        }

        if self.auth.token_ttl_secs == 0 || self.auth.token_cleanup_secs == 0 {
            return Err(ungueltig("auth", "token_ttl_secs und token_cleanup_secs muessen groesser 0 sein"));
        }

        if self.api.joins_per_minute == 0 || self.api.creates_per_minute == 0 {
            return Err(ungueltig("api", "Limits muessen groesser 0 sein"));
        }

        if !klangbruecke_observability::logging::log_format_gueltig(&self.logging.format) {
            return Err(ungueltig(
                "logging.format",
                format!("'{}' (erlaubt: text, json)", self.logging.format),
            ));
        }

        self.signaling_config()
            .validieren()
            .map_err(|e| ungueltig("signaling", e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Umrechnung in die Konfigurationen der Dienste
    // -----------------------------------------------------------------------

    fn adresse(&self, port: u16) -> SocketAddr {
        let ip = self
            .server
            .bind
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::from([0, 0, 0, 0]));
        SocketAddr::new(ip, port)
    }

    pub fn signaling_adresse(&self) -> SocketAddr {
        self.adresse(self.server.signaling_port)
    }

    pub fn api_adresse(&self) -> SocketAddr {
        self.adresse(self.server.api_port)
    }

    /// `None` wenn der Metrik-Endpunkt abgeschaltet ist
    pub fn metrics_adresse(&self) -> Option<SocketAddr> {
        (self.server.metrics_port != 0).then(|| self.adresse(self.server.metrics_port))
    }

    pub fn relay_config(&self) -> RelayConfig {
        let r = &self.relay;
        RelayConfig {
            format: AudioFormat {
                abtastrate: r.sample_rate,
                puffer_groesse: r.buffer_size,
                batch_faktor: r.batch_factor,
            },
            max_kanaele: r.max_channels,
            vorlauf: Duration::from_millis(r.preroll_ms),
            kanal_kapazitaet: r.channel_queue_capacity,
            gnadenfrist: Duration::from_secs(r.grace_period_secs),
            bereinigungs_intervall: Duration::from_secs(r.sweep_interval_secs),
            send_queue_groesse: r.send_queue_size,
            ..RelayConfig::default()
        }
    }

    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            keepalive: Duration::from_secs(self.signaling.keepalive_secs),
            timeout: Duration::from_secs(self.signaling.timeout_secs),
            max_frame_size: self.signaling.max_frame_size,
            send_queue_groesse: self.relay.send_queue_size,
            max_verbindungen: self.signaling.max_connections,
        }
    }

    pub fn api_konfig(&self) -> ApiServerKonfig {
        ApiServerKonfig {
            bind_addr: self.api_adresse(),
            cors_origins: self.api.cors_origins.clone(),
        }
    }

    pub fn rate_limits(&self) -> RateLimitKonfig {
        RateLimitKonfig {
            beitritte_pro_minute: self.api.joins_per_minute,
            anlegen_pro_minute: self.api.creates_per_minute,
        }
    }

    pub fn datenbank_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.database.url.clone(),
            max_verbindungen: self.database.max_connections,
            sqlite_wal: self.database.wal,
        }
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.token_ttl_secs)
    }

    pub fn token_bereinigung(&self) -> Duration {
        Duration::from_secs(self.auth.token_cleanup_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = KlangConfig::default();
        cfg.validieren().unwrap();
        assert_eq!(cfg.server.signaling_port, 9400);
        assert_eq!(cfg.auth.token_ttl_secs, 43_200);
        assert_eq!(cfg.database.url, "sqlite://klangbruecke.db");
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn adressen() {
        let cfg = KlangConfig::default();
        assert_eq!(cfg.signaling_adresse().to_string(), "0.0.0.0:9400");
        assert_eq!(cfg.api_adresse().to_string(), "0.0.0.0:9401");
        assert_eq!(cfg.metrics_adresse().map(|a| a.port()), Some(9402));
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            bind = "127.0.0.1"
            signaling_port = 7000

            [relay]
            buffer_size = 1024
            preroll_ms = 200

            [auth.credentials]
            "admin-nachweis" = "6f1c9a52-8a3e-4d7b-9c11-0d2f5b7e4a10"
        "#;
        let cfg = KlangConfig::aus_toml("test.toml", toml).unwrap();
        assert_eq!(cfg.signaling_adresse().to_string(), "127.0.0.1:7000");
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.server.api_port, 9401);
        assert_eq!(cfg.relay.sample_rate, 48_000);

        let relay = cfg.relay_config();
        assert_eq!(relay.format.puffer_groesse, 1024);
        assert_eq!(relay.vorlauf, Duration::from_millis(200));
        assert!(relay.scheduler_automatisch);

        let besitzer = cfg.auth.credentials["admin-nachweis"];
        assert_eq!(
            besitzer.inner().to_string(),
            "6f1c9a52-8a3e-4d7b-9c11-0d2f5b7e4a10"
        );
    }

    #[test]
    fn kaputtes_toml_nennt_die_datei() {
        let fehler = KlangConfig::aus_toml("kaputt.toml", "[server\nname = 1").unwrap_err();
        assert!(fehler.to_string().contains("kaputt.toml"));
    }

    #[test]
    fn ungueltige_werte_werden_abgelehnt() {
        let mut cfg = KlangConfig::default();
        cfg.relay.batch_factor = 0;
        assert!(matches!(
            cfg.validieren(),
            Err(KonfigFehler::Ungueltig { feld: "relay", .. })
        ));

        let mut cfg = KlangConfig::default();
        cfg.server.api_port = cfg.server.signaling_port;
        assert!(cfg.validieren().is_err());

        let mut cfg = KlangConfig::default();
        cfg.signaling.timeout_secs = cfg.signaling.keepalive_secs;
        assert!(matches!(
            cfg.validieren(),
            Err(KonfigFehler::Ungueltig { feld: "signaling", .. })
        ));

        let mut cfg = KlangConfig::default();
        cfg.server.bind = "irgendwo".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn metrik_port_null_schaltet_ab() {
        let mut cfg = KlangConfig::default();
        cfg.server.metrics_port = 0;
        cfg.validieren().unwrap();
        assert!(cfg.metrics_adresse().is_none());
    }
}
