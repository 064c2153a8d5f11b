//! Klangbruecke Server – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Server.

use anyhow::Result;
use klangbruecke_server::{config::KlangConfig, Server};

#[tokio::main]
async fn main() -> Result<()> {
    let config_pfad =
        std::env::var("KLANGBRUECKE_CONFIG").unwrap_or_else(|_| "klangbruecke.toml".into());

    let config = KlangConfig::laden(&config_pfad)?;

    klangbruecke_observability::logging_initialisieren(
        &config.logging.level,
        &config.logging.format,
    );

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Klangbruecke Server wird initialisiert"
    );

    Server::neu(config).starten().await
}
