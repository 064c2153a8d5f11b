//! klangbruecke-server – Bibliotheks-Root
//!
//! Verdrahtet Relay, Signaling, REST-API und Observability zu einem
//! Prozess und stellt den Einstiegspunkt fuer Integrationstests bereit.

pub mod config;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::future;
use klangbruecke_api::{ApiServer, ApiState, RateLimiter};
use klangbruecke_auth::{StatischeAnmeldung, TokenStore};
use klangbruecke_db::{RaumRepository, SpeicherDb, SqliteDb};
use klangbruecke_observability::{observability_server_starten, HealthState, RelayMetriken};
use klangbruecke_relay::{Abhaengigkeiten, RaumManager};
use klangbruecke_signaling::SignalingServer;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use config::KlangConfig;

/// Wartet bis der Shutdown-Kanal `true` meldet oder der Sender wegfaellt
async fn shutdown_signal(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

pub struct Server {
    pub config: KlangConfig,
}

impl Server {
    pub fn neu(config: KlangConfig) -> Self {
        Self { config }
    }

    /// Startet alle Dienste und laeuft bis Ctrl-C oder bis ein Dienst ausfaellt
    pub async fn starten(self) -> Result<()> {
        self.config.validieren()?;
        let laufend = self.hochfahren().await?;
        laufend.laufen_bis(ctrl_c()).await
    }

    /// Oeffnet Datenbank und Listener und startet alle Tasks
    ///
    /// Reihenfolge:
    /// 1. Repository (SQLite oder Speicher)
    /// 2. Token-Store, Metriken, Raum-Manager
    /// 3. Signaling-Listener
    /// 4. REST-API
    /// 5. Observability (falls `metrics_port` gesetzt)
    pub async fn hochfahren(self) -> Result<LaufenderServer> {
        let config = self.config;
        tracing::info!(
            server_name = %config.server.name,
            signaling = %config.signaling_adresse(),
            api = %config.api_adresse(),
            "Server startet"
        );

        let health = HealthState::neu();
        let repo: Arc<dyn RaumRepository> = if config.database.enabled {
            let db = SqliteDb::oeffnen(&config.datenbank_config())
                .await
                .with_context(|| format!("Datenbank '{}' nicht verfuegbar", config.database.url))?;
            health.db_status_setzen(true);
            Arc::new(db)
        } else {
            tracing::warn!("Datenbank deaktiviert, Raum-Datensaetze nur im Speicher");
            health.db_status_setzen(true);
            Arc::new(SpeicherDb::neu())
        };

        let tokens = TokenStore::neu(config.token_ttl());
        let metriken = RelayMetriken::neu()?;
        let manager = RaumManager::neu(
            Abhaengigkeiten::neu(config.relay_config(), Arc::clone(&tokens), repo)
                .mit_metriken(metriken.clone()),
        );

        if config.auth.credentials.is_empty() {
            tracing::warn!("Keine Nachweise konfiguriert, Raeume koennen nicht angelegt werden");
        }
        let anmeldung = Arc::new(StatischeAnmeldung::neu(config.auth.credentials.clone()));
        let limiter = RateLimiter::neu(config.rate_limits());
        let state = ApiState::neu(manager.clone(), anmeldung, limiter);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut dienste: Vec<(&'static str, JoinHandle<Result<()>>)> = Vec::new();

        let signaling = SignalingServer::neu(manager.clone(), config.signaling_config())?;
        let signaling_listener = TcpListener::bind(config.signaling_adresse())
            .await
            .with_context(|| format!("Signaling-Port {} belegt", config.signaling_adresse()))?;
        let signaling_adresse = signaling_listener.local_addr()?;
        let rx = shutdown_rx.clone();
        dienste.push((
            "signaling",
            tokio::spawn(async move {
                signaling.bedienen(signaling_listener, rx).await?;
                Ok::<_, anyhow::Error>(())
            }),
        ));

        let api_listener = TcpListener::bind(config.api_adresse())
            .await
            .with_context(|| format!("API-Port {} belegt", config.api_adresse()))?;
        let api_adresse = api_listener.local_addr()?;
        let api = ApiServer::neu(config.api_konfig());
        let rx = shutdown_rx.clone();
        dienste.push((
            "api",
            tokio::spawn(async move {
                api.bedienen(api_listener, state, shutdown_signal(rx)).await?;
                Ok::<_, anyhow::Error>(())
            }),
        ));

        if let Some(adresse) = config.metrics_adresse() {
            let rx = shutdown_rx.clone();
            let health = health.clone();
            dienste.push((
                "observability",
                tokio::spawn(async move {
                    observability_server_starten(adresse, metriken, health, shutdown_signal(rx)).await
                }),
            ));
        }

        let hintergrund = vec![
            tokens.bereinigung_starten(config.token_bereinigung()),
            manager.bereinigung_starten(),
        ];

        health.relay_status_setzen(true);
        tracing::info!(
            signaling = %signaling_adresse,
            api = %api_adresse,
            "Server bereit"
        );

        Ok(LaufenderServer {
            manager,
            health,
            signaling_adresse,
            api_adresse,
            shutdown_tx,
            dienste,
            hintergrund,
        })
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(fehler = %e, "Signal-Handler nicht verfuegbar");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// LaufenderServer
// ---------------------------------------------------------------------------

/// Handle auf einen hochgefahrenen Server
pub struct LaufenderServer {
    manager: RaumManager,
    health: HealthState,
    signaling_adresse: SocketAddr,
    api_adresse: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    dienste: Vec<(&'static str, JoinHandle<Result<()>>)>,
    hintergrund: Vec<JoinHandle<()>>,
}

impl LaufenderServer {
    pub fn manager(&self) -> &RaumManager {
        &self.manager
    }

    pub fn signaling_adresse(&self) -> SocketAddr {
        self.signaling_adresse
    }

    pub fn api_adresse(&self) -> SocketAddr {
        self.api_adresse
    }

    /// Laeuft bis `signal` fertig ist oder ein Dienst vorzeitig endet
    pub async fn laufen_bis(mut self, signal: impl Future<Output = ()>) -> Result<()> {
        tokio::select! {
            _ = signal => {
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
            }
            (name, ergebnis) = Self::erster_ausfall(&mut self.dienste) => {
                match ergebnis {
                    Ok(Ok(())) => tracing::warn!(dienst = name, "Dienst unerwartet beendet"),
                    Ok(Err(e)) => tracing::error!(dienst = name, fehler = %e, "Dienst ausgefallen"),
                    Err(e) => tracing::error!(dienst = name, fehler = %e, "Dienst-Task abgebrochen"),
                }
            }
        }
        self.beenden().await
    }

    async fn erster_ausfall(
        dienste: &mut Vec<(&'static str, JoinHandle<Result<()>>)>,
    ) -> (&'static str, Result<Result<()>, tokio::task::JoinError>) {
        if dienste.is_empty() {
            return std::future::pending().await;
        }
        let handles = dienste.iter_mut().map(|(_, h)| h);
        let (ergebnis, index, _) = future::select_all(handles).await;
        let (name, _) = dienste.remove(index);
        (name, ergebnis)
    }

    /// Meldet allen Diensten den Shutdown und wartet auf ihr Ende
    pub async fn beenden(self) -> Result<()> {
        self.health.relay_status_setzen(false);
        let _ = self.shutdown_tx.send(true);

        let mut erster_fehler = None;
        for (name, handle) in self.dienste {
            match handle.await {
                Ok(Ok(())) => tracing::debug!(dienst = name, "Dienst beendet"),
                Ok(Err(e)) => {
                    tracing::error!(dienst = name, fehler = %e, "Dienst mit Fehler beendet");
                    erster_fehler.get_or_insert(e);
                }
                Err(e) => tracing::error!(dienst = name, fehler = %e, "Dienst-Task abgebrochen"),
            }
        }
        for handle in self.hintergrund {
            handle.abort();
        }

        tracing::info!("Server beendet");
        match erster_fehler {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
