//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `SignalingServer` startet fuer jede eingehende Verbindung einen
//! eigenen tokio-Task mit einer [`ClientConnection`]. Der Raum-Manager ist
//! `Send + Sync`, die Tasks laufen auf dem Multi-Thread-Executor.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use klangbruecke_relay::RaumManager;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::SignalingConfig;
use crate::connection::ClientConnection;
use crate::error::SignalingResult;

#[derive(Debug, Clone)]
pub struct SignalingServer {
    manager: RaumManager,
    config: SignalingConfig,
    offen: Arc<AtomicUsize>,
}

/// Zaehlt eine offene Verbindung, gibt sie beim Drop wieder frei
struct VerbindungsPlatz(Arc<AtomicUsize>);

impl Drop for VerbindungsPlatz {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl SignalingServer {
    pub fn neu(manager: RaumManager, config: SignalingConfig) -> SignalingResult<Self> {
        config.validieren()?;
        Ok(Self {
            manager,
            config,
            offen: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Anzahl gerade offener Verbindungen
    pub fn offene_verbindungen(&self) -> usize {
        self.offen.load(Ordering::Acquire)
    }

    /// Bindet `bind_addr` und akzeptiert bis zum Shutdown
    pub async fn starten(
        self,
        bind_addr: SocketAddr,
        shutdown_rx: watch::Receiver<bool>,
    ) -> SignalingResult<()> {
        let listener = TcpListener::bind(bind_addr).await?;
        self.bedienen(listener, shutdown_rx).await
    }

    /// Accept-Loop auf einem bereits gebundenen Listener
    pub async fn bedienen(
        self,
        listener: TcpListener,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> SignalingResult<()> {
        let lokale_addr = listener.local_addr()?;
        tracing::info!(adresse = %lokale_addr, "TCP Signaling-Server gestartet");

        loop {
            tokio::select! {
                ergebnis = listener.accept() => {
                    match ergebnis {
                        Ok((stream, peer)) => {
                            let offen = self.offen.fetch_add(1, Ordering::AcqRel);
                            let platz = VerbindungsPlatz(Arc::clone(&self.offen));
                            if offen >= self.config.max_verbindungen {
                                tracing::warn!(
                                    peer = %peer,
                                    max = self.config.max_verbindungen,
                                    "Server voll, Verbindung abgelehnt"
                                );
                                drop(stream);
                                continue;
                            }

                            tracing::debug!(peer = %peer, "Verbindung akzeptiert");
                            let verbindung = ClientConnection::neu(
                                self.manager.clone(),
                                self.config.clone(),
                                peer,
                            );
                            let shutdown = shutdown_rx.clone();
                            tokio::spawn(async move {
                                let _platz = platz;
                                verbindung.verarbeiten(stream, shutdown).await;
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Signaling-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("TCP Signaling-Server gestoppt");
        Ok(())
    }
}
