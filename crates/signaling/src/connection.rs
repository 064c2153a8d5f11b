//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung laeuft als `ClientConnection` in einem eigenen
//! tokio-Task. Eingehende Frames gehen an den [`MessageDispatcher`], alles
//! was der Raum-Manager an die Verbindung schickt, kommt ueber die
//! Send-Queue des [`VerbindungsHandle`].
//!
//! ## Keepalive
//! - Server sendet alle `keepalive` einen Ping
//! - Kommt `timeout` lang nichts an, wird die Verbindung getrennt
//!
//! ## Ende
//! Egal warum die Schleife endet, der Raum-Manager erfaehrt es genau
//! einmal ueber `verbindung_getrennt`.

use std::net::SocketAddr;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use klangbruecke_core::ConnectionId;
use klangbruecke_protocol::{ErrorCode, FrameCodec, Nachricht};
use klangbruecke_relay::{RaumManager, VerbindungsHandle};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::codec::Framed;

use crate::config::SignalingConfig;
use crate::dispatcher::{MessageDispatcher, VerbindungsKontext};

/// Warum eine Verbindung beendet wurde
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrennGrund {
    /// Client hat den Socket geschlossen
    ClientGetrennt,
    /// Lese- oder Schreibfehler
    Fehler,
    Timeout,
    /// Raum-Manager hat die Verbindung beendet
    Abgebrochen,
    Shutdown,
}

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

pub struct ClientConnection {
    manager: RaumManager,
    config: SignalingConfig,
    peer: SocketAddr,
}

impl ClientConnection {
    pub fn neu(manager: RaumManager, config: SignalingConfig, peer: SocketAddr) -> Self {
        Self {
            manager,
            config,
            peer,
        }
    }

    /// Verbindungs-Schleife, laeuft bis Trennung oder Shutdown
    pub async fn verarbeiten(
        self,
        stream: TcpStream,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> TrennGrund {
        let peer = self.peer;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer, fehler = %e, "TCP_NODELAY nicht gesetzt");
        }

        let mut framed = Framed::new(stream, FrameCodec::with_max_size(self.config.max_frame_size));
        let (handle, mut sende_rx) =
            VerbindungsHandle::kanal(ConnectionId::new(), self.config.send_queue_groesse);
        let abbruch = handle.abbruch_token();
        let mut ctx = VerbindungsKontext::neu(peer, handle);
        let conn_id = ctx.conn_id;
        let dispatcher = MessageDispatcher::neu(self.manager.clone());

        tracing::info!(peer = %peer, connection_id = %conn_id, "Neue Verbindung");

        let mut ping_takt = tokio::time::interval_at(
            Instant::now() + self.config.keepalive,
            self.config.keepalive,
        );
        ping_takt.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut letzter_empfang = Instant::now();

        let grund = loop {
            tokio::select! {
                // Eingehender Frame
                frame = framed.next() => {
                    letzter_empfang = Instant::now();
                    let antwort = match frame {
                        Some(Ok(Ok(nachricht))) => {
                            tracing::trace!(
                                connection_id = %conn_id,
                                art = nachricht.art(),
                                "Nachricht empfangen"
                            );
                            dispatcher.dispatch(nachricht, &mut ctx)
                        }
                        Some(Ok(Err(ungueltig))) => {
                            tracing::debug!(
                                connection_id = %conn_id,
                                laenge = ungueltig.laenge,
                                grund = %ungueltig.grund,
                                "Ungueltiger Frame"
                            );
                            Some(Nachricht::fehler(
                                ErrorCode::InvalidMessage,
                                format!("Ungueltige Nachricht: {}", ungueltig.grund),
                            ))
                        }
                        Some(Err(e)) => {
                            tracing::warn!(connection_id = %conn_id, fehler = %e, "Frame-Lesefehler");
                            break TrennGrund::Fehler;
                        }
                        None => {
                            tracing::info!(connection_id = %conn_id, "Verbindung vom Client getrennt");
                            break TrennGrund::ClientGetrennt;
                        }
                    };

                    if let Some(antwort) = antwort {
                        if let Err(e) = framed.send(antwort).await {
                            tracing::warn!(connection_id = %conn_id, fehler = %e, "Senden fehlgeschlagen");
                            break TrennGrund::Fehler;
                        }
                    }
                }

                // Ausgehend vom Raum-Manager
                Some(ausgehend) = sende_rx.recv() => {
                    if let Err(e) = framed.send(ausgehend).await {
                        tracing::warn!(connection_id = %conn_id, fehler = %e, "Senden fehlgeschlagen");
                        break TrennGrund::Fehler;
                    }
                }

                // Keepalive-Ping
                _ = ping_takt.tick() => {
                    let ts = Utc::now().timestamp_millis().max(0) as u64;
                    if let Err(e) = framed.send(Nachricht::ping(ts)).await {
                        tracing::warn!(connection_id = %conn_id, fehler = %e, "Ping-Senden fehlgeschlagen");
                        break TrennGrund::Fehler;
                    }
                }

                _ = tokio::time::sleep_until(letzter_empfang + self.config.timeout) => {
                    tracing::warn!(
                        connection_id = %conn_id,
                        timeout_sek = self.config.timeout.as_secs(),
                        "Verbindungs-Timeout"
                    );
                    break TrennGrund::Timeout;
                }

                // Raum-Manager trennt: eingereihte Nachrichten noch schreiben
                _ = abbruch.cancelled() => {
                    while let Ok(ausgehend) = sende_rx.try_recv() {
                        if framed.feed(ausgehend).await.is_err() {
                            break;
                        }
                    }
                    let _ = SinkExt::<std::sync::Arc<Nachricht>>::flush(&mut framed).await;
                    tracing::debug!(connection_id = %conn_id, "Verbindung vom Relay beendet");
                    break TrennGrund::Abgebrochen;
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(connection_id = %conn_id, "Shutdown-Signal, Verbindung wird getrennt");
                        let abschied = Nachricht::fehler(
                            ErrorCode::InternalError,
                            "Server wird heruntergefahren",
                        );
                        let _ = framed.send(abschied).await;
                        break TrennGrund::Shutdown;
                    }
                }
            }
        };

        self.manager.verbindung_getrennt(conn_id);
        tracing::info!(
            peer = %peer,
            connection_id = %conn_id,
            session_id = ?ctx.session_id,
            grund = ?grund,
            "Verbindung beendet"
        );
        grund
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("peer", &self.peer)
            .finish()
    }
}
