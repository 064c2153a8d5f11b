//! Message-Dispatcher – Routet eingehende Nachrichten an den Raum-Manager
//!
//! Jede Nachricht wird genau einmal an der Transportgrenze dekodiert und
//! hier vollstaendig gematcht. Fehler beim Registrieren gehen als
//! `error`-Nachricht an den Client zurueck. Fehlerhafte Audio-Pakete werden
//! nur geloggt und verworfen, die Verbindung bleibt bestehen.

use std::net::SocketAddr;

use klangbruecke_core::{ConnectionId, Fehlerklasse, SessionId};
use klangbruecke_protocol::{ErrorCode, Nachricht};
use klangbruecke_relay::{RaumManager, RelayError, VerbindungsHandle};

/// Zustand einer Verbindung aus Sicht des Dispatchers
#[derive(Debug)]
pub struct VerbindungsKontext {
    pub conn_id: ConnectionId,
    pub peer: SocketAddr,
    /// Send-Queue und Abbruch-Token, wird bei der Registrierung uebergeben
    pub handle: VerbindungsHandle,
    /// Raum, fuer den sich die Verbindung registriert hat
    pub session_id: Option<SessionId>,
}

impl VerbindungsKontext {
    pub fn neu(peer: SocketAddr, handle: VerbindungsHandle) -> Self {
        Self {
            conn_id: handle.id(),
            peer,
            handle,
            session_id: None,
        }
    }
}

/// Antwort auf einen fehlgeschlagenen Aufruf des Raum-Managers
pub fn fehler_nachricht(fehler: &RelayError) -> Nachricht {
    Nachricht::fehler(fehler.fehlercode(), fehler.to_string())
}

#[derive(Debug, Clone)]
pub struct MessageDispatcher {
    manager: RaumManager,
}

impl MessageDispatcher {
    pub fn neu(manager: RaumManager) -> Self {
        Self { manager }
    }

    /// Verarbeitet eine Nachricht, gibt die direkte Antwort zurueck
    ///
    /// `None` heisst: keine Antwort (Audio, Pong).
    pub fn dispatch(&self, nachricht: Nachricht, ctx: &mut VerbindungsKontext) -> Option<Nachricht> {
        match nachricht {
            // ---------------------------------------------------------------
            // Registrierung
            // ---------------------------------------------------------------
            Nachricht::RegisterSource(anmeldung) => {
                let ergebnis = self.manager.sender_registrieren(
                    anmeldung.session_id,
                    &anmeldung.token,
                    ctx.handle.clone(),
                );
                Some(match ergebnis {
                    Ok(antwort) => {
                        ctx.session_id = Some(anmeldung.session_id);
                        Nachricht::SourceRegistered(antwort)
                    }
                    Err(e) => self.registrierung_abgelehnt(ctx, anmeldung.session_id, &e),
                })
            }

            Nachricht::RegisterListener(anmeldung) => {
                let ergebnis = self.manager.zuhoerer_registrieren(
                    anmeldung.session_id,
                    &anmeldung.token,
                    ctx.handle.clone(),
                    anmeldung.display_name,
                );
                Some(match ergebnis {
                    Ok(antwort) => {
                        ctx.session_id = Some(anmeldung.session_id);
                        Nachricht::ListenerRegistered(antwort)
                    }
                    Err(e) => self.registrierung_abgelehnt(ctx, anmeldung.session_id, &e),
                })
            }

            // ---------------------------------------------------------------
            // Audio
            // ---------------------------------------------------------------
            Nachricht::Audio(paket) => {
                let kanal = paket.channel;
                if let Err(e) = self.manager.audio_empfangen(ctx.conn_id, paket) {
                    match e.klasse() {
                        Fehlerklasse::Autorisierung => tracing::warn!(
                            connection_id = %ctx.conn_id,
                            channel = kanal,
                            fehler = %e,
                            "Audio ohne Berechtigung verworfen"
                        ),
                        _ => tracing::debug!(
                            connection_id = %ctx.conn_id,
                            channel = kanal,
                            fehler = %e,
                            "Audio-Paket verworfen"
                        ),
                    }
                }
                None
            }

            // ---------------------------------------------------------------
            // Keepalive
            // ---------------------------------------------------------------
            Nachricht::Ping(herzschlag) => Some(Nachricht::pong(herzschlag.timestamp)),

            Nachricht::Pong(_) => {
                tracing::trace!(connection_id = %ctx.conn_id, "Pong empfangen");
                None
            }

            // ---------------------------------------------------------------
            // Nur vom Relay an Clients
            // ---------------------------------------------------------------
            andere @ (Nachricht::SourceRegistered(_)
            | Nachricht::ListenerRegistered(_)
            | Nachricht::RoomStatus(_)
            | Nachricht::RoomSuspended(_)
            | Nachricht::RoomClosed(_)
            | Nachricht::Error(_)) => {
                tracing::debug!(
                    connection_id = %ctx.conn_id,
                    art = andere.art(),
                    "Nachricht in falscher Richtung"
                );
                Some(Nachricht::fehler(
                    ErrorCode::InvalidMessage,
                    format!("{} wird nur vom Relay gesendet", andere.art()),
                ))
            }
        }
    }

    fn registrierung_abgelehnt(
        &self,
        ctx: &VerbindungsKontext,
        session_id: SessionId,
        fehler: &RelayError,
    ) -> Nachricht {
        tracing::info!(
            connection_id = %ctx.conn_id,
            peer = %ctx.peer,
            session_id = %session_id,
            fehler = %fehler,
            "Registrierung abgelehnt"
        );
        fehler_nachricht(fehler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use klangbruecke_auth::TokenStore;
    use klangbruecke_core::IdentityId;
    use klangbruecke_db::SpeicherDb;
    use klangbruecke_protocol::AudioPaket;
    use klangbruecke_relay::{Abhaengigkeiten, NeueSitzung, RelayConfig};

    fn manager() -> RaumManager {
        let config = RelayConfig {
            scheduler_automatisch: false,
            ..RelayConfig::default()
        };
        let tokens = TokenStore::neu(Duration::from_secs(3600));
        RaumManager::neu(Abhaengigkeiten::neu(config, tokens, Arc::new(SpeicherDb::neu())))
    }

    fn kontext() -> (VerbindungsKontext, tokio::sync::mpsc::Receiver<Arc<Nachricht>>) {
        let (handle, rx) = VerbindungsHandle::kanal(ConnectionId::new(), 16);
        (VerbindungsKontext::neu("127.0.0.1:5000".parse().unwrap(), handle), rx)
    }

    #[tokio::test]
    async fn ping_wird_mit_pong_beantwortet() {
        let dispatcher = MessageDispatcher::neu(manager());
        let (mut ctx, _rx) = kontext();
        assert_eq!(
            dispatcher.dispatch(Nachricht::ping(42), &mut ctx),
            Some(Nachricht::pong(42))
        );
        assert_eq!(dispatcher.dispatch(Nachricht::pong(42), &mut ctx), None);
    }

    #[tokio::test]
    async fn falsches_token_ergibt_fehlerantwort() {
        let manager = manager();
        let sitzung = manager
            .sitzung_erstellen(IdentityId::new(), "probe1234", NeueSitzung::default())
            .unwrap();
        let dispatcher = MessageDispatcher::neu(manager);
        let (mut ctx, _rx) = kontext();

        let antwort = dispatcher.dispatch(
            Nachricht::RegisterSource(klangbruecke_protocol::nachricht::QuelleAnmelden {
                session_id: sitzung.session_id,
                token: "falsch".into(),
            }),
            &mut ctx,
        );
        assert!(matches!(
            antwort,
            Some(Nachricht::Error(ref f)) if f.code == ErrorCode::AuthenticationFailed
        ));
        assert_eq!(ctx.session_id, None);
    }

    #[tokio::test]
    async fn sender_registrierung_setzt_raum() {
        let manager = manager();
        let sitzung = manager
            .sitzung_erstellen(IdentityId::new(), "probe1234", NeueSitzung::default())
            .unwrap();
        let dispatcher = MessageDispatcher::neu(manager);
        let (mut ctx, _rx) = kontext();

        let antwort = dispatcher.dispatch(
            Nachricht::RegisterSource(klangbruecke_protocol::nachricht::QuelleAnmelden {
                session_id: sitzung.session_id,
                token: sitzung.token,
            }),
            &mut ctx,
        );
        assert!(matches!(antwort, Some(Nachricht::SourceRegistered(_))));
        assert_eq!(ctx.session_id, Some(sitzung.session_id));
    }

    #[tokio::test]
    async fn audio_ohne_registrierung_wird_still_verworfen() {
        let dispatcher = MessageDispatcher::neu(manager());
        let (mut ctx, _rx) = kontext();
        let antwort = dispatcher.dispatch(
            Nachricht::Audio(AudioPaket::pcm(0, vec![0.0], 1, 1)),
            &mut ctx,
        );
        assert_eq!(antwort, None);
    }

    #[tokio::test]
    async fn relay_nachricht_vom_client_ist_ungueltig() {
        let dispatcher = MessageDispatcher::neu(manager());
        let (mut ctx, _rx) = kontext();
        let antwort = dispatcher.dispatch(Nachricht::geschlossen(None), &mut ctx);
        assert!(matches!(
            antwort,
            Some(Nachricht::Error(ref f)) if f.code == ErrorCode::InvalidMessage
        ));
    }
}
