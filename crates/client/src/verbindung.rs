//! TCP-Verbindung zum Relay
//!
//! Frames werden mit dem [`FrameCodec`] des Protokolls gelesen und
//! geschrieben. Pings des Relays beantwortet die Verbindung selbst.
//!
//! ## Sender
//! [`RelayVerbindung::capture_senden`] fragt die Capture-Queue in festem
//! Takt ab, batcht die Frames und schickt fertige Pakete.
//!
//! ## Zuhoerer
//! [`RelayVerbindung::empfang_weiterleiten`] reicht alle Ereignisse ueber
//! eine begrenzte crossbeam-Queue an die Wiedergabe weiter. Ist sie voll,
//! wird das Ereignis verworfen.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use futures_util::{SinkExt, StreamExt};
use klangbruecke_core::SessionId;
use klangbruecke_protocol::nachricht::{
    FehlerAntwort, QuelleAnmelden, QuelleAngemeldet, ZuhoererAngemeldet, ZuhoererAnmelden,
};
use klangbruecke_protocol::{AudioPaket, FrameCodec, Nachricht, RaumStatus};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::MissedTickBehavior;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::capture::{CaptureBatcher, CaptureFrame};
use crate::error::{ClientError, ClientResult};

/// Standard-Wartezeit auf eine Anmelde-Antwort
pub const ANTWORT_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Ereignisse fuer die Wiedergabe
// ---------------------------------------------------------------------------

/// Was die Netz-Seite an die Wiedergabe weiterreicht
#[derive(Debug, Clone, PartialEq)]
pub enum Ereignis {
    Audio {
        paket: AudioPaket,
        /// Lokale Ankunftszeit in Millisekunden seit Unix-Epoche
        ankunft_ms: f64,
    },
    Status(RaumStatus),
    Suspendiert(DateTime<Utc>),
    Geschlossen(Option<String>),
    Fehler(FehlerAntwort),
}

/// Zusammenfassung einer beendeten Sende-Schleife
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendeBericht {
    pub gesendet: u64,
    /// Relay hat den Raum geschlossen
    pub raum_geschlossen: bool,
}

/// Zusammenfassung einer beendeten Empfangs-Schleife
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmpfangsBericht {
    pub weitergeleitet: u64,
    /// Wegen voller Wiedergabe-Queue verworfen
    pub verworfen: u64,
}

fn jetzt_ms() -> f64 {
    Utc::now().timestamp_millis() as f64
}

// ---------------------------------------------------------------------------
// RelayVerbindung
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RelayVerbindung {
    framed: Framed<TcpStream, FrameCodec>,
    peer: SocketAddr,
    antwort_timeout: Duration,
}

impl RelayVerbindung {
    pub async fn verbinden<A: ToSocketAddrs>(adresse: A) -> ClientResult<Self> {
        let stream = TcpStream::connect(adresse).await?;
        Self::aus_stream(stream)
    }

    pub fn aus_stream(stream: TcpStream) -> ClientResult<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        tracing::debug!(peer = %peer, "Verbindung zum Relay aufgebaut");
        Ok(Self {
            framed: Framed::new(stream, FrameCodec::new()),
            peer,
            antwort_timeout: ANTWORT_TIMEOUT,
        })
    }

    pub fn mit_antwort_timeout(mut self, timeout: Duration) -> Self {
        self.antwort_timeout = timeout;
        self
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub async fn senden(&mut self, nachricht: Nachricht) -> ClientResult<()> {
        self.framed.send(nachricht).await?;
        Ok(())
    }

    /// Naechste Nachricht des Relays, `None` wenn die Verbindung zu ist
    ///
    /// Ungueltige Frames werden uebersprungen, Pings direkt beantwortet.
    pub async fn empfangen(&mut self) -> ClientResult<Option<Nachricht>> {
        loop {
            match self.framed.next().await {
                None => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Err(ungueltig))) => {
                    tracing::warn!(
                        peer = %self.peer,
                        laenge = ungueltig.laenge,
                        grund = %ungueltig.grund,
                        "Ungueltiger Frame vom Relay"
                    );
                }
                Some(Ok(Ok(Nachricht::Ping(herzschlag)))) => {
                    self.senden(Nachricht::pong(herzschlag.timestamp)).await?;
                }
                Some(Ok(Ok(nachricht))) => return Ok(Some(nachricht)),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Anmeldung
    // -----------------------------------------------------------------------

    pub async fn als_sender_anmelden(
        &mut self,
        session_id: SessionId,
        token: &str,
    ) -> ClientResult<QuelleAngemeldet> {
        self.senden(Nachricht::RegisterSource(QuelleAnmelden {
            session_id,
            token: token.to_string(),
        }))
        .await?;
        self.antwort_abwarten(|n| match n {
            Nachricht::SourceRegistered(a) => Ok(a),
            andere => Err(andere),
        })
        .await
    }

    pub async fn als_zuhoerer_anmelden(
        &mut self,
        session_id: SessionId,
        token: &str,
        name: Option<String>,
    ) -> ClientResult<ZuhoererAngemeldet> {
        self.senden(Nachricht::RegisterListener(ZuhoererAnmelden {
            session_id,
            token: token.to_string(),
            display_name: name,
        }))
        .await?;
        self.antwort_abwarten(|n| match n {
            Nachricht::ListenerRegistered(a) => Ok(a),
            andere => Err(andere),
        })
        .await
    }

    /// Wartet auf die passende Antwort, `error` bricht ab
    async fn antwort_abwarten<T>(
        &mut self,
        mut passt: impl FnMut(Nachricht) -> Result<T, Nachricht>,
    ) -> ClientResult<T> {
        let timeout = self.antwort_timeout;
        let warten = async {
            loop {
                let nachricht = self.empfangen().await?.ok_or(ClientError::Getrennt)?;
                match nachricht {
                    Nachricht::Error(FehlerAntwort { code, message }) => {
                        return Err(ClientError::Relay { code, message });
                    }
                    andere => match passt(andere) {
                        Ok(antwort) => return Ok(antwort),
                        Err(andere) => {
                            tracing::trace!(art = andere.art(), "Nachricht vor Anmelde-Antwort ignoriert");
                        }
                    },
                }
            }
        };
        tokio::time::timeout(timeout, warten)
            .await
            .map_err(|_| ClientError::Zeitueberschreitung("Anmelde-Antwort".into()))?
    }

    // -----------------------------------------------------------------------
    // Sender
    // -----------------------------------------------------------------------

    /// Sende-Schleife des Senders
    ///
    /// Endet bei Abbruch, wenn die Capture-Seite ihren Eingang verwirft oder
    /// das Relay den Raum schliesst. Angefangene Batches werden beim Ende
    /// noch verschickt.
    pub async fn capture_senden(
        &mut self,
        mut batcher: CaptureBatcher,
        capture: Receiver<CaptureFrame>,
        abfrage: Duration,
        abbruch: CancellationToken,
    ) -> ClientResult<SendeBericht> {
        let mut bericht = SendeBericht::default();
        let mut takt = tokio::time::interval(abfrage.max(Duration::from_millis(1)));
        takt.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = abbruch.cancelled() => break,

                _ = takt.tick() => {
                    let mut capture_beendet = false;
                    loop {
                        match capture.try_recv() {
                            Ok(frame) => {
                                if let Some(paket) = batcher.frame_hinzufuegen(frame)? {
                                    self.senden(Nachricht::Audio(paket)).await?;
                                    bericht.gesendet += 1;
                                }
                            }
                            Err(TryRecvError::Empty) => break,
                            Err(TryRecvError::Disconnected) => {
                                capture_beendet = true;
                                break;
                            }
                        }
                    }
                    if capture_beendet {
                        tracing::debug!(peer = %self.peer, "Capture beendet");
                        break;
                    }
                }

                nachricht = self.empfangen() => {
                    match nachricht? {
                        None => return Err(ClientError::Getrennt),
                        Some(Nachricht::RoomClosed(g)) => {
                            tracing::info!(grund = ?g.reason, "Raum vom Relay geschlossen");
                            bericht.raum_geschlossen = true;
                            return Ok(bericht);
                        }
                        Some(Nachricht::Error(f)) => {
                            tracing::warn!(code = ?f.code, message = %f.message, "Relay meldet Fehler");
                        }
                        Some(andere) => {
                            tracing::trace!(art = andere.art(), "Nachricht an Sender");
                        }
                    }
                }
            }
        }

        for paket in batcher.rest_ausgeben()? {
            self.senden(Nachricht::Audio(paket)).await?;
            bericht.gesendet += 1;
        }
        Ok(bericht)
    }

    // -----------------------------------------------------------------------
    // Zuhoerer
    // -----------------------------------------------------------------------

    /// Empfangs-Schleife des Zuhoerers
    ///
    /// Endet bei Abbruch, Verbindungsende, `roomClosed` oder wenn die
    /// Wiedergabe ihre Queue verwirft.
    pub async fn empfang_weiterleiten(
        &mut self,
        wiedergabe: Sender<Ereignis>,
        abbruch: CancellationToken,
    ) -> ClientResult<EmpfangsBericht> {
        let mut bericht = EmpfangsBericht::default();

        loop {
            let nachricht = tokio::select! {
                _ = abbruch.cancelled() => break,
                n = self.empfangen() => n?,
            };
            let Some(nachricht) = nachricht else {
                tracing::info!(peer = %self.peer, "Relay hat die Verbindung getrennt");
                break;
            };

            let (ereignis, letztes) = match nachricht {
                Nachricht::Audio(paket) => (
                    Ereignis::Audio {
                        paket,
                        ankunft_ms: jetzt_ms(),
                    },
                    false,
                ),
                Nachricht::RoomStatus(s) => (Ereignis::Status(s), false),
                Nachricht::RoomSuspended(s) => (Ereignis::Suspendiert(s.suspended_until), false),
                Nachricht::RoomClosed(g) => (Ereignis::Geschlossen(g.reason), true),
                Nachricht::Error(f) => (Ereignis::Fehler(f), false),
                andere => {
                    tracing::trace!(art = andere.art(), "Nachricht an Zuhoerer ignoriert");
                    continue;
                }
            };

            match wiedergabe.try_send(ereignis) {
                Ok(()) => bericht.weitergeleitet += 1,
                Err(TrySendError::Full(_)) => {
                    bericht.verworfen += 1;
                    tracing::debug!(verworfen = bericht.verworfen, "Wiedergabe-Queue voll");
                }
                Err(TrySendError::Disconnected(_)) => break,
            }
            if letztes {
                break;
            }
        }
        Ok(bericht)
    }
}
