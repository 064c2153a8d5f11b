//! Raum-Manager
//!
//! Zentrale Registry aller Raeume. Thread-safe und `Clone`-faehig
//! (innerer Arc), wird in Signaling und REST injiziert.
//!
//! ## Sperren
//! - `raeume` ist eine DashMap, jeder Raum liegt hinter einem eigenen
//!   `parking_lot::Mutex`. Der Arc wird immer erst aus der Map geklont,
//!   dann wird gesperrt.
//! - Keine Sperre wird ueber ein `.await` gehalten. Persistenz laeuft im
//!   Hintergrund.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use klangbruecke_auth::{
    geheimnis_hashen, geheimnis_pruefen, geheimnis_verifizieren, AuthError, TokenRolle,
    TokenStore,
};
use klangbruecke_core::{ConnectionId, IdentityId, SessionId, SystemUhr, Uhr};
use klangbruecke_db::{GeraeteZuweisung, RaumRecord, RaumRepository};
use klangbruecke_observability::RelayMetriken;
use klangbruecke_protocol::nachricht::{QuelleAngemeldet, RaumSuspendiert, ZuhoererAngemeldet};
use klangbruecke_protocol::{AudioPaket, Nachricht, RaumStatus, Raumzustand};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::code::{code_normalisieren, CodeQuelle, ZufallsCodes};
use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::puffer::{KanalPuffer, PufferPhase};
use crate::raum::{Raum, RaumMetadaten, RelayErgebnis, SenderSlot, Zuhoerer};
use crate::scheduler::SchedulerHandle;
use crate::verbindung::VerbindungsHandle;

// ---------------------------------------------------------------------------
// Ein- und Ausgabetypen
// ---------------------------------------------------------------------------

/// Metadaten beim Anlegen eines Raums
#[derive(Debug, Clone, Default)]
pub struct NeueSitzung {
    pub name: Option<String>,
    pub oeffentlich: bool,
}

#[derive(Debug, Clone)]
pub struct ErstellteSitzung {
    pub session_id: SessionId,
    pub code: String,
    /// Sender-Token fuer `registerSource`
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct Beitritt {
    pub session_id: SessionId,
    /// Zuhoerer-Token fuer `registerListener`
    pub token: String,
    pub status: RaumStatus,
    pub name: Option<String>,
}

/// Ein Raum aus Sicht der Verwaltung
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SitzungsInfo {
    pub session_id: SessionId,
    pub code: String,
    pub name: Option<String>,
    pub public: bool,
    pub state: Raumzustand,
    pub has_broadcaster: bool,
    pub listener_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Interner Zustand eines Raums fuer Tests und Diagnose
#[derive(Debug, Clone)]
pub struct RaumMomentaufnahme {
    pub status: RaumStatus,
    pub code: String,
    pub suspendiert_bis: Option<DateTime<Utc>>,
    pub phase: PufferPhase,
    pub relay_sequenz: u64,
    pub fuellstaende: Vec<usize>,
    pub scheduler_aktiv: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rolle {
    Sender,
    Zuhoerer,
}

#[derive(Debug, Clone, Copy)]
struct Zuordnung {
    session_id: SessionId,
    rolle: Rolle,
}

// ---------------------------------------------------------------------------
// Abhaengigkeiten
// ---------------------------------------------------------------------------

/// Alles, was der Manager von aussen bekommt
pub struct Abhaengigkeiten {
    pub config: RelayConfig,
    pub tokens: Arc<TokenStore>,
    pub repo: Arc<dyn RaumRepository>,
    pub uhr: Arc<dyn Uhr>,
    pub code_quelle: Box<dyn CodeQuelle>,
    pub metriken: Option<RelayMetriken>,
}

impl Abhaengigkeiten {
    /// Systemuhr, Zufallscodes, keine Metriken
    pub fn neu(config: RelayConfig, tokens: Arc<TokenStore>, repo: Arc<dyn RaumRepository>) -> Self {
        Self {
            config,
            tokens,
            repo,
            uhr: Arc::new(SystemUhr),
            code_quelle: Box::new(ZufallsCodes),
            metriken: None,
        }
    }

    pub fn mit_uhr(mut self, uhr: Arc<dyn Uhr>) -> Self {
        self.uhr = uhr;
        self
    }

    pub fn mit_code_quelle(mut self, quelle: impl CodeQuelle + 'static) -> Self {
        self.code_quelle = Box::new(quelle);
        self
    }

    pub fn mit_metriken(mut self, metriken: RelayMetriken) -> Self {
        self.metriken = Some(metriken);
        self
    }
}

// ---------------------------------------------------------------------------
// RaumManager
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct RaumManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    raeume: DashMap<SessionId, Arc<Mutex<Raum>>>,
    /// Raum-Code (Grossbuchstaben) -> Raum
    codes: DashMap<String, SessionId>,
    verbindungen: DashMap<ConnectionId, Zuordnung>,
    tokens: Arc<TokenStore>,
    repo: Arc<dyn RaumRepository>,
    uhr: Arc<dyn Uhr>,
    code_quelle: Box<dyn CodeQuelle>,
    metriken: Option<RelayMetriken>,
    config: RelayConfig,
}

impl std::fmt::Debug for RaumManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaumManager")
            .field("raeume", &self.inner.raeume.len())
            .field("verbindungen", &self.inner.verbindungen.len())
            .finish()
    }
}

impl RaumManager {
    pub fn neu(abh: Abhaengigkeiten) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                raeume: DashMap::new(),
                codes: DashMap::new(),
                verbindungen: DashMap::new(),
                tokens: abh.tokens,
                repo: abh.repo,
                uhr: abh.uhr,
                code_quelle: abh.code_quelle,
                metriken: abh.metriken,
                config: abh.config,
            }),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.inner.config
    }

    pub fn anzahl(&self) -> usize {
        self.inner.raeume.len()
    }

    // -----------------------------------------------------------------------
    // Anlegen und Beitreten
    // -----------------------------------------------------------------------

    /// Legt einen Raum an und stellt das Sender-Token aus
    ///
    /// Hasht das Geheimnis (Argon2id), aus async-Code ueber
    /// `spawn_blocking` aufrufen.
    pub fn sitzung_erstellen(
        &self,
        besitzer: IdentityId,
        geheimnis: &str,
        neu: NeueSitzung,
    ) -> RelayResult<ErstellteSitzung> {
        geheimnis_pruefen(geheimnis)?;
        let hash = geheimnis_hashen(geheimnis)?;

        let session_id = SessionId::new();
        let code = self.code_vergeben(session_id)?;
        let jetzt = self.inner.uhr.jetzt();

        let mut raum = Raum::neu(
            session_id,
            code.clone(),
            hash,
            RaumMetadaten {
                besitzer,
                name: neu.name,
                oeffentlich: neu.oeffentlich,
                erstellt_am: jetzt,
            },
            self.puffer_erstellen(),
        );
        raum.persistenz = self.speichern_im_hintergrund(raum.datensatz());
        self.inner
            .raeume
            .insert(session_id, Arc::new(Mutex::new(raum)));

        let token = self
            .inner
            .tokens
            .ausstellen(session_id, TokenRolle::Sender, Some(besitzer));

        self.gauges_aktualisieren();

        tracing::info!(
            session_id = %session_id,
            code = %code,
            besitzer = %besitzer,
            "Raum angelegt"
        );

        Ok(ErstellteSitzung {
            session_id,
            code,
            token: token.token,
        })
    }

    /// Loest einen Code auf, prueft das Geheimnis und stellt ein Zuhoerer-Token aus
    pub fn sitzung_beitreten(&self, code: &str, geheimnis: &str) -> RelayResult<Beitritt> {
        let code = code_normalisieren(code);
        let session_id = self
            .inner
            .codes
            .get(&code)
            .map(|e| *e.value())
            .ok_or_else(|| RelayError::nicht_gefunden(format!("Raum-Code {code}")))?;
        let raum = self.raum(session_id)?;

        let hash = {
            let raum = raum.lock();
            if raum.zustand() == Raumzustand::Geschlossen {
                return Err(RelayError::Geschlossen);
            }
            raum.geheimnis_hash.clone()
        };

        if !geheimnis_verifizieren(geheimnis, &hash)? {
            tracing::info!(session_id = %session_id, "Beitritt mit falschem Geheimnis");
            return Err(AuthError::FalschesGeheimnis.into());
        }

        let token = self
            .inner
            .tokens
            .ausstellen(session_id, TokenRolle::Zuhoerer, None);

        let (status, name) = {
            let raum = raum.lock();
            (raum.status(), raum.metadaten.name.clone())
        };

        tracing::debug!(session_id = %session_id, "Zuhoerer-Token ausgestellt");
        Ok(Beitritt {
            session_id,
            token: token.token,
            status,
            name,
        })
    }

    /// Stellt dem Besitzer ein neues Sender-Token aus
    pub fn sender_token_erneuern(
        &self,
        session_id: SessionId,
        besitzer: IdentityId,
    ) -> RelayResult<String> {
        let raum = self.raum(session_id)?;
        {
            let raum = raum.lock();
            if raum.metadaten.besitzer != besitzer {
                return Err(RelayError::NichtBerechtigt("nur der Besitzer".into()));
            }
            if raum.zustand() == Raumzustand::Geschlossen {
                return Err(RelayError::Geschlossen);
            }
        }
        Ok(self
            .inner
            .tokens
            .ausstellen(session_id, TokenRolle::Sender, Some(besitzer))
            .token)
    }

    // -----------------------------------------------------------------------
    // Registrierung ueber das Signaling
    // -----------------------------------------------------------------------

    /// Installiert eine Verbindung als Sender des Raums
    pub fn sender_registrieren(
        &self,
        session_id: SessionId,
        token: &str,
        verbindung: VerbindungsHandle,
    ) -> RelayResult<QuelleAngemeldet> {
        let claims = self
            .inner
            .tokens
            .pruefen(token, session_id, Some(TokenRolle::Sender))?;
        let conn_id = verbindung.id();
        if self.zuordnung_pruefen(conn_id, session_id, Rolle::Sender)? {
            return self.sender_antwort(session_id);
        }

        let raum = self.raum(session_id)?;
        let (antwort, abgeloest) = {
            let mut raum = raum.lock();
            if raum.zustand() == Raumzustand::Geschlossen {
                return Err(RelayError::Geschlossen);
            }

            let abgeloest = match raum.sender.take() {
                None => None,
                Some(slot) if slot.identitaet.is_some() && slot.identitaet == claims.identitaet => {
                    slot.verbindung.trennen();
                    Some(slot.verbindung.id())
                }
                Some(slot) => {
                    raum.sender = Some(slot);
                    return Err(RelayError::BereitsBelegt);
                }
            };

            let war_suspendiert = raum.zustand() == Raumzustand::Suspendiert;
            raum.sender = Some(SenderSlot {
                verbindung,
                identitaet: claims.identitaet,
                seit: self.inner.uhr.jetzt(),
            });
            raum.puffer_zuruecksetzen();
            raum.scheduler_stoppen();
            raum.aktivieren();
            raum.an_alle_senden(
                Arc::new(Nachricht::RoomStatus(raum.status())),
                Some(conn_id),
            );

            tracing::info!(
                session_id = %session_id,
                connection_id = %conn_id,
                rueckeroberung = abgeloest.is_some(),
                war_suspendiert,
                "Sender registriert"
            );

            (self.quelle_angemeldet(&raum), abgeloest)
        };

        if let Some(alt) = abgeloest {
            self.inner.verbindungen.remove(&alt);
        }
        self.inner.verbindungen.insert(
            conn_id,
            Zuordnung {
                session_id,
                rolle: Rolle::Sender,
            },
        );
        self.gauges_aktualisieren();
        Ok(antwort)
    }

    /// Nimmt eine Verbindung als Zuhoerer auf
    pub fn zuhoerer_registrieren(
        &self,
        session_id: SessionId,
        token: &str,
        verbindung: VerbindungsHandle,
        name: Option<String>,
    ) -> RelayResult<ZuhoererAngemeldet> {
        self.inner.tokens.pruefen(token, session_id, None)?;
        let conn_id = verbindung.id();
        let bereits = self.zuordnung_pruefen(conn_id, session_id, Rolle::Zuhoerer)?;

        let raum = self.raum(session_id)?;
        let antwort = {
            let mut raum = raum.lock();
            if raum.zustand() == Raumzustand::Geschlossen {
                return Err(RelayError::Geschlossen);
            }
            if !bereits {
                raum.zuhoerer.insert(
                    conn_id,
                    Zuhoerer {
                        verbindung,
                        name: name.clone(),
                        beigetreten_am: self.inner.uhr.jetzt(),
                    },
                );
                raum.an_alle_senden(
                    Arc::new(Nachricht::RoomStatus(raum.status())),
                    Some(conn_id),
                );
                self.scheduler_starten_falls_noetig(&mut raum);
                tracing::info!(
                    session_id = %session_id,
                    connection_id = %conn_id,
                    name = name.as_deref().unwrap_or("-"),
                    zuhoerer = raum.zuhoerer.len(),
                    "Zuhoerer registriert"
                );
            }
            let status = raum.status();
            ZuhoererAngemeldet {
                room_name: raum.metadaten.name.clone(),
                has_broadcaster: status.has_broadcaster,
                listener_count: status.listener_count,
                state: status.state,
                stream: status.stream,
            }
        };

        self.inner.verbindungen.insert(
            conn_id,
            Zuordnung {
                session_id,
                rolle: Rolle::Zuhoerer,
            },
        );
        self.gauges_aktualisieren();
        Ok(antwort)
    }

    // -----------------------------------------------------------------------
    // Audio
    // -----------------------------------------------------------------------

    /// Nimmt ein Paket des Senders an
    pub fn audio_empfangen(&self, conn_id: ConnectionId, paket: AudioPaket) -> RelayResult<()> {
        let zuordnung = self
            .zuordnung(conn_id)
            .ok_or_else(|| RelayError::NichtBerechtigt("Verbindung nicht angemeldet".into()))?;
        if zuordnung.rolle != Rolle::Sender {
            return Err(RelayError::NichtBerechtigt(
                "nur der Sender darf Audio senden".into(),
            ));
        }
        paket
            .validieren()
            .map_err(|e| RelayError::Ungueltig(e.to_string()))?;

        let raum = self.raum(zuordnung.session_id)?;
        let verdraengt = {
            let mut raum = raum.lock();
            if raum.sender.as_ref().map(|s| s.verbindung.id()) != Some(conn_id) {
                return Err(RelayError::NichtBerechtigt(
                    "Verbindung haelt den Sender-Platz nicht".into(),
                ));
            }
            let kanal = paket.channel;
            let verdraengt = raum.puffer.einreihen(paket)?;
            if verdraengt {
                tracing::debug!(
                    session_id = %zuordnung.session_id,
                    channel = kanal,
                    "Kanal-Queue voll, aeltestes Paket verworfen"
                );
            }
            if raum.puffer.gate_pruefen() {
                tracing::info!(
                    session_id = %zuordnung.session_id,
                    schwelle = raum.puffer.schwelle(),
                    "Vorlauf erreicht, Relay beginnt"
                );
            }
            self.scheduler_starten_falls_noetig(&mut raum);
            verdraengt
        };

        if let Some(m) = &self.inner.metriken {
            m.pakete_empfangen.inc();
            if verdraengt {
                m.pakete_verworfen.inc();
            }
        }
        Ok(())
    }

    /// Ein Relay-Zyklus fuer einen Raum
    ///
    /// `None`, wenn der Raum nicht mehr existiert.
    pub fn relay_tick(&self, session_id: SessionId) -> Option<RelayErgebnis> {
        let raum = self.inner.raeume.get(&session_id).map(|e| Arc::clone(e.value()))?;
        let start = Instant::now();

        let ergebnis = {
            let mut raum = raum.lock();
            if raum.zustand() != Raumzustand::Aktiv || !raum.puffer.leitet_weiter() {
                return Some(RelayErgebnis::default());
            }
            let ergebnis = raum.relay_zyklus();
            if !ergebnis.entfernt.is_empty() {
                if raum.zuhoerer.is_empty() {
                    raum.scheduler_stoppen();
                }
                raum.status_verteilen();
            }
            ergebnis
        };

        for id in &ergebnis.entfernt {
            self.inner.verbindungen.remove(id);
        }
        if let Some(m) = &self.inner.metriken {
            m.pakete_weitergeleitet.inc_by(ergebnis.zustellungen as f64);
            m.zuhoerer_entfernt.inc_by(ergebnis.entfernt.len() as f64);
            m.tick_dauer.observe(start.elapsed().as_secs_f64());
        }
        if !ergebnis.entfernt.is_empty() {
            self.gauges_aktualisieren();
        }

        tracing::trace!(
            session_id = %session_id,
            pakete = ergebnis.sequenzen.len(),
            zustellungen = ergebnis.zustellungen,
            "Relay-Zyklus"
        );
        Some(ergebnis)
    }

    // -----------------------------------------------------------------------
    // Verbindungsverlust
    // -----------------------------------------------------------------------

    /// Einziger Eintrittspunkt fuer Verbindungsverlust aus dem Transport
    pub fn verbindung_getrennt(&self, conn_id: ConnectionId) {
        match self.zuordnung(conn_id) {
            Some(Zuordnung {
                session_id,
                rolle: Rolle::Sender,
            }) => self.sender_getrennt(session_id, conn_id),
            Some(Zuordnung {
                session_id,
                rolle: Rolle::Zuhoerer,
            }) => self.zuhoerer_getrennt(session_id, conn_id),
            None => {
                tracing::trace!(connection_id = %conn_id, "Getrennte Verbindung ohne Raum");
            }
        }
    }

    /// Sender weg: Raum wird suspendiert und wartet die Gnadenfrist ab
    pub fn sender_getrennt(&self, session_id: SessionId, conn_id: ConnectionId) {
        let Ok(raum) = self.raum(session_id) else {
            return;
        };
        {
            let mut raum = raum.lock();
            if raum.sender.as_ref().map(|s| s.verbindung.id()) != Some(conn_id) {
                tracing::debug!(
                    session_id = %session_id,
                    connection_id = %conn_id,
                    "Trennung einer abgeloesten Sender-Verbindung ignoriert"
                );
                return;
            }

            raum.sender = None;
            let bis = self.inner.uhr.jetzt() + self.inner.config.gnadenfrist_chrono();
            raum.suspendieren(bis);
            raum.scheduler_stoppen();
            raum.an_alle_senden(
                Arc::new(Nachricht::RoomSuspended(RaumSuspendiert {
                    suspended_until: bis,
                })),
                None,
            );
            raum.status_verteilen();

            tracing::info!(
                session_id = %session_id,
                suspendiert_bis = %bis,
                "Sender getrennt, Raum suspendiert"
            );
        }

        self.inner
            .verbindungen
            .remove_if(&conn_id, |_, z| z.session_id == session_id);
        self.gauges_aktualisieren();
    }

    pub fn zuhoerer_getrennt(&self, session_id: SessionId, conn_id: ConnectionId) {
        if let Ok(raum) = self.raum(session_id) {
            let mut raum = raum.lock();
            if raum.zuhoerer.remove(&conn_id).is_some() {
                if raum.zuhoerer.is_empty() {
                    raum.scheduler_stoppen();
                }
                raum.status_verteilen();
                tracing::info!(
                    session_id = %session_id,
                    connection_id = %conn_id,
                    zuhoerer = raum.zuhoerer.len(),
                    "Zuhoerer getrennt"
                );
            }
        }
        self.inner
            .verbindungen
            .remove_if(&conn_id, |_, z| z.session_id == session_id);
        self.gauges_aktualisieren();
    }

    // -----------------------------------------------------------------------
    // Schliessen und Bereinigen
    // -----------------------------------------------------------------------

    /// Schliesst einen Raum: alle Mitglieder werden benachrichtigt und getrennt
    pub fn sitzung_schliessen(
        &self,
        session_id: SessionId,
        grund: Option<String>,
    ) -> RelayResult<()> {
        let (_, raum) = self
            .inner
            .raeume
            .remove(&session_id)
            .ok_or_else(|| RelayError::nicht_gefunden(format!("Raum {session_id}")))?;

        let (code, getrennt) = {
            let mut raum = raum.lock();
            raum.schliessen();
            raum.an_alle_senden(Arc::new(Nachricht::geschlossen(grund.clone())), None);
            (raum.code.clone(), raum.alle_trennen())
        };

        self.inner.codes.remove_if(&code, |_, id| *id == session_id);
        for id in &getrennt {
            self.inner.verbindungen.remove(id);
        }
        let widerrufen = self.inner.tokens.raum_widerrufen(session_id);
        self.inaktiv_im_hintergrund(session_id);

        if let Some(m) = &self.inner.metriken {
            m.raeume_geschlossen.inc();
        }
        self.gauges_aktualisieren();

        tracing::info!(
            session_id = %session_id,
            grund = grund.as_deref().unwrap_or("-"),
            getrennt = getrennt.len(),
            tokens = widerrufen,
            "Raum geschlossen"
        );
        Ok(())
    }

    /// Schliesst alle Raeume, deren Gnadenfrist abgelaufen ist
    pub fn abgelaufene_bereinigen(&self) -> Vec<SessionId> {
        let jetzt = self.inner.uhr.jetzt();
        let kandidaten: Vec<(SessionId, Arc<Mutex<Raum>>)> = self
            .inner
            .raeume
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect();

        let abgelaufen: Vec<SessionId> = kandidaten
            .into_iter()
            .filter(|(_, raum)| raum.lock().frist_abgelaufen(jetzt))
            .map(|(id, _)| id)
            .collect();

        for id in &abgelaufen {
            if let Err(e) = self.sitzung_schliessen(*id, Some("Sender nicht zurueckgekehrt".into())) {
                tracing::debug!(session_id = %id, fehler = %e, "Raum bereits entfernt");
            }
        }
        abgelaufen
    }

    /// Startet den periodischen Bereinigungs-Task
    ///
    /// Der Task haelt nur eine schwache Referenz und endet mit dem Manager.
    pub fn bereinigung_starten(&self) -> JoinHandle<()> {
        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let intervall = self.inner.config.bereinigungs_intervall;
        tokio::spawn(async move {
            let mut takt = tokio::time::interval(intervall.max(Duration::from_millis(10)));
            takt.tick().await;
            loop {
                takt.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let geschlossen = RaumManager { inner }.abgelaufene_bereinigen();
                if !geschlossen.is_empty() {
                    tracing::debug!(anzahl = geschlossen.len(), "Abgelaufene Raeume geschlossen");
                }
            }
        })
    }

    // -----------------------------------------------------------------------
    // Verwaltung
    // -----------------------------------------------------------------------

    /// Alle Raeume eines Besitzers, dauerhafter Datensatz mit Live-Zustand
    pub async fn sitzungen_von(&self, besitzer: IdentityId) -> RelayResult<Vec<SitzungsInfo>> {
        let datensaetze = self.inner.repo.nach_besitzer(besitzer).await?;
        let mut infos: Vec<SitzungsInfo> = datensaetze
            .into_iter()
            .map(|record| self.info_aus_datensatz(record))
            .collect();

        // Noch nicht persistierte Live-Raeume ergaenzen
        for raum in self.live_raeume() {
            let raum = raum.lock();
            if raum.metadaten.besitzer == besitzer && !infos.iter().any(|i| i.session_id == raum.id)
            {
                infos.push(info_aus_raum(&raum));
            }
        }
        infos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(infos)
    }

    /// Setzt Kanal-zu-Geraet-Zuweisungen, nur fuer den Besitzer
    pub async fn geraete_zuweisen(
        &self,
        session_id: SessionId,
        besitzer: IdentityId,
        zuweisungen: Vec<GeraeteZuweisung>,
    ) -> RelayResult<Vec<GeraeteZuweisung>> {
        let live = self.besitzer_pruefen(session_id, besitzer).await?;

        let max = self.inner.config.max_kanaele;
        if let Some(z) = zuweisungen.iter().find(|z| z.kanal >= max) {
            return Err(RelayError::Ungueltig(format!(
                "Kanal {} ausserhalb von 0..{max}",
                z.kanal
            )));
        }

        // Datensatz sicherstellen, die Hintergrund-Persistenz kann noch laufen
        if let Some(datensatz) = live {
            self.inner.repo.speichern(&datensatz).await?;
        }
        for mut zuweisung in zuweisungen {
            zuweisung.session_id = session_id;
            self.inner.repo.zuweisung_setzen(&zuweisung).await?;
        }
        tracing::info!(session_id = %session_id, "Geraete-Zuweisungen aktualisiert");
        Ok(self.inner.repo.zuweisungen(session_id).await?)
    }

    pub async fn zuweisungen(
        &self,
        session_id: SessionId,
        besitzer: IdentityId,
    ) -> RelayResult<Vec<GeraeteZuweisung>> {
        self.besitzer_pruefen(session_id, besitzer).await?;
        Ok(self.inner.repo.zuweisungen(session_id).await?)
    }

    /// Schliesst (falls live) und loescht einen Raum dauerhaft
    pub async fn sitzung_loeschen(
        &self,
        session_id: SessionId,
        besitzer: IdentityId,
    ) -> RelayResult<()> {
        let live = self.besitzer_pruefen(session_id, besitzer).await?;
        if live.is_some() {
            // Erst-Speicherung abwarten, sonst legt sie den Datensatz neu an
            let ausstehend = self
                .raum(session_id)
                .ok()
                .and_then(|raum| {
                    let task = raum.lock().persistenz.take();
                    task
                });
            self.sitzung_schliessen(session_id, Some("Raum geloescht".into()))?;
            if let Some(task) = ausstehend {
                if let Err(e) = task.await {
                    tracing::warn!(session_id = %session_id, fehler = %e, "Speicher-Task abgebrochen");
                }
            }
        }
        self.inner.repo.loeschen(session_id).await?;
        tracing::info!(session_id = %session_id, "Raum geloescht");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn status(&self, session_id: SessionId) -> Option<RaumStatus> {
        let raum = self.raum(session_id).ok()?;
        let status = raum.lock().status();
        Some(status)
    }

    pub fn momentaufnahme(&self, session_id: SessionId) -> Option<RaumMomentaufnahme> {
        let raum = self.raum(session_id).ok()?;
        let raum = raum.lock();
        Some(RaumMomentaufnahme {
            status: raum.status(),
            code: raum.code.clone(),
            suspendiert_bis: raum.suspendiert_bis(),
            phase: raum.puffer.phase(),
            relay_sequenz: raum.relay_sequenz(),
            fuellstaende: raum.puffer.fuellstaende(),
            scheduler_aktiv: raum.scheduler_aktiv(),
        })
    }

    /// Raum, dem eine Verbindung zugeordnet ist
    pub fn sitzung_von_verbindung(&self, conn_id: ConnectionId) -> Option<SessionId> {
        self.zuordnung(conn_id).map(|z| z.session_id)
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsfunktionen
    // -----------------------------------------------------------------------

    fn raum(&self, session_id: SessionId) -> RelayResult<Arc<Mutex<Raum>>> {
        self.inner
            .raeume
            .get(&session_id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| RelayError::nicht_gefunden(format!("Raum {session_id}")))
    }

    fn live_raeume(&self) -> Vec<Arc<Mutex<Raum>>> {
        self.inner
            .raeume
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect()
    }

    fn zuordnung(&self, conn_id: ConnectionId) -> Option<Zuordnung> {
        self.inner.verbindungen.get(&conn_id).map(|z| *z.value())
    }

    /// `Ok(true)`, wenn die Verbindung schon genau so angemeldet ist
    fn zuordnung_pruefen(
        &self,
        conn_id: ConnectionId,
        session_id: SessionId,
        rolle: Rolle,
    ) -> RelayResult<bool> {
        match self.zuordnung(conn_id) {
            None => Ok(false),
            Some(z) if z.session_id == session_id && z.rolle == rolle => Ok(true),
            Some(_) => Err(RelayError::VerbindungBelegt(conn_id)),
        }
    }

    fn code_vergeben(&self, session_id: SessionId) -> RelayResult<String> {
        let versuche = self.inner.config.max_code_versuche.max(1);
        for _ in 0..versuche {
            let kandidat = code_normalisieren(&self.inner.code_quelle.naechster_code());
            if let Entry::Vacant(frei) = self.inner.codes.entry(kandidat.clone()) {
                frei.insert(session_id);
                return Ok(kandidat);
            }
            tracing::debug!(code = %kandidat, "Raum-Code bereits vergeben");
        }
        tracing::warn!(versuche, "Kein freier Raum-Code gefunden");
        Err(RelayError::CodesErschoepft(versuche))
    }

    fn puffer_erstellen(&self) -> KanalPuffer {
        let config = &self.inner.config;
        KanalPuffer::neu(
            config.vorlauf_schwelle(),
            config.kanal_kapazitaet,
            config.max_kanaele,
        )
    }

    fn quelle_angemeldet(&self, raum: &Raum) -> QuelleAngemeldet {
        QuelleAngemeldet {
            channels: self.inner.config.max_kanaele,
            sample_rate: self.inner.config.format.abtastrate,
            listener_count: raum.zuhoerer.len(),
        }
    }

    fn sender_antwort(&self, session_id: SessionId) -> RelayResult<QuelleAngemeldet> {
        let raum = self.raum(session_id)?;
        let raum = raum.lock();
        Ok(self.quelle_angemeldet(&raum))
    }

    fn scheduler_starten_falls_noetig(&self, raum: &mut Raum) {
        if !self.inner.config.scheduler_automatisch
            || raum.scheduler_aktiv()
            || !raum.scheduler_noetig()
        {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let session_id = raum.id;
        let handle = SchedulerHandle::starten(session_id, self.inner.config.takt(), move || {
            match weak.upgrade() {
                Some(inner) => RaumManager { inner }.relay_tick(session_id).is_some(),
                None => false,
            }
        });
        raum.scheduler_setzen(handle);
    }

    /// Prueft den Besitz, liefert den Live-Datensatz falls der Raum im Speicher ist
    async fn besitzer_pruefen(
        &self,
        session_id: SessionId,
        besitzer: IdentityId,
    ) -> RelayResult<Option<RaumRecord>> {
        if let Ok(raum) = self.raum(session_id) {
            let live = {
                let raum = raum.lock();
                (raum.metadaten.besitzer == besitzer).then(|| raum.datensatz())
            };
            return live
                .map(Some)
                .ok_or_else(|| RelayError::NichtBerechtigt("nur der Besitzer".into()));
        }

        match self.inner.repo.laden(session_id).await? {
            Some(record) if record.besitzer == besitzer => Ok(None),
            Some(_) => Err(RelayError::NichtBerechtigt("nur der Besitzer".into())),
            None => Err(RelayError::nicht_gefunden(format!("Raum {session_id}"))),
        }
    }

    fn info_aus_datensatz(&self, record: RaumRecord) -> SitzungsInfo {
        if let Ok(raum) = self.raum(record.id) {
            return info_aus_raum(&raum.lock());
        }
        SitzungsInfo {
            session_id: record.id,
            code: record.code,
            name: record.name,
            public: record.oeffentlich,
            state: Raumzustand::Geschlossen,
            has_broadcaster: false,
            listener_count: 0,
            created_at: record.erstellt_am,
        }
    }

    fn speichern_im_hintergrund(&self, datensatz: RaumRecord) -> Option<JoinHandle<()>> {
        let repo = Arc::clone(&self.inner.repo);
        let Ok(laufzeit) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(session_id = %datensatz.id, "Keine Laufzeit, Raum wird nicht gespeichert");
            return None;
        };
        Some(laufzeit.spawn(async move {
            if let Err(e) = repo.speichern(&datensatz).await {
                tracing::warn!(session_id = %datensatz.id, fehler = %e, "Raum konnte nicht gespeichert werden");
            }
        }))
    }

    fn inaktiv_im_hintergrund(&self, session_id: SessionId) {
        let repo = Arc::clone(&self.inner.repo);
        let zeitpunkt = self.inner.uhr.jetzt();
        let Ok(laufzeit) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(session_id = %session_id, "Keine Laufzeit, Raum wird nicht als inaktiv markiert");
            return;
        };
        laufzeit.spawn(async move {
            if let Err(e) = repo.inaktiv_markieren(session_id, zeitpunkt).await {
                tracing::warn!(session_id = %session_id, fehler = %e, "Raum konnte nicht als inaktiv markiert werden");
            }
        });
    }

    fn gauges_aktualisieren(&self) {
        let Some(m) = &self.inner.metriken else {
            return;
        };
        let (mut sender, mut zuhoerer) = (0usize, 0usize);
        for z in self.inner.verbindungen.iter() {
            match z.rolle {
                Rolle::Sender => sender += 1,
                Rolle::Zuhoerer => zuhoerer += 1,
            }
        }
        m.raeume_aktiv.set(self.inner.raeume.len() as f64);
        m.sender_verbunden.set(sender as f64);
        m.zuhoerer_verbunden.set(zuhoerer as f64);
    }
}

fn info_aus_raum(raum: &Raum) -> SitzungsInfo {
    let status = raum.status();
    SitzungsInfo {
        session_id: raum.id,
        code: raum.code.clone(),
        name: raum.metadaten.name.clone(),
        public: raum.metadaten.oeffentlich,
        state: status.state,
        has_broadcaster: status.has_broadcaster,
        listener_count: status.listener_count,
        created_at: raum.metadaten.erstellt_am,
    }
}
