//! Zustand eines einzelnen Raums
//!
//! Ein `Raum` liegt hinter einem `parking_lot::Mutex` im Raum-Manager.
//! Alle Methoden sind synchron, Nachrichten werden nur in Send-Queues
//! gelegt.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use klangbruecke_core::{ConnectionId, IdentityId, SessionId};
use klangbruecke_db::RaumRecord;
use klangbruecke_protocol::{Nachricht, RaumStatus, Raumzustand};
use tokio::task::JoinHandle;

use crate::puffer::KanalPuffer;
use crate::scheduler::SchedulerHandle;
use crate::verbindung::{SendeFehler, VerbindungsHandle};

// ---------------------------------------------------------------------------
// Mitglieder
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SenderSlot {
    pub verbindung: VerbindungsHandle,
    /// Identitaet aus dem Sender-Token, entscheidet ueber Rueckeroberung
    pub identitaet: Option<IdentityId>,
    pub seit: DateTime<Utc>,
}

#[derive(Debug)]
pub struct Zuhoerer {
    pub verbindung: VerbindungsHandle,
    pub name: Option<String>,
    pub beigetreten_am: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RaumMetadaten {
    pub besitzer: IdentityId,
    pub name: Option<String>,
    pub oeffentlich: bool,
    pub erstellt_am: DateTime<Utc>,
}

/// Ergebnis eines Relay-Zyklus
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayErgebnis {
    /// Neu vergebene Relay-Sequenzen, in Versandreihenfolge
    pub sequenzen: Vec<u64>,
    /// Erfolgreich eingereihte Nachrichten ueber alle Zuhoerer
    pub zustellungen: usize,
    /// Zuhoerer, die wegen eines Sendefehlers entfernt wurden
    pub entfernt: Vec<ConnectionId>,
}

// ---------------------------------------------------------------------------
// Raum
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Raum {
    pub id: SessionId,
    pub code: String,
    pub geheimnis_hash: String,
    pub metadaten: RaumMetadaten,
    zustand: Raumzustand,
    suspendiert_bis: Option<DateTime<Utc>>,
    pub puffer: KanalPuffer,
    relay_sequenz: u64,
    /// Zaehler der Sender-Streams, siehe `RaumStatus::stream`
    stream: u64,
    pub sender: Option<SenderSlot>,
    pub zuhoerer: HashMap<ConnectionId, Zuhoerer>,
    scheduler: Option<SchedulerHandle>,
    /// Laufende Erst-Speicherung des Datensatzes
    pub persistenz: Option<JoinHandle<()>>,
}

impl Raum {
    pub fn neu(
        id: SessionId,
        code: String,
        geheimnis_hash: String,
        metadaten: RaumMetadaten,
        puffer: KanalPuffer,
    ) -> Self {
        Self {
            id,
            code,
            geheimnis_hash,
            metadaten,
            zustand: Raumzustand::Aktiv,
            suspendiert_bis: None,
            puffer,
            relay_sequenz: 0,
            stream: 0,
            sender: None,
            zuhoerer: HashMap::new(),
            scheduler: None,
            persistenz: None,
        }
    }

    pub fn zustand(&self) -> Raumzustand {
        self.zustand
    }

    pub fn suspendiert_bis(&self) -> Option<DateTime<Utc>> {
        self.suspendiert_bis
    }

    pub fn relay_sequenz(&self) -> u64 {
        self.relay_sequenz
    }

    pub fn hat_sender(&self) -> bool {
        self.sender.is_some()
    }

    pub fn status(&self) -> RaumStatus {
        RaumStatus {
            has_broadcaster: self.hat_sender(),
            listener_count: self.zuhoerer.len(),
            state: self.zustand,
            stream: self.stream,
        }
    }

    // -----------------------------------------------------------------------
    // Zustandsuebergaenge
    // -----------------------------------------------------------------------

    /// `active -> suspended`, setzt die Frist
    pub fn suspendieren(&mut self, bis: DateTime<Utc>) {
        self.zustand = Raumzustand::Suspendiert;
        self.suspendiert_bis = Some(bis);
    }

    /// `suspended -> active`, hebt die Frist auf
    pub fn aktivieren(&mut self) {
        self.zustand = Raumzustand::Aktiv;
        self.suspendiert_bis = None;
    }

    pub fn schliessen(&mut self) {
        self.zustand = Raumzustand::Geschlossen;
        self.suspendiert_bis = None;
        self.scheduler_stoppen();
    }

    /// Frist abgelaufen?
    pub fn frist_abgelaufen(&self, jetzt: DateTime<Utc>) -> bool {
        self.zustand == Raumzustand::Suspendiert
            && self.suspendiert_bis.is_some_and(|bis| bis <= jetzt)
    }

    /// Neuer Sender-Stream: Kanalpuffer leeren, Relay-Sequenz ab 1
    pub fn puffer_zuruecksetzen(&mut self) {
        self.puffer.zuruecksetzen();
        self.relay_sequenz = 0;
        self.stream += 1;
    }

    // -----------------------------------------------------------------------
    // Scheduler
    // -----------------------------------------------------------------------

    pub fn scheduler_setzen(&mut self, handle: SchedulerHandle) {
        self.scheduler_stoppen();
        self.scheduler = Some(handle);
    }

    pub fn scheduler_stoppen(&mut self) {
        if let Some(handle) = self.scheduler.take() {
            handle.stoppen();
        }
    }

    pub fn scheduler_aktiv(&self) -> bool {
        self.scheduler.is_some()
    }

    /// Scheduler soll laufen: weiterleitend, Sender da, Zuhoerer da
    pub fn scheduler_noetig(&self) -> bool {
        self.zustand == Raumzustand::Aktiv
            && self.hat_sender()
            && self.puffer.leitet_weiter()
            && !self.zuhoerer.is_empty()
    }

    // -----------------------------------------------------------------------
    // Versand
    // -----------------------------------------------------------------------

    /// Sendet an Sender und alle Zuhoerer, ausser `ausser`
    ///
    /// Statusnachrichten sind best effort, ein Fehler entfernt niemanden.
    pub fn an_alle_senden(&self, nachricht: Arc<Nachricht>, ausser: Option<ConnectionId>) {
        let sender = self.sender.iter().map(|s| &s.verbindung);
        let zuhoerer = self.zuhoerer.values().map(|z| &z.verbindung);
        for verbindung in sender.chain(zuhoerer) {
            if Some(verbindung.id()) == ausser {
                continue;
            }
            if let Err(e) = verbindung.senden(Arc::clone(&nachricht)) {
                tracing::debug!(
                    session_id = %self.id,
                    connection_id = %verbindung.id(),
                    art = nachricht.art(),
                    fehler = ?e,
                    "Statusnachricht nicht zugestellt"
                );
            }
        }
    }

    pub fn status_verteilen(&self) {
        self.an_alle_senden(Arc::new(Nachricht::RoomStatus(self.status())), None);
    }

    /// Ein Relay-Zyklus: pro Kanal das aelteste Paket, neu gestempelt,
    /// an alle Zuhoerer
    pub fn relay_zyklus(&mut self) -> RelayErgebnis {
        let mut ergebnis = RelayErgebnis::default();

        for mut paket in self.puffer.zyklus() {
            self.relay_sequenz += 1;
            paket.sequence = self.relay_sequenz;
            ergebnis.sequenzen.push(self.relay_sequenz);

            let nachricht = Arc::new(Nachricht::Audio(paket));
            for (id, zuhoerer) in &self.zuhoerer {
                if ergebnis.entfernt.contains(id) {
                    continue;
                }
                match zuhoerer.verbindung.senden(Arc::clone(&nachricht)) {
                    Ok(()) => ergebnis.zustellungen += 1,
                    Err(SendeFehler::Voll) => {
                        tracing::warn!(
                            session_id = %self.id,
                            connection_id = %id,
                            "Send-Queue voll, Zuhoerer wird entfernt"
                        );
                        ergebnis.entfernt.push(*id);
                    }
                    Err(SendeFehler::Geschlossen) => {
                        tracing::debug!(
                            session_id = %self.id,
                            connection_id = %id,
                            "Zuhoerer-Verbindung geschlossen"
                        );
                        ergebnis.entfernt.push(*id);
                    }
                }
            }
        }

        for id in &ergebnis.entfernt {
            if let Some(zuhoerer) = self.zuhoerer.remove(id) {
                zuhoerer.verbindung.trennen();
            }
        }

        ergebnis
    }

    /// Trennt Sender und alle Zuhoerer, gibt die betroffenen Verbindungen zurueck
    pub fn alle_trennen(&mut self) -> Vec<ConnectionId> {
        let mut ids = Vec::with_capacity(self.zuhoerer.len() + 1);
        if let Some(slot) = self.sender.take() {
            slot.verbindung.trennen();
            ids.push(slot.verbindung.id());
        }
        for (id, zuhoerer) in self.zuhoerer.drain() {
            zuhoerer.verbindung.trennen();
            ids.push(id);
        }
        ids
    }

    /// Dauerhafter Datensatz fuer das Repository
    pub fn datensatz(&self) -> RaumRecord {
        RaumRecord {
            id: self.id,
            code: self.code.clone(),
            geheimnis_hash: self.geheimnis_hash.clone(),
            besitzer: self.metadaten.besitzer,
            name: self.metadaten.name.clone(),
            oeffentlich: self.metadaten.oeffentlich,
            aktiv: self.zustand != Raumzustand::Geschlossen,
            erstellt_am: self.metadaten.erstellt_am,
            geschlossen_am: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use klangbruecke_protocol::AudioPaket;
    use tokio::sync::mpsc;

    fn raum(schwelle: usize) -> Raum {
        Raum::neu(
            SessionId::new(),
            "ABC234".into(),
            "$argon2id$dummy".into(),
            RaumMetadaten {
                besitzer: IdentityId::new(),
                name: Some("Probe".into()),
                oeffentlich: false,
                erstellt_am: Utc::now(),
            },
            KanalPuffer::neu(schwelle, 16, 8),
        )
    }

    fn zuhoerer_hinzufuegen(
        raum: &mut Raum,
        groesse: usize,
    ) -> (ConnectionId, mpsc::Receiver<Arc<Nachricht>>) {
        let id = ConnectionId::new();
        let (verbindung, rx) = VerbindungsHandle::kanal(id, groesse);
        raum.zuhoerer.insert(
            id,
            Zuhoerer {
                verbindung,
                name: None,
                beigetreten_am: Utc::now(),
            },
        );
        (id, rx)
    }

    #[test]
    fn frist_nur_im_suspendierten_zustand() {
        let mut r = raum(1);
        assert_eq!(r.suspendiert_bis(), None);

        let bis = Utc::now();
        r.suspendieren(bis);
        assert_eq!(r.zustand(), Raumzustand::Suspendiert);
        assert_eq!(r.suspendiert_bis(), Some(bis));
        assert!(r.frist_abgelaufen(bis));

        r.aktivieren();
        assert_eq!(r.suspendiert_bis(), None);
        assert!(!r.frist_abgelaufen(bis + chrono::Duration::hours(1)));
    }

    #[test]
    fn zyklus_stempelt_neu_und_verteilt() {
        let mut r = raum(1);
        let (_, mut rx_a) = zuhoerer_hinzufuegen(&mut r, 8);
        let (_, mut rx_b) = zuhoerer_hinzufuegen(&mut r, 8);
        r.puffer.einreihen(AudioPaket::pcm(0, vec![0.1], 1, 900)).unwrap();
        r.puffer.einreihen(AudioPaket::pcm(1, vec![0.2], 1, 17)).unwrap();

        let ergebnis = r.relay_zyklus();
        assert_eq!(ergebnis.sequenzen, vec![1, 2]);
        assert_eq!(ergebnis.zustellungen, 4);

        for rx in [&mut rx_a, &mut rx_b] {
            let seqs: Vec<u64> = (0..2)
                .map(|_| match rx.try_recv().unwrap().as_ref() {
                    Nachricht::Audio(p) => p.sequence,
                    andere => panic!("Audio erwartet, {andere:?}"),
                })
                .collect();
            assert_eq!(seqs, vec![1, 2]);
        }
    }

    #[test]
    fn voller_zuhoerer_wird_entfernt_andere_nicht() {
        let mut r = raum(1);
        let (langsam, _rx_langsam) = zuhoerer_hinzufuegen(&mut r, 1);
        let (_, mut rx_schnell) = zuhoerer_hinzufuegen(&mut r, 8);
        r.puffer.einreihen(AudioPaket::pcm(0, vec![0.0], 1, 1)).unwrap();
        r.puffer.einreihen(AudioPaket::pcm(1, vec![0.0], 1, 1)).unwrap();

        let ergebnis = r.relay_zyklus();
        assert_eq!(ergebnis.entfernt, vec![langsam]);
        assert_eq!(r.zuhoerer.len(), 1);
        assert!(rx_schnell.try_recv().is_ok());
        assert!(rx_schnell.try_recv().is_ok());
    }

    #[test]
    fn datensatz_spiegelt_zustand() {
        let mut r = raum(1);
        assert!(r.datensatz().aktiv);
        r.schliessen();
        let datensatz = r.datensatz();
        assert!(!datensatz.aktiv);
        assert_eq!(datensatz.code, "ABC234");
    }

    #[test]
    fn alle_trennen_leert_mitglieder() {
        let mut r = raum(1);
        let (id, _rx) = zuhoerer_hinzufuegen(&mut r, 4);
        let getrennt = r.alle_trennen();
        assert_eq!(getrennt, vec![id]);
        assert!(r.zuhoerer.is_empty());
        assert!(!r.hat_sender());
    }
}
