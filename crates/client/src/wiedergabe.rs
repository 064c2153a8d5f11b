//! Wiedergabe-Schleife des Zuhoerers
//!
//! Leert die Ereignis-Queue der Netz-Seite, fuettert die Jitter Buffer und
//! plant die Ausgabe. Ruft nie in die Netz-Seite zurueck.

use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError};
use klangbruecke_protocol::nachricht::ZuhoererAngemeldet;
use klangbruecke_protocol::RaumStatus;

use crate::playback::{AudioAusgabe, PlaybackScheduler};
use crate::verbindung::Ereignis;

pub struct WiedergabeSchleife<A: AudioAusgabe> {
    ereignisse: Receiver<Ereignis>,
    scheduler: PlaybackScheduler<A>,
    sender_aktiv: bool,
    status: Option<RaumStatus>,
    beendet: bool,
}

impl<A: AudioAusgabe> WiedergabeSchleife<A> {
    pub fn neu(ereignisse: Receiver<Ereignis>, scheduler: PlaybackScheduler<A>) -> Self {
        Self {
            ereignisse,
            scheduler,
            sender_aktiv: false,
            status: None,
            beendet: false,
        }
    }

    /// Startzustand aus der Anmelde-Antwort uebernehmen
    pub fn mit_anmeldung(mut self, anmeldung: &ZuhoererAngemeldet) -> Self {
        self.sender_aktiv = anmeldung.has_broadcaster;
        self.status = Some(RaumStatus {
            has_broadcaster: anmeldung.has_broadcaster,
            listener_count: anmeldung.listener_count,
            state: anmeldung.state,
            stream: anmeldung.stream,
        });
        self
    }

    pub fn scheduler(&self) -> &PlaybackScheduler<A> {
        &self.scheduler
    }

    pub fn status(&self) -> Option<RaumStatus> {
        self.status
    }

    /// Raum geschlossen oder Netz-Seite beendet
    pub fn ist_beendet(&self) -> bool {
        self.beendet
    }

    /// Ein Durchlauf: alle wartenden Ereignisse verarbeiten, dann planen
    ///
    /// Liefert die Anzahl eingeplanter Pakete.
    pub fn schritt(&mut self) -> usize {
        let mut geplant = 0;
        loop {
            match self.ereignisse.try_recv() {
                Ok(ereignis) => geplant += self.verarbeiten(ereignis),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    geplant += self.beenden();
                    break;
                }
            }
        }
        if !self.beendet {
            geplant += self.scheduler.planen();
        }
        geplant
    }

    /// Laeuft bis zum Ende des Raums, plant im Takt `intervall`
    pub fn laufen(mut self, intervall: Duration) -> PlaybackScheduler<A> {
        let ereignisse = self.ereignisse.clone();
        let takt = crossbeam_channel::tick(intervall);

        while !self.beendet {
            crossbeam_channel::select! {
                recv(ereignisse) -> ereignis => match ereignis {
                    Ok(ereignis) => {
                        self.verarbeiten(ereignis);
                    }
                    Err(_) => {
                        self.beenden();
                    }
                },
                recv(takt) -> _ => {
                    self.scheduler.planen();
                }
            }
        }
        self.scheduler
    }

    /// Explizites Verlassen
    pub fn stoppen(&mut self) {
        self.scheduler.stoppen();
        self.beendet = true;
    }

    fn verarbeiten(&mut self, ereignis: Ereignis) -> usize {
        match ereignis {
            Ereignis::Audio { paket, ankunft_ms } => {
                self.scheduler.paket_empfangen(paket, ankunft_ms);
                0
            }
            Ereignis::Status(status) => {
                let vorher = self.sender_aktiv;
                let neuer_stream = self.status.is_some_and(|alt| alt.stream != status.stream);
                self.sender_aktiv = status.has_broadcaster;
                self.status = Some(status);
                match (vorher, status.has_broadcaster) {
                    // Sender weg: Rest abspielen
                    (true, false) => self.scheduler.ausleeren(),
                    // Neuer Sender, das Relay zaehlt wieder ab 1
                    (false, true) => {
                        self.scheduler.stoppen();
                        0
                    }
                    // Sender abgeloest: alten Stream zu Ende spielen, dann neu
                    (true, true) if neuer_stream => {
                        tracing::info!(stream = status.stream, "Sender abgeloest, Wiedergabe startet neu");
                        let geplant = self.scheduler.ausleeren();
                        self.scheduler.stoppen();
                        geplant
                    }
                    _ => 0,
                }
            }
            Ereignis::Suspendiert(bis) => {
                tracing::info!(suspendiert_bis = %bis, "Sender getrennt, Raum wartet");
                self.sender_aktiv = false;
                self.scheduler.ausleeren()
            }
            Ereignis::Geschlossen(grund) => {
                tracing::info!(grund = ?grund, "Raum geschlossen");
                self.beenden()
            }
            Ereignis::Fehler(f) => {
                tracing::warn!(code = ?f.code, message = %f.message, "Relay meldet Fehler");
                0
            }
        }
    }

    fn beenden(&mut self) -> usize {
        if self.beendet {
            return 0;
        }
        self.beendet = true;
        self.sender_aktiv = false;
        self.scheduler.ausleeren()
    }
}

impl<A: AudioAusgabe> std::fmt::Debug for WiedergabeSchleife<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WiedergabeSchleife")
            .field("sender_aktiv", &self.sender_aktiv)
            .field("status", &self.status)
            .field("beendet", &self.beendet)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jitter_buffer::JitterBufferConfig;
    use crate::playback::PlaybackConfig;
    use crate::qualitaet::PufferGroessen;
    use klangbruecke_protocol::{AudioFormat, AudioPaket, Raumzustand};

    #[derive(Debug, Default)]
    struct Senke {
        sequenzen: Vec<f32>,
    }

    impl AudioAusgabe for Senke {
        fn jetzt(&self) -> f64 {
            0.0
        }

        fn planen(&mut self, _kanal: u16, samples: &[f32], _start: f64, _rate: f64) {
            self.sequenzen.push(samples[0]);
        }
    }

    fn schleife(rx: Receiver<Ereignis>) -> WiedergabeSchleife<Senke> {
        let config = PlaybackConfig {
            // Die Senke steht bei 0, ohne Horizont wird alles geplant
            planungshorizont: f64::MAX,
            format: AudioFormat {
                abtastrate: 10,
                puffer_groesse: 1,
                batch_faktor: 1,
            },
            jitter: JitterBufferConfig {
                statisch: PufferGroessen { min: 2, ziel: 3, max: 10 },
                ..JitterBufferConfig::default()
            },
            ..PlaybackConfig::default()
        };
        WiedergabeSchleife::neu(rx, PlaybackScheduler::neu(Senke::default(), config))
    }

    fn audio(seq: u64) -> Ereignis {
        Ereignis::Audio {
            paket: AudioPaket::pcm(0, vec![seq as f32], seq, seq),
            ankunft_ms: seq as f64,
        }
    }

    fn status(has_broadcaster: bool) -> Ereignis {
        status_im_stream(has_broadcaster, 1)
    }

    fn status_im_stream(has_broadcaster: bool, stream: u64) -> Ereignis {
        Ereignis::Status(RaumStatus {
            has_broadcaster,
            listener_count: 1,
            state: if has_broadcaster {
                Raumzustand::Aktiv
            } else {
                Raumzustand::Suspendiert
            },
            stream,
        })
    }

    #[test]
    fn sender_weg_spielt_rest_ab() {
        let (tx, rx) = crossbeam_channel::bounded(16);
        let mut s = schleife(rx);
        tx.send(status(true)).unwrap();
        for seq in 1..=3 {
            tx.send(audio(seq)).unwrap();
        }
        s.schritt();
        // min 2: das dritte Paket bleibt im Puffer
        assert_eq!(s.scheduler().ausgabe().sequenzen, vec![1.0, 2.0]);

        tx.send(status(false)).unwrap();
        s.schritt();
        assert_eq!(s.scheduler().ausgabe().sequenzen, vec![1.0, 2.0, 3.0]);
        assert!(!s.ist_beendet());
    }

    #[test]
    fn abgeloester_sender_startet_wiedergabe_neu() {
        let (tx, rx) = crossbeam_channel::bounded(64);
        let mut s = schleife(rx);
        tx.send(status_im_stream(true, 1)).unwrap();
        for seq in 1..=20 {
            tx.send(audio(seq)).unwrap();
            s.schritt();
        }

        // Rueckeroberung ohne Suspendierung: true -> true, neuer Stream ab 1
        tx.send(status_im_stream(true, 2)).unwrap();
        for seq in 1..=12u64 {
            tx.send(Ereignis::Audio {
                paket: AudioPaket::pcm(0, vec![100.0 + seq as f32], seq, seq),
                ankunft_ms: 100.0 + seq as f64,
            })
            .unwrap();
            s.schritt();
        }

        // Alter Stream komplett, vom neuen fehlt nur das noch gepufferte Paket
        let mut erwartet: Vec<f32> = (1..=20).map(|n| n as f32).collect();
        erwartet.extend((1..=11).map(|n| 100.0 + n as f32));
        assert_eq!(s.scheduler().ausgabe().sequenzen, erwartet);

        let stats = s.scheduler().statistik(0).unwrap();
        assert_eq!(stats.verspaetet, 0);
        assert_eq!(stats.verloren, 0);
    }

    #[test]
    fn gleicher_stream_setzt_nicht_zurueck() {
        let (tx, rx) = crossbeam_channel::bounded(16);
        let mut s = schleife(rx);
        tx.send(status_im_stream(true, 1)).unwrap();
        for seq in 1..=3 {
            tx.send(audio(seq)).unwrap();
        }
        s.schritt();
        // Nur die Zuhoererzahl aendert sich
        tx.send(status_im_stream(true, 1)).unwrap();
        tx.send(audio(4)).unwrap();
        s.schritt();
        assert_eq!(s.scheduler().ausgabe().sequenzen, vec![1.0, 2.0, 3.0]);
        assert_eq!(s.scheduler().statistik(0).unwrap().empfangen, 4);
    }

    #[test]
    fn geschlossener_raum_beendet_schleife() {
        let (tx, rx) = crossbeam_channel::bounded(16);
        let mut s = schleife(rx);
        tx.send(audio(1)).unwrap();
        tx.send(Ereignis::Geschlossen(Some("owner_closed".into()))).unwrap();
        s.schritt();
        assert!(s.ist_beendet());
        assert_eq!(s.scheduler().ausgabe().sequenzen, vec![1.0]);
    }

    #[test]
    fn getrennte_queue_beendet_schleife() {
        let (tx, rx) = crossbeam_channel::bounded(16);
        let s = schleife(rx);
        tx.send(audio(1)).unwrap();
        drop(tx);
        let scheduler = s.laufen(Duration::from_millis(5));
        assert_eq!(scheduler.ausgabe().sequenzen, vec![1.0]);
    }
}
