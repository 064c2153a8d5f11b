//! Adaptiver Jitter Buffer pro Zuhoerer und Kanal
//!
//! Ordnet die vom Relay neu gestempelten Pakete nach Sequenznummer und haelt
//! sie zurueck, bis genug Vorlauf fuer eine lueckenlose Wiedergabe vorhanden
//! ist. Die Groessen passen sich alle N Pakete an die gemessene
//! Netzqualitaet an.
//!
//! ## Eigenschaften
//! - O(log n) Einfuegen (BTreeMap nach Sequence sortiert)
//! - Ausgabe ist streng aufsteigend, nichts wird doppelt abgespielt
//! - Keine Locks, wird pro Kanal single-threaded verwendet

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use klangbruecke_protocol::AudioPaket;
use serde::Serialize;

use crate::qualitaet::{Netzqualitaet, PufferGroessen};

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Glaettungsfaktor des Jitter-Mittelwerts (1/16 wie bei RTP)
const JITTER_GLAETTUNG: f64 = 16.0;

/// Obergrenze der gemerkten Luecken-Sequenzen
const MAX_FEHLEND: usize = 1024;

#[derive(Debug, Clone)]
pub struct JitterBufferConfig {
    /// Statische Groessen, Basis fuer die adaptive Skalierung
    pub statisch: PufferGroessen,
    /// Laenge der Jitter- und Latenz-Verlaeufe
    pub verlauf_laenge: usize,
    /// Neuberechnung der Groessen alle N Pakete
    pub neuberechnung_alle: u64,
    /// Liegt ein Paket mehr als `faktor x max` hinter dem Cursor, gilt das
    /// als Neustart des Streams
    pub neustart_faktor: usize,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            statisch: PufferGroessen::default(),
            verlauf_laenge: 50,
            neuberechnung_alle: 50,
            neustart_faktor: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Statistiken
// ---------------------------------------------------------------------------

/// Statistiken des Jitter Buffers (Snapshot)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JitterBufferStatistik {
    /// Anzahl empfangener Pakete gesamt
    pub empfangen: u64,
    /// An die Wiedergabe uebergebene Pakete
    pub abgespielt: u64,
    /// Luecken, die nie geschlossen wurden
    pub verloren: u64,
    /// Pakete mit bereits gepufferter Sequenz
    pub duplikate: u64,
    /// Spaet angekommen, aber noch verwendbar
    pub out_of_order: u64,
    /// Zu spaet, Sequenz war schon abgespielt
    pub verspaetet: u64,
    /// Wegen Ueberlauf vorne entfernt
    pub verworfen: u64,
    pub neustarts: u64,
    pub fuellstand: usize,
    /// Mittlerer Jitter ueber den Verlauf
    pub jitter_ms: f64,
    /// Mittlere Latenz ueber den Verlauf
    pub latenz_ms: f64,
    pub verlust_rate: f64,
    pub qualitaet: Netzqualitaet,
    pub groessen: PufferGroessen,
    pub puffernd: bool,
}

#[derive(Debug, Clone, Copy, Default)]
struct Zaehler {
    empfangen: u64,
    abgespielt: u64,
    verloren: u64,
    duplikate: u64,
    out_of_order: u64,
    verspaetet: u64,
    verworfen: u64,
    neustarts: u64,
}

// ---------------------------------------------------------------------------
// JitterBuffer
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct JitterBuffer {
    config: JitterBufferConfig,
    queue: BTreeMap<u64, AudioPaket>,
    groessen: PufferGroessen,
    qualitaet: Netzqualitaet,
    puffernd: bool,
    /// Hoechste bisher gesehene Sequenz
    erwartet: Option<u64>,
    zuletzt_abgespielt: Option<u64>,
    /// Als verloren gezaehlte Sequenzen, die noch nachkommen duerfen
    fehlend: BTreeSet<u64>,
    /// Ankunftszeit (ms) und Aufnahme-Zeitstempel des vorigen Pakets
    vorige_ankunft: Option<(f64, u64)>,
    jitter_ms: f64,
    jitter_verlauf: VecDeque<f64>,
    latenz_verlauf: VecDeque<f64>,
    seit_neuberechnung: u64,
    zaehler: Zaehler,
}

impl Default for JitterBuffer {
    fn default() -> Self {
        Self::neu(JitterBufferConfig::default())
    }
}

impl JitterBuffer {
    pub fn neu(config: JitterBufferConfig) -> Self {
        let groessen = config.statisch.begrenzt();
        Self {
            queue: BTreeMap::new(),
            groessen,
            qualitaet: Netzqualitaet::Good,
            puffernd: true,
            erwartet: None,
            zuletzt_abgespielt: None,
            fehlend: BTreeSet::new(),
            vorige_ankunft: None,
            jitter_ms: 0.0,
            jitter_verlauf: VecDeque::with_capacity(config.verlauf_laenge),
            latenz_verlauf: VecDeque::with_capacity(config.verlauf_laenge),
            seit_neuberechnung: 0,
            zaehler: Zaehler::default(),
            config,
        }
    }

    /// Nimmt ein Paket auf
    ///
    /// `jetzt_ms` ist die lokale Ankunftszeit in Millisekunden seit
    /// Unix-Epoche, vergleichbar mit `paket.timestamp`.
    pub fn paket_hinzufuegen(&mut self, paket: AudioPaket, jetzt_ms: f64) {
        self.zaehler.empfangen += 1;
        let seq = paket.sequence;

        // Weit hinter dem Cursor nach Wiedergabestart: neuer Stream
        if let (Some(erwartet), Some(_)) = (self.erwartet, self.zuletzt_abgespielt) {
            let grenze = (self.config.neustart_faktor * self.groessen.max) as u64;
            if seq.saturating_add(grenze) < erwartet {
                tracing::info!(
                    channel = paket.channel,
                    sequence = seq,
                    erwartet,
                    "Sequenzsprung zurueck, Jitter Buffer startet neu"
                );
                self.neustart();
            }
        }

        if let Some(letzte) = self.zuletzt_abgespielt {
            if seq <= letzte {
                self.zaehler.verspaetet += 1;
                tracing::trace!(channel = paket.channel, sequence = seq, "Paket zu spaet");
                return;
            }
        }

        match self.erwartet {
            None => self.erwartet = Some(seq),
            Some(erwartet) if seq > erwartet + 1 => {
                self.zaehler.verloren += seq - erwartet - 1;
                let von = (erwartet + 1).max(seq.saturating_sub(MAX_FEHLEND as u64));
                self.fehlend.extend(von..seq);
                while self.fehlend.len() > MAX_FEHLEND {
                    self.fehlend.pop_first();
                }
                self.erwartet = Some(seq);
            }
            Some(erwartet) if seq == erwartet + 1 => self.erwartet = Some(seq),
            Some(_) => {
                if self.queue.contains_key(&seq) {
                    self.zaehler.duplikate += 1;
                } else {
                    self.zaehler.out_of_order += 1;
                    // Nur eine gezaehlte Luecke gilt als wiedergefunden
                    if self.fehlend.remove(&seq) {
                        self.zaehler.verloren = self.zaehler.verloren.saturating_sub(1);
                    }
                }
            }
        }

        self.messwerte_aufnehmen(&paket, jetzt_ms);
        self.queue.insert(seq, paket);

        self.seit_neuberechnung += 1;
        if self.seit_neuberechnung >= self.config.neuberechnung_alle.max(1) {
            self.seit_neuberechnung = 0;
            self.groessen_neu_berechnen();
        }

        if self.puffernd && self.queue.len() >= self.groessen.min {
            self.puffernd = false;
        }

        while self.queue.len() > self.groessen.max {
            if let Some((alt, _)) = self.queue.pop_first() {
                self.zaehler.verworfen += 1;
                self.erwartet = Some(self.erwartet.map_or(alt, |e| e.max(alt)));
                tracing::debug!(sequence = alt, "Jitter Buffer voll, aeltestes Paket verworfen");
            }
        }
    }

    /// Naechstes Paket fuer die Wiedergabe
    pub fn naechstes_paket(&mut self) -> Option<AudioPaket> {
        if self.puffernd {
            return None;
        }
        if self.queue.len() < self.groessen.min {
            self.puffernd = true;
            return None;
        }
        let (seq, paket) = self.queue.pop_first()?;
        self.abgespielt_bis(seq);
        self.zaehler.abgespielt += 1;
        Some(paket)
    }

    pub fn hat_genug_daten(&self) -> bool {
        !self.puffernd && self.queue.len() >= self.groessen.min
    }

    /// Gibt alle gepufferten Pakete in Reihenfolge aus
    pub fn ausleeren(&mut self) -> Vec<AudioPaket> {
        let pakete: Vec<AudioPaket> = std::mem::take(&mut self.queue).into_values().collect();
        if let Some(letztes) = pakete.last() {
            self.abgespielt_bis(letztes.sequence);
        }
        self.zaehler.abgespielt += pakete.len() as u64;
        self.puffernd = true;
        pakete
    }

    /// Vollstaendiger Neuanfang inklusive Statistik
    pub fn zuruecksetzen(&mut self) {
        *self = Self::neu(self.config.clone());
    }

    pub fn fuellstand(&self) -> usize {
        self.queue.len()
    }

    pub fn groessen(&self) -> PufferGroessen {
        self.groessen
    }

    pub fn qualitaet(&self) -> Netzqualitaet {
        self.qualitaet
    }

    pub fn ist_puffernd(&self) -> bool {
        self.puffernd
    }

    /// Hoechste bisher gesehene Sequenz
    pub fn erwartete_sequenz(&self) -> Option<u64> {
        self.erwartet
    }

    pub fn statistik(&self) -> JitterBufferStatistik {
        let z = self.zaehler;
        JitterBufferStatistik {
            empfangen: z.empfangen,
            abgespielt: z.abgespielt,
            verloren: z.verloren,
            duplikate: z.duplikate,
            out_of_order: z.out_of_order,
            verspaetet: z.verspaetet,
            verworfen: z.verworfen,
            neustarts: z.neustarts,
            fuellstand: self.queue.len(),
            jitter_ms: mittelwert(&self.jitter_verlauf),
            latenz_ms: mittelwert(&self.latenz_verlauf),
            verlust_rate: self.verlust_rate(),
            qualitaet: self.qualitaet,
            groessen: self.groessen,
            puffernd: self.puffernd,
        }
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsfunktionen
    // -----------------------------------------------------------------------

    /// Cursor setzen, Luecken bis einschliesslich `seq` sind endgueltig
    fn abgespielt_bis(&mut self, seq: u64) {
        self.zuletzt_abgespielt = Some(seq);
        self.fehlend = self.fehlend.split_off(&seq.saturating_add(1));
    }

    /// Stream-Neustart: Queue und Cursor leeren, Zaehler behalten
    fn neustart(&mut self) {
        self.queue.clear();
        self.erwartet = None;
        self.zuletzt_abgespielt = None;
        self.fehlend.clear();
        self.vorige_ankunft = None;
        self.puffernd = true;
        self.zaehler.neustarts += 1;
    }

    fn messwerte_aufnehmen(&mut self, paket: &AudioPaket, jetzt_ms: f64) {
        if let Some((ankunft, zeitstempel)) = self.vorige_ankunft {
            let beobachtet = jetzt_ms - ankunft;
            let soll = paket.timestamp as f64 - zeitstempel as f64;
            let abweichung = (beobachtet - soll).abs();
            self.jitter_ms += (abweichung - self.jitter_ms) / JITTER_GLAETTUNG;
            verlauf_anhaengen(&mut self.jitter_verlauf, self.jitter_ms, self.config.verlauf_laenge);
        }
        self.vorige_ankunft = Some((jetzt_ms, paket.timestamp));

        let latenz = (jetzt_ms - paket.timestamp as f64).max(0.0);
        verlauf_anhaengen(&mut self.latenz_verlauf, latenz, self.config.verlauf_laenge);
    }

    fn verlust_rate(&self) -> f64 {
        let gesamt = self.zaehler.empfangen + self.zaehler.verloren;
        if gesamt == 0 {
            return 0.0;
        }
        self.zaehler.verloren as f64 / gesamt as f64
    }

    fn groessen_neu_berechnen(&mut self) {
        let qualitaet = Netzqualitaet::einstufen(
            mittelwert(&self.jitter_verlauf),
            mittelwert(&self.latenz_verlauf),
            self.verlust_rate(),
        );
        let groessen = self.config.statisch.angepasst(qualitaet);
        if qualitaet != self.qualitaet || groessen != self.groessen {
            tracing::debug!(
                qualitaet = ?qualitaet,
                min = groessen.min,
                ziel = groessen.ziel,
                max = groessen.max,
                "Jitter-Buffer-Groessen angepasst"
            );
        }
        self.qualitaet = qualitaet;
        self.groessen = groessen;
    }
}

fn verlauf_anhaengen(verlauf: &mut VecDeque<f64>, wert: f64, laenge: usize) {
    verlauf.push_back(wert);
    while verlauf.len() > laenge.max(1) {
        verlauf.pop_front();
    }
}

fn mittelwert(werte: &VecDeque<f64>) -> f64 {
    if werte.is_empty() {
        return 0.0;
    }
    werte.iter().sum::<f64>() / werte.len() as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TAKT_MS: u64 = 341;

    fn paket(seq: u64) -> AudioPaket {
        AudioPaket::pcm(0, vec![seq as f32], seq * TAKT_MS, seq)
    }

    /// Ankunft mit 30 ms Latenz und ohne Jitter
    fn ankunft(seq: u64) -> f64 {
        (seq * TAKT_MS + 30) as f64
    }

    fn buffer(min: usize, ziel: usize, max: usize) -> JitterBuffer {
        JitterBuffer::neu(JitterBufferConfig {
            statisch: PufferGroessen { min, ziel, max },
            ..JitterBufferConfig::default()
        })
    }

    fn sequenzen(pakete: &[AudioPaket]) -> Vec<u64> {
        pakete.iter().map(|p| p.sequence).collect()
    }

    #[test]
    fn jitter_buffer_out_of_order() {
        let mut jb = buffer(1, 2, 10);
        for seq in [1, 3, 2, 4] {
            jb.paket_hinzufuegen(paket(seq), ankunft(seq));
        }
        assert_eq!(sequenzen(&jb.ausleeren()), vec![1, 2, 3, 4]);
        let stats = jb.statistik();
        assert_eq!(stats.out_of_order, 1);
        assert_eq!(stats.verloren, 0);
    }

    #[test]
    fn pakete_vor_dem_ersten_schliessen_keine_luecke() {
        let mut jb = buffer(1, 2, 10);
        for seq in [3, 6, 2] {
            jb.paket_hinzufuegen(paket(seq), ankunft(seq));
        }
        let stats = jb.statistik();
        // 4 und 5 fehlen, die 2 lag nie in einer Luecke
        assert_eq!(stats.verloren, 2);
        assert_eq!(stats.out_of_order, 1);

        jb.paket_hinzufuegen(paket(5), ankunft(5));
        assert_eq!(jb.statistik().verloren, 1);
        jb.paket_hinzufuegen(paket(5), ankunft(5));
        assert_eq!(jb.statistik().verloren, 1);
        assert_eq!(jb.statistik().duplikate, 1);
    }

    #[test]
    fn abgespielte_luecke_bleibt_verloren() {
        let mut jb = buffer(1, 2, 10);
        for seq in [1, 2, 4, 5] {
            jb.paket_hinzufuegen(paket(seq), ankunft(seq));
        }
        assert_eq!(sequenzen(&jb.ausleeren()), vec![1, 2, 4, 5]);
        jb.paket_hinzufuegen(paket(3), ankunft(6));
        let stats = jb.statistik();
        assert_eq!(stats.verloren, 1);
        assert_eq!(stats.verspaetet, 1);
    }

    #[test]
    fn luecke_zaehlt_verlust_und_setzt_cursor() {
        let mut jb = JitterBuffer::default();
        for seq in [1, 2, 5, 6] {
            jb.paket_hinzufuegen(paket(seq), ankunft(seq));
        }
        assert_eq!(jb.statistik().verloren, 2);
        assert_eq!(jb.erwartete_sequenz(), Some(6));
    }

    #[test]
    fn jitter_buffer_duplikate_verwerfen() {
        let mut jb = JitterBuffer::default();
        for seq in [1, 2, 2, 3] {
            jb.paket_hinzufuegen(paket(seq), ankunft(seq));
        }
        assert_eq!(jb.fuellstand(), 3);
        assert_eq!(jb.statistik().duplikate, 1);
        assert_eq!(sequenzen(&jb.ausleeren()), vec![1, 2, 3]);
    }

    #[test]
    fn erstes_paket_zaehlt_keinen_verlust() {
        let mut jb = JitterBuffer::default();
        jb.paket_hinzufuegen(paket(500), ankunft(500));
        assert_eq!(jb.statistik().verloren, 0);
        assert_eq!(jb.erwartete_sequenz(), Some(500));
    }

    #[test]
    fn puffert_bis_mindestgroesse() {
        let mut jb = JitterBuffer::default();
        jb.paket_hinzufuegen(paket(1), ankunft(1));
        assert!(jb.ist_puffernd());
        assert!(!jb.hat_genug_daten());
        assert!(jb.naechstes_paket().is_none());

        jb.paket_hinzufuegen(paket(2), ankunft(2));
        assert!(jb.hat_genug_daten());
        assert_eq!(jb.naechstes_paket().map(|p| p.sequence), Some(1));

        // Unter die Mindestgroesse gefallen: wieder puffern
        assert!(jb.naechstes_paket().is_none());
        assert!(jb.ist_puffernd());
    }

    #[test]
    fn abgespieltes_paket_ist_verspaetet() {
        let mut jb = buffer(1, 2, 10);
        jb.paket_hinzufuegen(paket(1), ankunft(1));
        jb.paket_hinzufuegen(paket(2), ankunft(2));
        assert_eq!(jb.naechstes_paket().map(|p| p.sequence), Some(1));

        jb.paket_hinzufuegen(paket(1), ankunft(3));
        assert_eq!(jb.statistik().verspaetet, 1);
        assert_eq!(sequenzen(&jb.ausleeren()), vec![2]);
    }

    #[test]
    fn ueberlauf_entfernt_aelteste() {
        let mut jb = buffer(1, 2, 3);
        for seq in 1..=5 {
            jb.paket_hinzufuegen(paket(seq), ankunft(seq));
        }
        assert_eq!(jb.fuellstand(), 3);
        assert_eq!(jb.statistik().verworfen, 2);
        assert_eq!(sequenzen(&jb.ausleeren()), vec![3, 4, 5]);
    }

    #[test]
    fn sprung_zurueck_ist_neustart() {
        let mut jb = buffer(1, 2, 3);
        for seq in 100..=103 {
            jb.paket_hinzufuegen(paket(seq), ankunft(seq));
        }
        while jb.naechstes_paket().is_some() {}

        // Neuer Sender beginnt wieder bei 1
        jb.paket_hinzufuegen(paket(1), ankunft(104));
        let stats = jb.statistik();
        assert_eq!(stats.neustarts, 1);
        assert_eq!(stats.verspaetet, 0);
        assert_eq!(jb.erwartete_sequenz(), Some(1));
        assert_eq!(jb.naechstes_paket().map(|p| p.sequence), Some(1));
    }

    #[test]
    fn stabiler_stream_wird_excellent() {
        let mut jb = JitterBuffer::default();
        for seq in 1..=200 {
            jb.paket_hinzufuegen(paket(seq), ankunft(seq));
            while jb.naechstes_paket().is_some() {}
            if seq >= 50 {
                assert_eq!(jb.qualitaet(), Netzqualitaet::Excellent, "bei Paket {seq}");
            }
        }
        assert_eq!(jb.groessen(), PufferGroessen { min: 1, ziel: 2, max: 6 });
        let stats = jb.statistik();
        assert_eq!(stats.verloren, 0);
        assert!(stats.latenz_ms > 29.0 && stats.latenz_ms < 31.0);
    }

    #[test]
    fn starker_jitter_vergroessert_puffer() {
        let mut jb = JitterBuffer::default();
        for seq in 1..=50u64 {
            // Abwechselnd 250 ms zu frueh bzw. zu spaet
            let versatz = if seq % 2 == 0 { 250.0 } else { -250.0 };
            jb.paket_hinzufuegen(paket(seq), ankunft(seq) + 300.0 + versatz);
        }
        assert_eq!(jb.qualitaet(), Netzqualitaet::Poor);
        assert_eq!(jb.groessen(), PufferGroessen { min: 4, ziel: 8, max: 20 });
    }

    #[test]
    fn zuruecksetzen_loescht_alles() {
        let mut jb = JitterBuffer::default();
        for seq in 1..=4 {
            jb.paket_hinzufuegen(paket(seq), ankunft(seq));
        }
        jb.zuruecksetzen();
        assert_eq!(jb.fuellstand(), 0);
        assert_eq!(jb.statistik().empfangen, 0);
        assert!(jb.ist_puffernd());
        assert_eq!(jb.erwartete_sequenz(), None);
    }
}
