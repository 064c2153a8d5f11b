//! Kanalpuffer eines Raums
//!
//! Eine FIFO-Queue pro Kanal. Eingehende Pakete werden hinten angehaengt,
//! jeder Relay-Zyklus entnimmt vorne. Es wird nie umsortiert.
//!
//! Der Puffer traegt auch die Unterphase `Puffernd -> Weiterleitend`:
//! erst wenn jeder bisher gesehene Kanal mindestens `schwelle` Pakete
//! haelt, wird weitergeleitet. Der Uebergang passiert genau einmal pro
//! Zuruecksetzen.

use std::collections::VecDeque;

use klangbruecke_protocol::AudioPaket;

use crate::error::{RelayError, RelayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PufferPhase {
    /// Sender ist neu angemeldet, Vorlauf wird gesammelt
    Puffernd,
    /// Vorlauf erreicht, der Scheduler darf laufen
    Weiterleitend,
}

#[derive(Debug)]
pub struct KanalPuffer {
    kanaele: Vec<VecDeque<AudioPaket>>,
    /// Kanaele, die seit dem letzten Zuruecksetzen Pakete erhalten haben
    gesehen: Vec<bool>,
    phase: PufferPhase,
    schwelle: usize,
    kapazitaet: usize,
    max_kanaele: u16,
}

impl KanalPuffer {
    pub fn neu(schwelle: usize, kapazitaet: usize, max_kanaele: u16) -> Self {
        Self {
            kanaele: Vec::new(),
            gesehen: Vec::new(),
            phase: PufferPhase::Puffernd,
            schwelle: schwelle.max(1),
            kapazitaet: kapazitaet.max(1),
            max_kanaele,
        }
    }

    /// Haengt ein Paket an die Queue seines Kanals an
    ///
    /// Gibt `true` zurueck, wenn dafuer das aelteste Paket verdraengt wurde.
    pub fn einreihen(&mut self, paket: AudioPaket) -> RelayResult<bool> {
        let kanal = paket.channel;
        if kanal >= self.max_kanaele {
            return Err(RelayError::Ungueltig(format!(
                "Kanal {kanal} ausserhalb von 0..{}",
                self.max_kanaele
            )));
        }

        let idx = usize::from(kanal);
        if idx >= self.kanaele.len() {
            self.kanaele.resize_with(idx + 1, VecDeque::new);
            self.gesehen.resize(idx + 1, false);
        }
        self.gesehen[idx] = true;

        let queue = &mut self.kanaele[idx];
        let verdraengt = if queue.len() >= self.kapazitaet {
            queue.pop_front();
            true
        } else {
            false
        };
        queue.push_back(paket);
        Ok(verdraengt)
    }

    /// Prueft den Vorlauf und schaltet ggf. auf `Weiterleitend`
    ///
    /// Liefert nur beim Uebergang `true`.
    pub fn gate_pruefen(&mut self) -> bool {
        if self.phase == PufferPhase::Weiterleitend {
            return false;
        }
        let minimum = self
            .kanaele
            .iter()
            .zip(&self.gesehen)
            .filter(|(_, gesehen)| **gesehen)
            .map(|(queue, _)| queue.len())
            .min();
        match minimum {
            Some(min) if min >= self.schwelle => {
                self.phase = PufferPhase::Weiterleitend;
                true
            }
            _ => false,
        }
    }

    /// Entnimmt das aelteste Paket jedes nicht-leeren Kanals, in Kanalreihenfolge
    pub fn zyklus(&mut self) -> Vec<AudioPaket> {
        self.kanaele
            .iter_mut()
            .filter_map(VecDeque::pop_front)
            .collect()
    }

    pub fn zuruecksetzen(&mut self) {
        self.kanaele.clear();
        self.gesehen.clear();
        self.phase = PufferPhase::Puffernd;
    }

    pub fn phase(&self) -> PufferPhase {
        self.phase
    }

    pub fn leitet_weiter(&self) -> bool {
        self.phase == PufferPhase::Weiterleitend
    }

    /// Fuellstand pro Kanal, Index = Kanalnummer
    pub fn fuellstaende(&self) -> Vec<usize> {
        self.kanaele.iter().map(VecDeque::len).collect()
    }

    pub fn schwelle(&self) -> usize {
        self.schwelle
    }
}
