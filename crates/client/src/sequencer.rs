//! Sequenzvergabe des Senders
//!
//! Jeder logische Kanal zaehlt unabhaengig ab 1. Die Nummern sind nur
//! innerhalb der Verbindung des Senders gueltig, das Relay stempelt sie
//! vor der Weiterleitung neu.

use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct PaketSequenzer {
    zaehler: HashMap<u16, u64>,
}

impl PaketSequenzer {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Liefert die naechste Sequenznummer fuer `kanal`
    pub fn naechste(&mut self, kanal: u16) -> u64 {
        let z = self.zaehler.entry(kanal).or_insert(0);
        *z += 1;
        *z
    }

    /// Zuletzt vergebene Nummer (0 = noch keine)
    pub fn aktuell(&self, kanal: u16) -> u64 {
        self.zaehler.get(&kanal).copied().unwrap_or(0)
    }

    /// Bei neuer Verbindung zum Relay wieder bei 1 beginnen
    pub fn zuruecksetzen(&mut self) {
        self.zaehler.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kanaele_zaehlen_unabhaengig() {
        let mut seq = PaketSequenzer::neu();
        assert_eq!(seq.naechste(0), 1);
        assert_eq!(seq.naechste(0), 2);
        assert_eq!(seq.naechste(3), 1);
        assert_eq!(seq.naechste(0), 3);
        assert_eq!(seq.aktuell(3), 1);
        assert_eq!(seq.aktuell(7), 0);
    }

    #[test]
    fn zuruecksetzen_beginnt_bei_eins() {
        let mut seq = PaketSequenzer::neu();
        seq.naechste(1);
        seq.naechste(1);
        seq.zuruecksetzen();
        assert_eq!(seq.naechste(1), 1);
    }
}
