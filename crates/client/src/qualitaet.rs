//! Einstufung der Netzqualitaet und adaptive Puffergroessen

use serde::Serialize;

/// Obergrenze fuer die adaptive Maximalgroesse in Paketen
pub const MAX_PUFFER_PAKETE: usize = 64;

/// Netzqualitaet aus Sicht eines Zuhoerers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Netzqualitaet {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Netzqualitaet {
    /// Stuft die Messwerte ein, alle drei Schwellen muessen erfuellt sein
    ///
    /// `verlust_rate` ist ein Anteil zwischen 0 und 1.
    pub fn einstufen(jitter_ms: f64, latenz_ms: f64, verlust_rate: f64) -> Self {
        if jitter_ms < 20.0 && latenz_ms < 100.0 && verlust_rate < 0.01 {
            Self::Excellent
        } else if jitter_ms < 50.0 && latenz_ms < 200.0 && verlust_rate < 0.03 {
            Self::Good
        } else if jitter_ms < 100.0 && latenz_ms < 400.0 && verlust_rate < 0.08 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn multiplikator(self) -> f64 {
        match self {
            Self::Excellent => 0.6,
            Self::Good => 1.0,
            Self::Fair => 1.5,
            Self::Poor => 2.0,
        }
    }
}

/// Puffergroessen in Paketen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PufferGroessen {
    pub min: usize,
    pub ziel: usize,
    pub max: usize,
}

impl Default for PufferGroessen {
    fn default() -> Self {
        Self {
            min: 2,
            ziel: 4,
            max: 10,
        }
    }
}

impl PufferGroessen {
    /// Skaliert die statischen Groessen mit dem Multiplikator der Qualitaet
    pub fn angepasst(self, qualitaet: Netzqualitaet) -> Self {
        let faktor = qualitaet.multiplikator();
        let skalieren = |wert: usize| (wert as f64 * faktor).round() as usize;
        Self {
            min: skalieren(self.min),
            ziel: skalieren(self.ziel),
            max: skalieren(self.max),
        }
        .begrenzt()
    }

    /// `min >= 1`, `ziel >= min`, `max >= ziel`, `max <= 64`
    pub fn begrenzt(self) -> Self {
        let max = self.max.min(MAX_PUFFER_PAKETE).max(1);
        let min = self.min.max(1).min(max);
        let ziel = self.ziel.max(min).min(max);
        Self { min, ziel, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn einstufung_nach_tabelle() {
        assert_eq!(Netzqualitaet::einstufen(5.0, 50.0, 0.0), Netzqualitaet::Excellent);
        assert_eq!(Netzqualitaet::einstufen(30.0, 50.0, 0.0), Netzqualitaet::Good);
        assert_eq!(Netzqualitaet::einstufen(5.0, 300.0, 0.0), Netzqualitaet::Fair);
        assert_eq!(Netzqualitaet::einstufen(5.0, 50.0, 0.05), Netzqualitaet::Fair);
        assert_eq!(Netzqualitaet::einstufen(150.0, 50.0, 0.0), Netzqualitaet::Poor);
        assert_eq!(Netzqualitaet::einstufen(5.0, 50.0, 0.2), Netzqualitaet::Poor);
    }

    #[test]
    fn schwellen_sind_exklusiv() {
        assert_eq!(Netzqualitaet::einstufen(20.0, 50.0, 0.0), Netzqualitaet::Good);
        assert_eq!(Netzqualitaet::einstufen(5.0, 100.0, 0.0), Netzqualitaet::Good);
        assert_eq!(Netzqualitaet::einstufen(5.0, 50.0, 0.01), Netzqualitaet::Good);
    }

    #[test]
    fn groessen_pro_qualitaet() {
        let statisch = PufferGroessen::default();
        assert_eq!(
            statisch.angepasst(Netzqualitaet::Excellent),
            PufferGroessen { min: 1, ziel: 2, max: 6 }
        );
        assert_eq!(statisch.angepasst(Netzqualitaet::Good), statisch);
        assert_eq!(
            statisch.angepasst(Netzqualitaet::Fair),
            PufferGroessen { min: 3, ziel: 6, max: 15 }
        );
        assert_eq!(
            statisch.angepasst(Netzqualitaet::Poor),
            PufferGroessen { min: 4, ziel: 8, max: 20 }
        );
    }

    #[test]
    fn begrenzung_haelt_ordnung_ein() {
        let g = PufferGroessen { min: 0, ziel: 0, max: 500 }.begrenzt();
        assert_eq!(g, PufferGroessen { min: 1, ziel: 1, max: 64 });

        let g = PufferGroessen { min: 40, ziel: 50, max: 40 }.angepasst(Netzqualitaet::Poor);
        assert!(g.min >= 1 && g.ziel >= g.min && g.max >= g.ziel && g.max <= 64);
    }
}
