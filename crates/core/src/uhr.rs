//! Zeitquellen
//!
//! Der Raum-Manager liest die Zeit nur ueber [`Uhr`], damit Gnadenfristen
//! in Tests mit einer simulierten Uhr geprueft werden koennen.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Austauschbare Zeitquelle
pub trait Uhr: Send + Sync + std::fmt::Debug {
    fn jetzt(&self) -> DateTime<Utc>;
}

/// Echte Systemzeit
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemUhr;

impl Uhr for SystemUhr {
    fn jetzt(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manuell gestellte Uhr fuer Tests
#[derive(Debug)]
pub struct TestUhr {
    jetzt: Mutex<DateTime<Utc>>,
}

impl TestUhr {
    pub fn neu(start: DateTime<Utc>) -> Self {
        Self {
            jetzt: Mutex::new(start),
        }
    }

    /// Stellt die Uhr um `dauer` vor
    pub fn vorstellen(&self, dauer: Duration) {
        let mut jetzt = self.jetzt.lock();
        *jetzt += dauer;
    }

    pub fn setzen(&self, zeitpunkt: DateTime<Utc>) {
        *self.jetzt.lock() = zeitpunkt;
    }
}

impl Default for TestUhr {
    fn default() -> Self {
        Self::neu(Utc::now())
    }
}

impl Uhr for TestUhr {
    fn jetzt(&self) -> DateTime<Utc> {
        *self.jetzt.lock()
    }
}
