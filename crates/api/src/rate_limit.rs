//! Rate Limiter fuer die oeffentlichen Endpunkte
//!
//! Token-Bucket pro Client-IP. Beitreten prueft ein Geheimnis und ist
//! deshalb enger begrenzt als das Anlegen durch angemeldete Besitzer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

#[derive(Debug, Clone)]
pub struct RateLimitKonfig {
    /// Beitrittsversuche pro Minute und IP
    pub beitritte_pro_minute: u32,
    /// Neue Raeume pro Minute und IP
    pub anlegen_pro_minute: u32,
}

impl Default for RateLimitKonfig {
    fn default() -> Self {
        Self {
            beitritte_pro_minute: 30,
            anlegen_pro_minute: 10,
        }
    }
}

/// Welcher Bucket eine Anfrage belastet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vorgang {
    Beitreten,
    Anlegen,
}

#[derive(Debug)]
struct TokenBucket {
    token: f64,
    max_token: f64,
    /// Token pro Sekunde
    fuellrate: f64,
    letzte_auffuellung: Instant,
}

impl TokenBucket {
    fn neu(pro_minute: u32) -> Self {
        let max = f64::from(pro_minute.max(1));
        Self {
            token: max,
            max_token: max,
            fuellrate: max / 60.0,
            letzte_auffuellung: Instant::now(),
        }
    }

    fn verbrauchen(&mut self) -> bool {
        self.auffuellen();
        if self.token >= 1.0 {
            self.token -= 1.0;
            true
        } else {
            false
        }
    }

    fn retry_after_secs(&mut self) -> u64 {
        self.auffuellen();
        let fehlend = 1.0 - self.token;
        if fehlend <= 0.0 {
            return 0;
        }
        (fehlend / self.fuellrate).ceil() as u64
    }

    fn auffuellen(&mut self) {
        let jetzt = Instant::now();
        let vergangen = jetzt.duration_since(self.letzte_auffuellung).as_secs_f64();
        self.token = (self.token + vergangen * self.fuellrate).min(self.max_token);
        self.letzte_auffuellung = jetzt;
    }
}

#[derive(Debug)]
pub struct RateLimiter {
    konfig: RateLimitKonfig,
    beitritte: Mutex<HashMap<String, TokenBucket>>,
    anlegen: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    pub fn neu(konfig: RateLimitKonfig) -> Arc<Self> {
        Arc::new(Self {
            konfig,
            beitritte: Mutex::new(HashMap::new()),
            anlegen: Mutex::new(HashMap::new()),
        })
    }

    /// `Ok(())` wenn erlaubt, sonst `Err(retry_after_secs)`
    pub fn pruefen(&self, vorgang: Vorgang, ip: &str) -> Result<(), u64> {
        let (buckets, limit) = match vorgang {
            Vorgang::Beitreten => (&self.beitritte, self.konfig.beitritte_pro_minute),
            Vorgang::Anlegen => (&self.anlegen, self.konfig.anlegen_pro_minute),
        };
        let mut buckets = buckets.lock();
        let bucket = buckets
            .entry(ip.to_string())
            .or_insert_with(|| TokenBucket::neu(limit));
        if bucket.verbrauchen() {
            Ok(())
        } else {
            Err(bucket.retry_after_secs())
        }
    }

    /// Entfernt Buckets, die seit fuenf Minuten unbenutzt sind
    pub fn aufraeumen(&self) {
        let schwelle = Duration::from_secs(5 * 60);
        let jetzt = Instant::now();
        for buckets in [&self.beitritte, &self.anlegen] {
            buckets
                .lock()
                .retain(|_, b| jetzt.duration_since(b.letzte_auffuellung) < schwelle);
        }
    }
}
