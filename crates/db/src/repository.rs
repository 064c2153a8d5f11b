//! Repository-Trait und Verbindungskonfiguration
//!
//! Das Relay spricht nur mit `Arc<dyn RaumRepository>`, damit Tests und
//! Installationen ohne Datenbank den Speicher-Store einsetzen koennen.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use klangbruecke_core::{IdentityId, SessionId};

use crate::error::DbError;
use crate::models::{GeraeteZuweisung, RaumRecord};

pub type DbResult<T> = Result<T, DbError>;

/// Konfiguration fuer die Datenbankverbindung
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Verbindungs-URL (z.B. "sqlite://klangbruecke.db")
    pub url: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen im Pool
    pub max_verbindungen: u32,
    /// Ob WAL-Modus aktiviert werden soll
    pub sqlite_wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://klangbruecke.db".into(),
            max_verbindungen: 5,
            sqlite_wal: true,
        }
    }
}

#[async_trait]
pub trait RaumRepository: Send + Sync {
    /// Legt einen Datensatz an oder ersetzt ihn
    async fn speichern(&self, raum: &RaumRecord) -> DbResult<()>;

    async fn laden(&self, id: SessionId) -> DbResult<Option<RaumRecord>>;

    /// Markiert einen Raum als geschlossen
    async fn inaktiv_markieren(&self, id: SessionId, zeitpunkt: DateTime<Utc>) -> DbResult<bool>;

    /// Alle Raeume eines Besitzers, neueste zuerst
    async fn nach_besitzer(&self, besitzer: IdentityId) -> DbResult<Vec<RaumRecord>>;

    /// Loescht einen Raum samt Zuweisungen
    async fn loeschen(&self, id: SessionId) -> DbResult<bool>;

    /// Setzt die Zuweisung fuer `(session_id, kanal)`, eine vorhandene wird ersetzt
    async fn zuweisung_setzen(&self, zuweisung: &GeraeteZuweisung) -> DbResult<()>;

    /// Zuweisungen eines Raums, nach Kanal sortiert
    async fn zuweisungen(&self, id: SessionId) -> DbResult<Vec<GeraeteZuweisung>>;
}
