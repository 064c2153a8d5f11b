//! Datensaetze

use chrono::{DateTime, Utc};
use klangbruecke_core::{IdentityId, SessionId};
use serde::{Deserialize, Serialize};

/// Dauerhafter Datensatz eines Raums
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaumRecord {
    pub id: SessionId,
    pub code: String,
    pub geheimnis_hash: String,
    pub besitzer: IdentityId,
    pub name: Option<String>,
    pub oeffentlich: bool,
    /// `false` sobald der Raum geschlossen wurde
    pub aktiv: bool,
    pub erstellt_am: DateTime<Utc>,
    pub geschlossen_am: Option<DateTime<Utc>>,
}

/// Ein Eingangskanal eines Aufnahmegeraets speist einen Raum-Kanal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeraeteZuweisung {
    pub session_id: SessionId,
    pub kanal: u16,
    pub geraet_id: String,
    pub geraet_kanal: u16,
    pub bezeichnung: Option<String>,
}
