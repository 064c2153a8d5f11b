//! Repository ohne Datenbank
//!
//! Haelt alle Datensaetze in einer `DashMap`. Wird verwendet, wenn die
//! Datenbank in der Konfiguration abgeschaltet ist, und in Tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use klangbruecke_core::{IdentityId, SessionId};

use crate::error::DbError;
use crate::models::{GeraeteZuweisung, RaumRecord};
use crate::repository::{DbResult, RaumRepository};

#[derive(Debug, Default)]
pub struct SpeicherDb {
    raeume: DashMap<SessionId, RaumRecord>,
    zuweisungen: DashMap<SessionId, BTreeMap<u16, GeraeteZuweisung>>,
}

impl SpeicherDb {
    pub fn neu() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RaumRepository for SpeicherDb {
    async fn speichern(&self, raum: &RaumRecord) -> DbResult<()> {
        self.raeume.insert(raum.id, raum.clone());
        Ok(())
    }

    async fn laden(&self, id: SessionId) -> DbResult<Option<RaumRecord>> {
        Ok(self.raeume.get(&id).map(|r| r.clone()))
    }

    async fn inaktiv_markieren(&self, id: SessionId, zeitpunkt: DateTime<Utc>) -> DbResult<bool> {
        Ok(match self.raeume.get_mut(&id) {
            Some(mut raum) => {
                raum.aktiv = false;
                raum.geschlossen_am = Some(zeitpunkt);
                true
            }
            None => false,
        })
    }

    async fn nach_besitzer(&self, besitzer: IdentityId) -> DbResult<Vec<RaumRecord>> {
        let mut liste: Vec<RaumRecord> = self
            .raeume
            .iter()
            .filter(|r| r.besitzer == besitzer)
            .map(|r| r.clone())
            .collect();
        liste.sort_by(|a, b| b.erstellt_am.cmp(&a.erstellt_am));
        Ok(liste)
    }

    async fn loeschen(&self, id: SessionId) -> DbResult<bool> {
        self.zuweisungen.remove(&id);
        Ok(self.raeume.remove(&id).is_some())
    }

    async fn zuweisung_setzen(&self, zuweisung: &GeraeteZuweisung) -> DbResult<()> {
        if !self.raeume.contains_key(&zuweisung.session_id) {
            return Err(DbError::nicht_gefunden(format!(
                "Raum {}",
                zuweisung.session_id
            )));
        }
        self.zuweisungen
            .entry(zuweisung.session_id)
            .or_default()
            .insert(zuweisung.kanal, zuweisung.clone());
        Ok(())
    }

    async fn zuweisungen(&self, id: SessionId) -> DbResult<Vec<GeraeteZuweisung>> {
        Ok(self
            .zuweisungen
            .get(&id)
            .map(|z| z.values().cloned().collect())
            .unwrap_or_default())
    }
}
