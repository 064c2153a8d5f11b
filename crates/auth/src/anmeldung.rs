//! Schnittstelle zum Anmeldedienst
//!
//! Wer einen Raum anlegt, muss authentifiziert sein. Die Ausgabe von
//! Anmeldedaten gehoert nicht zu Klangbruecke: das Relay ruft nur
//! "Nachweis pruefen -> Identitaet" auf.

use std::collections::HashMap;

use async_trait::async_trait;
use klangbruecke_core::IdentityId;

use crate::error::{AuthError, AuthResult};

/// Externer Dienst, der einen Nachweis (z.B. Bearer-Token) in eine
/// Identitaet uebersetzt
#[async_trait]
pub trait Anmeldedienst: Send + Sync {
    async fn identitaet_pruefen(&self, nachweis: &str) -> AuthResult<IdentityId>;
}

/// Anmeldedienst mit fest konfigurierten Nachweisen
#[derive(Debug, Default, Clone)]
pub struct StatischeAnmeldung {
    nachweise: HashMap<String, IdentityId>,
}

impl StatischeAnmeldung {
    pub fn neu(nachweise: HashMap<String, IdentityId>) -> Self {
        Self { nachweise }
    }

    pub fn mit_nachweis(mut self, nachweis: impl Into<String>, identitaet: IdentityId) -> Self {
        self.nachweise.insert(nachweis.into(), identitaet);
        self
    }

    pub fn anzahl(&self) -> usize {
        self.nachweise.len()
    }
}

#[async_trait]
impl Anmeldedienst for StatischeAnmeldung {
    async fn identitaet_pruefen(&self, nachweis: &str) -> AuthResult<IdentityId> {
        self.nachweise
            .get(nachweis)
            .copied()
            .ok_or(AuthError::UngueltigeAnmeldedaten)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bekannter_nachweis_ergibt_identitaet() {
        let id = IdentityId::new();
        let dienst = StatischeAnmeldung::default().mit_nachweis("geheim-1", id);
        assert_eq!(dienst.identitaet_pruefen("geheim-1").await.unwrap(), id);
        assert_eq!(dienst.anzahl(), 1);
    }

    #[tokio::test]
    async fn unbekannter_nachweis_wird_abgelehnt() {
        let dienst = StatischeAnmeldung::default();
        assert!(matches!(
            dienst.identitaet_pruefen("falsch").await,
            Err(AuthError::UngueltigeAnmeldedaten)
        ));
    }
}
