//! Raum-Tokens
//!
//! Beim Anlegen und Beitreten eines Raums wird ein Token ausgestellt, das
//! auf genau diesen Raum und eine Rolle beschraenkt ist. Tokens sind opake
//! Zufallsstrings, die Claims liegen nur im Speicher des Relays.
//! Ein Hintergrund-Task bereinigt abgelaufene Tokens.

use std::{collections::HashMap, sync::Arc, time::Duration};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use klangbruecke_core::{IdentityId, SessionId, SystemUhr, Uhr};
use parking_lot::RwLock;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthResult};

/// Standard-Lebensdauer: 12 Stunden
pub const STANDARD_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Rolle, fuer die ein Token gilt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenRolle {
    Sender,
    Zuhoerer,
}

/// Inhalt eines Tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub session_id: SessionId,
    pub rolle: TokenRolle,
    /// Identitaet des Besitzers, bei anonymen Zuhoerern `None`
    pub identitaet: Option<IdentityId>,
    pub ausgestellt_am: DateTime<Utc>,
    pub laeuft_ab_am: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AusgestellterToken {
    pub token: String,
    pub claims: TokenClaims,
}

/// In-Memory Token-Store mit TTL
#[derive(Debug)]
pub struct TokenStore {
    tokens: RwLock<HashMap<String, TokenClaims>>,
    ttl: chrono::Duration,
    uhr: Arc<dyn Uhr>,
}

impl TokenStore {
    pub fn neu(ttl: Duration) -> Arc<Self> {
        Self::mit_uhr(ttl, Arc::new(SystemUhr))
    }

    pub fn mit_uhr(ttl: Duration, uhr: Arc<dyn Uhr>) -> Arc<Self> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::hours(12));
        Arc::new(Self {
            tokens: RwLock::new(HashMap::new()),
            ttl,
            uhr,
        })
    }

    /// Startet den periodischen Cleanup-Task
    pub fn bereinigung_starten(
        self: &Arc<Self>,
        intervall: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut takt = tokio::time::interval(intervall);
            takt.tick().await;
            loop {
                takt.tick().await;
                let entfernt = store.abgelaufene_bereinigen();
                if entfernt > 0 {
                    tracing::debug!(anzahl = entfernt, "Abgelaufene Tokens bereinigt");
                }
            }
        })
    }

    /// Stellt ein neues Token fuer Raum und Rolle aus
    pub fn ausstellen(
        &self,
        session_id: SessionId,
        rolle: TokenRolle,
        identitaet: Option<IdentityId>,
    ) -> AusgestellterToken {
        let token = token_generieren();
        let jetzt = self.uhr.jetzt();
        let claims = TokenClaims {
            session_id,
            rolle,
            identitaet,
            ausgestellt_am: jetzt,
            laeuft_ab_am: jetzt + self.ttl,
        };
        self.tokens.write().insert(token.clone(), claims.clone());
        tracing::debug!(session_id = %session_id, rolle = ?rolle, "Token ausgestellt");
        AusgestellterToken { token, claims }
    }

    /// Prueft ein Token gegen Raum und (optional) Rolle
    pub fn pruefen(
        &self,
        token: &str,
        session_id: SessionId,
        rolle: Option<TokenRolle>,
    ) -> AuthResult<TokenClaims> {
        let tokens = self.tokens.read();
        let claims = tokens.get(token).ok_or(AuthError::TokenUngueltig)?;
        if claims.laeuft_ab_am <= self.uhr.jetzt() {
            return Err(AuthError::TokenAbgelaufen);
        }
        if claims.session_id != session_id {
            return Err(AuthError::FalscherGeltungsbereich(session_id.to_string()));
        }
        if let Some(rolle) = rolle {
            if claims.rolle != rolle {
                return Err(AuthError::FalscherGeltungsbereich(format!("Rolle {rolle:?}")));
            }
        }
        Ok(claims.clone())
    }

    /// Entfernt alle Tokens eines Raums, gibt die Anzahl zurueck
    pub fn raum_widerrufen(&self, session_id: SessionId) -> usize {
        let mut tokens = self.tokens.write();
        let vorher = tokens.len();
        tokens.retain(|_, c| c.session_id != session_id);
        vorher - tokens.len()
    }

    pub fn abgelaufene_bereinigen(&self) -> usize {
        let jetzt = self.uhr.jetzt();
        let mut tokens = self.tokens.write();
        let vorher = tokens.len();
        tokens.retain(|_, c| c.laeuft_ab_am > jetzt);
        vorher - tokens.len()
    }

    pub fn anzahl(&self) -> usize {
        self.tokens.read().len()
    }
}

/// Kryptografisch zufaelliges Token (32 Bytes, URL-sicheres Base64)
fn token_generieren() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
