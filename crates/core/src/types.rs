//! Gemeinsame Identifikationstypen fuer Klangbruecke
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Raum-, Verbindungs- und Identitaets-IDs zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $praefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Erstellt eine neue zufaellige ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Gibt die innere UUID zurueck
            pub fn inner(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                Self(u)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($praefix, ":{}"), self.0)
            }
        }
    };
}

uuid_id!(
    /// Stabile ID eines Raums (Session), wird auf dem Draht verwendet
    SessionId,
    "session"
);

uuid_id!(
    /// ID einer einzelnen Transportverbindung
    ConnectionId,
    "conn"
);

uuid_id!(
    /// Authentifizierte Identitaet eines Besitzers bzw. Senders
    IdentityId,
    "identity"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_sind_eindeutig() {
        assert_ne!(SessionId::new(), SessionId::new());
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[test]
    fn anzeige_mit_praefix() {
        let id = IdentityId::new();
        assert!(id.to_string().starts_with("identity:"));
        assert!(SessionId::new().to_string().starts_with("session:"));
    }

    #[test]
    fn serde_als_reine_uuid() {
        let uuid = Uuid::new_v4();
        let id = SessionId(uuid);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{uuid}\""));
        let zurueck: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, id);
    }
}
