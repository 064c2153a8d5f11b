//! klangbruecke-auth – Zugang zu Raeumen
//!
//! Dieses Crate implementiert:
//! - Regeln und Argon2id-Hashing fuer Raum-Zugangsgeheimnisse
//! - Raum-Tokens (in-memory mit TTL, an einen Raum und eine Rolle gebunden)
//! - Die Schnittstelle zum externen Anmeldedienst (Nachweis -> Identitaet)

pub mod anmeldung;
pub mod error;
pub mod geheimnis;
pub mod token;

// Bequeme Re-Exporte
pub use anmeldung::{Anmeldedienst, StatischeAnmeldung};
pub use error::{AuthError, AuthResult};
pub use geheimnis::{geheimnis_hashen, geheimnis_pruefen, geheimnis_verifizieren};
pub use token::{AusgestellterToken, TokenClaims, TokenRolle, TokenStore};
