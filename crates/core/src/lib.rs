//! klangbruecke-core – Gemeinsame Typen, Fehlerklassen und Uhren
//!
//! Dieses Crate stellt die Bausteine bereit, die Relay, Client und
//! Schnittstellen gemeinsam nutzen: typisierte IDs, die Fehlertaxonomie
//! und eine austauschbare Zeitquelle.

pub mod error;
pub mod types;
pub mod uhr;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Fehlerklasse, KlangError, Result};
pub use types::{ConnectionId, IdentityId, SessionId};
pub use uhr::{SystemUhr, TestUhr, Uhr};
