//! klangbruecke-db – Dauerhafte Raum-Datensaetze
//!
//! Das Relay haelt Raeume im Speicher. Dieses Crate speichert zusaetzlich
//! einen dauerhaften Datensatz pro Raum (fuer die Verwaltungsoberflaeche)
//! und die Kanal-zu-Geraet-Zuweisungen. Zwei Implementierungen stehen
//! hinter [`RaumRepository`]: SQLite und ein reiner Speicher-Store.

pub mod error;
pub mod models;
pub mod repository;
pub mod speicher;
pub mod sqlite;

pub use error::DbError;
pub use models::{GeraeteZuweisung, RaumRecord};
pub use repository::{DatabaseConfig, DbResult, RaumRepository};
pub use speicher::SpeicherDb;
pub use sqlite::SqliteDb;
