//! klangbruecke-relay – Raum-Manager und Relay-Engine
//!
//! Nimmt gebuendeltes Audio eines Senders pro Raum entgegen und verteilt es
//! in festem Takt an alle Zuhoerer.
//!
//! ## Module
//! - [`manager`] – Registry aller Raeume, Lebenszyklus, Registrierung
//! - [`raum`] – Zustand eines Raums und der Relay-Zyklus
//! - [`puffer`] – FIFO-Kanalpuffer mit Vorlauf-Gate
//! - [`scheduler`] – Timer-Task pro Raum
//! - [`verbindung`] – Send-Queue und Abbruch einer Verbindung
//! - [`code`] – Raum-Codes

pub mod code;
pub mod config;
pub mod error;
pub mod manager;
pub mod puffer;
pub mod raum;
pub mod scheduler;
pub mod verbindung;

pub use code::{CodeQuelle, ZufallsCodes};
pub use config::RelayConfig;
pub use error::{RelayError, RelayResult};
pub use manager::{
    Abhaengigkeiten, Beitritt, ErstellteSitzung, NeueSitzung, RaumManager, RaumMomentaufnahme,
    SitzungsInfo,
};
pub use puffer::PufferPhase;
pub use raum::RelayErgebnis;
pub use verbindung::{SendeFehler, VerbindungsHandle};
