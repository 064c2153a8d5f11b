//! klangbruecke-signaling – TCP-Transport des Relays
//!
//! Nimmt TCP-Verbindungen an, dekodiert Frames und reicht sie an den
//! Raum-Manager weiter.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |  Frames rein, Send-Queue raus, Keepalive
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     v
//! RaumManager (klangbruecke-relay)
//! ```

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod tcp;

pub use config::SignalingConfig;
pub use connection::{ClientConnection, TrennGrund};
pub use dispatcher::{MessageDispatcher, VerbindungsKontext};
pub use error::{SignalingError, SignalingResult};
pub use tcp::SignalingServer;
