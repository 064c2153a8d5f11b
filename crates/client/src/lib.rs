//! klangbruecke-client – Sender- und Zuhoerer-Seite
//!
//! Sender: Capture-Frames werden pro Kanal gebatcht, nummeriert und ueber
//! die [`RelayVerbindung`] verschickt.
//!
//! Zuhoerer: empfangene Pakete laufen ueber eine Queue in die
//! [`WiedergabeSchleife`], die pro Kanal einen adaptiven [`JitterBuffer`]
//! fuettert und die Ausgabe zeitlich plant.
//!
//! ```text
//! Capture-Callback --crossbeam--> CaptureBatcher --> TCP --> Relay
//! Relay --> TCP --> Ereignis-Queue --crossbeam--> JitterBuffer --> Ausgabe
//! ```

pub mod capture;
pub mod error;
pub mod jitter_buffer;
pub mod playback;
pub mod qualitaet;
pub mod sequencer;
pub mod verbindung;
pub mod wiedergabe;

pub use capture::{capture_kanal, CaptureBatcher, CaptureEingang, CaptureFrame};
pub use error::{ClientError, ClientResult};
pub use jitter_buffer::{JitterBuffer, JitterBufferConfig, JitterBufferStatistik};
pub use playback::{wiedergaberate, AudioAusgabe, PlaybackConfig, PlaybackScheduler};
pub use qualitaet::{Netzqualitaet, PufferGroessen};
pub use sequencer::PaketSequenzer;
pub use verbindung::{EmpfangsBericht, Ereignis, RelayVerbindung, SendeBericht};
pub use wiedergabe::WiedergabeSchleife;
