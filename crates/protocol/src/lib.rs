//! klangbruecke-protocol – Nachrichtenprotokoll und Audio-Paketformat
//!
//! Dieses Crate definiert alle Nachrichten, die zwischen Sender, Relay und
//! Zuhoerern ausgetauscht werden, das Frame-Format fuer TCP sowie die
//! Schnittstelle zum (externen) Audio-Codec.

pub mod audio;
pub mod codec;
pub mod error;
pub mod format;
pub mod nachricht;
pub mod wire;

pub use audio::{AudioPaket, Kodierung, Nutzdaten};
pub use codec::{AudioCodec, PcmCodec};
pub use error::{ProtocolError, ProtocolResult};
pub use format::AudioFormat;
pub use nachricht::{ErrorCode, Nachricht, RaumStatus, Raumzustand};
pub use wire::FrameCodec;
