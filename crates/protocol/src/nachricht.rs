//! Nachrichten zwischen Sender, Relay und Zuhoerern
//!
//! Jede Verbindung tauscht getaggte JSON-Objekte aus. Das Feld `type`
//! bestimmt die Variante, alle Felder sind camelCase:
//!
//! ```text
//! {"type":"registerListener","sessionId":"...","token":"..."}
//! {"type":"roomStatus","hasBroadcaster":true,"listenerCount":3,"state":"active"}
//! ```
//!
//! Die Nachricht wird genau einmal an der Transportgrenze dekodiert,
//! danach wird nur noch erschoepfend ueber [`Nachricht`] gematcht.

use chrono::{DateTime, Utc};
use klangbruecke_core::SessionId;
use serde::{Deserialize, Serialize};

use crate::audio::AudioPaket;

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Fehler-Codes in `error`-Nachrichten
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidMessage,
    AuthenticationFailed,
    Unauthorized,
    AlreadyBroadcasting,
    Conflict,
    NotFound,
    RoomClosed,
    InternalError,
}

// ---------------------------------------------------------------------------
// Raumzustand
// ---------------------------------------------------------------------------

/// Lebenszyklus eines Raums
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Raumzustand {
    #[serde(rename = "active")]
    Aktiv,
    #[serde(rename = "suspended")]
    Suspendiert,
    #[serde(rename = "closed")]
    Geschlossen,
}

impl std::fmt::Display for Raumzustand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Aktiv => "active",
            Self::Suspendiert => "suspended",
            Self::Geschlossen => "closed",
        })
    }
}

// ---------------------------------------------------------------------------
// Nutzlasten
// ---------------------------------------------------------------------------

/// Sender meldet sich fuer einen Raum an
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuelleAnmelden {
    pub session_id: SessionId,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuelleAngemeldet {
    pub channels: u16,
    pub sample_rate: u32,
    pub listener_count: usize,
}

/// Zuhoerer meldet sich fuer einen Raum an
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZuhoererAnmelden {
    pub session_id: SessionId,
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZuhoererAngemeldet {
    pub room_name: Option<String>,
    pub has_broadcaster: bool,
    pub listener_count: usize,
    pub state: Raumzustand,
    #[serde(default)]
    pub stream: u64,
}

/// Momentaufnahme eines Raums, wird bei jeder Aenderung verteilt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaumStatus {
    pub has_broadcaster: bool,
    pub listener_count: usize,
    pub state: Raumzustand,
    /// Steigt mit jeder Sender-Registrierung, die Relay-Sequenzen beginnen
    /// dann wieder bei 1
    #[serde(default)]
    pub stream: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaumSuspendiert {
    pub suspended_until: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaumGeschlossen {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Heartbeat, Zeitstempel in Millisekunden seit Unix-Epoche
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Herzschlag {
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FehlerAntwort {
    pub code: ErrorCode,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Nachricht
// ---------------------------------------------------------------------------

/// Alle Nachrichten des Protokolls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Nachricht {
    RegisterSource(QuelleAnmelden),
    SourceRegistered(QuelleAngemeldet),
    RegisterListener(ZuhoererAnmelden),
    ListenerRegistered(ZuhoererAngemeldet),
    Audio(AudioPaket),
    RoomStatus(RaumStatus),
    RoomSuspended(RaumSuspendiert),
    RoomClosed(RaumGeschlossen),
    Ping(Herzschlag),
    Pong(Herzschlag),
    Error(FehlerAntwort),
}

impl Nachricht {
    pub fn ping(timestamp: u64) -> Self {
        Self::Ping(Herzschlag { timestamp })
    }

    /// Antwort auf einen Ping, spiegelt dessen Zeitstempel
    pub fn pong(timestamp: u64) -> Self {
        Self::Pong(Herzschlag { timestamp })
    }

    pub fn fehler(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(FehlerAntwort {
            code,
            message: message.into(),
        })
    }

    pub fn geschlossen(reason: Option<String>) -> Self {
        Self::RoomClosed(RaumGeschlossen { reason })
    }

    /// Name der Variante wie auf dem Draht (fuer Logs)
    pub fn art(&self) -> &'static str {
        match self {
            Self::RegisterSource(_) => "registerSource",
            Self::SourceRegistered(_) => "sourceRegistered",
            Self::RegisterListener(_) => "registerListener",
            Self::ListenerRegistered(_) => "listenerRegistered",
            Self::Audio(_) => "audio",
            Self::RoomStatus(_) => "roomStatus",
            Self::RoomSuspended(_) => "roomSuspended",
            Self::RoomClosed(_) => "roomClosed",
            Self::Ping(_) => "ping",
            Self::Pong(_) => "pong",
            Self::Error(_) => "error",
        }
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn register_listener_draht_format() {
        let id = Uuid::new_v4();
        let json = format!(
            r#"{{"type":"registerListener","sessionId":"{id}","token":"abc","displayName":"Mia"}}"#
        );
        let nachricht = Nachricht::from_json(&json).unwrap();
        match nachricht {
            Nachricht::RegisterListener(r) => {
                assert_eq!(r.session_id, SessionId(id));
                assert_eq!(r.token, "abc");
                assert_eq!(r.display_name.as_deref(), Some("Mia"));
            }
            andere => panic!("Falsche Variante: {andere:?}"),
        }
    }

    #[test]
    fn room_status_draht_format() {
        let msg = Nachricht::RoomStatus(RaumStatus {
            has_broadcaster: true,
            listener_count: 3,
            state: Raumzustand::Suspendiert,
            stream: 2,
        });
        let wert: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(wert["type"], "roomStatus");
        assert_eq!(wert["hasBroadcaster"], true);
        assert_eq!(wert["listenerCount"], 3);
        assert_eq!(wert["state"], "suspended");
        assert_eq!(wert["stream"], 2);

        // Ohne Feld: Stream 0
        let alt = r#"{"type":"roomStatus","hasBroadcaster":false,"listenerCount":0,"state":"active"}"#;
        match Nachricht::from_json(alt).unwrap() {
            Nachricht::RoomStatus(s) => assert_eq!(s.stream, 0),
            andere => panic!("Falsche Variante: {andere:?}"),
        }
    }

    #[test]
    fn audio_nachricht_flach_getaggt() {
        let json = r#"{"type":"audio","channel":1,"data":[0.5],"encoding":"pcm","timestamp":9,"sequence":4,"bufferCount":4}"#;
        match Nachricht::from_json(json).unwrap() {
            Nachricht::Audio(p) => {
                assert_eq!(p.channel, 1);
                assert_eq!(p.sequence, 4);
                assert_eq!(p.buffer_count, Some(4));
            }
            andere => panic!("Falsche Variante: {andere:?}"),
        }
    }

    #[test]
    fn fehler_nachricht_codes() {
        let msg = Nachricht::fehler(ErrorCode::AlreadyBroadcasting, "belegt");
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"error""#));
        assert!(json.contains("ALREADY_BROADCASTING"));
        assert_eq!(Nachricht::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn ping_pong_spiegeln() {
        let ping = Nachricht::ping(1234);
        assert_eq!(ping.to_json().unwrap(), r#"{"type":"ping","timestamp":1234}"#);
        assert_eq!(Nachricht::pong(1234).art(), "pong");
    }

    #[test]
    fn unbekannter_typ_wird_abgelehnt() {
        assert!(Nachricht::from_json(r#"{"type":"mix","channel":1}"#).is_err());
        assert!(Nachricht::from_json("kein json").is_err());
    }

    #[test]
    fn room_closed_ohne_grund() {
        let msg = Nachricht::geschlossen(None);
        assert_eq!(msg.to_json().unwrap(), r#"{"type":"roomClosed"}"#);
    }
}
