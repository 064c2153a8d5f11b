//! Verbindungs-Handles
//!
//! Der Raum-Manager schreibt nie direkt auf einen Socket. Jede Verbindung
//! hat eine begrenzte Send-Queue, die ihr Transport-Task leert, und ein
//! Abbruch-Token, mit dem der Manager die Verbindung beendet.

use std::sync::Arc;

use klangbruecke_core::ConnectionId;
use klangbruecke_protocol::Nachricht;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Warum eine Nachricht nicht in die Send-Queue passte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendeFehler {
    Voll,
    Geschlossen,
}

#[derive(Debug, Clone)]
pub struct VerbindungsHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Arc<Nachricht>>,
    abbruch: CancellationToken,
}

impl VerbindungsHandle {
    pub fn neu(
        id: ConnectionId,
        tx: mpsc::Sender<Arc<Nachricht>>,
        abbruch: CancellationToken,
    ) -> Self {
        Self { id, tx, abbruch }
    }

    /// Erstellt Handle und zugehoerige Empfangsseite
    pub fn kanal(id: ConnectionId, groesse: usize) -> (Self, mpsc::Receiver<Arc<Nachricht>>) {
        let (tx, rx) = mpsc::channel(groesse.max(1));
        (Self::neu(id, tx, CancellationToken::new()), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Legt eine Nachricht nicht-blockierend in die Send-Queue
    pub fn senden(&self, nachricht: Arc<Nachricht>) -> Result<(), SendeFehler> {
        if self.abbruch.is_cancelled() {
            return Err(SendeFehler::Geschlossen);
        }
        self.tx.try_send(nachricht).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendeFehler::Voll,
            mpsc::error::TrySendError::Closed(_) => SendeFehler::Geschlossen,
        })
    }

    /// Fordert den Transport auf, die Verbindung zu schliessen
    ///
    /// Bereits eingereihte Nachrichten werden vorher noch geschrieben.
    pub fn trennen(&self) {
        self.abbruch.cancel();
    }

    pub fn ist_getrennt(&self) -> bool {
        self.abbruch.is_cancelled()
    }

    pub fn abbruch_token(&self) -> CancellationToken {
        self.abbruch.clone()
    }
}
