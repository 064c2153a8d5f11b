//! Relay-Scheduler
//!
//! Ein Timer-Task pro aktivem Raum mit Zuhoerern. Jeder Takt ruft den
//! uebergebenen Zyklus auf. Liefert der Zyklus `false` (Raum weg oder
//! Manager verworfen), endet der Task von selbst.

use std::time::Duration;

use klangbruecke_core::SessionId;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct SchedulerHandle {
    abbruch: CancellationToken,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Startet den Task, der erste Zyklus laeuft sofort
    pub fn starten<F>(session_id: SessionId, takt: Duration, mut zyklus: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let abbruch = CancellationToken::new();
        let token = abbruch.clone();
        let takt = takt.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut intervall = tokio::time::interval(takt);
            tracing::debug!(session_id = %session_id, takt_ms = takt.as_millis() as u64, "Relay-Scheduler gestartet");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = intervall.tick() => {
                        if !zyklus() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!(session_id = %session_id, "Relay-Scheduler beendet");
        });

        Self { abbruch, task }
    }

    pub fn stoppen(self) {
        self.abbruch.cancel();
    }

    pub fn ist_beendet(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.abbruch.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn zyklus_pro_takt() {
        let zaehler = Arc::new(AtomicUsize::new(0));
        let z = Arc::clone(&zaehler);
        let handle = SchedulerHandle::starten(SessionId::new(), Duration::from_millis(100), move || {
            z.fetch_add(1, Ordering::SeqCst);
            true
        });

        tokio::time::sleep(Duration::from_millis(350)).await;
        // Sofort, 100, 200, 300
        assert_eq!(zaehler.load(Ordering::SeqCst), 4);

        handle.stoppen();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(zaehler.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn endet_wenn_zyklus_false_liefert() {
        let handle = SchedulerHandle::starten(SessionId::new(), Duration::from_millis(50), || false);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.ist_beendet());
    }
}
