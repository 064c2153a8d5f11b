//! Health-Check-Endpunkt fuer Klangbruecke
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime, Relay- und DB-Zustand

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub relay_ready: bool,
    pub db_connected: bool,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Debug, Clone)]
pub struct HealthState {
    start_time: Arc<Instant>,
    relay_bereit: Arc<AtomicBool>,
    db_verbunden: Arc<AtomicBool>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::neu()
    }
}

impl HealthState {
    /// Neuer Zustand: Relay noch nicht bereit, DB als verbunden angenommen
    pub fn neu() -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            relay_bereit: Arc::new(AtomicBool::new(false)),
            db_verbunden: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn relay_bereit(&self) -> bool {
        self.relay_bereit.load(Ordering::Relaxed)
    }

    pub fn relay_status_setzen(&self, bereit: bool) {
        self.relay_bereit.store(bereit, Ordering::Relaxed);
    }

    pub fn db_verbunden(&self) -> bool {
        self.db_verbunden.load(Ordering::Relaxed)
    }

    pub fn db_status_setzen(&self, verbunden: bool) {
        self.db_verbunden.store(verbunden, Ordering::Relaxed);
    }

    /// Gesamtstatus aus Relay und Datenbank
    ///
    /// Ohne Datenbank laeuft das Relay weiter (Persistenz ist nachrangig),
    /// ohne Relay ist der Dienst nicht nutzbar.
    pub fn status(&self) -> HealthStatus {
        match (self.relay_bereit(), self.db_verbunden()) {
            (false, _) => HealthStatus::Unhealthy,
            (true, false) => HealthStatus::Degraded,
            (true, true) => HealthStatus::Healthy,
        }
    }

    pub fn antwort(&self) -> HealthResponse {
        HealthResponse {
            status: self.status(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            relay_ready: self.relay_bereit(),
            db_connected: self.db_verbunden(),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – gibt den Serverstatus zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let antwort = state.antwort();
    let http_status = match antwort.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (http_status, Json(antwort))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn status_aus_relay_und_db() {
        let state = HealthState::neu();
        assert_eq!(state.status(), HealthStatus::Unhealthy);

        state.relay_status_setzen(true);
        assert_eq!(state.status(), HealthStatus::Healthy);

        state.db_status_setzen(false);
        assert_eq!(state.status(), HealthStatus::Degraded);
    }

    #[test]
    fn klone_teilen_zustand() {
        let state = HealthState::neu();
        let klon = state.clone();
        klon.relay_status_setzen(true);
        assert!(state.relay_bereit());
    }

    #[test]
    fn health_response_serialisierung() {
        let state = HealthState::neu();
        state.relay_status_setzen(true);
        let json = serde_json::to_string(&state.antwort()).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(json.contains("\"relay_ready\":true"));
        assert!(json.contains("\"db_connected\":true"));
    }

    #[tokio::test]
    async fn nicht_bereit_ergibt_503() {
        let antwort = health_router(HealthState::neu())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn bereit_ergibt_200() {
        let state = HealthState::neu();
        state.relay_status_setzen(true);
        state.db_status_setzen(false);
        let antwort = health_router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::OK);
    }
}
