//! Axum HTTP-Server fuer die REST-API

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{HeaderValue, Method};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes::v1_router;
use crate::state::ApiState;

/// Abstand, in dem unbenutzte Rate-Limit-Buckets entfernt werden
const AUFRAEUM_INTERVALL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct ApiServerKonfig {
    pub bind_addr: SocketAddr,
    /// Erlaubte CORS-Origins. Leer = alle Origins erlaubt.
    pub cors_origins: Vec<String>,
}

impl Default for ApiServerKonfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9401)),
            cors_origins: Vec::new(),
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
}

/// Vollstaendige App mit CORS- und Trace-Layer
pub fn router(state: ApiState, cors_origins: &[String]) -> Router {
    v1_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiServer {
    konfig: ApiServerKonfig,
}

impl ApiServer {
    pub fn neu(konfig: ApiServerKonfig) -> Self {
        Self { konfig }
    }

    pub async fn starten(
        self,
        state: ApiState,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.konfig.bind_addr).await?;
        self.bedienen(listener, state, shutdown).await
    }

    /// Bedient einen bereits gebundenen Listener bis `shutdown` fertig ist
    pub async fn bedienen(
        self,
        listener: TcpListener,
        state: ApiState,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        let limiter = state.limiter.clone();
        let aufraeumen = tokio::spawn(async move {
            let mut takt = tokio::time::interval(AUFRAEUM_INTERVALL);
            loop {
                takt.tick().await;
                limiter.aufraeumen();
            }
        });

        let app = router(state, &self.konfig.cors_origins);
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "REST-Server gestartet");

        let ergebnis = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        aufraeumen.abort();
        tracing::info!("REST-Server gestoppt");
        ergebnis
    }
}
