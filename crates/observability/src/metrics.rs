//! Prometheus-kompatible Metriken des Relays
//!
//! Registrierte Metriken:
//! - `klangbruecke_rooms_active` – Gauge: Raeume im Speicher
//! - `klangbruecke_broadcasters_connected` – Gauge: Verbundene Sender
//! - `klangbruecke_listeners_connected` – Gauge: Verbundene Zuhoerer
//! - `klangbruecke_packets_received_total` – Counter: Eingegangene Audio-Pakete
//! - `klangbruecke_packets_relayed_total` – Counter: Zugestellte Audio-Pakete
//! - `klangbruecke_packets_evicted_total` – Counter: Bei Ueberlauf verworfene Pakete
//! - `klangbruecke_listeners_dropped_total` – Counter: Zuhoerer nach Sendefehler entfernt
//! - `klangbruecke_rooms_closed_total` – Counter: Geschlossene Raeume
//! - `klangbruecke_relay_tick_seconds` – Histogram: Dauer eines Relay-Zyklus

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Relay-Metriken, `Clone` teilt die Registry
#[derive(Clone)]
pub struct RelayMetriken {
    pub registry: Arc<Registry>,

    pub raeume_aktiv: Gauge,
    pub sender_verbunden: Gauge,
    pub zuhoerer_verbunden: Gauge,

    pub pakete_empfangen: Counter,
    pub pakete_weitergeleitet: Counter,
    pub pakete_verworfen: Counter,
    pub zuhoerer_entfernt: Counter,
    pub raeume_geschlossen: Counter,

    pub tick_dauer: Histogram,
}

impl std::fmt::Debug for RelayMetriken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayMetriken").finish_non_exhaustive()
    }
}

fn gauge(registry: &Registry, name: &str, hilfe: &str) -> Result<Gauge> {
    let g = Gauge::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(g.clone()))?;
    Ok(g)
}

fn counter(registry: &Registry, name: &str, hilfe: &str) -> Result<Counter> {
    let c = Counter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl RelayMetriken {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let raeume_aktiv = gauge(&registry, "klangbruecke_rooms_active", "Raeume im Speicher")?;
        let sender_verbunden = gauge(
            &registry,
            "klangbruecke_broadcasters_connected",
            "Verbundene Sender",
        )?;
        let zuhoerer_verbunden = gauge(
            &registry,
            "klangbruecke_listeners_connected",
            "Verbundene Zuhoerer",
        )?;

        let pakete_empfangen = counter(
            &registry,
            "klangbruecke_packets_received_total",
            "Eingegangene Audio-Pakete",
        )?;
        let pakete_weitergeleitet = counter(
            &registry,
            "klangbruecke_packets_relayed_total",
            "An Zuhoerer zugestellte Audio-Pakete",
        )?;
        let pakete_verworfen = counter(
            &registry,
            "klangbruecke_packets_evicted_total",
            "Bei Pufferueberlauf verworfene Pakete",
        )?;
        let zuhoerer_entfernt = counter(
            &registry,
            "klangbruecke_listeners_dropped_total",
            "Nach Sendefehler entfernte Zuhoerer",
        )?;
        let raeume_geschlossen = counter(
            &registry,
            "klangbruecke_rooms_closed_total",
            "Geschlossene Raeume",
        )?;

        let tick_dauer = Histogram::with_opts(
            HistogramOpts::new(
                "klangbruecke_relay_tick_seconds",
                "Dauer eines Relay-Zyklus in Sekunden",
            )
            .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05]),
        )?;
        registry.register(Box::new(tick_dauer.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            raeume_aktiv,
            sender_verbunden,
            zuhoerer_verbunden,
            pakete_empfangen,
            pakete_weitergeleitet,
            pakete_verworfen,
            zuhoerer_entfernt,
            raeume_geschlossen,
            tick_dauer,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: RelayMetriken) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<RelayMetriken>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn metriken_erstellen_und_zaehlen() {
        let metriken = RelayMetriken::neu().unwrap();
        metriken.pakete_weitergeleitet.inc_by(9.0);
        metriken.pakete_weitergeleitet.inc();
        assert_eq!(metriken.pakete_weitergeleitet.get(), 10.0);

        metriken.zuhoerer_verbunden.set(3.0);
        metriken.zuhoerer_verbunden.dec();
        assert_eq!(metriken.zuhoerer_verbunden.get(), 2.0);
    }

    #[test]
    fn getrennte_registries_pro_instanz() {
        let a = RelayMetriken::neu().unwrap();
        let b = RelayMetriken::neu().unwrap();
        a.raeume_aktiv.set(5.0);
        assert_eq!(b.raeume_aktiv.get(), 0.0);
    }

    #[test]
    fn export_im_prometheus_format() {
        let metriken = RelayMetriken::neu().unwrap();
        metriken.raeume_geschlossen.inc();
        metriken.tick_dauer.observe(0.0002);

        let text = metriken.exportieren().unwrap();
        assert!(text.contains("klangbruecke_rooms_closed_total 1"));
        assert!(text.contains("klangbruecke_relay_tick_seconds_bucket"));
        assert!(text.contains("# HELP"));
    }

    #[tokio::test]
    async fn metrics_endpunkt_liefert_text() {
        let metriken = RelayMetriken::neu().unwrap();
        metriken.pakete_empfangen.inc();
        let antwort = metrics_router(metriken)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(antwort.status(), StatusCode::OK);
    }
}
