//! Route-Definitionen fuer die REST-API (/v1/...)

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{devices, sessions};
use crate::middleware::{anlegen_begrenzen, beitritt_begrenzen};
use crate::state::ApiState;

/// Erstellt den vollstaendigen /v1/-Router
///
/// Anlegen und Beitreten laufen durch den Rate Limiter.
pub fn v1_router(state: ApiState) -> Router<ApiState> {
    let anlegen = post(sessions::anlegen).layer(from_fn_with_state(state.clone(), anlegen_begrenzen));
    let beitreten =
        post(sessions::beitreten).layer(from_fn_with_state(state, beitritt_begrenzen));

    Router::new()
        .route("/v1/sessions", get(sessions::auflisten).merge(anlegen))
        .route("/v1/sessions/join", beitreten)
        .route("/v1/sessions/:id", axum::routing::delete(sessions::loeschen))
        .route("/v1/sessions/:id/token", post(sessions::token_erneuern))
        .route(
            "/v1/sessions/:id/devices",
            get(devices::auflisten).put(devices::zuweisen),
        )
}
