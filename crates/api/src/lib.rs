//! klangbruecke-api – REST-Schnittstelle
//!
//! - `POST /v1/sessions`: Raum anlegen (Bearer-Nachweis)
//! - `POST /v1/sessions/join`: mit Code und Geheimnis beitreten
//! - `GET /v1/sessions`: eigene Raeume
//! - `DELETE /v1/sessions/:id`: Raum schliessen und loeschen
//! - `POST /v1/sessions/:id/token`: neues Sender-Token
//! - `GET|PUT /v1/sessions/:id/devices`: Geraete-Zuweisungen

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use rate_limit::{RateLimitKonfig, RateLimiter};
pub use server::{router, ApiServer, ApiServerKonfig};
pub use state::ApiState;
