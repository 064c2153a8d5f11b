//! Fehlertypen fuer die REST-Schnittstelle
//!
//! Jeder Fehler wird als `{"error": {"code": <http>, "message": ...}}`
//! beantwortet.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use klangbruecke_auth::AuthError;
use klangbruecke_relay::RelayError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Authentifizierung fehlgeschlagen: {0}")]
    Authentifizierung(String),

    #[error("Ungueltige Eingabe: {0}")]
    UngueltigeEingabe(String),

    #[error("Rate Limit ueberschritten: bitte warte {retry_after_secs} Sekunden")]
    RateLimitUeberschritten { retry_after_secs: u64 },

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Relay(e) => e.http_status(),
            Self::Auth(e) => e.klasse().http_status(),
            Self::Authentifizierung(_) => 401,
            Self::UngueltigeEingabe(_) => 400,
            Self::RateLimitUeberschritten { .. } => 429,
            Self::Intern(_) => 500,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), fehler = %self, "REST-Anfrage fehlgeschlagen");
        } else {
            tracing::debug!(status = status.as_u16(), fehler = %self, "REST-Anfrage abgelehnt");
        }

        let mut fehler = json!({
            "code": status.as_u16(),
            "message": self.to_string(),
        });
        if let Self::RateLimitUeberschritten { retry_after_secs } = self {
            fehler["retry_after_secs"] = json!(retry_after_secs);
        }
        (status, Json(json!({ "error": fehler }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_folgt_der_fehlerklasse() {
        assert_eq!(ApiError::from(RelayError::Geschlossen).http_status(), 410);
        assert_eq!(ApiError::from(RelayError::BereitsBelegt).http_status(), 409);
        assert_eq!(ApiError::from(AuthError::FalschesGeheimnis).http_status(), 401);
        assert_eq!(
            ApiError::from(AuthError::GeheimnisUngueltig("kurz".into())).http_status(),
            400
        );
        assert_eq!(
            ApiError::RateLimitUeberschritten { retry_after_secs: 3 }.http_status(),
            429
        );
    }
}
