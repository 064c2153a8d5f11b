//! REST-Handler fuer Raeume: anlegen, beitreten, auflisten, loeschen

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use klangbruecke_core::SessionId;
use klangbruecke_protocol::Raumzustand;
use klangbruecke_relay::{NeueSitzung, SitzungsInfo};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnlegenBody {
    pub secret: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Angelegt {
    pub session_id: SessionId,
    pub code: String,
    /// Sender-Token
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct BeitretenBody {
    pub code: String,
    pub secret: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beigetreten {
    pub session_id: SessionId,
    /// Zuhoerer-Token
    pub token: String,
    pub listener_count: usize,
    pub has_broadcaster: bool,
    pub state: Raumzustand,
    pub room_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SitzungsListe {
    pub sessions: Vec<SitzungsInfo>,
}

pub(crate) fn body<T>(body: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    body.map(|Json(b)| b)
        .map_err(|e| ApiError::UngueltigeEingabe(e.body_text()))
}

pub(crate) fn session_id(pfad: Result<Path<SessionId>, PathRejection>) -> ApiResult<SessionId> {
    pfad.map(|Path(id)| id)
        .map_err(|e| ApiError::UngueltigeEingabe(e.body_text()))
}

/// POST /v1/sessions
pub async fn anlegen(
    State(state): State<ApiState>,
    headers: HeaderMap,
    anfrage: Result<Json<AnlegenBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let besitzer = state.identitaet(&headers).await?;
    let anfrage = body(anfrage)?;

    // Argon2 blockiert, nicht auf dem Executor hashen
    let manager = state.manager.clone();
    let sitzung = tokio::task::spawn_blocking(move || {
        manager.sitzung_erstellen(
            besitzer,
            &anfrage.secret,
            NeueSitzung {
                name: anfrage.name,
                oeffentlich: anfrage.public,
            },
        )
    })
    .await
    .map_err(|e| ApiError::Intern(e.to_string()))??;

    Ok((
        StatusCode::CREATED,
        Json(Angelegt {
            session_id: sitzung.session_id,
            code: sitzung.code,
            token: sitzung.token,
        }),
    ))
}

/// POST /v1/sessions/join
pub async fn beitreten(
    State(state): State<ApiState>,
    anfrage: Result<Json<BeitretenBody>, JsonRejection>,
) -> ApiResult<Json<Beigetreten>> {
    let anfrage = body(anfrage)?;

    let manager = state.manager.clone();
    let beitritt = tokio::task::spawn_blocking(move || {
        manager.sitzung_beitreten(&anfrage.code, &anfrage.secret)
    })
    .await
    .map_err(|e| ApiError::Intern(e.to_string()))??;

    Ok(Json(Beigetreten {
        session_id: beitritt.session_id,
        token: beitritt.token,
        listener_count: beitritt.status.listener_count,
        has_broadcaster: beitritt.status.has_broadcaster,
        state: beitritt.status.state,
        room_name: beitritt.name,
    }))
}

/// GET /v1/sessions
pub async fn auflisten(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<Json<SitzungsListe>> {
    let besitzer = state.identitaet(&headers).await?;
    let sessions = state.manager.sitzungen_von(besitzer).await?;
    Ok(Json(SitzungsListe { sessions }))
}

/// DELETE /v1/sessions/:id
pub async fn loeschen(
    State(state): State<ApiState>,
    headers: HeaderMap,
    pfad: Result<Path<SessionId>, PathRejection>,
) -> ApiResult<StatusCode> {
    let besitzer = state.identitaet(&headers).await?;
    let session_id = session_id(pfad)?;
    state.manager.sitzung_loeschen(session_id, besitzer).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NeuesToken {
    /// Sender-Token
    pub token: String,
}

/// POST /v1/sessions/:id/token
///
/// Neues Sender-Token fuer den Besitzer, bestehende bleiben gueltig.
pub async fn token_erneuern(
    State(state): State<ApiState>,
    headers: HeaderMap,
    pfad: Result<Path<SessionId>, PathRejection>,
) -> ApiResult<Json<NeuesToken>> {
    let besitzer = state.identitaet(&headers).await?;
    let session_id = session_id(pfad)?;
    let token = state.manager.sender_token_erneuern(session_id, besitzer)?;
    Ok(Json(NeuesToken { token }))
}
