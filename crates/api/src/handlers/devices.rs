//! REST-Handler fuer Kanal-zu-Geraet-Zuweisungen

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::Json;
use klangbruecke_core::SessionId;
use klangbruecke_db::GeraeteZuweisung;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::handlers::sessions::{body, session_id};
use crate::state::ApiState;

/// Ein Eingangskanal eines Aufnahmegeraets fuer einen Raum-Kanal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zuweisung {
    pub channel: u16,
    pub device_id: String,
    pub device_channel: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Zuweisung {
    fn in_datensatz(self, session_id: SessionId) -> GeraeteZuweisung {
        GeraeteZuweisung {
            session_id,
            kanal: self.channel,
            geraet_id: self.device_id,
            geraet_kanal: self.device_channel,
            bezeichnung: self.label,
        }
    }
}

impl From<GeraeteZuweisung> for Zuweisung {
    fn from(z: GeraeteZuweisung) -> Self {
        Self {
            channel: z.kanal,
            device_id: z.geraet_id,
            device_channel: z.geraet_kanal,
            label: z.bezeichnung,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Zuweisungen {
    pub assignments: Vec<Zuweisung>,
}

fn antwort(liste: Vec<GeraeteZuweisung>) -> Json<Zuweisungen> {
    let mut assignments: Vec<Zuweisung> = liste.into_iter().map(Zuweisung::from).collect();
    assignments.sort_by_key(|z| z.channel);
    Json(Zuweisungen { assignments })
}

/// PUT /v1/sessions/:id/devices
///
/// Ersetzt die Zuweisungen der genannten Kanaele, andere bleiben bestehen.
pub async fn zuweisen(
    State(state): State<ApiState>,
    headers: HeaderMap,
    pfad: Result<Path<SessionId>, PathRejection>,
    anfrage: Result<Json<Zuweisungen>, JsonRejection>,
) -> ApiResult<Json<Zuweisungen>> {
    let besitzer = state.identitaet(&headers).await?;
    let session_id = session_id(pfad)?;
    let anfrage = body(anfrage)?;

    let mut kanaele: Vec<u16> = anfrage.assignments.iter().map(|z| z.channel).collect();
    kanaele.sort_unstable();
    if kanaele.windows(2).any(|w| w[0] == w[1]) {
        return Err(ApiError::UngueltigeEingabe(
            "Kanal mehrfach zugewiesen".into(),
        ));
    }

    let datensaetze = anfrage
        .assignments
        .into_iter()
        .map(|z| z.in_datensatz(session_id))
        .collect();
    let liste = state
        .manager
        .geraete_zuweisen(session_id, besitzer, datensaetze)
        .await?;
    Ok(antwort(liste))
}

/// GET /v1/sessions/:id/devices
pub async fn auflisten(
    State(state): State<ApiState>,
    headers: HeaderMap,
    pfad: Result<Path<SessionId>, PathRejection>,
) -> ApiResult<Json<Zuweisungen>> {
    let besitzer = state.identitaet(&headers).await?;
    let session_id = session_id(pfad)?;
    let liste = state.manager.zuweisungen(session_id, besitzer).await?;
    Ok(antwort(liste))
}
