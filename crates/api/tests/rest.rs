//! REST-API ueber `tower::ServiceExt::oneshot`

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use klangbruecke_api::{router, ApiState, RateLimitKonfig, RateLimiter};
use klangbruecke_auth::{StatischeAnmeldung, TokenStore};
use klangbruecke_core::IdentityId;
use klangbruecke_db::SpeicherDb;
use klangbruecke_relay::{Abhaengigkeiten, RaumManager, RelayConfig};
use serde_json::{json, Value};
use tower::ServiceExt;

const BESITZER_A: &str = "nachweis-a";
const BESITZER_B: &str = "nachweis-b";

// ---------------------------------------------------------------------------
// Aufbau
// ---------------------------------------------------------------------------

fn app_mit_limits(limits: RateLimitKonfig) -> Router {
    let relay = RelayConfig {
        scheduler_automatisch: false,
        ..RelayConfig::default()
    };
    let tokens = TokenStore::neu(Duration::from_secs(3600));
    let manager = RaumManager::neu(Abhaengigkeiten::neu(relay, tokens, Arc::new(SpeicherDb::neu())));
    let anmeldung = StatischeAnmeldung::default()
        .mit_nachweis(BESITZER_A, IdentityId::new())
        .mit_nachweis(BESITZER_B, IdentityId::new());
    let state = ApiState::neu(manager, Arc::new(anmeldung), RateLimiter::neu(limits));
    router(state, &[])
}

fn app() -> Router {
    app_mit_limits(RateLimitKonfig::default())
}

async fn anfrage(
    app: &Router,
    methode: Method,
    pfad: &str,
    nachweis: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(methode).uri(pfad);
    if let Some(nachweis) = nachweis {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {nachweis}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let antwort = app.clone().oneshot(request).await.unwrap();
    let status = antwort.status();
    let bytes = axum::body::to_bytes(antwort.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn anlegen(app: &Router, nachweis: &str, name: &str) -> Value {
    let (status, body) = anfrage(
        app,
        Method::POST,
        "/v1/sessions",
        Some(nachweis),
        Some(json!({ "secret": "sehr-geheim", "name": name })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

fn fehlercode(body: &Value) -> u64 {
    body["error"]["code"].as_u64().unwrap()
}

// ---------------------------------------------------------------------------
// Anlegen und Beitreten
// ---------------------------------------------------------------------------

#[tokio::test]
async fn anlegen_und_beitreten() {
    let app = app();
    let angelegt = anlegen(&app, BESITZER_A, "Probe").await;
    assert_eq!(angelegt["code"].as_str().unwrap().len(), 6);
    assert!(!angelegt["token"].as_str().unwrap().is_empty());

    let (status, beigetreten) = anfrage(
        &app,
        Method::POST,
        "/v1/sessions/join",
        None,
        Some(json!({ "code": angelegt["code"], "secret": "sehr-geheim" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{beigetreten}");
    assert_eq!(beigetreten["sessionId"], angelegt["sessionId"]);
    assert_eq!(beigetreten["listenerCount"], 0);
    assert_eq!(beigetreten["hasBroadcaster"], false);
    assert_eq!(beigetreten["state"], "active");
    assert_eq!(beigetreten["roomName"], "Probe");
    assert_ne!(beigetreten["token"], angelegt["token"]);
}

#[tokio::test]
async fn anlegen_ohne_nachweis_ist_401() {
    let app = app();
    let (status, body) = anfrage(
        &app,
        Method::POST,
        "/v1/sessions",
        None,
        Some(json!({ "secret": "sehr-geheim" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(fehlercode(&body), 401);

    let (status, _) = anfrage(
        &app,
        Method::POST,
        "/v1/sessions",
        Some("unbekannt"),
        Some(json!({ "secret": "sehr-geheim" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn zu_kurzes_geheimnis_ist_400() {
    let app = app();
    let (status, body) = anfrage(
        &app,
        Method::POST,
        "/v1/sessions",
        Some(BESITZER_A),
        Some(json!({ "secret": "kurz" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fehlercode(&body), 400);
    assert!(body["error"]["message"].as_str().unwrap().contains("mindestens"));
}

#[tokio::test]
async fn kaputtes_json_ist_400_im_fehlerformat() {
    let app = app();
    let (status, body) = anfrage(
        &app,
        Method::POST,
        "/v1/sessions/join",
        None,
        Some(json!({ "code": 123 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fehlercode(&body), 400);
}

#[tokio::test]
async fn falsches_geheimnis_und_unbekannter_code() {
    let app = app();
    let angelegt = anlegen(&app, BESITZER_A, "Probe").await;

    let (status, body) = anfrage(
        &app,
        Method::POST,
        "/v1/sessions/join",
        None,
        Some(json!({ "code": angelegt["code"], "secret": "ganz-falsch" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(fehlercode(&body), 401);

    let (status, _) = anfrage(
        &app,
        Method::POST,
        "/v1/sessions/join",
        None,
        Some(json!({ "code": "ZZZZZZ", "secret": "sehr-geheim" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn beitritte_werden_begrenzt() {
    let app = app_mit_limits(RateLimitKonfig {
        beitritte_pro_minute: 2,
        anlegen_pro_minute: 10,
    });
    let angelegt = anlegen(&app, BESITZER_A, "Probe").await;
    let body = json!({ "code": angelegt["code"], "secret": "sehr-geheim" });

    for _ in 0..2 {
        let (status, _) =
            anfrage(&app, Method::POST, "/v1/sessions/join", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, antwort) =
        anfrage(&app, Method::POST, "/v1/sessions/join", None, Some(body)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(fehlercode(&antwort), 429);
    assert!(antwort["error"]["retry_after_secs"].as_u64().unwrap() > 0);
}

// ---------------------------------------------------------------------------
// Verwaltung
// ---------------------------------------------------------------------------

#[tokio::test]
async fn eigene_sitzungen_auflisten() {
    let app = app();
    anlegen(&app, BESITZER_A, "Erster").await;
    anlegen(&app, BESITZER_A, "Zweiter").await;
    anlegen(&app, BESITZER_B, "Fremd").await;

    let (status, body) = anfrage(&app, Method::GET, "/v1/sessions", Some(BESITZER_A), None).await;
    assert_eq!(status, StatusCode::OK);
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert!(sessions.iter().all(|s| s["state"] == "active"));
    assert!(sessions.iter().all(|s| s["name"] != "Fremd"));

    let (status, _) = anfrage(&app, Method::GET, "/v1/sessions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn loeschen_nur_durch_besitzer() {
    let app = app();
    let angelegt = anlegen(&app, BESITZER_A, "Probe").await;
    let pfad = format!("/v1/sessions/{}", angelegt["sessionId"].as_str().unwrap());

    let (status, body) = anfrage(&app, Method::DELETE, &pfad, Some(BESITZER_B), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(fehlercode(&body), 403);

    let (status, _) = anfrage(&app, Method::DELETE, &pfad, Some(BESITZER_A), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, liste) = anfrage(&app, Method::GET, "/v1/sessions", Some(BESITZER_A), None).await;
    assert!(liste["sessions"].as_array().unwrap().is_empty());

    let (status, _) = anfrage(
        &app,
        Method::POST,
        "/v1/sessions/join",
        None,
        Some(json!({ "code": angelegt["code"], "secret": "sehr-geheim" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = anfrage(&app, Method::DELETE, &pfad, Some(BESITZER_A), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sender_token_nur_fuer_besitzer() {
    let app = app();
    let angelegt = anlegen(&app, BESITZER_A, "Probe").await;
    let pfad = format!("/v1/sessions/{}/token", angelegt["sessionId"].as_str().unwrap());

    let (status, body) = anfrage(&app, Method::POST, &pfad, Some(BESITZER_A), None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_ne!(body["token"], angelegt["token"]);

    let (status, body) = anfrage(&app, Method::POST, &pfad, Some(BESITZER_B), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(fehlercode(&body), 403);

    let (status, _) = anfrage(&app, Method::POST, &pfad, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn ungueltige_session_id_ist_400() {
    let app = app();
    let (status, body) =
        anfrage(&app, Method::DELETE, "/v1/sessions/keine-uuid", Some(BESITZER_A), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(fehlercode(&body), 400);
}

#[tokio::test]
async fn geraete_zuweisungen_ersetzen_genannte_kanaele() {
    let app = app();
    let angelegt = anlegen(&app, BESITZER_A, "Probe").await;
    let pfad = format!("/v1/sessions/{}/devices", angelegt["sessionId"].as_str().unwrap());

    let (status, body) = anfrage(
        &app,
        Method::PUT,
        &pfad,
        Some(BESITZER_A),
        Some(json!({ "assignments": [
            { "channel": 1, "deviceId": "pult", "deviceChannel": 3 },
            { "channel": 0, "deviceId": "pult", "deviceChannel": 2, "label": "Sprecher" },
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let liste = body["assignments"].as_array().unwrap();
    assert_eq!(liste.len(), 2);
    assert_eq!(liste[0]["channel"], 0);
    assert_eq!(liste[0]["label"], "Sprecher");

    // Nur Kanal 1 wird ersetzt
    let (status, _) = anfrage(
        &app,
        Method::PUT,
        &pfad,
        Some(BESITZER_A),
        Some(json!({ "assignments": [
            { "channel": 1, "deviceId": "funk", "deviceChannel": 0 },
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = anfrage(&app, Method::GET, &pfad, Some(BESITZER_A), None).await;
    assert_eq!(status, StatusCode::OK);
    let liste = body["assignments"].as_array().unwrap();
    assert_eq!(liste.len(), 2);
    assert_eq!(liste[0]["deviceId"], "pult");
    assert_eq!(liste[1]["deviceId"], "funk");

    let (status, _) = anfrage(&app, Method::GET, &pfad, Some(BESITZER_B), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn ungueltige_zuweisungen_werden_abgelehnt() {
    let app = app();
    let angelegt = anlegen(&app, BESITZER_A, "Probe").await;
    let pfad = format!("/v1/sessions/{}/devices", angelegt["sessionId"].as_str().unwrap());

    // Kanal ausserhalb von max_kanaele
    let (status, _) = anfrage(
        &app,
        Method::PUT,
        &pfad,
        Some(BESITZER_A),
        Some(json!({ "assignments": [
            { "channel": 32, "deviceId": "pult", "deviceChannel": 0 },
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Derselbe Kanal zweimal
    let (status, _) = anfrage(
        &app,
        Method::PUT,
        &pfad,
        Some(BESITZER_A),
        Some(json!({ "assignments": [
            { "channel": 2, "deviceId": "pult", "deviceChannel": 0 },
            { "channel": 2, "deviceId": "funk", "deviceChannel": 1 },
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
