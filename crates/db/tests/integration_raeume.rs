//! Integration-Tests fuer RaumRepository (In-Memory SQLite und Speicher-Store)

use chrono::{Duration, Utc};
use klangbruecke_core::{IdentityId, SessionId};
use klangbruecke_db::{DbError, GeraeteZuweisung, RaumRecord, RaumRepository, SpeicherDb, SqliteDb};

async fn sqlite() -> SqliteDb {
    SqliteDb::in_memory().await.expect("In-Memory DB konnte nicht erstellt werden")
}

fn raum(besitzer: IdentityId, code: &str, alter_min: i64) -> RaumRecord {
    RaumRecord {
        id: SessionId::new(),
        code: code.into(),
        geheimnis_hash: "$argon2id$dummy".into(),
        besitzer,
        name: Some(format!("Raum {code}")),
        oeffentlich: false,
        aktiv: true,
        erstellt_am: Utc::now() - Duration::minutes(alter_min),
        geschlossen_am: None,
    }
}

fn zuweisung(session_id: SessionId, kanal: u16, geraet_kanal: u16) -> GeraeteZuweisung {
    GeraeteZuweisung {
        session_id,
        kanal,
        geraet_id: "usb-interface-1".into(),
        geraet_kanal,
        bezeichnung: None,
    }
}

async fn speichern_und_laden(repo: &dyn RaumRepository) {
    let besitzer = IdentityId::new();
    let r = raum(besitzer, "ABC234", 0);
    repo.speichern(&r).await.unwrap();

    let geladen = repo.laden(r.id).await.unwrap().expect("Raum muss existieren");
    assert_eq!(geladen.code, "ABC234");
    assert_eq!(geladen.besitzer, besitzer);
    assert!(geladen.aktiv);
    assert_eq!(geladen.name.as_deref(), Some("Raum ABC234"));
    assert!(repo.laden(SessionId::new()).await.unwrap().is_none());
}

async fn nach_besitzer_neueste_zuerst(repo: &dyn RaumRepository) {
    let besitzer = IdentityId::new();
    let alt = raum(besitzer, "ALT222", 30);
    let neu = raum(besitzer, "NEU333", 1);
    let fremd = raum(IdentityId::new(), "XYZ444", 0);
    for r in [&alt, &neu, &fremd] {
        repo.speichern(r).await.unwrap();
    }

    let liste = repo.nach_besitzer(besitzer).await.unwrap();
    let codes: Vec<&str> = liste.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(codes, vec!["NEU333", "ALT222"]);
}

async fn inaktiv_markieren(repo: &dyn RaumRepository) {
    let r = raum(IdentityId::new(), "ZUE555", 0);
    repo.speichern(&r).await.unwrap();

    assert!(repo.inaktiv_markieren(r.id, Utc::now()).await.unwrap());
    let geladen = repo.laden(r.id).await.unwrap().unwrap();
    assert!(!geladen.aktiv);
    assert!(geladen.geschlossen_am.is_some());

    assert!(!repo.inaktiv_markieren(SessionId::new(), Utc::now()).await.unwrap());
}

async fn zuweisungen_ersetzen_und_loeschen(repo: &dyn RaumRepository) {
    let r = raum(IdentityId::new(), "GER666", 0);
    repo.speichern(&r).await.unwrap();

    repo.zuweisung_setzen(&zuweisung(r.id, 1, 3)).await.unwrap();
    repo.zuweisung_setzen(&zuweisung(r.id, 0, 2)).await.unwrap();
    repo.zuweisung_setzen(&zuweisung(r.id, 1, 4)).await.unwrap();

    let liste = repo.zuweisungen(r.id).await.unwrap();
    assert_eq!(liste.len(), 2, "Kanal 1 muss ersetzt worden sein");
    assert_eq!(liste[0].kanal, 0);
    assert_eq!(liste[1].geraet_kanal, 4);

    assert!(repo.loeschen(r.id).await.unwrap());
    assert!(repo.laden(r.id).await.unwrap().is_none());
    assert!(repo.zuweisungen(r.id).await.unwrap().is_empty());
}

async fn zuweisung_ohne_raum(repo: &dyn RaumRepository) {
    let ergebnis = repo.zuweisung_setzen(&zuweisung(SessionId::new(), 0, 0)).await;
    assert!(matches!(ergebnis, Err(DbError::NichtGefunden(_))));
}

#[tokio::test]
async fn sqlite_speichern_und_laden() {
    speichern_und_laden(&sqlite().await).await;
}

#[tokio::test]
async fn sqlite_nach_besitzer() {
    nach_besitzer_neueste_zuerst(&sqlite().await).await;
}

#[tokio::test]
async fn sqlite_inaktiv_markieren() {
    inaktiv_markieren(&sqlite().await).await;
}

#[tokio::test]
async fn sqlite_zuweisungen() {
    zuweisungen_ersetzen_und_loeschen(&sqlite().await).await;
}

#[tokio::test]
async fn sqlite_zuweisung_ohne_raum() {
    zuweisung_ohne_raum(&sqlite().await).await;
}

#[tokio::test]
async fn sqlite_speichern_ist_upsert() {
    let db = sqlite().await;
    let mut r = raum(IdentityId::new(), "UPS777", 0);
    db.speichern(&r).await.unwrap();
    r.name = Some("Umbenannt".into());
    db.speichern(&r).await.unwrap();
    let geladen = db.laden(r.id).await.unwrap().unwrap();
    assert_eq!(geladen.name.as_deref(), Some("Umbenannt"));
}

#[tokio::test]
async fn speicher_store_verhaelt_sich_gleich() {
    let db = SpeicherDb::neu();
    speichern_und_laden(&db).await;
    nach_besitzer_neueste_zuerst(&db).await;
    inaktiv_markieren(&db).await;
    zuweisungen_ersetzen_und_loeschen(&db).await;
    zuweisung_ohne_raum(&db).await;
}
