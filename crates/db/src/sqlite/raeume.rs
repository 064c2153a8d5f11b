//! SQLite-Implementierung des RaumRepository

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use klangbruecke_core::{IdentityId, SessionId};
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{GeraeteZuweisung, RaumRecord};
use crate::repository::{DbResult, RaumRepository};
use crate::sqlite::pool::SqliteDb;

const RAUM_SPALTEN: &str =
    "id, code, secret_hash, owner_id, name, is_public, active, created_at, closed_at";

#[async_trait]
impl RaumRepository for SqliteDb {
    async fn speichern(&self, raum: &RaumRecord) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO rooms
               (id, code, secret_hash, owner_id, name, is_public, active, created_at, closed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               code = excluded.code,
               secret_hash = excluded.secret_hash,
               name = excluded.name,
               is_public = excluded.is_public,
               active = excluded.active,
               closed_at = excluded.closed_at",
        )
        .bind(raum.id.inner().to_string())
        .bind(&raum.code)
        .bind(&raum.geheimnis_hash)
        .bind(raum.besitzer.inner().to_string())
        .bind(&raum.name)
        .bind(raum.oeffentlich)
        .bind(raum.aktiv)
        .bind(zeit_text(raum.erstellt_am))
        .bind(raum.geschlossen_am.map(zeit_text))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn laden(&self, id: SessionId) -> DbResult<Option<RaumRecord>> {
        let row = sqlx::query(&format!("SELECT {RAUM_SPALTEN} FROM rooms WHERE id = ?"))
            .bind(id.inner().to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_raum(&r)).transpose()
    }

    async fn inaktiv_markieren(&self, id: SessionId, zeitpunkt: DateTime<Utc>) -> DbResult<bool> {
        let ergebnis = sqlx::query("UPDATE rooms SET active = 0, closed_at = ? WHERE id = ?")
            .bind(zeit_text(zeitpunkt))
            .bind(id.inner().to_string())
            .execute(&self.pool)
            .await?;
        Ok(ergebnis.rows_affected() > 0)
    }

    async fn nach_besitzer(&self, besitzer: IdentityId) -> DbResult<Vec<RaumRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RAUM_SPALTEN} FROM rooms WHERE owner_id = ? ORDER BY created_at DESC"
        ))
        .bind(besitzer.inner().to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_raum).collect()
    }

    async fn loeschen(&self, id: SessionId) -> DbResult<bool> {
        let ergebnis = sqlx::query("DELETE FROM rooms WHERE id = ?")
            .bind(id.inner().to_string())
            .execute(&self.pool)
            .await?;
        Ok(ergebnis.rows_affected() > 0)
    }

    async fn zuweisung_setzen(&self, z: &GeraeteZuweisung) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO device_assignments (room_id, channel, device_id, device_channel, label)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(room_id, channel) DO UPDATE SET
               device_id = excluded.device_id,
               device_channel = excluded.device_channel,
               label = excluded.label",
        )
        .bind(z.session_id.inner().to_string())
        .bind(i64::from(z.kanal))
        .bind(&z.geraet_id)
        .bind(i64::from(z.geraet_kanal))
        .bind(&z.bezeichnung)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            let fehler = DbError::Sqlx(e);
            if fehler.ist_fremdschluessel() {
                DbError::nicht_gefunden(format!("Raum {}", z.session_id))
            } else {
                fehler
            }
        })?;
        Ok(())
    }

    async fn zuweisungen(&self, id: SessionId) -> DbResult<Vec<GeraeteZuweisung>> {
        let rows = sqlx::query(
            "SELECT room_id, channel, device_id, device_channel, label
             FROM device_assignments WHERE room_id = ? ORDER BY channel",
        )
        .bind(id.inner().to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_zuweisung).collect()
    }
}

// ---------------------------------------------------------------------------
// Zeilen-Konvertierung
// ---------------------------------------------------------------------------

/// RFC 3339 mit fester Mikrosekunden-Praezision, damit ORDER BY stimmt
fn zeit_text(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_uuid(row: &SqliteRow, col: &str) -> DbResult<Uuid> {
    let s: String = row.try_get(col)?;
    Uuid::parse_str(&s).map_err(|e| DbError::intern(format!("Ungueltige UUID in '{col}': {e}")))
}

fn parse_datetime(s: &str, col: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::intern(format!("Ungueltige DateTime in '{col}': {e}")))
}

fn parse_u16(row: &SqliteRow, col: &str) -> DbResult<u16> {
    let wert: i64 = row.try_get(col)?;
    u16::try_from(wert)
        .map_err(|_| DbError::UngueltigeDaten(format!("'{col}' ausserhalb von u16: {wert}")))
}

fn row_to_raum(row: &SqliteRow) -> DbResult<RaumRecord> {
    let erstellt: String = row.try_get("created_at")?;
    let geschlossen: Option<String> = row.try_get("closed_at")?;
    Ok(RaumRecord {
        id: SessionId(parse_uuid(row, "id")?),
        code: row.try_get("code")?,
        geheimnis_hash: row.try_get("secret_hash")?,
        besitzer: IdentityId(parse_uuid(row, "owner_id")?),
        name: row.try_get("name")?,
        oeffentlich: row.try_get("is_public")?,
        aktiv: row.try_get("active")?,
        erstellt_am: parse_datetime(&erstellt, "created_at")?,
        geschlossen_am: geschlossen
            .as_deref()
            .map(|s| parse_datetime(s, "closed_at"))
            .transpose()?,
    })
}

fn row_to_zuweisung(row: &SqliteRow) -> DbResult<GeraeteZuweisung> {
    Ok(GeraeteZuweisung {
        session_id: SessionId(parse_uuid(row, "room_id")?),
        kanal: parse_u16(row, "channel")?,
        geraet_id: row.try_get("device_id")?,
        geraet_kanal: parse_u16(row, "device_channel")?,
        bezeichnung: row.try_get("label")?,
    })
}
