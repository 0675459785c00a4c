//! # Database Persistence Layer
//!
//! Provides Postgres persistence for Transmission records via SQLx.
//!
//! ## Architecture
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, every
//! mutation is written through to PostgreSQL and the in-memory stores are
//! hydrated from it on startup. When absent, the API operates in
//! in-memory-only mode (suitable for development and testing).
//!
//! Every record table has the same shape:
//!
//! ```text
//! id UUID PRIMARY KEY, shipment_id UUID NULL, body JSONB, updated_at TIMESTAMPTZ
//! ```
//!
//! `body` holds the serialized record; `shipment_id` is indexed for
//! per-shipment queries run directly against the database.

use chrono::Utc;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use uuid::Uuid;

use crate::records::Persisted;

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if no URL is configured (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool(database_url: Option<&str>) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = database_url else {
        tracing::warn!(
            "DATABASE_URL not set; running in-memory only mode. \
             State will not survive restarts."
        );
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Insert or replace a record.
pub async fn save<T: Persisted>(pool: &PgPool, record: &T) -> Result<(), sqlx::Error> {
    let sql = format!(
        "INSERT INTO {table} (id, shipment_id, body, updated_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (id) DO UPDATE
         SET shipment_id = EXCLUDED.shipment_id, body = EXCLUDED.body, updated_at = EXCLUDED.updated_at",
        table = T::TABLE
    );
    sqlx::query(&sql)
        .bind(record.key())
        .bind(record.shipment_key())
        .bind(Json(record))
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a record. Returns whether a row was removed.
pub async fn delete<T: Persisted>(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let sql = format!("DELETE FROM {} WHERE id = $1", T::TABLE);
    let result = sqlx::query(&sql).bind(id).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

/// Load every record of a table.
///
/// Rows whose body no longer deserializes are skipped with an error log.
pub async fn load_all<T: Persisted>(pool: &PgPool) -> Result<Vec<T>, sqlx::Error> {
    let sql = format!("SELECT id, body FROM {} ORDER BY updated_at", T::TABLE);
    let rows: Vec<(Uuid, Json<serde_json::Value>)> =
        sqlx::query_as(&sql).fetch_all(pool).await?;

    let mut records = Vec::with_capacity(rows.len());
    for (id, Json(body)) in rows {
        match serde_json::from_value::<T>(body) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::error!(table = T::TABLE, %id, error = %e, "skipping row with undecodable body");
            }
        }
    }
    Ok(records)
}
