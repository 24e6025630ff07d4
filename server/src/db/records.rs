//! Database operations for the `local_records` and `remote_records` tables.
//!
//! Both tables hold the same row shape. Keys are stored as the JSON rendering
//! of the structured key, so `("a_b", "c")` and `("a", "b_c")` never collide.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{PgPool, Row, SqlitePool};
use tidesync_engine::{DataShapeError, Record};

/// A stored record row, in either replica.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub record_key: String,
    /// JSON text of the payload
    pub payload: String,
    pub updated_at: i64,
    pub deleted: bool,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for StoredRecord {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(StoredRecord {
            record_key: row.try_get("record_key")?,
            payload: row.try_get("payload")?,
            updated_at: row.try_get("updated_at")?,
            deleted: row.try_get("deleted")?,
        })
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredRecord {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredRecord {
            record_key: row.try_get("record_key")?,
            payload: row.try_get("payload")?,
            updated_at: row.try_get("updated_at")?,
            deleted: row.try_get("deleted")?,
        })
    }
}

impl StoredRecord {
    /// Convert a database row to an engine record.
    pub fn decode<K: DeserializeOwned>(&self) -> Result<Record<K>, DataShapeError> {
        let key: K = serde_json::from_str(&self.record_key).map_err(|e| {
            DataShapeError::for_key(self.record_key.as_str(), format!("undecodable key: {}", e))
        })?;
        let updated_at = u64::try_from(self.updated_at).map_err(|_| {
            DataShapeError::for_key(
                self.record_key.as_str(),
                format!("negative updatedAt {}", self.updated_at),
            )
        })?;
        let payload = serde_json::from_str(&self.payload).map_err(|e| {
            DataShapeError::for_key(self.record_key.as_str(), format!("undecodable payload: {}", e))
        })?;

        Ok(Record {
            key,
            updated_at,
            deleted: self.deleted,
            payload,
        })
    }

    /// Convert an engine record to a database row.
    pub fn encode<K: Serialize>(record: &Record<K>) -> Result<Self, DataShapeError> {
        let record_key = serde_json::to_string(&record.key)
            .map_err(|e| DataShapeError::new(format!("unencodable key: {}", e)))?;
        let updated_at = i64::try_from(record.updated_at).map_err(|_| {
            DataShapeError::for_key(
                record_key.as_str(),
                format!("updatedAt {} out of range", record.updated_at),
            )
        })?;

        Ok(StoredRecord {
            payload: record.payload.to_string(),
            record_key,
            updated_at,
            deleted: record.deleted,
        })
    }
}

/// Every local record of one collection, tombstones included.
pub async fn fetch_local(
    pool: &SqlitePool,
    session_id: &str,
    collection: &str,
) -> Result<Vec<StoredRecord>, sqlx::Error> {
    sqlx::query_as::<_, StoredRecord>(
        r#"
        SELECT record_key, payload, updated_at, deleted
        FROM local_records
        WHERE session_id = ?1 AND collection = ?2
        "#,
    )
    .bind(session_id)
    .bind(collection)
    .fetch_all(pool)
    .await
}

/// Insert or replace a local record.
pub async fn upsert_local(
    pool: &SqlitePool,
    session_id: &str,
    collection: &str,
    record: &StoredRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO local_records (session_id, collection, record_key, payload, updated_at, deleted)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT (session_id, collection, record_key) DO UPDATE SET
            payload = excluded.payload,
            updated_at = excluded.updated_at,
            deleted = excluded.deleted
        "#,
    )
    .bind(session_id)
    .bind(collection)
    .bind(&record.record_key)
    .bind(&record.payload)
    .bind(record.updated_at)
    .bind(record.deleted)
    .execute(pool)
    .await?;

    Ok(())
}

/// Every remote record of one collection for one session.
pub async fn fetch_remote(
    pool: &PgPool,
    session_id: &str,
    collection: &str,
) -> Result<Vec<StoredRecord>, sqlx::Error> {
    sqlx::query_as::<_, StoredRecord>(
        r#"
        SELECT record_key, payload::text AS payload, updated_at, deleted
        FROM remote_records
        WHERE session_id = $1 AND collection = $2
        "#,
    )
    .bind(session_id)
    .bind(collection)
    .fetch_all(pool)
    .await
}

/// Insert or replace a remote record.
pub async fn upsert_remote(
    pool: &PgPool,
    session_id: &str,
    collection: &str,
    record: &StoredRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO remote_records (session_id, collection, record_key, payload, updated_at, deleted)
        VALUES ($1, $2, $3, $4::jsonb, $5, $6)
        ON CONFLICT (session_id, collection, record_key) DO UPDATE SET
            payload = EXCLUDED.payload,
            updated_at = EXCLUDED.updated_at,
            deleted = EXCLUDED.deleted
        "#,
    )
    .bind(session_id)
    .bind(collection)
    .bind(&record.record_key)
    .bind(&record.payload)
    .bind(record.updated_at)
    .bind(record.deleted)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tidesync_engine::CompositeKey;

    async fn local_pool() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::run_local_migrations(&pool).await.unwrap();
        pool
    }

    #[test]
    fn keys_are_stored_as_json() {
        let string_key: Record<String> = Record::new("ex1", json!({}), 1);
        assert_eq!(StoredRecord::encode(&string_key).unwrap().record_key, r#""ex1""#);

        let int_key: Record<i64> = Record::new(42, json!({}), 1);
        assert_eq!(StoredRecord::encode(&int_key).unwrap().record_key, "42");

        let key: CompositeKey<String, String> = CompositeKey::new("t1", "e1");
        let pair: Record<CompositeKey<String, String>> = Record::tombstone(key, 1);
        let stored = StoredRecord::encode(&pair).unwrap();
        assert_eq!(stored.record_key, r#"{"first":"t1","second":"e1"}"#);
        assert_eq!(stored.decode::<CompositeKey<String, String>>().unwrap(), pair);
    }

    #[test]
    fn bad_rows_are_data_shape_errors() {
        let row = StoredRecord {
            record_key: r#""s1""#.to_string(),
            payload: "{not json".to_string(),
            updated_at: 5,
            deleted: false,
        };
        let err = row.decode::<String>().unwrap_err();
        assert_eq!(err.key.as_deref(), Some(r#""s1""#));
        assert!(err.reason.starts_with("undecodable payload"));

        let row = StoredRecord {
            record_key: r#""s1""#.to_string(),
            payload: "{}".to_string(),
            updated_at: 5,
            deleted: false,
        };
        assert!(row.decode::<i64>().is_err());

        let row = StoredRecord {
            updated_at: -1,
            ..row
        };
        assert!(row.decode::<String>().is_err());
    }

    #[test]
    fn timestamps_beyond_i64_are_rejected() {
        let record: Record<String> = Record::new("ex1", json!({}), u64::MAX);
        assert!(StoredRecord::encode(&record).is_err());
    }

    #[tokio::test]
    async fn local_upsert_replaces_by_key() {
        let pool = local_pool().await;
        let first: Record<String> = Record::new("ex1", json!({"name": "Squat"}), 1);
        let second: Record<String> = Record::tombstone("ex1", 2);

        upsert_local(&pool, "user-1", "exercises", &StoredRecord::encode(&first).unwrap())
            .await
            .unwrap();
        upsert_local(&pool, "user-1", "exercises", &StoredRecord::encode(&second).unwrap())
            .await
            .unwrap();

        let rows = fetch_local(&pool, "user-1", "exercises").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].decode::<String>().unwrap(), second);
    }

    #[tokio::test]
    async fn local_rows_are_scoped() {
        let pool = local_pool().await;
        let record: Record<i64> = Record::new(7, json!({"metric": "volume"}), 10);
        let stored = StoredRecord::encode(&record).unwrap();

        upsert_local(&pool, "user-1", "chart_templates", &stored)
            .await
            .unwrap();

        assert_eq!(fetch_local(&pool, "user-1", "chart_templates").await.unwrap().len(), 1);
        assert!(fetch_local(&pool, "user-2", "chart_templates").await.unwrap().is_empty());
        assert!(fetch_local(&pool, "user-1", "set_configs").await.unwrap().is_empty());
    }
}
