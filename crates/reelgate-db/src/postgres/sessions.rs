use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reelgate_core::models::UploadSession;
use reelgate_core::AppError;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::repository::SessionStore;

const SESSION_COLUMNS: &str = r#"
    id, asset_id, original_filename, declared_size, mime_type, owner_id, chunk_size,
    total_chunks, received_chunks, scratch_dir, created_at, last_activity_at
"#;

/// PostgreSQL-backed upload session store
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn session_from_row(row: &PgRow) -> Result<UploadSession, AppError> {
        let declared_size: i64 = row.try_get("declared_size")?;
        let chunk_size: i64 = row.try_get("chunk_size")?;
        let total_chunks: i32 = row.try_get("total_chunks")?;
        let received: Vec<i32> = row.try_get("received_chunks")?;
        let scratch_dir: String = row.try_get("scratch_dir")?;

        Ok(UploadSession {
            id: row.try_get("id")?,
            asset_id: row.try_get("asset_id")?,
            original_filename: row.try_get("original_filename")?,
            declared_size: declared_size.max(0) as u64,
            mime_type: row.try_get("mime_type")?,
            owner_id: row.try_get("owner_id")?,
            chunk_size: chunk_size.max(0) as u64,
            total_chunks: total_chunks.max(0) as u32,
            received_chunks: received
                .into_iter()
                .filter(|i| *i >= 0)
                .map(|i| i as u32)
                .collect::<BTreeSet<_>>(),
            scratch_dir: PathBuf::from(scratch_dir),
            created_at: row.try_get("created_at")?,
            last_activity_at: row.try_get("last_activity_at")?,
        })
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &UploadSession) -> Result<(), AppError> {
        let received: Vec<i32> = session.received_chunks.iter().map(|i| *i as i32).collect();

        sqlx::query(
            r#"
            INSERT INTO upload_sessions (
                id, asset_id, original_filename, declared_size, mime_type, owner_id,
                chunk_size, total_chunks, received_chunks, scratch_dir, created_at, last_activity_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(&session.id)
        .bind(session.asset_id)
        .bind(&session.original_filename)
        .bind(session.declared_size as i64)
        .bind(&session.mime_type)
        .bind(&session.owner_id)
        .bind(session.chunk_size as i64)
        .bind(session.total_chunks as i32)
        .bind(received)
        .bind(session.scratch_dir.to_string_lossy().to_string())
        .bind(session.created_at)
        .bind(session.last_activity_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<UploadSession>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM upload_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::session_from_row).transpose()
    }

    async fn record_chunk(&self, id: &str, index: u32) -> Result<Option<UploadSession>, AppError> {
        // Single-row UPDATE: the row lock serializes concurrent chunks of one session.
        let row = sqlx::query(&format!(
            r#"
            UPDATE upload_sessions
            SET received_chunks = CASE
                    WHEN $2 = ANY(received_chunks) THEN received_chunks
                    ELSE array_append(received_chunks, $2)
                END,
                last_activity_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(id)
        .bind(index as i32)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::session_from_row).transpose()
    }

    async fn touch(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE upload_sessions SET last_activity_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM upload_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_inactive(&self, before: DateTime<Utc>) -> Result<Vec<UploadSession>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM upload_sessions WHERE last_activity_at < $1 ORDER BY last_activity_at",
            SESSION_COLUMNS
        ))
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::session_from_row).collect()
    }
}
