use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reelgate_core::models::{JobStatus, TranscodeJob, TranscodeOptions};
use reelgate_core::AppError;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::path::PathBuf;
use uuid::Uuid;

use crate::repository::TranscodeJobRepository;

const JOB_COLUMNS: &str = r#"
    id, asset_id, input_path, options, status, error_message,
    created_at, started_at, last_heartbeat_at, finished_at
"#;

/// PostgreSQL-backed transcode job repository
#[derive(Clone)]
pub struct PgTranscodeJobRepository {
    pool: PgPool,
}

impl PgTranscodeJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn job_from_row(row: &PgRow) -> Result<TranscodeJob, AppError> {
        let status: String = row.try_get("status")?;
        let input_path: String = row.try_get("input_path")?;
        let options: Json<TranscodeOptions> = row.try_get("options")?;

        Ok(TranscodeJob {
            id: row.try_get("id")?,
            asset_id: row.try_get("asset_id")?,
            input_path: PathBuf::from(input_path),
            options: options.0,
            status: status.parse::<JobStatus>()?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            last_heartbeat_at: row.try_get("last_heartbeat_at")?,
            finished_at: row.try_get("finished_at")?,
        })
    }
}

#[async_trait]
impl TranscodeJobRepository for PgTranscodeJobRepository {
    async fn insert(&self, job: &TranscodeJob) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO transcode_jobs (id, asset_id, input_path, options, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(job.id)
        .bind(job.asset_id)
        .bind(job.input_path.to_string_lossy().to_string())
        .bind(Json(&job.options))
        .bind(job.status.to_string())
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<TranscodeJob>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transcode_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::job_from_row).transpose()
    }

    async fn mark_running(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE transcode_jobs
            SET status = 'running', started_at = NOW(), last_heartbeat_at = NOW()
            WHERE id = $1 AND status = 'queued'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn heartbeat(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE transcode_jobs SET last_heartbeat_at = NOW() WHERE id = $1 AND status = 'running'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finish(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<bool, AppError> {
        if !status.is_finished() {
            return Err(AppError::Internal(format!(
                "Cannot finish job with non-final status {}",
                status
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE transcode_jobs
            SET status = $2, error_message = $3, finished_at = NOW()
            WHERE id = $1 AND status IN ('queued', 'running')
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<TranscodeJob>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM transcode_jobs WHERE status = $1 ORDER BY created_at",
            JOB_COLUMNS
        ))
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::job_from_row).collect()
    }

    async fn find_stale_running(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Vec<TranscodeJob>, AppError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM transcode_jobs
            WHERE status = 'running' AND COALESCE(last_heartbeat_at, started_at, created_at) < $1
            ORDER BY created_at
            "#,
            JOB_COLUMNS
        ))
        .bind(before)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::job_from_row).collect()
    }

    async fn latest_for_asset(&self, asset_id: Uuid) -> Result<Option<TranscodeJob>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM transcode_jobs WHERE asset_id = $1 ORDER BY created_at DESC LIMIT 1",
            JOB_COLUMNS
        ))
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::job_from_row).transpose()
    }
}
