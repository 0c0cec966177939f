use async_trait::async_trait;
use reelgate_core::models::{AssetOutputs, AssetStatus, QualityOutput, VideoAsset, VideoMetadata};
use reelgate_core::AppError;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::repository::AssetStateRecorder;

const ASSET_COLUMNS: &str = r#"
    id, owner_id, original_filename, original_path, status, processing_progress,
    thumbnail_url, hls_playlist_url, error_message, metadata, qualities,
    created_at, updated_at
"#;

/// PostgreSQL-backed asset state recorder
#[derive(Clone)]
pub struct PgAssetRepository {
    pool: PgPool,
}

impl PgAssetRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn asset_from_row(row: &PgRow) -> Result<VideoAsset, AppError> {
        let status: String = row.try_get("status")?;
        let progress: i16 = row.try_get("processing_progress")?;
        let metadata: Option<Json<VideoMetadata>> = row.try_get("metadata")?;
        let qualities: Json<Vec<QualityOutput>> = row.try_get("qualities")?;

        Ok(VideoAsset {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            original_filename: row.try_get("original_filename")?,
            original_path: row.try_get("original_path")?,
            status: status.parse::<AssetStatus>()?,
            processing_progress: progress.clamp(0, 100) as u8,
            thumbnail_url: row.try_get("thumbnail_url")?,
            hls_playlist_url: row.try_get("hls_playlist_url")?,
            error_message: row.try_get("error_message")?,
            metadata: metadata.map(|m| m.0),
            qualities: qualities.0,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn ensure_updated(rows: u64, id: Uuid) -> Result<(), AppError> {
        if rows == 0 {
            return Err(AppError::NotFound(format!("Video asset {}", id)));
        }
        Ok(())
    }

    /// A status-guarded update touching no row is either a missing asset or one in
    /// another state; only the former is an error.
    async fn guarded_result(&self, rows: u64, id: Uuid) -> Result<bool, AppError> {
        if rows > 0 {
            return Ok(true);
        }
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM video_assets WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        if exists {
            Ok(false)
        } else {
            Err(AppError::NotFound(format!("Video asset {}", id)))
        }
    }
}

#[async_trait]
impl AssetStateRecorder for PgAssetRepository {
    async fn create_asset(&self, asset: &VideoAsset) -> Result<(), AppError> {
        // Use dynamic SQLx queries to avoid requiring DATABASE_URL/sqlx prepare
        sqlx::query(
            r#"
            INSERT INTO video_assets (
                id, owner_id, original_filename, original_path, status, processing_progress,
                metadata, qualities, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(asset.id)
        .bind(&asset.owner_id)
        .bind(&asset.original_filename)
        .bind(&asset.original_path)
        .bind(asset.status.to_string())
        .bind(asset.processing_progress as i16)
        .bind(asset.metadata.as_ref().map(Json))
        .bind(Json(&asset.qualities))
        .bind(asset.created_at)
        .bind(asset.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_asset(&self, id: Uuid) -> Result<Option<VideoAsset>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM video_assets WHERE id = $1",
            ASSET_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::asset_from_row).transpose()
    }

    async fn mark_processing(
        &self,
        id: Uuid,
        original_path: &str,
        metadata: Option<&VideoMetadata>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE video_assets
            SET status = 'processing', original_path = $2,
                metadata = COALESCE($3, metadata), updated_at = NOW()
            WHERE id = $1 AND status = 'uploading'
            "#,
        )
        .bind(id)
        .bind(original_path)
        .bind(metadata.map(Json))
        .execute(&self.pool)
        .await?;

        self.guarded_result(result.rows_affected(), id).await
    }

    async fn record_metadata(&self, id: Uuid, metadata: &VideoMetadata) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE video_assets SET metadata = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(Json(metadata))
        .execute(&self.pool)
        .await?;

        Self::ensure_updated(result.rows_affected(), id)
    }

    async fn update_progress(&self, id: Uuid, progress: u8) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE video_assets SET processing_progress = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(progress.min(100) as i16)
        .execute(&self.pool)
        .await?;

        self.guarded_result(result.rows_affected(), id).await
    }

    async fn mark_ready(&self, id: Uuid, outputs: &AssetOutputs) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE video_assets
            SET status = 'ready', processing_progress = 100, thumbnail_url = $2,
                hls_playlist_url = $3, qualities = $4, error_message = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(&outputs.thumbnail_url)
        .bind(&outputs.hls_playlist_url)
        .bind(Json(&outputs.qualities))
        .execute(&self.pool)
        .await?;

        self.guarded_result(result.rows_affected(), id).await
    }

    async fn mark_error(&self, id: Uuid, message: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE video_assets
            SET status = 'error', error_message = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('uploading', 'processing')
            "#,
        )
        .bind(id)
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn discard_uploading(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM video_assets WHERE id = $1 AND status = 'uploading'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
