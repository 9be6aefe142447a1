//! Content-addressed CV versions.

use std::path::Path;

use chrono::Utc;
use jmt_core::{CvMetadata, CvVersion};
use sha2::{Digest, Sha256};
use sqlx::sqlite::SqliteRow;
use sqlx::types::Json;
use sqlx::Row;
use tokio::fs;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::Store;

/// Width of the hexadecimal CV key prefix.
pub const CV_KEY_LEN: usize = 16;

const CV_COLUMNS: &str = "cv_key, file_name, file_path, file_hash, upload_date, summary, metadata";

pub fn file_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Deterministic key for a CV: the first 16 hex characters of its SHA-256.
pub fn generate_cv_key(bytes: &[u8]) -> String {
    let mut key = file_hash(bytes);
    key.truncate(CV_KEY_LEN);
    key
}

impl Store {
    /// Registers the CV at `path` unless a version with the same content is already known.
    /// A known version is returned exactly as stored.
    pub async fn get_or_create_cv_metadata(
        &self,
        path: impl AsRef<Path>,
    ) -> Result<CvVersion, StoreError> {
        let path = path.as_ref();
        let bytes = fs::read(path).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                StoreError::FileNotFound(path.to_path_buf())
            } else {
                StoreError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let hash = file_hash(&bytes);
        let cv_key = hash[..CV_KEY_LEN].to_string();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let mut tx = self.pool().begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO cv_versions (cv_key, file_name, file_path, file_hash, upload_date)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (cv_key) DO NOTHING",
        )
        .bind(&cv_key)
        .bind(&file_name)
        .bind(path.display().to_string())
        .bind(&hash)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let row = sqlx::query(&format!(
            "SELECT {CV_COLUMNS} FROM cv_versions WHERE cv_key = ?1"
        ))
        .bind(&cv_key)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        if inserted == 1 {
            info!(%cv_key, file = %file_name, "registered new CV version");
        } else {
            debug!(%cv_key, "CV version already known");
        }
        row_to_cv_version(&row)
    }

    pub async fn get_cv_version(&self, cv_key: &str) -> Result<CvVersion, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CV_COLUMNS} FROM cv_versions WHERE cv_key = ?1"
        ))
        .bind(cv_key)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("cv version {cv_key}")))?;
        row_to_cv_version(&row)
    }

    pub async fn list_cv_versions(&self) -> Result<Vec<CvVersion>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CV_COLUMNS} FROM cv_versions ORDER BY upload_date DESC, cv_key"
        ))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(row_to_cv_version).collect()
    }

    /// Attaches the extraction collaborator's summary to an existing CV version.
    pub async fn set_cv_summary(
        &self,
        cv_key: &str,
        summary: &str,
        metadata: Option<&CvMetadata>,
    ) -> Result<CvVersion, StoreError> {
        let mut tx = self.pool().begin().await?;
        let updated = sqlx::query(
            "UPDATE cv_versions SET summary = ?2, metadata = ?3 WHERE cv_key = ?1",
        )
        .bind(cv_key)
        .bind(summary)
        .bind(metadata.map(Json))
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(StoreError::NotFound(format!("cv version {cv_key}")));
        }

        let row = sqlx::query(&format!(
            "SELECT {CV_COLUMNS} FROM cv_versions WHERE cv_key = ?1"
        ))
        .bind(cv_key)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        row_to_cv_version(&row)
    }
}

fn row_to_cv_version(row: &SqliteRow) -> Result<CvVersion, StoreError> {
    let metadata: Option<Json<CvMetadata>> = row.try_get("metadata")?;
    Ok(CvVersion {
        cv_key: row.try_get("cv_key")?,
        file_name: row.try_get("file_name")?,
        file_path: row.try_get("file_path")?,
        file_hash: row.try_get("file_hash")?,
        upload_date: row.try_get("upload_date")?,
        summary: row.try_get("summary")?,
        metadata: metadata.map(|m| m.0),
    })
}
