//! File registry (C4): the persistent `absolute_path -> (checksum,
//! identifier)` mapping. Exactly one row exists iff the file exists on
//! disk after publication (spec §3 FileRecord invariant); keeping that
//! invariant true is the publish/delete paths' job, not this store's.

use pifs_api_types::{ApiError, FileRecord};
use sqlx::PgPool;

pub struct FileRegistry {
    db: PgPool,
}

impl FileRegistry {
    pub fn new(db: PgPool) -> Self {
        FileRegistry { db }
    }

    pub async fn get(&self, path: &str) -> Result<Option<FileRecord>, ApiError> {
        sqlx::query_as::<_, FileRecord>(
            "SELECT path, checksum, identifier FROM file_records WHERE path = $1",
        )
        .bind(path)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| ApiError::Internal(e.into()))
    }

    pub async fn insert_all(&self, records: &[FileRecord]) -> Result<(), ApiError> {
        let mut tx = self.db.begin().await.map_err(|e| ApiError::Internal(e.into()))?;
        for record in records {
            sqlx::query(
                "INSERT INTO file_records (path, checksum, identifier) VALUES ($1, $2, $3)",
            )
            .bind(&record.path)
            .bind(&record.checksum)
            .bind(&record.identifier)
            .execute(&mut *tx)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        }
        tx.commit().await.map_err(|e| ApiError::Internal(e.into()))?;
        Ok(())
    }

    pub async fn delete_under(&self, path_prefix: &str) -> Result<Vec<FileRecord>, ApiError> {
        let deleted = sqlx::query_as::<_, FileRecord>(
            "DELETE FROM file_records WHERE path = $1 OR path LIKE $2 RETURNING path, checksum, identifier",
        )
        .bind(path_prefix)
        .bind(format!("{path_prefix}/%"))
        .fetch_all(&self.db)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
        Ok(deleted)
    }

    pub async fn list_under(&self, path_prefix: &str) -> Result<Vec<FileRecord>, ApiError> {
        sqlx::query_as::<_, FileRecord>(
            "SELECT path, checksum, identifier FROM file_records WHERE path = $1 OR path LIKE $2",
        )
        .bind(path_prefix)
        .bind(format!("{path_prefix}/%"))
        .fetch_all(&self.db)
        .await
        .map_err(|e| ApiError::Internal(e.into()))
    }
}
