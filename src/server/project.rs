//! Project store (C3 persistence half; arithmetic lives in
//! `pifs_store::quota`).
//!
//! `used_quota` is reconciled at the three points spec §4.3 names:
//! after a publish, after a delete, and by periodic reconciliation
//! against `stored_bytes` walked fresh off disk.

use pifs_api_types::{ApiError, Project};
use sqlx::PgPool;
use walkdir::WalkDir;

pub struct ProjectStore {
    db: PgPool,
}

impl ProjectStore {
    pub fn new(db: PgPool) -> Self {
        ProjectStore { db }
    }

    pub async fn get(&self, project_id: &str) -> Result<Project, ApiError> {
        sqlx::query_as::<_, Project>("SELECT id, quota, used_quota FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?
            .ok_or_else(|| ApiError::NotFound(format!("project {project_id}")))
    }

    pub async fn list_all(&self) -> Result<Vec<Project>, ApiError> {
        sqlx::query_as::<_, Project>("SELECT id, quota, used_quota FROM projects ORDER BY id")
            .fetch_all(&self.db)
            .await
            .map_err(|e| ApiError::Internal(e.into()))
    }

    /// Admin project creation (spec §9 Section B supplement). Rejects
    /// identifiers that are not a single path segment, mirroring the
    /// same rule the path sanitiser applies to uploads.
    pub async fn create(&self, project_id: &str, quota: i64) -> Result<Project, ApiError> {
        if project_id.is_empty()
            || project_id.contains('/')
            || project_id.contains("..")
            || project_id.starts_with('.')
        {
            return Err(ApiError::InvalidPath(project_id.to_string()));
        }

        sqlx::query(
            "INSERT INTO projects (id, quota, used_quota) VALUES ($1, $2, 0) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(project_id)
        .bind(quota)
        .execute(&self.db)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;

        self.get(project_id).await
    }

    pub async fn set_quota(&self, project_id: &str, quota: i64) -> Result<Project, ApiError> {
        sqlx::query("UPDATE projects SET quota = $1 WHERE id = $2")
            .bind(quota)
            .bind(project_id)
            .execute(&self.db)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        self.get(project_id).await
    }

    pub async fn delete(&self, project_id: &str) -> Result<(), ApiError> {
        sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(project_id)
            .execute(&self.db)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        Ok(())
    }

    pub async fn set_used_quota(&self, project_id: &str, used_quota: i64) -> Result<(), ApiError> {
        sqlx::query("UPDATE projects SET used_quota = $1 WHERE id = $2")
            .bind(used_quota)
            .bind(project_id)
            .execute(&self.db)
            .await
            .map_err(|e| ApiError::Internal(e.into()))?;
        Ok(())
    }

    /// Reconciles `used_quota` against the authoritative on-disk total
    /// (spec §4.3 point (c)).
    pub async fn reconcile_used_quota(
        &self,
        project_id: &str,
        project_root: &std::path::Path,
    ) -> Result<i64, ApiError> {
        let stored_bytes: u64 = WalkDir::new(project_root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum();

        self.set_used_quota(project_id, stored_bytes as i64).await?;
        Ok(stored_bytes as i64)
    }

    /// Sum of `declared_size` across every in-flight upload for the
    /// project (spec §4.3 `reserved_bytes`).
    pub async fn reserved_bytes(&self, project_id: &str) -> Result<i64, ApiError> {
        let row: (Option<i64>,) = sqlx::query_as(
            "SELECT SUM(declared_size) FROM uploads WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_one(&self.db)
        .await
        .map_err(|e| ApiError::Internal(e.into()))?;
        Ok(row.0.unwrap_or(0))
    }
}
