//! Background worker entry point (spec §5, §4.7): drains the three named
//! queues, doing the slow part of archive extraction, trash cleanup and
//! catalogue reconciliation outside the request path.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use pifs_store::checksum;
use walkdir::WalkDir;

use pifs::server::publish::{self, StagedFile};
use pifs::server::task::Job;
use pifs::server::worker::{spawn_all, JobHandler};
use pifs::AppState;

struct UploadJobHandler {
    state: Arc<AppState>,
}

#[async_trait]
impl JobHandler for UploadJobHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<()> {
        let upload_id = job.payload["upload_id"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("job payload missing upload_id"))?;
        let resolved_path = job.payload["resolved_path"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("job payload missing resolved_path"))?
            .to_string();
        let is_archive = job.payload["archive"].as_bool().unwrap_or(false);

        let upload = self
            .state
            .uploads
            .get(&upload_id.to_string())
            .await?
            .ok_or_else(|| anyhow::anyhow!("upload {upload_id} no longer exists"))?;

        let staging = pifs::server::upload::StagingPaths::new(
            Path::new(&self.state.config.upload_tmp_path),
            upload_id,
        );
        let project_root = Path::new(&self.state.config.upload_projects_path).join(&job.project_id);

        let result = if is_archive {
            self.process_archive(&upload, &staging, &project_root).await
        } else {
            self.process_file(&upload, &staging, &project_root).await
        };

        let _ = tokio::fs::remove_dir_all(&staging.upload_dir).await;
        let _ = self.state.uploads.delete(&upload.id).await;
        let _ = self.state.locks.release(&job.project_id, &resolved_path).await;
        result
    }
}

impl UploadJobHandler {
    async fn process_file(
        &self,
        upload: &pifs_api_types::Upload,
        staging: &pifs::server::upload::StagingPaths,
        project_root: &Path,
    ) -> anyhow::Result<()> {
        let verified = pifs::server::upload::verify_source(
            &staging.source,
            upload.source_checksum.as_deref(),
        )
        .map_err(|e| anyhow::anyhow!(e))?;

        let size = tokio::fs::metadata(&staging.source).await?.len();
        let staged = vec![StagedFile {
            relative_path: upload.relative_path.clone(),
            absolute_staging_path: staging.source.clone(),
            size,
            checksum: verified.md5,
        }];

        publish::publish(
            &self.state.catalogue,
            &self.state.registry,
            &self.state.projects,
            &upload.project_id,
            &self.state.config.storage_id,
            project_root,
            staged,
        )
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    async fn process_archive(
        &self,
        upload: &pifs_api_types::Upload,
        staging: &pifs::server::upload::StagingPaths,
        project_root: &Path,
    ) -> anyhow::Result<()> {
        let entries = pifs_store::archive::extract_archive(&staging.source, &staging.tmp_storage)?;
        pifs_store::archive::sanitise_extracted_tree(&staging.tmp_storage)?;

        let target_dir = upload.relative_path.as_str();
        let extracted_size: u64 = entries.iter().map(|e| e.size).sum();

        let project = self.state.projects.get(&upload.project_id).await.map_err(|e| anyhow::anyhow!(e))?;
        let reserved = self
            .state
            .projects
            .reserved_bytes(&upload.project_id)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        let remaining = project.quota - project.used_quota - reserved;
        if !pifs_store::quota::admit(project.quota, project.used_quota, reserved, extracted_size as i64)
        {
            anyhow::bail!("quota exceeded: remaining {remaining}, extracted {extracted_size}");
        }

        let mut staged = Vec::with_capacity(entries.len());
        let mut conflicts = Vec::new();
        let existing = self
            .state
            .catalogue
            .list_project_files(&upload.project_id)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        for entry in &entries {
            let relative_path = format!("{target_dir}/{}", entry.relative_path.display());
            let catalogue_path = format!("/{relative_path}");
            if existing.contains_key(&catalogue_path) {
                conflicts.push(relative_path.clone());
                continue;
            }

            let absolute_staging_path = staging.tmp_storage.join(&entry.relative_path);
            let file = std::fs::File::open(&absolute_staging_path)?;
            let digests = checksum::digest(file, None)?;
            staged.push(StagedFile {
                relative_path,
                absolute_staging_path,
                size: entry.size,
                checksum: digests.md5,
            });
        }

        if !conflicts.is_empty() {
            anyhow::bail!("file(s) already exist: {}", conflicts.join(", "));
        }

        publish::publish(
            &self.state.catalogue,
            &self.state.registry,
            &self.state.projects,
            &upload.project_id,
            &self.state.config.storage_id,
            project_root,
            staged,
        )
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }
}

struct FilesJobHandler {
    state: Arc<AppState>,
}

#[async_trait]
impl JobHandler for FilesJobHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<()> {
        let trash_path = job.payload["trash_path"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("job payload missing trash_path"))?;
        let resolved_path = job.payload["resolved_path"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("job payload missing resolved_path"))?;
        let keep_catalogue_metadata = job.payload["keep_catalogue_metadata"]
            .as_bool()
            .unwrap_or(false);
        let file_ids: Vec<String> = job.payload["file_ids"]
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        if !keep_catalogue_metadata {
            self.state.registry.delete_under(resolved_path).await.map_err(|e| anyhow::anyhow!(e))?;
            if !file_ids.is_empty() {
                self.state
                    .catalogue
                    .delete_files(&file_ids)
                    .await
                    .map_err(|e| anyhow::anyhow!(e))?;
            }
        }

        tokio::fs::remove_dir_all(trash_path).await.ok();

        let project_root =
            Path::new(&self.state.config.upload_projects_path).join(&job.project_id);
        self.state
            .projects
            .reconcile_used_quota(&job.project_id, &project_root)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        self.state.locks.release(&job.project_id, resolved_path).await.ok();
        Ok(())
    }
}

/// Catalogue reconciliation (spec component C7's `metadata` queue);
/// re-syncs `used_quota` against the on-disk total for the job's project.
struct MetadataJobHandler {
    state: Arc<AppState>,
}

#[async_trait]
impl JobHandler for MetadataJobHandler {
    async fn handle(&self, job: &Job) -> anyhow::Result<()> {
        let project_root =
            Path::new(&self.state.config.upload_projects_path).join(&job.project_id);
        let stored_bytes = WalkDir::new(&project_root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .count();
        log::info!(
            "metadata reconciliation for project {}: {stored_bytes} file(s) on disk",
            job.project_id
        );
        self.state
            .projects
            .reconcile_used_quota(&job.project_id, &project_root)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = pifs_config::Config::from_env()?;
    let state = Arc::new(AppState::connect(config).await?);

    let handles = spawn_all(
        state.tasks.clone(),
        Arc::new(UploadJobHandler { state: state.clone() }),
        Arc::new(FilesJobHandler { state: state.clone() }),
        Arc::new(MetadataJobHandler { state: state.clone() }),
    );

    log::info!("pifs-worker started, draining upload/files/metadata queues");
    for handle in handles {
        handle.await?;
    }
    Ok(())
}
