//! Server-side state: locking, the task/queue pair, the upload state
//! machine, publication, trash handling, tus glue, authentication and
//! the background worker pool. `crate::api2` is the only consumer of
//! this module from the HTTP side.

pub mod auth;
pub mod lock;
pub mod project;
pub mod publish;
pub mod registry;
pub mod task;
pub mod trash;
pub mod tus;
pub mod upload;
pub mod worker;

use std::sync::Arc;

use sqlx::PgPool;

use crate::server::auth::Authenticator;
use crate::server::lock::LockManager;
use crate::server::project::ProjectStore;
use crate::server::registry::FileRegistry;
use crate::server::task::TaskStore;
use crate::server::upload::UploadStore;

/// Every shared, long-lived resource a handler or worker might need,
/// owned by the application root and handed down by reference (spec §9:
/// no global client singletons).
pub struct AppState {
    pub config: pifs_config::Config,
    pub db: PgPool,
    pub catalogue: pifs_client::CatalogueClient,
    pub locks: LockManager,
    pub projects: ProjectStore,
    pub registry: FileRegistry,
    pub tasks: Arc<TaskStore>,
    pub uploads: UploadStore,
    pub auth: Authenticator,
}

impl AppState {
    pub async fn connect(config: pifs_config::Config) -> anyhow::Result<Self> {
        let db = PgPool::connect(&config.database_url).await?;
        let catalogue = pifs_client::CatalogueClient::new(
            config.catalogue_base_url.clone(),
            config.catalogue_token.clone(),
        );
        let locks = LockManager::new(&config.redis_url)?;
        let projects = ProjectStore::new(db.clone());
        let registry = FileRegistry::new(db.clone());
        let tasks = Arc::new(TaskStore::new(db.clone(), &config.redis_url)?);
        let uploads = UploadStore::new(db.clone());
        let auth = Authenticator::new(db.clone(), config.admin_token.clone());

        Ok(AppState {
            config,
            db,
            catalogue,
            locks,
            projects,
            registry,
            tasks,
            uploads,
            auth,
        })
    }
}
