//! HTTP client for the downstream digital-preservation catalogue (C6) and
//! the dataset guard built on top of it (C13).
//!
//! The catalogue is treated as a remote file registry the core never
//! owns: this crate only ever speaks its documented v3 surface (spec §9
//! Open Question: v1 is not wired here) and translates its responses
//! into the error taxonomy the rest of PIFS expects.

mod dataset_guard;

pub use dataset_guard::{guard_delete, DatasetGuardError};

use std::collections::HashMap;

use pifs_api_types::DatasetInfo;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const POST_FILES_CHUNK_SIZE: usize = 5000;

#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("catalogue resource not available")]
    NotAvailable,
    #[error("catalogue returned {status}: {body}")]
    Http { status: u16, body: String },
    #[error("catalogue transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct FileRecordInput {
    pub project_identifier: String,
    pub pathname: String,
    pub checksum: String,
    pub identifier: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogueFileRecord {
    pub pathname: String,
    pub identifier: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryRecord {
    pub identifier: String,
}

/// The catalogue client, owned by the application root and handed to
/// handlers and workers by reference (spec §9: "no process-wide mutable
/// state" applies to the catalogue and Redis clients alike).
#[derive(Debug, Clone)]
pub struct CatalogueClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl CatalogueClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        CatalogueClient {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn send_json<T: for<'de> Deserialize<'de>>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, CatalogueError> {
        let response = req.bearer_auth(&self.token).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.as_u16() == 404 {
            return Err(CatalogueError::NotAvailable);
        }
        if !status.is_success() {
            return Err(CatalogueError::Http {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| CatalogueError::Http {
            status: status.as_u16(),
            body: format!("malformed response body: {e}"),
        })
    }

    /// Bulk-creates file records, chunking at 5 000 per request (spec
    /// §4.5) so a single huge batch-upload publish doesn't produce one
    /// oversized POST.
    pub async fn post_files(&self, records: &[FileRecordInput]) -> Result<(), CatalogueError> {
        for chunk in records.chunks(POST_FILES_CHUNK_SIZE) {
            let _: serde_json::Value = self
                .send_json(self.http.post(self.url("/v3/files")).json(chunk))
                .await?;
        }
        Ok(())
    }

    pub async fn list_project_files(
        &self,
        project_id: &str,
    ) -> Result<HashMap<String, CatalogueFileRecord>, CatalogueError> {
        let records: Vec<CatalogueFileRecord> = self
            .send_json(self.http.get(self.url(&format!("/v3/files/{project_id}"))))
            .await?;
        Ok(records
            .into_iter()
            .map(|r| (r.pathname.clone(), r))
            .collect())
    }

    pub async fn files_to_datasets(
        &self,
        file_ids: &[String],
    ) -> Result<HashMap<String, Vec<String>>, CatalogueError> {
        self.send_json(
            self.http
                .post(self.url("/v3/files/datasets"))
                .json(&serde_json::json!({ "file_ids": file_ids })),
        )
        .await
    }

    pub async fn dataset(&self, id: &str) -> Result<DatasetInfo, CatalogueError> {
        #[derive(Deserialize)]
        struct Wire {
            id: String,
            preservation_state: pifs_api_types::PreservationState,
        }

        let wire: Wire = self
            .send_json(self.http.get(self.url(&format!("/v3/datasets/{id}"))))
            .await?;
        Ok(DatasetInfo {
            identifier: wire.id,
            preservation_state: wire.preservation_state,
        })
    }

    pub async fn delete_files(&self, file_ids: &[String]) -> Result<DeleteResult, CatalogueError> {
        self.send_json(
            self.http
                .post(self.url("/v3/files/delete"))
                .json(&serde_json::json!({ "file_ids": file_ids })),
        )
        .await
    }

    /// Returns `Ok(None)` for a fresh directory with no catalogue record
    /// yet, per spec §9: callers must tolerate a null identifier rather
    /// than treating the lookup miss as an error.
    pub async fn get_project_directory(
        &self,
        project_id: &str,
        path: &str,
    ) -> Result<Option<DirectoryRecord>, CatalogueError> {
        match self
            .send_json(
                self.http
                    .get(self.url(&format!("/v3/directories/{project_id}/{path}"))),
            )
            .await
        {
            Ok(record) => Ok(Some(record)),
            Err(CatalogueError::NotAvailable) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
