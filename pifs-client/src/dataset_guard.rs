//! Dataset guard (C13, spec §4.9).
//!
//! Before any destructive operation the core resolves the catalogue
//! file-IDs under a path, fetches their datasets in one call, and checks
//! each dataset's preservation state. The asymmetry is deliberate:
//! accepted datasets let the bytes go but keep the catalogue row;
//! anything still pending blocks the operation outright.

use thiserror::Error;

use crate::{CatalogueClient, CatalogueError};

#[derive(Debug, Error)]
pub enum DatasetGuardError {
    #[error("path is referenced by a dataset still pending preservation")]
    HasPendingDataset,
    #[error(transparent)]
    Catalogue(#[from] CatalogueError),
}

/// The outcome of evaluating the guard for a set of file-IDs: whether the
/// catalogue metadata must survive the delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardResult {
    pub keep_catalogue_metadata: bool,
}

/// Evaluates the guard for the given catalogue file-IDs. Returns
/// [`DatasetGuardError::HasPendingDataset`] if any associated dataset is
/// still pending; otherwise reports whether an accepted dataset requires
/// the catalogue rows to be preserved even though the bytes are deleted.
pub async fn guard_delete(
    client: &CatalogueClient,
    file_ids: &[String],
) -> Result<GuardResult, DatasetGuardError> {
    if file_ids.is_empty() {
        return Ok(GuardResult {
            keep_catalogue_metadata: false,
        });
    }

    let file_to_datasets = client.files_to_datasets(file_ids).await?;
    let dataset_ids: Vec<String> = file_to_datasets
        .into_values()
        .flatten()
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .collect();

    if dataset_ids.is_empty() {
        return Ok(GuardResult {
            keep_catalogue_metadata: false,
        });
    }

    let mut keep_catalogue_metadata = false;
    for id in dataset_ids {
        let dataset = client.dataset(&id).await?;
        if dataset.preservation_state.is_pending() {
            return Err(DatasetGuardError::HasPendingDataset);
        }
        if dataset.preservation_state.is_accepted() {
            keep_catalogue_metadata = true;
        }
    }

    Ok(GuardResult {
        keep_catalogue_metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_file_set_never_blocks() {
        let client = CatalogueClient::new("http://localhost:0", "token");
        let result = guard_delete(&client, &[]).await.unwrap();
        assert!(!result.keep_catalogue_metadata);
    }
}
