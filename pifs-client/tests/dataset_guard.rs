//! Integration tests for [`guard_delete`] against a fake catalogue that
//! answers `files_to_datasets` and per-id dataset lookups.

mod support;

use pifs_client::{guard_delete, CatalogueClient, DatasetGuardError};

fn route_two_datasets(path: &str) -> (u16, String) {
    match path {
        "/v3/files/datasets" => (200, r#"{"file-1":["ds-1","ds-2"]}"#.to_string()),
        "/v3/datasets/ds-1" => (
            200,
            r#"{"id":"ds-1","preservation_state":"accepted_to_digital_preservation"}"#.to_string(),
        ),
        "/v3/datasets/ds-2" => (
            200,
            r#"{"id":"ds-2","preservation_state":"in_digital_preservation"}"#.to_string(),
        ),
        other => (404, format!("unexpected path: {other}")),
    }
}

#[tokio::test]
async fn accepted_and_in_preservation_datasets_keep_metadata() {
    let addr = support::spawn(route_two_datasets).await;
    let client = CatalogueClient::new(format!("http://{addr}"), "token");

    let result = guard_delete(&client, &["file-1".to_string()]).await.unwrap();
    assert!(result.keep_catalogue_metadata);
}

#[tokio::test]
async fn pending_dataset_blocks_delete() {
    let addr = support::spawn(|path| match path {
        "/v3/files/datasets" => (200, r#"{"file-1":["ds-pending"]}"#.to_string()),
        "/v3/datasets/ds-pending" => (
            200,
            r#"{"id":"ds-pending","preservation_state":"validating"}"#.to_string(),
        ),
        other => (404, format!("unexpected path: {other}")),
    })
    .await;
    let client = CatalogueClient::new(format!("http://{addr}"), "token");

    let err = guard_delete(&client, &["file-1".to_string()]).await.unwrap_err();
    assert!(matches!(err, DatasetGuardError::HasPendingDataset));
}

#[tokio::test]
async fn file_with_no_datasets_never_blocks_and_keeps_nothing() {
    let addr = support::spawn(|path| match path {
        "/v3/files/datasets" => (200, "{}".to_string()),
        other => (404, format!("unexpected path: {other}")),
    })
    .await;
    let client = CatalogueClient::new(format!("http://{addr}"), "token");

    let result = guard_delete(&client, &["file-1".to_string()]).await.unwrap();
    assert!(!result.keep_catalogue_metadata);
}
