//! Integration tests for [`CatalogueClient`] against a fake v3 endpoint.

mod support;

use pifs_client::CatalogueClient;

#[tokio::test]
async fn list_project_files_keys_by_pathname() {
    let addr = support::spawn(|_path| {
        (
            200,
            r#"[{"pathname":"/a/report.pdf","identifier":"file-1"}]"#.to_string(),
        )
    })
    .await;

    let client = CatalogueClient::new(format!("http://{addr}"), "token");
    let files = client.list_project_files("demo").await.unwrap();
    assert_eq!(files.get("/a/report.pdf").unwrap().identifier, "file-1");
}

#[tokio::test]
async fn dataset_parses_preservation_state() {
    let addr = support::spawn(|_path| {
        (
            200,
            r#"{"id":"ds-1","preservation_state":"in_digital_preservation"}"#.to_string(),
        )
    })
    .await;

    let client = CatalogueClient::new(format!("http://{addr}"), "token");
    let dataset = client.dataset("ds-1").await.unwrap();
    assert!(dataset.preservation_state.is_terminal());
    assert!(dataset.preservation_state.is_accepted());
}

#[tokio::test]
async fn not_found_status_maps_to_not_available() {
    let addr = support::spawn(|_path| (404, String::new())).await;

    let client = CatalogueClient::new(format!("http://{addr}"), "token");
    let directory = client.get_project_directory("demo", "a/b").await.unwrap();
    assert!(directory.is_none());
}

#[tokio::test]
async fn delete_files_reports_deleted_count() {
    let addr = support::spawn(|_path| (200, r#"{"deleted_count":3}"#.to_string())).await;

    let client = CatalogueClient::new(format!("http://{addr}"), "token");
    let result = client
        .delete_files(&["a".to_string(), "b".to_string(), "c".to_string()])
        .await
        .unwrap();
    assert_eq!(result.deleted_count, 3);
}
