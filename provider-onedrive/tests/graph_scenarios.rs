use bridge_traits::http::HttpMethod;
use bytes::Bytes;
use core_auth::testing::{signed_in_connection, ScriptedHttpClient, StaticRefresher};
use core_auth::ProviderKind;
use core_cloud::{CloudError, CloudPath, CloudStorage};
use core_runtime::config::AccessLevel;
use provider_onedrive::OneDriveConnector;
use serde_json::json;
use std::sync::Arc;

async fn onedrive(http: Arc<ScriptedHttpClient>) -> OneDriveConnector {
    let connection = signed_in_connection(
        ProviderKind::OneDrive,
        "token",
        Arc::new(StaticRefresher::new("refreshed")),
    )
    .await;
    OneDriveConnector::new(http, connection, AccessLevel::FullAccess)
}

fn not_found() -> serde_json::Value {
    json!({"error": {"code": "itemNotFound", "message": "not found"}})
}

#[tokio::test]
async fn nested_directory_is_created_level_by_level() {
    let http = Arc::new(ScriptedHttpClient::new());
    http.push_json(404, not_found())
        .push_json(404, not_found())
        .push_json(200, json!({"id": "root-id", "root": {}}))
        .push_json(201, json!({"id": "a-id", "name": "a", "folder": {}}))
        .push_json(201, json!({"id": "b-id", "name": "b", "folder": {}}));

    let drive = onedrive(http.clone()).await;
    let dir = drive
        .create_directory(&CloudPath::parse("/a/b").unwrap())
        .await
        .unwrap();

    assert_eq!(dir.path, "/a/b");
    assert!(dir.is_directory);

    let requests = http.requests();
    assert_eq!(requests.len(), 5);
    assert_eq!(requests[3].method, HttpMethod::Post);
    assert!(requests[3].url.ends_with("/me/drive/items/root-id/children"));
    assert!(requests[4].url.ends_with("/me/drive/items/a-id/children"));

    let body: serde_json::Value =
        serde_json::from_slice(requests[4].body.as_ref().unwrap()).unwrap();
    assert_eq!(body["name"], "b");
    assert_eq!(body["@microsoft.graph.conflictBehavior"], "fail");
}

#[tokio::test]
async fn upload_below_a_file_is_rejected() {
    let http = Arc::new(ScriptedHttpClient::new());
    http.push_json(
        200,
        json!({"id": "f", "name": "a.txt", "file": {"mimeType": "text/plain"}}),
    );

    let drive = onedrive(http.clone()).await;
    let result = drive
        .upload(
            &CloudPath::parse("/a.txt/b.txt").unwrap(),
            Bytes::from_static(b"x"),
        )
        .await;

    assert!(matches!(result, Err(CloudError::NotADirectory(_))));
    assert_eq!(http.requests().len(), 1);
}

#[tokio::test]
async fn download_retries_after_expired_token() {
    let http = Arc::new(ScriptedHttpClient::new());
    http.push(401, "").push(200, "hello graph");

    let refresher = Arc::new(StaticRefresher::new("refreshed"));
    let connection =
        signed_in_connection(ProviderKind::OneDrive, "stale", refresher.clone()).await;
    let drive = OneDriveConnector::new(http.clone(), connection, AccessLevel::FullAccess);

    let bytes = drive
        .download(&CloudPath::parse("/greeting.txt").unwrap())
        .await
        .unwrap();

    assert_eq!(&bytes[..], b"hello graph");
    assert_eq!(refresher.calls(), 1);
    let requests = http.requests();
    assert!(requests[1].url.ends_with("/me/drive/root:/greeting.txt:/content"));
    assert_eq!(
        requests[1].header_value("authorization"),
        Some("Bearer refreshed")
    );
}
