//! Executor, pagination and mapping driven through the public API.

use bridge_traits::http::HttpRequest;
use core_auth::testing::{signed_in_connection, ScriptedHttpClient, StaticRefresher};
use core_auth::ProviderKind;
use core_cloud::{
    drain_pages, CloudError, CloudFile, CloudPath, FileMapper, Page, RequestExecutor, META_ID,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct Entry {
    id: String,
    name: String,
    folder: bool,
}

#[derive(Debug, Deserialize)]
struct Listing {
    entries: Vec<Entry>,
    next: Option<String>,
}

struct EntryMapper;

impl FileMapper for EntryMapper {
    type Native = Entry;

    fn to_cloud_file(&self, native: Entry, parent: &CloudPath) -> core_cloud::Result<CloudFile> {
        let path = core_cloud::child_path(parent, &native.name)?;
        let file = if native.folder {
            CloudFile::directory(&path)
        } else {
            CloudFile::file(&path)
        };
        Ok(file.with_metadata(META_ID, native.id))
    }
}

async fn executor(http: Arc<ScriptedHttpClient>) -> (RequestExecutor, Arc<StaticRefresher>) {
    let refresher = Arc::new(StaticRefresher::new("second"));
    let connection = signed_in_connection(ProviderKind::Dropbox, "first", refresher.clone()).await;
    (RequestExecutor::new(http, connection), refresher)
}

#[tokio::test]
async fn paged_listing_survives_a_token_rejection_mid_way() {
    let http = Arc::new(ScriptedHttpClient::new());
    http.push_json(
        200,
        json!({"entries": [{"id": "1", "name": "a", "folder": true}], "next": "c1"}),
    )
    .push(401, "")
    .push_json(
        200,
        json!({"entries": [{"id": "2", "name": "b.txt", "folder": false}], "next": null}),
    );
    let (executor, refresher) = executor(http.clone()).await;
    let parent = CloudPath::parse("/docs").unwrap();

    let entries = drain_pages(|cursor| {
        let executor = executor.clone();
        async move {
            let url = match cursor {
                Some(c) => format!("https://api.example.com/list?cursor={}", c),
                None => "https://api.example.com/list".to_string(),
            };
            let listing: Listing = executor
                .execute_json("list", || HttpRequest::get(url.clone()))
                .await?;
            Ok::<_, CloudError>(Page {
                items: listing.entries,
                next_cursor: listing.next,
            })
        }
    })
    .await
    .unwrap();

    let files = EntryMapper.to_cloud_files(entries, &parent);
    let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["/docs/a", "/docs/b.txt"]);
    assert!(files[0].is_directory);
    assert_eq!(files[1].native_id(), Some("2"));

    assert_eq!(refresher.calls(), 1);
    let requests = http.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].header_value("authorization"), Some("Bearer first"));
    assert_eq!(requests[2].header_value("authorization"), Some("Bearer second"));
    assert!(requests[2].url.ends_with("cursor=c1"));
}

#[tokio::test]
async fn repeated_rejection_signs_the_connection_out() {
    let http = Arc::new(ScriptedHttpClient::new());
    http.push(401, "").push(401, "");
    let (executor, _) = executor(http).await;

    let result = executor
        .execute("metadata", || HttpRequest::get("https://api.example.com/item"))
        .await;

    let error = result.unwrap_err();
    assert!(matches!(error, CloudError::AuthExpired(_)));
    assert!(error.requires_sign_in());
    assert!(executor.connection().tokens().tokens().await.is_none());
}
