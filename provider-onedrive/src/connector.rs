//! OneDrive connector over Microsoft Graph
//!
//! Graph addresses items by path relative to a drive root
//! (`/me/drive/root:/docs/a.txt:`), so no ID walk is needed. Folders are
//! still created one level at a time because Graph only creates a folder
//! inside an existing parent.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bytes::Bytes;
use core_auth::{AccountSummary, AuthFlowController, Connection, OAuthConfig, ProviderKind};
use core_cloud::{
    drain_pages, ignore_not_found, json_body, ByteReader, CloudError, CloudFile, CloudPath,
    CloudStorage, FileMapper, Page, RequestExecutor, Result,
};
use core_runtime::config::{AccessLevel, ClientCredentials, CoreConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::account::GraphAccountFetcher;
use crate::error::GraphClassifier;
use crate::mapper::DriveItemMapper;
use crate::types::{
    ChildrenPage, CreateFolderRequest, CreateLinkRequest, CreateLinkResponse, DriveItem,
    EmptyFacet, UploadSession,
};

pub const GRAPH_BASE: &str = "https://graph.microsoft.com/v1.0";

/// Largest body Graph accepts on a single `PUT .../content`.
const SIMPLE_UPLOAD_LIMIT: usize = 4 * 1024 * 1024;

/// Upload session fragment size; Graph requires multiples of 320 KiB.
const UPLOAD_CHUNK_SIZE: usize = 32 * 320 * 1024;

const PAGE_SIZE: u32 = 200;

const TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

pub struct OneDriveConnector {
    executor: RequestExecutor,
    http_client: Arc<dyn HttpClient>,
    access_level: AccessLevel,
    mapper: DriveItemMapper,
}

impl OneDriveConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        connection: Connection,
        access_level: AccessLevel,
    ) -> Self {
        Self {
            executor: RequestExecutor::new(http_client.clone(), connection)
                .with_classifier(Arc::new(GraphClassifier)),
            http_client,
            access_level,
            mapper: DriveItemMapper,
        }
    }

    pub fn from_connection(config: &CoreConfig, connection: Connection) -> Self {
        Self::new(config.http_client.clone(), connection, config.access_level)
    }

    /// Sign-in controller wired to the Microsoft identity platform.
    pub fn auth_controller(
        config: &CoreConfig,
        credentials: &ClientCredentials,
    ) -> AuthFlowController {
        let oauth =
            OAuthConfig::for_provider(ProviderKind::OneDrive, config.access_level, credentials);
        let fetcher = Arc::new(GraphAccountFetcher::new(config.http_client.clone()));
        AuthFlowController::new(config, oauth, fetcher)
    }

    fn root_address(&self) -> &'static str {
        match self.access_level {
            AccessLevel::AppFolder => "/me/drive/special/approot",
            AccessLevel::FullAccess => "/me/drive/root",
        }
    }

    /// Graph URL addressing `path`.
    fn item_url(&self, path: &CloudPath) -> Result<String> {
        let segments = path.addressable_segments()?;
        Ok(if segments.is_empty() {
            format!("{}{}", GRAPH_BASE, self.root_address())
        } else {
            format!(
                "{}{}:/{}:",
                GRAPH_BASE,
                self.root_address(),
                encode_segments(&segments)
            )
        })
    }

    fn item_by_id_url(item_id: &str) -> String {
        format!("{}/me/drive/items/{}", GRAPH_BASE, item_id)
    }

    async fn get_item(&self, path: &CloudPath) -> Result<DriveItem> {
        let url = self.item_url(path)?;
        self.executor
            .execute_json("get item", || HttpRequest::get(url.clone()))
            .await
    }

    async fn list_children(&self, item_id: &str) -> Result<Vec<DriveItem>> {
        let first = format!("{}/children?$top={}", Self::item_by_id_url(item_id), PAGE_SIZE);

        drain_pages(|next_link| {
            let url = next_link.unwrap_or_else(|| first.clone());
            async move {
                let page: ChildrenPage = self
                    .executor
                    .execute_json("list children", || HttpRequest::get(url.clone()))
                    .await?;
                Ok(Page {
                    items: page.value,
                    next_cursor: page.next_link,
                })
            }
        })
        .await
    }

    /// Create folder `name` under `parent_id`; an existing folder of that
    /// name is returned instead.
    async fn create_child_folder(
        &self,
        parent_id: &str,
        name: &str,
        path: &CloudPath,
    ) -> Result<DriveItem> {
        let body = json_body(&CreateFolderRequest {
            name,
            folder: EmptyFacet::default(),
            conflict_behavior: "fail",
        })?;
        let url = format!("{}/children", Self::item_by_id_url(parent_id));

        let created: Result<DriveItem> = self
            .executor
            .execute_json("create folder", || {
                HttpRequest::post(url.clone())
                    .header("Content-Type", "application/json")
                    .body(body.clone())
            })
            .await;

        match created {
            Err(CloudError::Conflict(_)) => {
                debug!(path = %path, "Folder already exists");
                let existing = self.get_item(path).await?;
                if existing.is_folder() {
                    Ok(existing)
                } else {
                    Err(CloudError::NotADirectory(path.to_string()))
                }
            }
            other => other,
        }
    }

    /// Folder at `path`, creating it and any missing ancestors.
    async fn ensure_folder(&self, path: &CloudPath) -> Result<DriveItem> {
        let mut missing = Vec::new();
        let mut current = path.clone();

        let mut folder = loop {
            match self.get_item(&current).await {
                Ok(item) => break item,
                Err(CloudError::NotFound(what)) => match current.parent() {
                    Some(parent) => {
                        missing.push(current);
                        current = parent;
                    }
                    None => return Err(CloudError::NotFound(what)),
                },
                Err(e) => return Err(e),
            }
        };

        if !folder.is_folder() {
            return Err(CloudError::NotADirectory(current.to_string()));
        }

        for path in missing.into_iter().rev() {
            let name = path.native_name().unwrap_or_default();
            folder = self.create_child_folder(&folder.id, &name, &path).await?;
            debug!(path = %path, folder_id = %folder.id, "Created folder");
        }

        Ok(folder)
    }

    async fn upload_small(&self, parent_id: &str, name: &str, data: Bytes) -> Result<DriveItem> {
        let url = format!(
            "{}:/{}:/content",
            Self::item_by_id_url(parent_id),
            urlencoding::encode(name)
        );

        self.executor
            .execute_json("upload", || {
                HttpRequest::new(HttpMethod::Put, url.clone())
                    .header("Content-Type", "application/octet-stream")
                    .body(data.clone())
                    .timeout(TRANSFER_TIMEOUT)
            })
            .await
    }

    /// Upload through a resumable session in fixed-size fragments.
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn upload_session(&self, parent_id: &str, name: &str, data: Bytes) -> Result<DriveItem> {
        let url = format!(
            "{}:/{}:/createUploadSession",
            Self::item_by_id_url(parent_id),
            urlencoding::encode(name)
        );
        let body = json_body(&json!({"item": {"@microsoft.graph.conflictBehavior": "replace"}}))?;

        let session: UploadSession = self
            .executor
            .execute_json("create upload session", || {
                HttpRequest::post(url.clone())
                    .header("Content-Type", "application/json")
                    .body(body.clone())
            })
            .await?;

        let total = data.len();
        let mut offset = 0;
        loop {
            let end = (offset + UPLOAD_CHUNK_SIZE).min(total);
            // The upload URL is pre-authenticated and must not carry a bearer token
            let request = HttpRequest::new(HttpMethod::Put, session.upload_url.clone())
                .header("Content-Range", format!("bytes {}-{}/{}", offset, end - 1, total))
                .body(data.slice(offset..end))
                .timeout(TRANSFER_TIMEOUT);

            let response = self.http_client.execute(request).await?;
            if !response.is_success() {
                return Err(self.executor.classifier().classify("upload fragment", &response));
            }

            debug!(offset, end, total, status = response.status, "Uploaded fragment");
            if end == total {
                return Ok(serde_json::from_slice(&response.body)?);
            }
            offset = end;
        }
    }

    async fn delete_item(&self, path: &CloudPath) -> Result<()> {
        let url = self.item_url(path)?;
        self.executor
            .execute("delete", || HttpRequest::new(HttpMethod::Delete, url.clone()))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CloudStorage for OneDriveConnector {
    fn provider(&self) -> ProviderKind {
        ProviderKind::OneDrive
    }

    fn account(&self) -> &AccountSummary {
        self.executor.connection().account()
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn list(&self, path: &CloudPath) -> Result<Vec<CloudFile>> {
        let folder = self.get_item(path).await?;
        if !folder.is_folder() {
            return Err(CloudError::NotADirectory(path.to_string()));
        }

        let children = self.list_children(&folder.id).await?;
        info!(entries = children.len(), "Listed OneDrive folder");
        Ok(self.mapper.to_cloud_files(children, path))
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn metadata(&self, path: &CloudPath) -> Result<CloudFile> {
        let item = self.get_item(path).await?;
        if path.is_directory_hint() && !item.is_folder() {
            return Err(CloudError::NotADirectory(path.to_string()));
        }
        Ok(self.mapper.at_path(item, path))
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn create_directory(&self, path: &CloudPath) -> Result<CloudFile> {
        let folder = self.ensure_folder(path).await?;
        Ok(self.mapper.at_path(folder, path))
    }

    #[instrument(skip(self, data), fields(path = %path, bytes = data.len()))]
    async fn upload(&self, path: &CloudPath, data: Bytes) -> Result<CloudFile> {
        let (parent, name) = match (path.parent(), path.native_name()) {
            (Some(parent), Some(name)) => (parent, name),
            _ => return Err(CloudError::InvalidPath(format!("cannot upload to {}", path))),
        };

        let folder = self.ensure_folder(&parent).await?;

        let item = if data.len() <= SIMPLE_UPLOAD_LIMIT {
            self.upload_small(&folder.id, &name, data).await?
        } else {
            self.upload_session(&folder.id, &name, data).await?
        };

        info!(item_id = %item.id, "Uploaded file to OneDrive");
        Ok(self.mapper.at_path(item, path))
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn download_stream(&self, path: &CloudPath) -> Result<ByteReader> {
        let url = format!("{}/content", self.item_url(path)?);
        let response = self
            .executor
            .execute_streaming("download", || {
                HttpRequest::get(url.clone()).timeout(TRANSFER_TIMEOUT)
            })
            .await?;
        Ok(response.body)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn delete(&self, path: &CloudPath) -> Result<()> {
        if path.is_root() {
            return Err(CloudError::InvalidPath("cannot delete the root".to_string()));
        }
        ignore_not_found(self.delete_item(path).await)
    }

    /// Graph returns the existing link when one of the same type exists.
    #[instrument(skip(self), fields(path = %path))]
    async fn create_share_link(&self, path: &CloudPath) -> Result<String> {
        let url = format!("{}/createLink", self.item_url(path)?);
        let body = json_body(&CreateLinkRequest {
            kind: "view",
            scope: "anonymous",
        })?;

        let created: CreateLinkResponse = self
            .executor
            .execute_json("create link", || {
                HttpRequest::post(url.clone())
                    .header("Content-Type", "application/json")
                    .body(body.clone())
            })
            .await?;

        Ok(created.link.web_url)
    }

    #[instrument(skip(self))]
    async fn resolve_share_link(&self, url: &str) -> Result<CloudFile> {
        let request_url = format!("{}/shares/{}/driveItem", GRAPH_BASE, share_token(url));
        let item: DriveItem = self
            .executor
            .execute_json("resolve link", || HttpRequest::get(request_url.clone()))
            .await?;
        self.mapper.to_cloud_file(item, &CloudPath::root())
    }

    async fn logout(&self) -> Result<()> {
        Ok(self.executor.connection().logout().await?)
    }
}

fn encode_segments(segments: &[String]) -> String {
    segments
        .iter()
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Sharing token for `/shares/{token}`: `u!` + unpadded base64url of the URL.
fn share_token(url: &str) -> String {
    format!("u!{}", URL_SAFE_NO_PAD.encode(url.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpResponse, StreamingResponse};
    use core_auth::testing::{signed_in_connection, ScriptedHttpClient, StaticRefresher};
    use mockall::{mock, Sequence};

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn execute_streaming(&self, request: HttpRequest) -> BridgeResult<StreamingResponse>;
        }
    }

    async fn onedrive(http: Arc<ScriptedHttpClient>, level: AccessLevel) -> OneDriveConnector {
        onedrive_with(http, level).await
    }

    async fn onedrive_with(http: Arc<dyn HttpClient>, level: AccessLevel) -> OneDriveConnector {
        let connection = signed_in_connection(
            ProviderKind::OneDrive,
            "token",
            Arc::new(StaticRefresher::new("refreshed")),
        )
        .await;
        OneDriveConnector::new(http, connection, level)
    }

    fn folder(id: &str, name: &str) -> serde_json::Value {
        json!({"id": id, "name": name, "folder": {"childCount": 0}})
    }

    fn file(id: &str, name: &str, size: u64) -> serde_json::Value {
        json!({"id": id, "name": name, "size": size, "file": {"mimeType": "text/plain"}})
    }

    #[test]
    fn test_share_token() {
        assert_eq!(
            share_token("https://1drv.ms/t/s!AkX"),
            format!("u!{}", URL_SAFE_NO_PAD.encode("https://1drv.ms/t/s!AkX"))
        );
        assert!(!share_token("https://1drv.ms/?a=b").contains('='));
    }

    #[tokio::test]
    async fn test_item_urls_follow_access_level() {
        let http = Arc::new(ScriptedHttpClient::new());
        let app = onedrive(http.clone(), AccessLevel::AppFolder).await;
        let full = onedrive(http, AccessLevel::FullAccess).await;
        let path = CloudPath::parse("/my docs/a#1.txt").unwrap();

        assert_eq!(
            app.item_url(&path).unwrap(),
            format!("{}/me/drive/special/approot:/my%20docs/a%231.txt:", GRAPH_BASE)
        );
        assert_eq!(
            full.item_url(&CloudPath::root()).unwrap(),
            format!("{}/me/drive/root", GRAPH_BASE)
        );

        // Escaped segments reach Graph under their native name
        let percent = CloudPath::root().join_native("100%2F").unwrap();
        assert_eq!(
            full.item_url(&percent).unwrap(),
            format!("{}/me/drive/root:/100%252F:", GRAPH_BASE)
        );
        let up = CloudPath::parse("/a/%2E%2E").unwrap();
        assert!(matches!(full.item_url(&up), Err(CloudError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn test_list_follows_next_links() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(200, folder("docs-id", "docs"))
            .push_json(
                200,
                json!({"value": [file("1", "a.txt", 1)], "@odata.nextLink": "https://graph.microsoft.com/v1.0/page2"}),
            )
            .push_json(200, json!({"value": [folder("2", "sub")]}));

        let drive = onedrive(http.clone(), AccessLevel::FullAccess).await;
        let files = drive.list(&CloudPath::parse("/docs").unwrap()).await.unwrap();

        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/docs/a.txt", "/docs/sub"]);
        let requests = http.requests();
        assert!(requests[1].url.contains("/me/drive/items/docs-id/children"));
        assert_eq!(requests[2].url, "https://graph.microsoft.com/v1.0/page2");
    }

    #[tokio::test]
    async fn test_list_of_file_is_not_a_directory() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(200, file("1", "a.txt", 1));

        let drive = onedrive(http, AccessLevel::FullAccess).await;
        assert!(matches!(
            drive.list(&CloudPath::parse("/a.txt").unwrap()).await,
            Err(CloudError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_list_missing_is_not_found() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(
            404,
            json!({"error": {"code": "itemNotFound", "message": "The resource could not be found."}}),
        );

        let drive = onedrive(http, AccessLevel::FullAccess).await;
        assert!(matches!(
            drive.list(&CloudPath::parse("/missing").unwrap()).await,
            Err(CloudError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_directory_conflict_returns_existing() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push(404, "")
            .push_json(200, json!({"id": "root-id", "root": {}}))
            .push_json(
                409,
                json!({"error": {"code": "nameAlreadyExists", "message": "exists"}}),
            )
            .push_json(200, folder("a-id", "a"));

        let drive = onedrive(http.clone(), AccessLevel::FullAccess).await;
        let dir = drive
            .create_directory(&CloudPath::parse("/a").unwrap())
            .await
            .unwrap();

        assert!(dir.is_directory);
        assert_eq!(dir.native_id(), Some("a-id"));
        assert_eq!(http.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_small_upload_puts_content_under_parent() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = Sequence::new();
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| {
                assert_eq!(req.method, HttpMethod::Get);
                assert!(req.url.ends_with("/me/drive/special/approot:/notes:"));
                Ok(HttpResponse::new(200, folder("notes-id", "notes").to_string()))
            });
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|req| {
                assert_eq!(req.method, HttpMethod::Put);
                assert!(req.url.ends_with("/me/drive/items/notes-id:/to%20do.md:/content"));
                assert_eq!(req.header_value("Authorization"), Some("Bearer token"));
                assert_eq!(req.body.as_deref(), Some(&b"- milk"[..]));
                Ok(HttpResponse::new(201, file("todo-id", "to do.md", 6).to_string()))
            });

        let drive = onedrive_with(Arc::new(mock_http), AccessLevel::AppFolder).await;
        let uploaded = drive
            .upload(
                &CloudPath::parse("/notes/to do.md").unwrap(),
                Bytes::from_static(b"- milk"),
            )
            .await
            .unwrap();

        assert_eq!(uploaded.path, "/notes/to do.md");
        assert_eq!(uploaded.native_id(), Some("todo-id"));
    }

    #[tokio::test]
    async fn test_large_upload_uses_session() {
        let http = Arc::new(ScriptedHttpClient::new());
        let size = SIMPLE_UPLOAD_LIMIT + UPLOAD_CHUNK_SIZE;
        http.push_json(200, json!({"id": "root-id", "root": {}}))
            .push_json(200, json!({"uploadUrl": "https://upload.example/session"}))
            .push(202, r#"{"nextExpectedRanges": ["10485760-"]}"#)
            .push_json(201, file("big", "big.bin", size as u64));

        let drive = onedrive(http.clone(), AccessLevel::FullAccess).await;
        let uploaded = drive
            .upload(
                &CloudPath::parse("/big.bin").unwrap(),
                Bytes::from(vec![7u8; size]),
            )
            .await
            .unwrap();

        assert_eq!(uploaded.size, Some(size as u64));
        let requests = http.requests();
        assert_eq!(requests.len(), 4);
        assert!(requests[1].url.ends_with("/me/drive/items/root-id:/big.bin:/createUploadSession"));
        assert_eq!(
            requests[2].header_value("content-range"),
            Some(format!("bytes 0-{}/{}", UPLOAD_CHUNK_SIZE - 1, size).as_str())
        );
        assert!(requests[2].header_value("authorization").is_none());
        assert_eq!(
            requests[3].header_value("content-range"),
            Some(format!("bytes {}-{}/{}", UPLOAD_CHUNK_SIZE, size - 1, size).as_str())
        );
    }

    #[tokio::test]
    async fn test_share_link_and_resolution() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(
            200,
            json!({"link": {"type": "view", "webUrl": "https://1drv.ms/t/s!abc"}}),
        )
        .push_json(200, file("9", "a.txt", 3));

        let drive = onedrive(http.clone(), AccessLevel::FullAccess).await;
        let link = drive
            .create_share_link(&CloudPath::parse("/a.txt").unwrap())
            .await
            .unwrap();
        let resolved = drive.resolve_share_link(&link).await.unwrap();

        assert_eq!(link, "https://1drv.ms/t/s!abc");
        assert_eq!(resolved.native_id(), Some("9"));
        let requests = http.requests();
        assert!(requests[0].url.ends_with("/me/drive/root:/a.txt:/createLink"));
        assert!(requests[1].url.contains(&format!("/shares/{}/driveItem", share_token(&link))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(404, json!({"error": {"code": "itemNotFound", "message": "gone"}}))
            .push(403, "denied");

        let drive = onedrive(http, AccessLevel::FullAccess).await;
        let path = CloudPath::parse("/a.txt").unwrap();

        assert!(drive.delete(&path).await.is_ok());
        assert!(matches!(
            drive.delete(&path).await,
            Err(CloudError::RemoteError {
                status: Some(403),
                ..
            })
        ));
    }
}
