//! Google Drive API connector implementation
//!
//! Implements `CloudStorage` for Google Drive API v3. Drive addresses
//! everything by opaque file IDs chained through `parents`, so every
//! path-based operation first walks the path with [`PathResolver`].

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
use bytes::Bytes;
use core_auth::{AccountSummary, AuthFlowController, Connection, OAuthConfig, ProviderKind};
use core_cloud::{
    drain_pages, escape_query_literal, ignore_not_found, json_body, ByteReader, ChildNode,
    CloudError, CloudFile, CloudPath, CloudStorage, FileMapper, NodeLookup, Page, PathResolver,
    RequestExecutor, Result,
};
use core_runtime::config::{AccessLevel, ClientCredentials, CoreConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::account::DriveAccountFetcher;
use crate::error::DriveClassifier;
use crate::mapper::DriveFileMapper;
use crate::types::{
    CreateFileRequest, DriveFile, FilesListResponse, PermissionRequest, FOLDER_MIME_TYPE,
};

/// Google Drive API base URL
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Google Drive media upload base URL
const DRIVE_UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

/// Maximum results per page (Google Drive API limit)
const MAX_PAGE_SIZE: u32 = 1000;

/// Fields to request for file resources
const FILE_FIELDS: &str = "id,name,mimeType,size,modifiedTime,version,md5Checksum,parents,trashed";

/// Root alias of the app-private folder.
const APP_DATA_ROOT: &str = "appDataFolder";

/// Root alias of "My Drive".
const ACCOUNT_ROOT: &str = "root";

const TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

/// Google Drive API connector
///
/// # Example
///
/// ```ignore
/// use provider_google_drive::GoogleDriveConnector;
/// use core_cloud::{CloudPath, CloudStorage};
///
/// let auth = GoogleDriveConnector::auth_controller(&config, &credentials);
/// if let Some(connection) = auth.connect(false).await?.into_connection() {
///     let drive = GoogleDriveConnector::from_connection(&config, connection);
///     let files = drive.list(&CloudPath::parse("/docs")?).await?;
/// }
/// ```
pub struct GoogleDriveConnector {
    executor: RequestExecutor,
    access_level: AccessLevel,
    mapper: DriveFileMapper,
}

impl GoogleDriveConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        connection: Connection,
        access_level: AccessLevel,
    ) -> Self {
        Self {
            executor: RequestExecutor::new(http_client, connection)
                .with_classifier(Arc::new(DriveClassifier)),
            access_level,
            mapper: DriveFileMapper,
        }
    }

    pub fn from_connection(config: &CoreConfig, connection: Connection) -> Self {
        Self::new(config.http_client.clone(), connection, config.access_level)
    }

    /// Sign-in controller wired to Google's endpoints and the `about` lookup.
    pub fn auth_controller(
        config: &CoreConfig,
        credentials: &ClientCredentials,
    ) -> AuthFlowController {
        let oauth = OAuthConfig::for_provider(
            ProviderKind::GoogleDrive,
            config.access_level,
            credentials,
        );
        let fetcher = Arc::new(DriveAccountFetcher::new(config.http_client.clone()));
        AuthFlowController::new(config, oauth, fetcher)
    }

    fn root_alias(&self) -> &'static str {
        match self.access_level {
            AccessLevel::AppFolder => APP_DATA_ROOT,
            AccessLevel::FullAccess => ACCOUNT_ROOT,
        }
    }

    fn spaces(&self) -> &'static str {
        match self.access_level {
            AccessLevel::AppFolder => APP_DATA_ROOT,
            AccessLevel::FullAccess => "drive",
        }
    }

    fn resolver(&self) -> PathResolver<'_> {
        PathResolver::new(self)
    }

    async fn get_file(&self, file_id: &str) -> Result<DriveFile> {
        let url = format!("{}/files/{}?fields={}", DRIVE_API_BASE, file_id, FILE_FIELDS);
        self.executor
            .execute_json("get file", || HttpRequest::get(url.clone()))
            .await
    }

    /// Files named `name` directly inside `parent_id`. Drive allows
    /// duplicate names; folders sort first.
    async fn find_named(&self, parent_id: &str, name: &str) -> Result<Option<DriveFile>> {
        let query = format!(
            "'{}' in parents and name = '{}' and trashed = false",
            escape_query_literal(parent_id),
            escape_query_literal(name)
        );
        let url = format!(
            "{}/files?q={}&spaces={}&pageSize=10&fields=files({})",
            DRIVE_API_BASE,
            urlencoding::encode(&query),
            self.spaces(),
            FILE_FIELDS
        );

        let listing: FilesListResponse = self
            .executor
            .execute_json("find child", || HttpRequest::get(url.clone()))
            .await?;

        let mut files = listing.files;
        files.sort_by_key(|f| !f.is_folder());
        Ok(files.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveFile>> {
        let query = format!("'{}' in parents and trashed = false", escape_query_literal(folder_id));
        let base_url = format!(
            "{}/files?q={}&spaces={}&pageSize={}&fields=nextPageToken,files({})",
            DRIVE_API_BASE,
            urlencoding::encode(&query),
            self.spaces(),
            MAX_PAGE_SIZE,
            FILE_FIELDS
        );

        drain_pages(|cursor| {
            let url = match cursor {
                Some(token) => format!("{}&pageToken={}", base_url, urlencoding::encode(&token)),
                None => base_url.clone(),
            };
            async move {
                let listing: FilesListResponse = self
                    .executor
                    .execute_json("list folder", || HttpRequest::get(url.clone()))
                    .await?;
                Ok(Page {
                    items: listing.files,
                    next_cursor: listing.next_page_token,
                })
            }
        })
        .await
    }

    async fn create_file(
        &self,
        parent_id: &str,
        name: &str,
        mime_type: Option<&str>,
    ) -> Result<DriveFile> {
        let body = json_body(&CreateFileRequest {
            name,
            mime_type,
            parents: vec![parent_id],
        })?;
        let url = format!("{}/files?fields={}", DRIVE_API_BASE, FILE_FIELDS);

        self.executor
            .execute_json("create file", || {
                HttpRequest::post(url.clone())
                    .header("Content-Type", "application/json")
                    .body(body.clone())
            })
            .await
    }

    async fn upload_content(&self, file_id: &str, data: Bytes) -> Result<DriveFile> {
        let url = format!(
            "{}/files/{}?uploadType=media&fields={}",
            DRIVE_UPLOAD_BASE, file_id, FILE_FIELDS
        );

        self.executor
            .execute_json("upload content", || {
                HttpRequest::new(HttpMethod::Patch, url.clone())
                    .header("Content-Type", "application/octet-stream")
                    .body(data.clone())
                    .timeout(TRANSFER_TIMEOUT)
            })
            .await
    }

    async fn delete_resolved(&self, path: &CloudPath) -> Result<()> {
        let node = self.resolver().resolve_file(path).await?;
        let url = format!("{}/files/{}", DRIVE_API_BASE, node.native_id);
        self.executor
            .execute("delete", || HttpRequest::new(HttpMethod::Delete, url.clone()))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NodeLookup for GoogleDriveConnector {
    fn root_id(&self) -> String {
        self.root_alias().to_string()
    }

    async fn find_child(&self, parent_id: &str, name: &str) -> Result<Option<ChildNode>> {
        Ok(self.find_named(parent_id, name).await?.map(|f| ChildNode {
            is_directory: f.is_folder(),
            native_id: f.id,
        }))
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String> {
        let folder = self
            .create_file(parent_id, name, Some(FOLDER_MIME_TYPE))
            .await?;
        debug!(folder_id = %folder.id, name, "Created folder");
        Ok(folder.id)
    }
}

#[async_trait]
impl CloudStorage for GoogleDriveConnector {
    fn provider(&self) -> ProviderKind {
        ProviderKind::GoogleDrive
    }

    fn account(&self) -> &AccountSummary {
        self.executor.connection().account()
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn list(&self, path: &CloudPath) -> Result<Vec<CloudFile>> {
        let folder = self.resolver().resolve_folder(path).await?;
        let children = self.list_children(&folder.native_id).await?;

        info!(entries = children.len(), "Listed Google Drive folder");
        Ok(self.mapper.to_cloud_files(children, path))
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn metadata(&self, path: &CloudPath) -> Result<CloudFile> {
        let node = self.resolver().resolve_file(path).await?;
        let drive_file = self.get_file(&node.native_id).await?;
        Ok(self.mapper.at_path(drive_file, path))
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn create_directory(&self, path: &CloudPath) -> Result<CloudFile> {
        let node = self.resolver().resolve_or_create_folder(path).await?;
        let folder = self.get_file(&node.native_id).await?;
        Ok(self.mapper.at_path(folder, path))
    }

    #[instrument(skip(self, data), fields(path = %path, bytes = data.len()))]
    async fn upload(&self, path: &CloudPath, data: Bytes) -> Result<CloudFile> {
        let (parent, name) = match (path.parent(), path.native_name()) {
            (Some(parent), Some(name)) => (parent, name),
            _ => return Err(CloudError::InvalidPath(format!("cannot upload to {}", path))),
        };

        let folder = self.resolver().resolve_or_create_folder(&parent).await?;

        let target = match self.find_named(&folder.native_id, &name).await? {
            Some(existing) if existing.is_folder() => {
                return Err(CloudError::Conflict(format!("{} is a directory", path)));
            }
            Some(existing) => existing.id,
            None => self.create_file(&folder.native_id, &name, None).await?.id,
        };

        let uploaded = self.upload_content(&target, data).await?;
        info!(file_id = %uploaded.id, "Uploaded file to Google Drive");
        Ok(self.mapper.at_path(uploaded, path))
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn download_stream(&self, path: &CloudPath) -> Result<ByteReader> {
        let node = self.resolver().resolve_file(path).await?;
        if node.is_directory {
            return Err(CloudError::Unsupported(format!("{} is a directory", path)));
        }

        let url = format!("{}/files/{}?alt=media", DRIVE_API_BASE, node.native_id);
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
        ignore_not_found(self.delete_resolved(path).await)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn create_share_link(&self, path: &CloudPath) -> Result<String> {
        let node = self.resolver().resolve_file(path).await?;

        let body = json_body(&PermissionRequest {
            role: "reader",
            kind: "anyone",
        })?;
        let url = format!("{}/files/{}/permissions", DRIVE_API_BASE, node.native_id);
        let granted = self
            .executor
            .execute("share", || {
                HttpRequest::post(url.clone())
                    .header("Content-Type", "application/json")
                    .body(body.clone())
            })
            .await;
        match granted {
            Ok(_) => {}
            Err(CloudError::Conflict(_)) => debug!("Anyone-with-link permission already present"),
            Err(e) => return Err(e),
        }

        let url = format!(
            "{}/files/{}?fields=id,webViewLink",
            DRIVE_API_BASE, node.native_id
        );
        let file: DriveFile = self
            .executor
            .execute_json("share link", || HttpRequest::get(url.clone()))
            .await?;

        file.web_view_link
            .ok_or_else(|| CloudError::RemoteError {
                status: None,
                message: "Drive returned no webViewLink".to_string(),
            })
    }

    #[instrument(skip(self))]
    async fn resolve_share_link(&self, url: &str) -> Result<CloudFile> {
        let file_id = file_id_from_link(url)?;
        let drive_file = self.get_file(&file_id).await?;
        self.mapper.to_cloud_file(drive_file, &CloudPath::root())
    }

    async fn logout(&self) -> Result<()> {
        Ok(self.executor.connection().logout().await?)
    }
}

/// File ID inside a Drive sharing URL.
///
/// Handles `/file/d/<id>/...`, `/drive/folders/<id>` and `?id=<id>` forms.
fn file_id_from_link(link: &str) -> Result<String> {
    let parsed = url::Url::parse(link)
        .map_err(|e| CloudError::InvalidPath(format!("{}: {}", link, e)))?;

    if let Some((_, id)) = parsed.query_pairs().find(|(k, _)| k == "id") {
        if !id.is_empty() {
            return Ok(id.into_owned());
        }
    }

    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|part| !part.is_empty()).collect())
        .unwrap_or_default();

    segments
        .windows(2)
        .find(|pair| pair[0] == "d" || pair[0] == "folders")
        .map(|pair| pair[1].to_string())
        .ok_or_else(|| CloudError::InvalidPath(format!("not a Drive link: {}", link)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpResponse, StreamingResponse};
    use core_auth::testing::{signed_in_connection, ScriptedHttpClient, StaticRefresher};
    use mockall::{mock, Sequence};
    use serde_json::json;

    mock! {
        HttpClient {}

        #[async_trait]
        impl HttpClient for HttpClient {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
            async fn execute_streaming(&self, request: HttpRequest) -> BridgeResult<StreamingResponse>;
        }
    }

    async fn connector_with(
        http: Arc<dyn HttpClient>,
        access_level: AccessLevel,
    ) -> GoogleDriveConnector {
        let connection = signed_in_connection(
            ProviderKind::GoogleDrive,
            "test_token",
            Arc::new(StaticRefresher::new("refreshed")),
        )
        .await;
        GoogleDriveConnector::new(http, connection, access_level)
    }

    fn folder_json(id: &str, name: &str) -> serde_json::Value {
        json!({"id": id, "name": name, "mimeType": FOLDER_MIME_TYPE})
    }

    fn file_json(id: &str, name: &str, size: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "mimeType": "text/plain",
            "size": size,
            "modifiedTime": "2024-01-01T00:00:00.000Z",
            "version": "3"
        })
    }

    #[tokio::test]
    async fn test_list_root_skips_resolution() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_execute().times(1).returning(|req| {
            assert!(req.url.contains("spaces=drive"));
            assert!(req.url.contains(&*urlencoding::encode("'root' in parents")));
            assert_eq!(req.header_value("Authorization"), Some("Bearer test_token"));
            Ok(HttpResponse::new(
                200,
                json!({"files": [
                    {"id": "f1", "name": "docs", "mimeType": FOLDER_MIME_TYPE},
                    {"id": "f2", "name": "a.txt", "mimeType": "text/plain", "size": "3"}
                ]})
                .to_string(),
            ))
        });

        let drive = connector_with(Arc::new(mock_http), AccessLevel::FullAccess).await;
        let files = drive.list(&CloudPath::root()).await.unwrap();

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "/docs");
        assert!(files[0].is_directory);
        assert_eq!(files[1].path, "/a.txt");
        assert_eq!(files[1].size, Some(3));
    }

    #[tokio::test]
    async fn test_list_follows_page_tokens() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(200, json!({"files": [folder_json("docs-id", "docs")]}))
            .push_json(
                200,
                json!({"files": [file_json("a", "a.txt", "1")], "nextPageToken": "p2"}),
            )
            .push_json(200, json!({"files": [file_json("b", "b.txt", "2")]}));

        let drive = connector_with(http.clone(), AccessLevel::AppFolder).await;
        let files = drive.list(&CloudPath::parse("/docs").unwrap()).await.unwrap();

        let names: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(names, vec!["/docs/a.txt", "/docs/b.txt"]);

        let requests = http.requests();
        assert!(requests[0].url.contains("spaces=appDataFolder"));
        assert!(requests[0]
            .url
            .contains(&*urlencoding::encode("'appDataFolder' in parents and name = 'docs'")));
        assert!(requests[2].url.ends_with("&pageToken=p2"));
    }

    #[tokio::test]
    async fn test_list_of_file_is_not_a_directory() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(200, json!({"files": [file_json("n", "notes.txt", "4")]}));

        let drive = connector_with(http, AccessLevel::FullAccess).await;
        let result = drive.list(&CloudPath::parse("/notes.txt").unwrap()).await;

        assert!(matches!(result, Err(CloudError::NotADirectory(_))));
    }

    #[tokio::test]
    async fn test_name_lookup_escapes_quotes() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(200, json!({"files": []}));

        let drive = connector_with(http.clone(), AccessLevel::FullAccess).await;
        let result = drive.metadata(&CloudPath::parse("/it's.txt").unwrap()).await;

        assert!(matches!(result, Err(CloudError::NotFound(_))));
        assert!(http.requests()[0]
            .url
            .contains(&*urlencoding::encode(r"name = 'it\'s.txt'")));
    }

    #[tokio::test]
    async fn test_metadata_maps_file() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(200, json!({"files": [file_json("r1", "report.txt", "42")]}))
            .push_json(200, file_json("r1", "report.txt", "42"));

        let drive = connector_with(http, AccessLevel::FullAccess).await;
        let file = drive
            .metadata(&CloudPath::parse("/report.txt").unwrap())
            .await
            .unwrap();

        assert_eq!(file.path, "/report.txt");
        assert_eq!(file.size, Some(42));
        assert_eq!(file.native_id(), Some("r1"));
        assert_eq!(file.revision(), Some("3"));
    }

    #[tokio::test]
    async fn test_upload_overwrites_existing_file() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(200, json!({"files": [file_json("r1", "report.txt", "1")]}))
            .push_json(200, file_json("r1", "report.txt", "5"));

        let drive = connector_with(http.clone(), AccessLevel::FullAccess).await;
        let file = drive
            .upload(
                &CloudPath::parse("/report.txt").unwrap(),
                Bytes::from_static(b"hello"),
            )
            .await
            .unwrap();

        assert_eq!(file.size, Some(5));
        let requests = http.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].method, HttpMethod::Patch);
        assert!(requests[1].url.contains("/upload/drive/v3/files/r1?uploadType=media"));
        assert_eq!(requests[1].body.as_deref(), Some(&b"hello"[..]));
    }

    #[tokio::test]
    async fn test_upload_onto_folder_conflicts() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(200, json!({"files": [folder_json("d", "docs")]}));

        let drive = connector_with(http, AccessLevel::FullAccess).await;
        let result = drive
            .upload(&CloudPath::parse("/docs").unwrap(), Bytes::from_static(b"x"))
            .await;

        assert!(matches!(result, Err(CloudError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_delete_missing_is_success() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(200, json!({"files": []}));

        let drive = connector_with(http.clone(), AccessLevel::FullAccess).await;
        drive
            .delete(&CloudPath::parse("/gone.txt").unwrap())
            .await
            .unwrap();
        assert_eq!(http.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_propagates_other_failures() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(200, json!({"files": [file_json("g", "gone.txt", "1")]}))
            .push_json(
                500,
                json!({"error": {"code": 500, "message": "Backend Error", "errors": [{"reason": "backendError"}]}}),
            );

        let drive = connector_with(http.clone(), AccessLevel::FullAccess).await;
        let result = drive.delete(&CloudPath::parse("/gone.txt").unwrap()).await;

        assert!(matches!(
            result,
            Err(CloudError::RemoteError {
                status: Some(500),
                ..
            })
        ));
        assert_eq!(http.requests()[1].method, HttpMethod::Delete);
    }

    #[tokio::test]
    async fn test_share_link() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(200, json!({"files": [file_json("r1", "report.txt", "1")]}))
            .push_json(200, json!({"id": "perm", "type": "anyone", "role": "reader"}))
            .push_json(
                200,
                json!({"id": "r1", "webViewLink": "https://drive.google.com/file/d/r1/view"}),
            );

        let drive = connector_with(http.clone(), AccessLevel::FullAccess).await;
        let link = drive
            .create_share_link(&CloudPath::parse("/report.txt").unwrap())
            .await
            .unwrap();

        assert_eq!(link, "https://drive.google.com/file/d/r1/view");
        let body: serde_json::Value =
            serde_json::from_slice(http.requests()[1].body.as_ref().unwrap()).unwrap();
        assert_eq!(body, json!({"role": "reader", "type": "anyone"}));
    }

    #[tokio::test]
    async fn test_resolve_share_link() {
        let http = Arc::new(ScriptedHttpClient::new());
        http.push_json(200, file_json("r1", "report.txt", "9"));

        let drive = connector_with(http.clone(), AccessLevel::FullAccess).await;
        let file = drive
            .resolve_share_link("https://drive.google.com/file/d/r1/view?usp=sharing")
            .await
            .unwrap();

        assert_eq!(file.name, "report.txt");
        assert!(http.requests()[0].url.contains("/files/r1?"));
    }

    #[test]
    fn test_file_id_from_link() {
        assert_eq!(
            file_id_from_link("https://drive.google.com/file/d/abc/view").unwrap(),
            "abc"
        );
        assert_eq!(
            file_id_from_link("https://drive.google.com/drive/folders/xyz").unwrap(),
            "xyz"
        );
        assert_eq!(
            file_id_from_link("https://drive.google.com/open?id=q1").unwrap(),
            "q1"
        );
        assert!(file_id_from_link("https://example.com/").is_err());
        assert!(file_id_from_link("not a url").is_err());
    }

    #[tokio::test]
    async fn test_api_error_handling() {
        let mut mock_http = MockHttpClient::new();
        let mut seq = Sequence::new();
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(HttpResponse::new(
                    200,
                    json!({"files": [{"id": "x", "name": "nonexistent", "mimeType": "text/plain"}]})
                        .to_string(),
                ))
            });
        mock_http
            .expect_execute()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(HttpResponse::new(404, "File not found")));

        let drive = connector_with(Arc::new(mock_http), AccessLevel::FullAccess).await;
        let result = drive
            .metadata(&CloudPath::parse("/nonexistent").unwrap())
            .await;

        assert!(matches!(result, Err(CloudError::NotFound(_))));
    }
}
