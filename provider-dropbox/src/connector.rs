//! Dropbox connector over the v2 HTTP API
//!
//! Dropbox addresses everything by path, so there is no resolver here:
//! `CloudPath` maps straight to the API path (`""` for the root) and
//! uploads create missing parents implicitly.

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_auth::{AccountSummary, AuthFlowController, Connection, OAuthConfig, ProviderKind};
use core_cloud::{
    drain_pages, ignore_not_found, json_body, ByteReader, CloudError, CloudFile, CloudPath,
    CloudStorage, FileMapper, Page, RequestExecutor, Result,
};
use core_runtime::config::{ClientCredentials, CoreConfig};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::account::DropboxAccountFetcher;
use crate::error::DropboxClassifier;
use crate::mapper::DropboxMapper;
use crate::types::{
    CommitInfo, CreateFolderArg, CreateSharedLinkArg, ListFolderArg, ListFolderContinueArg,
    ListFolderResult, ListSharedLinksArg, ListSharedLinksResult, Metadata, MetadataResult,
    PathArg, SharedLink, SharedLinkArg, SharedLinkSettings, UploadSessionAppendArg,
    UploadSessionCursor, UploadSessionFinishArg, UploadSessionStartArg, UploadSessionStartResult,
};

pub const API_BASE: &str = "https://api.dropboxapi.com/2";
pub const CONTENT_BASE: &str = "https://content.dropboxapi.com/2";

const LIST_LIMIT: u32 = 2000;

/// `files/upload` rejects bodies over 150 MiB.
const SINGLE_UPLOAD_LIMIT: usize = 150 * 1024 * 1024;

/// Session chunks must be multiples of 4 MiB.
const UPLOAD_CHUNK_SIZE: usize = 8 * 1024 * 1024;

const TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);

pub struct DropboxConnector {
    executor: RequestExecutor,
    mapper: DropboxMapper,
    single_upload_limit: usize,
    chunk_size: usize,
}

impl DropboxConnector {
    /// Paths are the same for app-folder and full-access apps; Dropbox
    /// scopes app-folder tokens server side.
    pub fn new(http_client: Arc<dyn HttpClient>, connection: Connection) -> Self {
        Self {
            executor: RequestExecutor::new(http_client, connection)
                .with_classifier(Arc::new(DropboxClassifier)),
            mapper: DropboxMapper,
            single_upload_limit: SINGLE_UPLOAD_LIMIT,
            chunk_size: UPLOAD_CHUNK_SIZE,
        }
    }

    pub fn from_connection(config: &CoreConfig, connection: Connection) -> Self {
        Self::new(config.http_client.clone(), connection)
    }

    /// Sign-in controller wired to Dropbox OAuth.
    pub fn auth_controller(
        config: &CoreConfig,
        credentials: &ClientCredentials,
    ) -> AuthFlowController {
        let oauth =
            OAuthConfig::for_provider(ProviderKind::Dropbox, config.access_level, credentials);
        let fetcher = Arc::new(DropboxAccountFetcher::new(config.http_client.clone()));
        AuthFlowController::new(config, oauth, fetcher)
    }

    #[cfg(test)]
    fn with_chunking(mut self, single_upload_limit: usize, chunk_size: usize) -> Self {
        self.single_upload_limit = single_upload_limit;
        self.chunk_size = chunk_size;
        self
    }

    /// POST a JSON argument to an RPC endpoint.
    async fn rpc<A, T>(&self, endpoint: &str, arg: &A) -> Result<T>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/{}", API_BASE, endpoint);
        let body = json_body(arg)?;

        self.executor
            .execute_json(endpoint, || {
                HttpRequest::post(url.clone())
                    .header("Content-Type", "application/json")
                    .body(body.clone())
            })
            .await
    }

    /// POST raw bytes to a content endpoint, passing `arg` in `Dropbox-API-Arg`.
    async fn content_upload<A>(&self, endpoint: &str, arg: &A, data: Bytes) -> Result<HttpResponse>
    where
        A: Serialize + ?Sized,
    {
        let url = format!("{}/{}", CONTENT_BASE, endpoint);
        let arg = api_arg(arg)?;

        self.executor
            .execute(endpoint, || {
                HttpRequest::post(url.clone())
                    .header("Dropbox-API-Arg", arg.clone())
                    .header("Content-Type", "application/octet-stream")
                    .body(data.clone())
                    .timeout(TRANSFER_TIMEOUT)
            })
            .await
    }

    async fn get_metadata(&self, path: &CloudPath) -> Result<Metadata> {
        let api_path = api_path(path)?;
        self.rpc("files/get_metadata", &PathArg { path: &api_path })
            .await
    }

    /// Upload through a session: start, append whole chunks, finish with the rest.
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn upload_session(&self, api_path: &str, data: Bytes) -> Result<Metadata> {
        let total = data.len();
        let first_end = self.chunk_size.min(total);

        let started: UploadSessionStartResult = {
            let response = self
                .content_upload(
                    "files/upload_session/start",
                    &UploadSessionStartArg { close: false },
                    data.slice(..first_end),
                )
                .await?;
            serde_json::from_slice(&response.body)?
        };

        let mut offset = first_end;
        while total - offset > self.chunk_size {
            let end = offset + self.chunk_size;
            self.content_upload(
                "files/upload_session/append_v2",
                &UploadSessionAppendArg {
                    cursor: UploadSessionCursor {
                        session_id: &started.session_id,
                        offset: offset as u64,
                    },
                    close: false,
                },
                data.slice(offset..end),
            )
            .await?;
            debug!(offset, end, total, "Appended upload chunk");
            offset = end;
        }

        let response = self
            .content_upload(
                "files/upload_session/finish",
                &UploadSessionFinishArg {
                    cursor: UploadSessionCursor {
                        session_id: &started.session_id,
                        offset: offset as u64,
                    },
                    commit: CommitInfo::overwrite(api_path),
                },
                data.slice(offset..),
            )
            .await?;

        Ok(serde_json::from_slice(&response.body)?)
    }

    async fn existing_link(&self, api_path: &str) -> Result<String> {
        let listed: ListSharedLinksResult = self
            .rpc(
                "sharing/list_shared_links",
                &ListSharedLinksArg {
                    path: api_path,
                    direct_only: true,
                },
            )
            .await?;

        listed
            .links
            .into_iter()
            .next()
            .map(|link| link.url)
            .ok_or_else(|| CloudError::NotFound(format!("shared link for {}", api_path)))
    }
}

#[async_trait]
impl CloudStorage for DropboxConnector {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Dropbox
    }

    fn account(&self) -> &AccountSummary {
        self.executor.connection().account()
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn list(&self, path: &CloudPath) -> Result<Vec<CloudFile>> {
        let api_path = api_path(path)?;

        let entries = drain_pages(|cursor| {
            let api_path = api_path.as_str();
            async move {
                let result: ListFolderResult = match cursor {
                    None => {
                        self.rpc(
                            "files/list_folder",
                            &ListFolderArg {
                                path: api_path,
                                recursive: false,
                                limit: LIST_LIMIT,
                            },
                        )
                        .await?
                    }
                    Some(cursor) => {
                        self.rpc(
                            "files/list_folder/continue",
                            &ListFolderContinueArg { cursor: &cursor },
                        )
                        .await?
                    }
                };
                Ok(Page::from_has_more(
                    result.entries,
                    result.cursor,
                    result.has_more,
                ))
            }
        })
        .await?;

        let live: Vec<Metadata> = entries.into_iter().filter(|e| !e.is_deleted()).collect();
        info!(entries = live.len(), "Listed Dropbox folder");
        Ok(self.mapper.to_cloud_files(live, path))
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn metadata(&self, path: &CloudPath) -> Result<CloudFile> {
        if path.is_root() {
            return Err(CloudError::Unsupported(
                "Dropbox has no metadata for the root folder".to_string(),
            ));
        }

        let metadata = self.get_metadata(path).await?;
        if path.is_directory_hint() && !metadata.is_folder() {
            return Err(CloudError::NotADirectory(path.to_string()));
        }
        Ok(self.mapper.at_path(metadata, path))
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn create_directory(&self, path: &CloudPath) -> Result<CloudFile> {
        if path.is_root() {
            return Ok(CloudFile::directory(path));
        }

        let api_path = api_path(path)?;
        let created: Result<MetadataResult> = self
            .rpc(
                "files/create_folder_v2",
                &CreateFolderArg {
                    path: &api_path,
                    autorename: false,
                },
            )
            .await;

        let mut folder = match created {
            Ok(result) => result.metadata,
            Err(CloudError::Conflict(_)) => {
                debug!("Folder already exists");
                let existing = self.get_metadata(path).await?;
                if !existing.is_folder() {
                    return Err(CloudError::NotADirectory(path.to_string()));
                }
                existing
            }
            Err(e) => return Err(e),
        };

        // create_folder_v2 returns untagged folder metadata
        folder.tag = Some("folder".to_string());
        Ok(self.mapper.at_path(folder, path))
    }

    #[instrument(skip(self, data), fields(path = %path, bytes = data.len()))]
    async fn upload(&self, path: &CloudPath, data: Bytes) -> Result<CloudFile> {
        if path.is_root() {
            return Err(CloudError::InvalidPath("cannot upload to the root".to_string()));
        }

        let api_path = api_path(path)?;
        let metadata: Metadata = if data.len() <= self.single_upload_limit {
            let response = self
                .content_upload("files/upload", &CommitInfo::overwrite(&api_path), data)
                .await?;
            serde_json::from_slice(&response.body)?
        } else {
            self.upload_session(&api_path, data).await?
        };

        info!(rev = ?metadata.rev, "Uploaded file to Dropbox");
        Ok(self.mapper.at_path(metadata, path))
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn download_stream(&self, path: &CloudPath) -> Result<ByteReader> {
        if path.is_root() {
            return Err(CloudError::Unsupported("cannot download a folder".to_string()));
        }

        let url = format!("{}/files/download", CONTENT_BASE);
        let arg = api_arg(&PathArg {
            path: &api_path(path)?,
        })?;

        let response = self
            .executor
            .execute_streaming("download", || {
                HttpRequest::post(url.clone())
                    .header("Dropbox-API-Arg", arg.clone())
                    .timeout(TRANSFER_TIMEOUT)
            })
            .await?;
        Ok(response.body)
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn delete(&self, path: &CloudPath) -> Result<()> {
        if path.is_root() {
            return Err(CloudError::InvalidPath("cannot delete the root".to_string()));
        }

        let api_path = api_path(path)?;
        let deleted = self
            .rpc::<_, MetadataResult>("files/delete_v2", &PathArg { path: &api_path })
            .await
            .map(|_| ());
        ignore_not_found(deleted)
    }

    /// An existing public link is returned rather than failing.
    #[instrument(skip(self), fields(path = %path))]
    async fn create_share_link(&self, path: &CloudPath) -> Result<String> {
        let api_path = api_path(path)?;
        let created: Result<SharedLink> = self
            .rpc(
                "sharing/create_shared_link_with_settings",
                &CreateSharedLinkArg {
                    path: &api_path,
                    settings: SharedLinkSettings {
                        requested_visibility: "public",
                    },
                },
            )
            .await;

        match created {
            Ok(link) => Ok(link.url),
            Err(CloudError::Conflict(_)) => {
                debug!("Shared link already exists");
                self.existing_link(&api_path).await
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn resolve_share_link(&self, url: &str) -> Result<CloudFile> {
        let link: SharedLink = self
            .rpc(
                "sharing/get_shared_link_metadata",
                &SharedLinkArg { url: url.trim() },
            )
            .await?;
        self.mapper.by_display_path(link.target, &CloudPath::root())
    }

    async fn logout(&self) -> Result<()> {
        Ok(self.executor.connection().logout().await?)
    }
}

/// Dropbox spells the root as the empty string.
fn api_path(path: &CloudPath) -> Result<String> {
    Ok(path
        .addressable_segments()?
        .iter()
        .map(|segment| format!("/{}", segment))
        .collect())
}

/// JSON for the `Dropbox-API-Arg` header. Header values must be ASCII, so
/// everything else is written as `\uXXXX` escapes.
fn api_arg<A: Serialize + ?Sized>(arg: &A) -> Result<String> {
    let json = serde_json::to_string(arg)?;
    let mut escaped = String::with_capacity(json.len());
    let mut units = [0u16; 2];

    for c in json.chars() {
        if c.is_ascii() && c != '\u{7f}' {
            escaped.push(c);
        } else {
            for unit in c.encode_utf16(&mut units) {
                escaped.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }

    Ok(escaped)
}
