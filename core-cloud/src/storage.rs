//! Unified storage interface implemented by every provider adapter.

use crate::error::{CloudError, Result};
use crate::file::CloudFile;
use crate::path::CloudPath;
use crate::transfer;
use async_trait::async_trait;
use bridge_traits::http::DynAsyncRead;
use bytes::Bytes;
use core_auth::{AccountSummary, ProviderKind};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use tracing::{debug, info, warn};

/// Streamed file body.
pub type ByteReader = Box<DynAsyncRead>;

/// The same file operations against any back end.
///
/// # Contract
///
/// - `list` returns every entry of a directory; `NotFound` when it does not
///   exist, `NotADirectory` when the path names a file
/// - `upload` creates missing parent directories
/// - `delete` succeeds when the path is already gone
/// - `create_directory` and `create_share_link` succeed when the target
///   already exists, returning the existing resource
#[async_trait]
pub trait CloudStorage: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Account the underlying connection belongs to.
    fn account(&self) -> &AccountSummary;

    async fn list(&self, path: &CloudPath) -> Result<Vec<CloudFile>>;

    /// Every entry below `path`, directories before their contents.
    ///
    /// Each directory is listed once, even if a back end reports it again.
    async fn list_recursive(&self, path: &CloudPath) -> Result<Vec<CloudFile>> {
        let start = CloudPath::parse(&path.to_string())?;
        let mut visited = HashSet::from([start.clone()]);
        let mut pending = VecDeque::from([start]);
        let mut entries = Vec::new();

        while let Some(directory) = pending.pop_front() {
            for entry in self.list(&directory).await? {
                if entry.is_directory {
                    // Compare without the directory hint
                    let child = CloudPath::parse(&entry.path)?;
                    if visited.insert(child.clone()) {
                        pending.push_back(child);
                    } else {
                        warn!(directory = %directory, entry = %entry.path, "Directory listed twice, not descending again");
                        continue;
                    }
                }
                entries.push(entry);
            }
        }

        Ok(entries)
    }

    async fn metadata(&self, path: &CloudPath) -> Result<CloudFile>;

    async fn create_directory(&self, path: &CloudPath) -> Result<CloudFile>;

    async fn upload(&self, path: &CloudPath, data: Bytes) -> Result<CloudFile>;

    async fn upload_file(&self, local: &Path, remote: &CloudPath) -> Result<CloudFile> {
        let data = transfer::read_local_file(local).await?;
        info!(provider = %self.provider(), bytes = data.len(), remote = %remote, "Uploading local file");
        self.upload(remote, data).await
    }

    async fn download_stream(&self, path: &CloudPath) -> Result<ByteReader>;

    async fn download(&self, path: &CloudPath) -> Result<Bytes> {
        let mut reader = self.download_stream(path).await?;
        transfer::read_all(&mut reader).await
    }

    /// Stream `remote` into `local`; a failed or cancelled transfer leaves
    /// no file behind.
    async fn download_to_file(&self, remote: &CloudPath, local: &Path) -> Result<u64> {
        debug!(provider = %self.provider(), remote = %remote, local = %local.display(), "Downloading to file");
        let mut reader = self.download_stream(remote).await?;
        transfer::copy_to_file(&mut reader, local).await
    }

    async fn delete(&self, path: &CloudPath) -> Result<()>;

    /// Publicly readable link to `path`.
    async fn create_share_link(&self, path: &CloudPath) -> Result<String>;

    /// Metadata of the item a share link points to.
    async fn resolve_share_link(&self, url: &str) -> Result<CloudFile>;

    /// Clear the connection's stored credentials.
    async fn logout(&self) -> Result<()>;
}

/// Treat a not-found failure as success, for idempotent deletes.
pub fn ignore_not_found(result: Result<()>) -> Result<()> {
    match result {
        Err(CloudError::NotFound(what)) => {
            info!(target = %what, "Already absent, nothing to delete");
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Storage over a fixed tree, for the trait's provided methods.
    struct FixedStorage {
        account: AccountSummary,
        tree: HashMap<String, Vec<CloudFile>>,
        contents: HashMap<String, Vec<u8>>,
        uploads: Mutex<Vec<(String, Bytes)>>,
    }

    impl FixedStorage {
        fn new() -> Self {
            let dir = |p: &str| CloudFile::directory(&CloudPath::parse(p).unwrap());
            let file = |p: &str| {
                CloudFile::file(&CloudPath::parse(p).unwrap()).with_size(Some(3))
            };

            let tree = HashMap::from([
                ("/".to_string(), vec![dir("/a"), file("/top.txt")]),
                ("/a".to_string(), vec![dir("/a/b"), file("/a/one.txt")]),
                ("/a/b".to_string(), vec![file("/a/b/two.txt")]),
            ]);

            Self {
                account: AccountSummary::new("acct"),
                tree,
                contents: HashMap::from([("/top.txt".to_string(), b"top".to_vec())]),
                uploads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CloudStorage for FixedStorage {
        fn provider(&self) -> ProviderKind {
            ProviderKind::Dropbox
        }

        fn account(&self) -> &AccountSummary {
            &self.account
        }

        async fn list(&self, path: &CloudPath) -> Result<Vec<CloudFile>> {
            self.tree
                .get(&path.to_string())
                .cloned()
                .ok_or_else(|| CloudError::NotFound(path.to_string()))
        }

        async fn metadata(&self, path: &CloudPath) -> Result<CloudFile> {
            Err(CloudError::NotFound(path.to_string()))
        }

        async fn create_directory(&self, path: &CloudPath) -> Result<CloudFile> {
            Ok(CloudFile::directory(path))
        }

        async fn upload(&self, path: &CloudPath, data: Bytes) -> Result<CloudFile> {
            self.uploads
                .lock()
                .unwrap()
                .push((path.to_string(), data.clone()));
            Ok(CloudFile::file(path).with_size(Some(data.len() as u64)))
        }

        async fn download_stream(&self, path: &CloudPath) -> Result<ByteReader> {
            let data = self
                .contents
                .get(&path.to_string())
                .cloned()
                .ok_or_else(|| CloudError::NotFound(path.to_string()))?;
            Ok(Box::new(std::io::Cursor::new(data)))
        }

        async fn delete(&self, _path: &CloudPath) -> Result<()> {
            Ok(())
        }

        async fn create_share_link(&self, path: &CloudPath) -> Result<String> {
            Ok(format!("https://share.example{}", path))
        }

        async fn resolve_share_link(&self, url: &str) -> Result<CloudFile> {
            Err(CloudError::NotFound(url.to_string()))
        }

        async fn logout(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_list_recursive_walks_subdirectories() {
        let storage = FixedStorage::new();

        let entries = storage.list_recursive(&CloudPath::root()).await.unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();

        assert_eq!(
            paths,
            vec!["/a", "/top.txt", "/a/b", "/a/one.txt", "/a/b/two.txt"]
        );
    }

    #[tokio::test]
    async fn test_list_recursive_missing_root() {
        let storage = FixedStorage::new();
        let result = storage
            .list_recursive(&CloudPath::parse("/missing").unwrap())
            .await;
        assert!(matches!(result, Err(CloudError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_download_buffers_stream() {
        let storage = FixedStorage::new();
        let data = storage
            .download(&CloudPath::parse("/top.txt").unwrap())
            .await
            .unwrap();
        assert_eq!(&data[..], b"top");
    }

    #[tokio::test]
    async fn test_download_to_file_missing_leaves_nothing() {
        let storage = FixedStorage::new();
        let local = std::env::temp_dir().join(format!(
            "core-cloud-storage-{}-missing.bin",
            std::process::id()
        ));

        let result = storage
            .download_to_file(&CloudPath::parse("/nope").unwrap(), &local)
            .await;

        assert!(matches!(result, Err(CloudError::NotFound(_))));
        assert!(!local.exists());
    }

    #[tokio::test]
    async fn test_upload_file_reads_local_content() {
        let storage = FixedStorage::new();
        let local = std::env::temp_dir().join(format!(
            "core-cloud-storage-{}-upload.txt",
            std::process::id()
        ));
        std::fs::write(&local, b"payload").unwrap();

        let file = storage
            .upload_file(&local, &CloudPath::parse("/docs/report.txt").unwrap())
            .await
            .unwrap();
        std::fs::remove_file(&local).unwrap();

        assert_eq!(file.size, Some(7));
        let uploads = storage.uploads.lock().unwrap();
        assert_eq!(uploads[0].0, "/docs/report.txt");
        assert_eq!(&uploads[0].1[..], b"payload");
    }

    #[test]
    fn test_ignore_not_found() {
        assert!(ignore_not_found(Err(CloudError::NotFound("x".into()))).is_ok());
        assert!(ignore_not_found(Err(CloudError::remote(500, "x"))).is_err());
    }

    /// Lists a directory that reports itself as its own child.
    struct SelfListing {
        account: AccountSummary,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl CloudStorage for SelfListing {
        fn provider(&self) -> ProviderKind {
            ProviderKind::GoogleDrive
        }

        fn account(&self) -> &AccountSummary {
            &self.account
        }

        async fn list(&self, path: &CloudPath) -> Result<Vec<CloudFile>> {
            *self.calls.lock().unwrap() += 1;
            Ok(vec![
                CloudFile::directory(path),
                CloudFile::file(&path.join("x.txt").unwrap()),
            ])
        }

        async fn metadata(&self, path: &CloudPath) -> Result<CloudFile> {
            Err(CloudError::NotFound(path.to_string()))
        }

        async fn create_directory(&self, path: &CloudPath) -> Result<CloudFile> {
            Ok(CloudFile::directory(path))
        }

        async fn upload(&self, path: &CloudPath, _data: Bytes) -> Result<CloudFile> {
            Ok(CloudFile::file(path))
        }

        async fn download_stream(&self, path: &CloudPath) -> Result<ByteReader> {
            Err(CloudError::NotFound(path.to_string()))
        }

        async fn delete(&self, _path: &CloudPath) -> Result<()> {
            Ok(())
        }

        async fn create_share_link(&self, path: &CloudPath) -> Result<String> {
            Err(CloudError::NotFound(path.to_string()))
        }

        async fn resolve_share_link(&self, url: &str) -> Result<CloudFile> {
            Err(CloudError::NotFound(url.to_string()))
        }

        async fn logout(&self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_list_recursive_lists_each_directory_once() {
        let storage = SelfListing {
            account: AccountSummary::new("acct"),
            calls: Mutex::new(0),
        };

        let entries = storage
            .list_recursive(&CloudPath::parse("/loop/").unwrap())
            .await
            .unwrap();

        assert_eq!(*storage.calls.lock().unwrap(), 1);
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/loop/x.txt"]);
    }
}
