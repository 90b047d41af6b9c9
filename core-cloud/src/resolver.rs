//! Path Resolver
//!
//! Maps a [`CloudPath`] onto a back end's native object references by
//! walking it one segment at a time from the root, looking each segment up
//! by name inside its parent. Nothing is cached between calls, so changes
//! made outside this process are seen on the next resolution.

use crate::error::{CloudError, Result};
use crate::path::CloudPath;
use async_trait::async_trait;
use tracing::{debug, instrument};

/// A child found by name inside a folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildNode {
    pub native_id: String,
    pub is_directory: bool,
}

impl ChildNode {
    pub fn folder(native_id: impl Into<String>) -> Self {
        Self {
            native_id: native_id.into(),
            is_directory: true,
        }
    }

    pub fn file(native_id: impl Into<String>) -> Self {
        Self {
            native_id: native_id.into(),
            is_directory: false,
        }
    }
}

/// Result of a resolution. Valid only for the operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNode {
    pub native_id: String,
    /// `None` for the root.
    pub parent_native_id: Option<String>,
    pub is_directory: bool,
}

/// Name lookups a back end must answer for path resolution.
#[async_trait]
pub trait NodeLookup: Send + Sync {
    /// Reference of the configured root (account root or app folder).
    fn root_id(&self) -> String;

    /// Child of `parent_id` named exactly `name`, if any.
    async fn find_child(&self, parent_id: &str, name: &str) -> Result<Option<ChildNode>>;

    /// Create folder `name` inside `parent_id` and return its reference.
    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Any,
    Folder,
    CreateFolder,
}

/// Walks paths against a [`NodeLookup`].
pub struct PathResolver<'a> {
    lookup: &'a dyn NodeLookup,
}

impl<'a> PathResolver<'a> {
    pub fn new(lookup: &'a dyn NodeLookup) -> Self {
        Self { lookup }
    }

    pub fn root(&self) -> ResolvedNode {
        ResolvedNode {
            native_id: self.lookup.root_id(),
            parent_native_id: None,
            is_directory: true,
        }
    }

    /// Resolve an existing file or folder.
    ///
    /// A trailing slash requires the final segment to be a folder.
    pub async fn resolve_file(&self, path: &CloudPath) -> Result<ResolvedNode> {
        self.walk(path, Target::Any).await
    }

    /// Resolve an existing folder.
    pub async fn resolve_folder(&self, path: &CloudPath) -> Result<ResolvedNode> {
        self.walk(path, Target::Folder).await
    }

    /// Resolve a folder, creating every missing segment on the way.
    pub async fn resolve_or_create_folder(&self, path: &CloudPath) -> Result<ResolvedNode> {
        self.walk(path, Target::CreateFolder).await
    }

    #[instrument(skip(self), fields(path = %path))]
    async fn walk(&self, path: &CloudPath, target: Target) -> Result<ResolvedNode> {
        let mut current = self.root();
        let segments = path.native_segments();

        for (index, segment) in segments.iter().enumerate() {
            let is_last = index + 1 == segments.len();

            let child = match self.lookup.find_child(&current.native_id, segment).await? {
                Some(child) => child,
                None if target == Target::CreateFolder => {
                    debug!(segment = %segment, "Creating missing folder");
                    let id = self
                        .lookup
                        .create_folder(&current.native_id, segment)
                        .await?;
                    ChildNode::folder(id)
                }
                None => return Err(CloudError::NotFound(path.to_string())),
            };

            if !is_last && !child.is_directory {
                let prefix = path.segments()[..=index].join("/");
                return Err(CloudError::NotADirectory(format!("/{}", prefix)));
            }

            current = ResolvedNode {
                native_id: child.native_id,
                parent_native_id: Some(current.native_id),
                is_directory: child.is_directory,
            };
        }

        let wants_folder = target != Target::Any || path.is_directory_hint();
        if wants_folder && !current.is_directory {
            return Err(CloudError::NotADirectory(path.to_string()));
        }

        Ok(current)
    }
}

/// Quote a name for a query language that delimits strings with `'`.
///
/// Backslashes and single quotes are escaped with a backslash.
///
/// ```
/// use core_cloud::resolver::escape_query_literal;
///
/// assert_eq!(escape_query_literal("it's"), r"it\'s");
/// assert_eq!(escape_query_literal(r"a\b"), r"a\\b");
/// ```
pub fn escape_query_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Node {
        id: String,
        parent: String,
        name: String,
        is_directory: bool,
    }

    /// In-memory parent-chained tree.
    #[derive(Default)]
    struct FakeTree {
        nodes: Mutex<Vec<Node>>,
        lookups: AtomicUsize,
        created: AtomicUsize,
    }

    impl FakeTree {
        fn add(&self, parent: &str, name: &str, is_directory: bool) -> String {
            let mut nodes = self.nodes.lock().unwrap();
            let id = format!("n{}", nodes.len() + 1);
            nodes.push(Node {
                id: id.clone(),
                parent: parent.to_string(),
                name: name.to_string(),
                is_directory,
            });
            id
        }

        fn parent_of(&self, id: &str) -> Option<String> {
            let nodes = self.nodes.lock().unwrap();
            nodes.iter().find(|n| n.id == id).map(|n| n.parent.clone())
        }
    }

    #[async_trait]
    impl NodeLookup for FakeTree {
        fn root_id(&self) -> String {
            "root".to_string()
        }

        async fn find_child(&self, parent_id: &str, name: &str) -> Result<Option<ChildNode>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let nodes = self.nodes.lock().unwrap();
            Ok(nodes
                .iter()
                .find(|n| n.parent == parent_id && n.name == name)
                .map(|n| ChildNode {
                    native_id: n.id.clone(),
                    is_directory: n.is_directory,
                }))
        }

        async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(self.add(parent_id, name, true))
        }
    }

    fn path(raw: &str) -> CloudPath {
        CloudPath::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_root_resolves_without_lookup() {
        let tree = FakeTree::default();
        let resolver = PathResolver::new(&tree);

        for raw in ["", "/", "."] {
            let node = resolver.resolve_folder(&path(raw)).await.unwrap();
            assert_eq!(node.native_id, "root");
            assert_eq!(node.parent_native_id, None);
        }
        assert_eq!(tree.lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_create_nested_folders_once() {
        let tree = FakeTree::default();
        let resolver = PathResolver::new(&tree);

        let c = resolver
            .resolve_or_create_folder(&path("/a/b/c"))
            .await
            .unwrap();
        assert_eq!(tree.created.load(Ordering::SeqCst), 3);

        let b = tree.parent_of(&c.native_id).unwrap();
        let a = tree.parent_of(&b).unwrap();
        assert_eq!(tree.parent_of(&a).as_deref(), Some("root"));
        assert_eq!(c.parent_native_id.as_deref(), Some(b.as_str()));

        let again = resolver
            .resolve_or_create_folder(&path("/a/b/c"))
            .await
            .unwrap();
        assert_eq!(again, c);
        assert_eq!(tree.created.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_resolve_file() {
        let tree = FakeTree::default();
        let docs = tree.add("root", "docs", true);
        let report = tree.add(&docs, "report.txt", false);
        let resolver = PathResolver::new(&tree);

        let node = resolver
            .resolve_file(&path("/docs/report.txt"))
            .await
            .unwrap();

        assert_eq!(node.native_id, report);
        assert_eq!(node.parent_native_id, Some(docs));
        assert!(!node.is_directory);
    }

    #[tokio::test]
    async fn test_missing_segment_is_not_found() {
        let tree = FakeTree::default();
        let resolver = PathResolver::new(&tree);

        assert!(matches!(
            resolver.resolve_file(&path("/nope/file.txt")).await,
            Err(CloudError::NotFound(_))
        ));
        assert_eq!(tree.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_file_as_intermediate_segment_fails() {
        let tree = FakeTree::default();
        tree.add("root", "notes.txt", false);
        let resolver = PathResolver::new(&tree);

        let result = resolver
            .resolve_or_create_folder(&path("/notes.txt/sub"))
            .await;

        match result {
            Err(CloudError::NotADirectory(prefix)) => assert_eq!(prefix, "/notes.txt"),
            other => panic!("unexpected: {:?}", other),
        }
        assert_eq!(tree.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_trailing_slash_requires_folder() {
        let tree = FakeTree::default();
        tree.add("root", "notes.txt", false);
        let resolver = PathResolver::new(&tree);

        assert!(resolver.resolve_file(&path("/notes.txt")).await.is_ok());
        assert!(matches!(
            resolver.resolve_file(&path("/notes.txt/")).await,
            Err(CloudError::NotADirectory(_))
        ));
        assert!(matches!(
            resolver.resolve_folder(&path("/notes.txt")).await,
            Err(CloudError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_escaped_segments_look_up_native_names() {
        let tree = FakeTree::default();
        let reports = tree.add("root", "2024/Q1", true);
        let up = tree.add(&reports, "..", true);
        let resolver = PathResolver::new(&tree);

        let listed = CloudPath::root()
            .join_native("2024/Q1")
            .and_then(|p| p.join_native(".."))
            .unwrap();
        let node = resolver.resolve_folder(&listed).await.unwrap();

        assert_eq!(node.native_id, up);
        assert_eq!(node.parent_native_id, Some(reports));
    }
}
