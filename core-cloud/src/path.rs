//! Caller-facing hierarchical paths.
//!
//! Paths are `/`-separated and always rooted. Parsing collapses repeated
//! separators, drops `.` segments and rejects `..`. A trailing slash is kept
//! as a hint that the caller means a directory.
//!
//! Native names that cannot be a segment as-is (`a/b`, `..`) are stored
//! escaped: `%2F` for `/`, `%2E` for a dot of a `.`/`..` name, `%00` for NUL
//! and `%25` for a literal `%`. Names are only escaped when they need it or
//! already contain one of those sequences, so ordinary names with a stray `%`
//! read the same in both forms. [`CloudPath::native_segments`] undoes it.

use crate::error::{CloudError, Result};
use std::fmt;
use std::str::FromStr;

/// Escape sequences and the character each one stands for.
const ESCAPES: [(&str, char); 4] = [("%25", '%'), ("%2F", '/'), ("%2E", '.'), ("%00", '\0')];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CloudPath {
    segments: Vec<String>,
    directory_hint: bool,
}

impl CloudPath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse and normalise a caller path. `""`, `"/"` and `"."` are the root.
    ///
    /// ```
    /// use core_cloud::CloudPath;
    ///
    /// let path = CloudPath::parse("docs//./report.txt").unwrap();
    /// assert_eq!(path.to_string(), "/docs/report.txt");
    /// assert_eq!(path.name(), Some("report.txt"));
    /// assert!(CloudPath::parse("/a/../b").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let mut segments = Vec::new();

        for segment in trimmed.split('/') {
            match segment {
                "" | "." => continue,
                ".." => {
                    return Err(CloudError::InvalidPath(format!(
                        "parent segments are not allowed: {}",
                        raw
                    )))
                }
                s if s.contains('\0') => {
                    return Err(CloudError::InvalidPath(format!(
                        "NUL byte in path: {:?}",
                        raw
                    )))
                }
                s => segments.push(s.to_string()),
            }
        }

        let directory_hint = !segments.is_empty() && trimmed.ends_with('/');

        Ok(Self {
            segments,
            directory_hint,
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Final segment; `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Containing directory; `None` for the root.
    pub fn parent(&self) -> Option<CloudPath> {
        if self.is_root() {
            return None;
        }

        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
            directory_hint: false,
        })
    }

    /// Child path `self/name`. `name` must be a single segment.
    pub fn join(&self, name: &str) -> Result<CloudPath> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(CloudError::InvalidPath(format!(
                "not a single path segment: {:?}",
                name
            )));
        }

        let mut segments = self.segments.clone();
        segments.push(name.to_string());

        Ok(Self {
            segments,
            directory_hint: false,
        })
    }

    /// Child path for a back end's native `name`, escaping it when it is not
    /// a valid segment on its own. Only an empty name is rejected.
    pub fn join_native(&self, name: &str) -> Result<CloudPath> {
        let segment = escape_name(name).ok_or_else(|| {
            CloudError::InvalidPath(format!("empty entry name below {}", self))
        })?;

        let mut segments = self.segments.clone();
        segments.push(segment);

        Ok(Self {
            segments,
            directory_hint: false,
        })
    }

    /// Build a path from a back end's own `/`-separated native path.
    pub fn from_native_path(native: &str) -> Result<CloudPath> {
        native
            .split('/')
            .filter(|name| !name.is_empty())
            .try_fold(CloudPath::root(), |path, name| path.join_native(name))
    }

    /// Segments as the back end names them, escapes undone.
    pub fn native_segments(&self) -> Vec<String> {
        self.segments.iter().map(|s| unescape_segment(s)).collect()
    }

    /// Final segment as the back end names it.
    pub fn native_name(&self) -> Option<String> {
        self.segments.last().map(|s| unescape_segment(s))
    }

    /// Native segments for back ends addressed by path, where a `/`, `.` or
    /// `..` name would change which item the request reaches.
    pub fn addressable_segments(&self) -> Result<Vec<String>> {
        let segments = self.native_segments();
        let unaddressable =
            |s: &&String| s.as_str() == "." || s.as_str() == ".." || s.contains(['/', '\0']);
        if let Some(bad) = segments.iter().find(unaddressable) {
            return Err(CloudError::InvalidPath(format!(
                "{:?} cannot be addressed by path: {}",
                bad, self
            )));
        }
        Ok(segments)
    }

    /// Whether the caller wrote a trailing slash.
    pub fn is_directory_hint(&self) -> bool {
        self.directory_hint
    }

    /// Same path, marked as a directory.
    pub fn as_directory(&self) -> CloudPath {
        Self {
            segments: self.segments.clone(),
            directory_hint: !self.is_root(),
        }
    }

    /// Segments joined without a leading slash; empty for the root.
    pub fn relative(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for CloudPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for CloudPath {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for CloudPath {
    type Error = CloudError;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

fn contains_escape(name: &str) -> bool {
    name.char_indices().any(|(i, c)| c == '%' && escape_at(name, i).is_some())
}

fn escape_at(segment: &str, index: usize) -> Option<char> {
    let candidate = segment.get(index..index + 3)?;
    ESCAPES
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(candidate))
        .map(|(_, c)| *c)
}

fn escape_name(name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    if name == "." || name == ".." {
        return Some("%2E".repeat(name.len()));
    }
    if !name.contains(['/', '\0']) && !contains_escape(name) {
        return Some(name.to_string());
    }
    Some(
        name.replace('%', "%25")
            .replace('/', "%2F")
            .replace('\0', "%00"),
    )
}

fn unescape_segment(segment: &str) -> String {
    if !segment.contains('%') {
        return segment.to_string();
    }

    let mut out = String::with_capacity(segment.len());
    let mut rest = segment.char_indices();
    while let Some((i, c)) = rest.next() {
        match (c, escape_at(segment, i)) {
            ('%', Some(decoded)) => {
                out.push(decoded);
                rest.next();
                rest.next();
            }
            _ => out.push(c),
        }
    }
    out
}
