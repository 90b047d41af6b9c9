//! Dropbox v2 request and response payloads.

use serde::{Deserialize, Serialize};

/// File or folder metadata.
///
/// Listing entries carry a `.tag`; upload responses omit it and are always
/// files.
#[derive(Debug, Clone, Deserialize)]
pub struct Metadata {
    #[serde(rename = ".tag", default)]
    pub tag: Option<String>,
    pub name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub path_lower: Option<String>,
    #[serde(default)]
    pub path_display: Option<String>,
    #[serde(default)]
    pub server_modified: Option<String>,
    #[serde(default)]
    pub rev: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub content_hash: Option<String>,
}

impl Metadata {
    pub fn is_folder(&self) -> bool {
        self.tag.as_deref() == Some("folder")
    }

    pub fn is_deleted(&self) -> bool {
        self.tag.as_deref() == Some("deleted")
    }
}

/// Argument of `files/list_folder`.
#[derive(Debug, Serialize)]
pub struct ListFolderArg<'a> {
    pub path: &'a str,
    pub recursive: bool,
    pub limit: u32,
}

/// Argument of `files/list_folder/continue`.
#[derive(Debug, Serialize)]
pub struct ListFolderContinueArg<'a> {
    pub cursor: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ListFolderResult {
    #[serde(default)]
    pub entries: Vec<Metadata>,
    pub cursor: String,
    #[serde(default)]
    pub has_more: bool,
}

/// Any endpoint taking a single `path`.
#[derive(Debug, Serialize)]
pub struct PathArg<'a> {
    pub path: &'a str,
}

#[derive(Debug, Serialize)]
pub struct CreateFolderArg<'a> {
    pub path: &'a str,
    pub autorename: bool,
}

/// Response of `files/create_folder_v2` and `files/delete_v2`.
#[derive(Debug, Deserialize)]
pub struct MetadataResult {
    pub metadata: Metadata,
}

/// `Dropbox-API-Arg` of `files/upload` and the commit of an upload session.
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo<'a> {
    pub path: &'a str,
    pub mode: &'a str,
    pub autorename: bool,
    pub mute: bool,
}

impl<'a> CommitInfo<'a> {
    pub fn overwrite(path: &'a str) -> Self {
        Self {
            path,
            mode: "overwrite",
            autorename: false,
            mute: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadSessionStartArg {
    pub close: bool,
}

#[derive(Debug, Deserialize)]
pub struct UploadSessionStartResult {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct UploadSessionCursor<'a> {
    pub session_id: &'a str,
    pub offset: u64,
}

#[derive(Debug, Serialize)]
pub struct UploadSessionAppendArg<'a> {
    pub cursor: UploadSessionCursor<'a>,
    pub close: bool,
}

#[derive(Debug, Serialize)]
pub struct UploadSessionFinishArg<'a> {
    pub cursor: UploadSessionCursor<'a>,
    pub commit: CommitInfo<'a>,
}

#[derive(Debug, Serialize)]
pub struct CreateSharedLinkArg<'a> {
    pub path: &'a str,
    pub settings: SharedLinkSettings<'a>,
}

#[derive(Debug, Serialize)]
pub struct SharedLinkSettings<'a> {
    pub requested_visibility: &'a str,
}

#[derive(Debug, Serialize)]
pub struct ListSharedLinksArg<'a> {
    pub path: &'a str,
    pub direct_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListSharedLinksResult {
    #[serde(default)]
    pub links: Vec<SharedLink>,
}

#[derive(Debug, Serialize)]
pub struct SharedLinkArg<'a> {
    pub url: &'a str,
}

/// Shared link metadata; also carries the target's file fields.
#[derive(Debug, Clone, Deserialize)]
pub struct SharedLink {
    pub url: String,
    #[serde(flatten)]
    pub target: Metadata,
}

/// `users/get_current_account`
#[derive(Debug, Deserialize)]
pub struct FullAccount {
    pub account_id: String,
    pub name: AccountName,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AccountName {
    pub display_name: String,
}

/// Body of an endpoint-specific (409) error.
#[derive(Debug, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error_summary: String,
}
