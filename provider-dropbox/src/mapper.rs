use core_cloud::{
    child_path, parse_timestamp, CloudFile, CloudPath, FileMapper, Result, META_ID, META_REVISION,
};

use crate::types::Metadata;

/// Metadata key for Dropbox's content hash.
pub const META_CONTENT_HASH: &str = "content_hash";

#[derive(Debug, Default, Clone, Copy)]
pub struct DropboxMapper;

impl DropboxMapper {
    pub fn at_path(&self, metadata: Metadata, path: &CloudPath) -> CloudFile {
        if metadata.is_folder() {
            return CloudFile::directory(path).with_optional_metadata(META_ID, metadata.id);
        }

        CloudFile::file(path)
            .with_size(metadata.size)
            .with_modified_time(parse_timestamp(metadata.server_modified.as_deref()))
            .with_optional_metadata(META_ID, metadata.id)
            .with_optional_metadata(META_REVISION, metadata.rev)
            .with_optional_metadata(META_CONTENT_HASH, metadata.content_hash)
    }

    /// Map using the reported path when present, falling back to `parent/name`.
    pub fn by_display_path(&self, metadata: Metadata, parent: &CloudPath) -> Result<CloudFile> {
        let path = match metadata
            .path_display
            .as_deref()
            .or(metadata.path_lower.as_deref())
        {
            Some(display) => CloudPath::from_native_path(display)?,
            None => child_path(parent, &metadata.name)?,
        };
        Ok(self.at_path(metadata, &path))
    }
}

impl FileMapper for DropboxMapper {
    type Native = Metadata;

    /// Listing entries keep the caller's spelling of `parent`, since Dropbox
    /// matches paths case-insensitively.
    fn to_cloud_file(&self, native: Metadata, parent: &CloudPath) -> Result<CloudFile> {
        let path = child_path(parent, &native.name)?;
        Ok(self.at_path(native, &path))
    }
}
