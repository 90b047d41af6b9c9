use core_cloud::{
    child_path, parse_timestamp, CloudFile, CloudPath, FileMapper, Result, META_ID, META_MIME_TYPE,
    META_REVISION,
};

use crate::types::DriveFile;

/// Maps Drive file resources; folders are recognised by their MIME type.
#[derive(Debug, Default, Clone, Copy)]
pub struct DriveFileMapper;

impl DriveFileMapper {
    /// Map a record whose caller path is already known.
    pub fn at_path(&self, drive_file: DriveFile, path: &CloudPath) -> CloudFile {
        let base = if drive_file.is_folder() {
            CloudFile::directory(path)
        } else {
            CloudFile::file(path)
        };

        base.with_size(drive_file.size.as_deref().and_then(|s| s.parse().ok()))
            .with_modified_time(parse_timestamp(drive_file.modified_time.as_deref()))
            .with_metadata(META_ID, drive_file.id)
            .with_metadata(META_MIME_TYPE, drive_file.mime_type)
            .with_optional_metadata(META_REVISION, drive_file.version)
            .with_optional_metadata("md5_checksum", drive_file.md5_checksum)
    }
}

impl FileMapper for DriveFileMapper {
    type Native = DriveFile;

    fn to_cloud_file(&self, native: DriveFile, parent: &CloudPath) -> Result<CloudFile> {
        let path = child_path(parent, &native.name)?;
        Ok(self.at_path(native, &path))
    }
}
