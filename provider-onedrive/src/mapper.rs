use core_cloud::{
    child_path, parse_timestamp, CloudFile, CloudPath, FileMapper, Result, META_ID, META_MIME_TYPE,
    META_REVISION,
};

use crate::types::DriveItem;

/// Maps Graph drive items; the `folder` facet marks directories.
#[derive(Debug, Default, Clone, Copy)]
pub struct DriveItemMapper;

impl DriveItemMapper {
    pub fn at_path(&self, item: DriveItem, path: &CloudPath) -> CloudFile {
        let base = if item.is_folder() {
            CloudFile::directory(path)
        } else {
            CloudFile::file(path)
        };

        base.with_size(item.size)
            .with_modified_time(parse_timestamp(item.last_modified_date_time.as_deref()))
            .with_metadata(META_ID, item.id)
            .with_optional_metadata(META_REVISION, item.e_tag)
            .with_optional_metadata(META_MIME_TYPE, item.file.and_then(|f| f.mime_type))
    }
}

impl FileMapper for DriveItemMapper {
    type Native = DriveItem;

    fn to_cloud_file(&self, native: DriveItem, parent: &CloudPath) -> Result<CloudFile> {
        let path = child_path(parent, &native.name)?;
        Ok(self.at_path(native, &path))
    }
}
