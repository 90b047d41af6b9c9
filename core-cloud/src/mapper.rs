use crate::error::Result;
use crate::file::CloudFile;
use crate::path::CloudPath;
use tracing::warn;

/// Converts a back end's native metadata record into a [`CloudFile`].
///
/// Implementations are pure: they decide `is_directory` from the back end's
/// marker, keep size and modification time for files only, and carry the
/// native id and revision over in `metadata`.
pub trait FileMapper: Send + Sync {
    type Native;

    /// `parent` is the caller path of the folder the record was listed in,
    /// for back ends whose records do not carry a path of their own.
    ///
    /// Fails only for records whose name cannot become a path segment.
    fn to_cloud_file(&self, native: Self::Native, parent: &CloudPath) -> Result<CloudFile>;

    /// Map a listing, leaving out records with no usable name.
    fn to_cloud_files(&self, natives: Vec<Self::Native>, parent: &CloudPath) -> Vec<CloudFile> {
        natives
            .into_iter()
            .filter_map(|native| match self.to_cloud_file(native, parent) {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!(parent = %parent, error = %e, "Skipping unnamed entry");
                    None
                }
            })
            .collect()
    }
}

/// Caller path for a child named `name` inside `parent`.
///
/// Names that are not a valid segment on their own are escaped (see
/// [`CloudPath::join_native`]), so the child never aliases another path.
pub fn child_path(parent: &CloudPath, name: &str) -> Result<CloudPath> {
    parent.join_native(name)
}
