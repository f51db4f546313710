use super::{MirrorError, SyncTarget};
use std::path::{Path, PathBuf};

/// Maps paths from a target's source tree into its destination tree.
///
/// Pure path-segment manipulation; never touches the filesystem.
#[derive(Debug, Clone)]
pub struct PathTranslator {
    source: PathBuf,
    destination: PathBuf,
}

impl PathTranslator {
    pub fn new(target: &SyncTarget) -> Self {
        Self {
            source: target.source.clone(),
            destination: target.destination.clone(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Translate an absolute path under the source tree to its destination
    /// counterpart by replacing the source prefix.
    pub fn to_destination(&self, path: &Path) -> Result<PathBuf, MirrorError> {
        let relative = path
            .strip_prefix(&self.source)
            .map_err(|_| MirrorError::OutsideTarget {
                path: path.to_path_buf(),
                source: self.source.clone(),
            })?;
        Ok(self.destination.join(relative))
    }

    /// Translate a rename into destination-tree terms.
    ///
    /// Returns the mirrored old path and the mirrored new path. The new path
    /// is produced by replacing exactly the final path segment of the old
    /// mirrored path, so a directory that happens to contain the old name as
    /// a substring elsewhere in the path is never corrupted.
    pub fn translate_rename(&self, from: &Path, to: &Path) -> Result<(PathBuf, PathBuf), MirrorError> {
        let old_dest = self.to_destination(from)?;
        let new_name = to.file_name().ok_or_else(|| {
            MirrorError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "rename target has no file name",
            ))
        })?;
        let new_dest = old_dest.with_file_name(new_name);
        Ok((old_dest, new_dest))
    }
}
