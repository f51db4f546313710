use std::path::PathBuf;

/// Error types for mirror operations
#[derive(Debug)]
pub enum MirrorError {
    /// Standard IO error (automatically converted via From)
    Io(std::io::Error),

    /// The watch subscription could not be established or maintained
    Watch(notify::Error),

    /// A path that does not lie under the mirrored source tree
    OutsideTarget { path: PathBuf, source: PathBuf },

    /// The operation was cancelled by a session stop
    Cancelled,
}

impl std::fmt::Display for MirrorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MirrorError::Io(e) => write!(f, "IO error: {e}"),
            MirrorError::Watch(e) => write!(f, "watch subscription failed: {e}"),
            MirrorError::OutsideTarget { path, source } => write!(
                f,
                "path {} is outside the mirrored source {}",
                path.display(),
                source.display()
            ),
            MirrorError::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for MirrorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MirrorError::Io(e) => Some(e),
            MirrorError::Watch(e) => Some(e),
            MirrorError::OutsideTarget { .. } => None,
            MirrorError::Cancelled => None,
        }
    }
}

impl From<std::io::Error> for MirrorError {
    fn from(e: std::io::Error) -> Self {
        MirrorError::Io(e)
    }
}

impl From<notify::Error> for MirrorError {
    fn from(e: notify::Error) -> Self {
        MirrorError::Watch(e)
    }
}

impl MirrorError {
    /// True for cooperative-cancellation markers, which are never logged as
    /// failures.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, MirrorError::Cancelled)
    }
}
