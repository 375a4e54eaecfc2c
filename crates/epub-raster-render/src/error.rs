use std::fmt;
use std::io;
use std::path::PathBuf;

use epub_raster::EpubError;

use crate::session::RenderError;

/// Fatal error for a pagination run. No variant is retried.
#[derive(Debug)]
pub enum PaginateError {
    /// Run settings were rejected before any work started.
    InvalidOptions(String),
    /// Output directory exists and is not empty, or is not a directory.
    Precondition(String),
    /// Archive could not be opened or its reading order resolved.
    Book(EpubError),
    /// A rendering command failed.
    Render(RenderError),
    /// A page (or the run manifest) could not be written.
    Write {
        /// Target file.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },
}

impl PaginateError {
    pub(crate) fn write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }
}

impl fmt::Display for PaginateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOptions(msg) => write!(f, "invalid options: {}", msg),
            Self::Precondition(msg) => write!(f, "precondition failed: {}", msg),
            Self::Book(err) => write!(f, "{}", err),
            Self::Render(err) => write!(f, "{}", err),
            Self::Write { path, source } => {
                write!(f, "failed to write {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for PaginateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidOptions(_) | Self::Precondition(_) => None,
            Self::Book(err) => Some(err),
            Self::Render(err) => Some(err),
            Self::Write { source, .. } => Some(source),
        }
    }
}

impl From<EpubError> for PaginateError {
    fn from(value: EpubError) -> Self {
        Self::Book(value)
    }
}

impl From<RenderError> for PaginateError {
    fn from(value: RenderError) -> Self {
        Self::Render(value)
    }
}
