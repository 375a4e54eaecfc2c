//! Error types for archive reading and spine extraction.

use std::fmt;
use std::io;

/// Classification of ZIP container failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZipErrorKind {
    /// End-of-central-directory record could not be located.
    MissingEndOfCentralDirectory,
    /// A central-directory or local header had the wrong signature or length.
    BadHeader,
    /// Archive uses ZIP64 extensions, which are not supported.
    Zip64Unsupported,
    /// Entry is encrypted.
    Encrypted,
    /// Entry uses a compression method other than stored or deflate.
    UnsupportedMethod(u16),
    /// Deflate stream was corrupt or truncated.
    Inflate,
    /// Decompressed size did not match the central directory.
    SizeMismatch,
    /// CRC-32 of the decompressed data did not match.
    CrcMismatch,
    /// Entry name would escape the extraction root.
    UnsafePath,
    /// Entry or archive exceeded a configured limit.
    LimitExceeded,
}

impl fmt::Display for ZipErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEndOfCentralDirectory => f.write_str("missing end of central directory"),
            Self::BadHeader => f.write_str("bad header"),
            Self::Zip64Unsupported => f.write_str("zip64 unsupported"),
            Self::Encrypted => f.write_str("encrypted entry"),
            Self::UnsupportedMethod(method) => write!(f, "unsupported method {}", method),
            Self::Inflate => f.write_str("inflate failed"),
            Self::SizeMismatch => f.write_str("size mismatch"),
            Self::CrcMismatch => f.write_str("crc mismatch"),
            Self::UnsafePath => f.write_str("unsafe entry path"),
            Self::LimitExceeded => f.write_str("limit exceeded"),
        }
    }
}

/// ZIP container error with optional entry context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZipError {
    /// Failure classification.
    pub kind: ZipErrorKind,
    /// Entry name, when the failure is tied to one entry.
    pub entry: Option<Box<str>>,
    /// Human-readable detail.
    pub detail: Option<Box<str>>,
}

impl ZipError {
    pub(crate) fn new(kind: ZipErrorKind) -> Self {
        Self {
            kind,
            entry: None,
            detail: None,
        }
    }

    pub(crate) fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into().into_boxed_str());
        self
    }

    pub(crate) fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into().into_boxed_str());
        self
    }
}

impl fmt::Display for ZipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zip: {}", self.kind)?;
        if let Some(entry) = self.entry.as_deref() {
            write!(f, " [entry={}]", entry)?;
        }
        if let Some(detail) = self.detail.as_deref() {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for ZipError {}

/// Errors raised while opening an EPUB and resolving its reading order.
#[derive(Debug)]
pub enum EpubError {
    /// Underlying filesystem or reader failure.
    Io(io::Error),
    /// The archive itself is malformed or unsupported.
    Zip(ZipError),
    /// `META-INF/container.xml` is absent from the archive.
    ContainerNotFound,
    /// The container descriptor or package document could not be parsed.
    ManifestParse(String),
}

impl fmt::Display for EpubError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::Zip(err) => write!(f, "{}", err),
            Self::ContainerNotFound => f.write_str("EPUB container.xml not found"),
            Self::ManifestParse(msg) => write!(f, "manifest parse error: {}", msg),
        }
    }
}

impl std::error::Error for EpubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Zip(err) => Some(err),
            Self::ContainerNotFound | Self::ManifestParse(_) => None,
        }
    }
}

impl From<io::Error> for EpubError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ZipError> for EpubError {
    fn from(value: ZipError) -> Self {
        Self::Zip(value)
    }
}

impl From<quick_xml::Error> for EpubError {
    fn from(value: quick_xml::Error) -> Self {
        Self::ManifestParse(value.to_string())
    }
}
