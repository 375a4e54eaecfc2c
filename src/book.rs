//! Archive extraction and reading-order resolution.
//!
//! [`open_book`] unpacks an EPUB into a work directory and resolves the spine
//! into an ordered list of [`ContentDocument`]s that a renderer can load from
//! disk, with relative resources (images, stylesheets) alongside them.

use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;

use crate::container::{parse_container, CONTAINER_PATH};
use crate::error::EpubError;
use crate::spine::{parse_spine, Spine};
use crate::zip::{ZipArchive, ZipLimits};

/// One renderable unit from the reading order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentDocument {
    /// Position of the itemref in the spine (non-linear entries keep their slot).
    pub spine_index: usize,
    /// Manifest id.
    pub id: String,
    /// Href as written in the manifest, relative to the package document.
    pub href: String,
    /// Absolute path of the extracted content file.
    pub path: PathBuf,
    /// Directory that relative links inside the document resolve against.
    pub base_dir: PathBuf,
}

impl ContentDocument {
    /// File name of the content document, for progress output.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.href.clone())
    }
}

/// Options for [`open_book`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Extract into this directory instead of a fresh temporary one.
    pub work_dir: Option<PathBuf>,
    /// Archive reading limits.
    pub zip: ZipLimits,
}

impl ExtractOptions {
    /// Extract into a caller-owned directory that outlives the book.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Override archive reading limits.
    pub fn with_zip_limits(mut self, limits: ZipLimits) -> Self {
        self.zip = limits;
        self
    }
}

/// An EPUB unpacked on disk with its reading order resolved.
///
/// When extracted into a temporary directory, the files are removed when the
/// book is dropped.
#[derive(Debug)]
pub struct ExtractedBook {
    root: PathBuf,
    package_path: PathBuf,
    spine: Spine,
    documents: Vec<ContentDocument>,
    _temp: Option<TempDir>,
}

impl ExtractedBook {
    /// Root of the extracted archive.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of the OPF package document.
    pub fn package_path(&self) -> &Path {
        &self.package_path
    }

    /// Parsed package manifest and spine.
    pub fn spine(&self) -> &Spine {
        &self.spine
    }

    /// Content documents in reading order.
    pub fn content_documents(&self) -> &[ContentDocument] {
        &self.documents
    }
}

/// Open an EPUB with default options.
pub fn open_book(path: impl AsRef<Path>) -> Result<ExtractedBook, EpubError> {
    open_book_with_options(path, ExtractOptions::default())
}

/// Unpack `path` and resolve its spine into content documents.
///
/// Fails with [`EpubError::ContainerNotFound`] when the archive has no
/// container descriptor and [`EpubError::ManifestParse`] when the descriptor
/// or package document cannot be parsed.
pub fn open_book_with_options(
    path: impl AsRef<Path>,
    options: ExtractOptions,
) -> Result<ExtractedBook, EpubError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut zip = ZipArchive::with_limits(BufReader::new(file), options.zip)?;

    let (root, temp) = match options.work_dir {
        Some(dir) => {
            std::fs::create_dir_all(&dir)?;
            (dir, None)
        }
        None => {
            let temp = tempfile::Builder::new().prefix("epub-raster-").tempdir()?;
            (temp.path().to_path_buf(), Some(temp))
        }
    };
    let root = std::fs::canonicalize(&root)?;

    let container = zip
        .read_by_name(CONTAINER_PATH)?
        .ok_or(EpubError::ContainerNotFound)?;
    let rootfile = parse_container(&container)?;
    zip.extract_all(&root)?;

    let package_rel = crate::zip::sanitize_entry_path(&rootfile).map_err(|_| {
        EpubError::ManifestParse(format!("rootfile path escapes archive: {}", rootfile))
    })?;
    let package_path = root.join(package_rel);
    let package = std::fs::read(&package_path).map_err(|e| {
        EpubError::ManifestParse(format!(
            "package document {} unreadable: {}",
            rootfile, e
        ))
    })?;
    let spine = parse_spine(&package)?;
    let package_dir = package_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| root.clone());

    let documents = resolve_documents(&spine, &package_dir, &root);
    log::info!(
        "Found {} HTML files in EPUB spine ({})",
        documents.len(),
        path.display()
    );

    Ok(ExtractedBook {
        root,
        package_path,
        spine,
        documents,
        _temp: temp,
    })
}

fn resolve_documents(spine: &Spine, package_dir: &Path, root: &Path) -> Vec<ContentDocument> {
    let mut documents = Vec::with_capacity(spine.items.len());
    for (spine_index, item) in spine.linear_items() {
        let Some(path) = resolve_href(package_dir, &item.href) else {
            log::warn!("spine item {} has unusable href {:?}", item.id, item.href);
            continue;
        };
        if !path.starts_with(root) {
            log::warn!("spine item {} points outside the archive", item.id);
            continue;
        }
        if !path.is_file() {
            log::warn!("spine item {} missing from archive: {}", item.id, item.href);
            continue;
        }
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| package_dir.to_path_buf());
        documents.push(ContentDocument {
            spine_index,
            id: item.id.clone(),
            href: item.href.clone(),
            path,
            base_dir,
        });
    }
    documents
}

/// Resolve a manifest href against the package directory.
///
/// Query and fragment are stripped, percent-escapes decoded, and `.`/`..`
/// segments folded lexically.
pub fn resolve_href(package_dir: &Path, href: &str) -> Option<PathBuf> {
    let href = href.split(['#', '?']).next().unwrap_or_default();
    if href.is_empty() || href.contains("://") {
        return None;
    }
    let decoded = urlencoding::decode(href).ok()?;
    let mut out = package_dir.to_path_buf();
    for component in Path::new(decoded.as_ref()).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_href_decodes_and_folds() {
        let base = Path::new("/book/OEBPS");
        assert_eq!(
            resolve_href(base, "text/ch%201.xhtml#sec").unwrap(),
            PathBuf::from("/book/OEBPS/text/ch 1.xhtml")
        );
        assert_eq!(
            resolve_href(base, "../Text/./a.html").unwrap(),
            PathBuf::from("/book/Text/a.html")
        );
        assert!(resolve_href(base, "http://example.com/a.html").is_none());
        assert!(resolve_href(base, "#only-fragment").is_none());
        assert!(resolve_href(base, "/abs.html").is_none());
    }

    #[test]
    fn document_file_name_falls_back_to_href() {
        let doc = ContentDocument {
            spine_index: 0,
            id: "c1".into(),
            href: "ch1.xhtml".into(),
            path: PathBuf::from("/"),
            base_dir: PathBuf::from("/"),
        };
        assert_eq!(doc.file_name(), "ch1.xhtml");
    }
}
