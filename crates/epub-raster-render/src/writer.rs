//! Binarization and page persistence.
//!
//! Pages are written as PNG files named by their zero-padded global index
//! (`0000.png`, `0001.png`, ...). Each file is written to a temporary name in
//! the output directory first and renamed into place, so a page file either
//! exists complete or not at all.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, GrayImage, ImageEncoder};
use serde::{Deserialize, Serialize};

use crate::driver::{PageRecord, PageSink};
use crate::error::PaginateError;

/// File name of the optional run manifest.
pub const MANIFEST_FILE_NAME: &str = "pages.json";

const MANIFEST_SCHEMA_VERSION: u8 = 1;

/// Zero-padded page file name for a global index.
pub fn page_file_name(index: usize) -> String {
    format!("{:04}.png", index)
}

/// Threshold a grayscale capture: `px > threshold` becomes white, the rest black.
pub fn binarize(capture: &GrayImage, threshold: u8) -> GrayImage {
    let mut out = capture.clone();
    binarize_in_place(&mut out, threshold);
    out
}

/// In-place variant of [`binarize`].
pub fn binarize_in_place(image: &mut GrayImage, threshold: u8) {
    for px in image.iter_mut() {
        *px = if *px > threshold { 255 } else { 0 };
    }
}

/// Check that `dir` can become the output directory without touching it.
///
/// A missing path passes. An existing one must be an empty directory.
pub fn check_output_dir(dir: &Path) -> Result<(), PaginateError> {
    match fs::metadata(dir) {
        Ok(meta) if !meta.is_dir() => Err(PaginateError::Precondition(format!(
            "output path {} is not a directory",
            dir.display()
        ))),
        Ok(_) => {
            let mut entries =
                fs::read_dir(dir).map_err(|e| PaginateError::write(dir, e))?;
            if entries.next().is_some() {
                return Err(PaginateError::Precondition(format!(
                    "Output directory must be empty: {}",
                    dir.display()
                )));
            }
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(PaginateError::write(dir, err)),
    }
}

/// Ensure `dir` is usable as an output directory, creating it if missing.
pub fn prepare_output_dir(dir: &Path) -> Result<(), PaginateError> {
    check_output_dir(dir)?;
    fs::create_dir_all(dir).map_err(|e| PaginateError::write(dir, e))
}

/// Entry in the run manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestPage {
    /// Written file name.
    pub file: String,
    /// Page metadata.
    #[serde(flatten)]
    pub page: PageRecord,
}

/// Run manifest written to [`MANIFEST_FILE_NAME`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Schema version of this file.
    pub version: u8,
    /// Page width for every page.
    pub width: u32,
    /// Threshold used for binarization.
    pub threshold: u8,
    /// Pages in index order.
    pub pages: Vec<ManifestPage>,
}

impl RunManifest {
    /// Load a manifest written by a previous run.
    pub fn read(path: &Path) -> Result<Self, PaginateError> {
        let payload = fs::read(path).map_err(|e| PaginateError::write(path, e))?;
        serde_json::from_slice(&payload).map_err(|e| {
            PaginateError::write(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }
}

/// Summary returned by [`PngPageWriter::finish`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteSummary {
    /// Files written, in index order.
    pub files: Vec<PathBuf>,
    /// Manifest path, when enabled.
    pub manifest: Option<PathBuf>,
}

/// Binarizes captures and writes them as PNG files.
#[derive(Debug)]
pub struct PngPageWriter {
    dir: PathBuf,
    width: u32,
    threshold: u8,
    manifest: Option<Vec<ManifestPage>>,
    files: Vec<PathBuf>,
}

impl PngPageWriter {
    /// Writer into `dir` (which should have passed [`prepare_output_dir`]).
    pub fn new(dir: impl Into<PathBuf>, width: u32, threshold: u8) -> Self {
        Self {
            dir: dir.into(),
            width,
            threshold,
            manifest: None,
            files: Vec::new(),
        }
    }

    /// Also record every page and write [`MANIFEST_FILE_NAME`] on finish.
    pub fn with_manifest(mut self, enabled: bool) -> Self {
        self.manifest = enabled.then(Vec::new);
        self
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files written so far.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Flush the manifest (if enabled) and return what was written.
    pub fn finish(self) -> Result<WriteSummary, PaginateError> {
        let manifest = match self.manifest {
            Some(pages) => {
                let path = self.dir.join(MANIFEST_FILE_NAME);
                let manifest = RunManifest {
                    version: MANIFEST_SCHEMA_VERSION,
                    width: self.width,
                    threshold: self.threshold,
                    pages,
                };
                write_atomic(&path, |w| {
                    serde_json::to_writer_pretty(&mut *w, &manifest)
                        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
                    w.write_all(b"\n")
                })?;
                Some(path)
            }
            None => None,
        };
        Ok(WriteSummary {
            files: self.files,
            manifest,
        })
    }
}

impl PageSink for PngPageWriter {
    fn write_page(&mut self, page: &PageRecord, mut capture: GrayImage) -> Result<(), PaginateError> {
        binarize_in_place(&mut capture, self.threshold);
        let file = page_file_name(page.index);
        let path = self.dir.join(&file);
        let (width, height) = capture.dimensions();
        if width != self.width || height != page.height {
            log::warn!(
                "{}: capture is {}x{}, expected {}x{}",
                file,
                width,
                height,
                self.width,
                page.height
            );
        }

        write_atomic(&path, |w| {
            PngEncoder::new_with_quality(w, CompressionType::Best, FilterType::Adaptive)
                .write_image(capture.as_raw(), width, height, ExtendedColorType::L8)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        })?;
        log::info!("Saved {} (height: {}px)", file, page.height);

        if let Some(pages) = self.manifest.as_mut() {
            pages.push(ManifestPage {
                file,
                page: page.clone(),
            });
        }
        self.files.push(path);
        Ok(())
    }
}

fn write_atomic<F>(path: &Path, write: F) -> Result<(), PaginateError>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.tmp-{}", file_name, std::process::id()));

    let result = (|| {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        fs::rename(&temp_path, path)
    })();

    result.map_err(|err| {
        let _ = fs::remove_file(&temp_path);
        PaginateError::write(path, err)
    })
}
