use std::fmt;
use std::path::Path;
use std::time::Duration;

use epub_raster::ContentDocument;
use image::GrayImage;

/// Command surface over one live rendering engine instance.
///
/// Every call blocks until the engine has finished the command; no two
/// commands are ever in flight. Implementations are reused across documents,
/// so `load` must fully replace the previous document.
pub trait RenderSession {
    /// Navigate to `document` and wait for resource loading to quiesce.
    fn load(&mut self, document: &ContentDocument) -> Result<(), RenderError>;

    /// Resolve the loaded document's relative links against `base_dir`.
    fn set_base_resource_path(&mut self, base_dir: &Path) -> Result<(), RenderError>;

    /// Force `font-size` on the document body to an opaque CSS size expression.
    fn inject_text_size_override(&mut self, size: &str) -> Result<(), RenderError>;

    /// Resize the capture area.
    fn set_viewport(&mut self, width: u32, height: u32) -> Result<(), RenderError>;

    /// Scroll the document's root scroller to `offset` pixels from the top.
    fn set_scroll_offset(&mut self, offset: u32) -> Result<(), RenderError>;

    /// Full scrollable height of the loaded document.
    fn measure_total_height(&mut self) -> Result<u32, RenderError>;

    /// Capture the current viewport as a single-channel luminance bitmap.
    fn capture_grayscale(&mut self) -> Result<GrayImage, RenderError>;

    /// Wait for re-layout after a resize or scroll.
    ///
    /// `delay` is a minimum wait; engines that expose a frame signal may
    /// additionally wait for it.
    fn settle(&mut self, delay: Duration) -> Result<(), RenderError>;
}

impl<S: RenderSession + ?Sized> RenderSession for &mut S {
    fn load(&mut self, document: &ContentDocument) -> Result<(), RenderError> {
        (**self).load(document)
    }

    fn set_base_resource_path(&mut self, base_dir: &Path) -> Result<(), RenderError> {
        (**self).set_base_resource_path(base_dir)
    }

    fn inject_text_size_override(&mut self, size: &str) -> Result<(), RenderError> {
        (**self).inject_text_size_override(size)
    }

    fn set_viewport(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        (**self).set_viewport(width, height)
    }

    fn set_scroll_offset(&mut self, offset: u32) -> Result<(), RenderError> {
        (**self).set_scroll_offset(offset)
    }

    fn measure_total_height(&mut self) -> Result<u32, RenderError> {
        (**self).measure_total_height()
    }

    fn capture_grayscale(&mut self) -> Result<GrayImage, RenderError> {
        (**self).capture_grayscale()
    }

    fn settle(&mut self, delay: Duration) -> Result<(), RenderError> {
        (**self).settle(delay)
    }
}

/// Which rendering command failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderErrorKind {
    /// The engine could not be started or connected to.
    Launch,
    /// Navigation or resource loading failed.
    Load,
    /// A script or style injection failed, or returned an unexpected value.
    Script,
    /// Resizing the viewport failed.
    Viewport,
    /// Taking the screenshot failed.
    Capture,
    /// Screenshot bytes could not be decoded into a bitmap.
    Decode,
    /// The engine went away mid-run.
    Closed,
}

impl fmt::Display for RenderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Launch => "launch",
            Self::Load => "load",
            Self::Script => "script",
            Self::Viewport => "viewport",
            Self::Capture => "capture",
            Self::Decode => "decode",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Failure of a rendering command. Always fatal to the run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderError {
    /// Failing command class.
    pub kind: RenderErrorKind,
    /// Human-readable message from the engine.
    pub message: Box<str>,
    /// Document being processed, when known.
    pub document: Option<Box<str>>,
}

impl RenderError {
    /// Create an error without document context.
    pub fn new(kind: RenderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into().into_boxed_str(),
            document: None,
        }
    }

    /// Attach the document being processed.
    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into().into_boxed_str());
        self
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "render:{}: {}", self.kind, self.message)?;
        if let Some(document) = self.document.as_deref() {
            write!(f, " [document={}]", document)?;
        }
        Ok(())
    }
}

impl std::error::Error for RenderError {}
