//! Scripted rendering session: documents are columns of white rows with
//! horizontal bands of "ink" standing in for text lines.

use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;

use epub_raster::ContentDocument;
use epub_raster_render::{
    PageRecord, PageSink, PaginateError, RenderError, RenderErrorKind, RenderSession,
};
use image::{GrayImage, Luma};

pub const INK: u8 = 20;
pub const PAPER: u8 = 250;

#[derive(Clone, Debug, Default)]
pub struct SyntheticDoc {
    pub total_height: u32,
    pub ink: Vec<Range<u32>>,
}

impl SyntheticDoc {
    pub fn blank(total_height: u32) -> Self {
        Self {
            total_height,
            ink: Vec::new(),
        }
    }

    pub fn with_ink(mut self, band: Range<u32>) -> Self {
        self.ink.push(band);
        self
    }

    /// Evenly spaced text lines: `line` rows of ink every `pitch` rows.
    pub fn lines(total_height: u32, pitch: u32, line: u32) -> Self {
        let mut doc = Self::blank(total_height);
        let mut y = 0;
        while y < total_height {
            doc.ink.push(y..(y + line).min(total_height));
            y += pitch;
        }
        doc
    }

    fn is_ink(&self, y: u32) -> bool {
        self.ink.iter().any(|band| band.contains(&y))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Load(PathBuf),
    Base(PathBuf),
    TextSize(String),
    Viewport(u32, u32),
    Scroll(u32),
    Measure,
    Capture { top: u32, height: u32 },
    Settle(Duration),
}

#[derive(Default)]
pub struct SyntheticSession {
    docs: HashMap<PathBuf, SyntheticDoc>,
    current: Option<SyntheticDoc>,
    width: u32,
    height: u32,
    scroll: u32,
    pub log: Vec<Op>,
    pub captures: usize,
    pub fail_capture_at: Option<usize>,
    pub record_ops: bool,
}

impl SyntheticSession {
    pub fn new() -> Self {
        Self {
            record_ops: true,
            ..Self::default()
        }
    }

    pub fn add(&mut self, path: impl Into<PathBuf>, doc: SyntheticDoc) -> &mut Self {
        self.docs.insert(path.into(), doc);
        self
    }

    fn push(&mut self, op: Op) {
        if self.record_ops {
            self.log.push(op);
        }
    }

    fn doc(&self) -> Result<&SyntheticDoc, RenderError> {
        self.current
            .as_ref()
            .ok_or_else(|| RenderError::new(RenderErrorKind::Script, "no document loaded"))
    }

    /// Scroll position the engine actually uses: clamped like a browser.
    fn effective_scroll(&self) -> u32 {
        let total = self.current.as_ref().map_or(0, |d| d.total_height);
        self.scroll.min(total.saturating_sub(self.height))
    }

    pub fn captures_in_log(&self) -> Vec<(u32, u32)> {
        self.log
            .iter()
            .filter_map(|op| match op {
                Op::Capture { top, height } => Some((*top, *height)),
                _ => None,
            })
            .collect()
    }
}

impl RenderSession for SyntheticSession {
    fn load(&mut self, document: &ContentDocument) -> Result<(), RenderError> {
        self.push(Op::Load(document.path.clone()));
        let doc = self.docs.get(&document.path).cloned().ok_or_else(|| {
            RenderError::new(
                RenderErrorKind::Load,
                format!("net::ERR_FILE_NOT_FOUND {}", document.path.display()),
            )
        })?;
        self.current = Some(doc);
        self.scroll = 0;
        Ok(())
    }

    fn set_base_resource_path(&mut self, base_dir: &Path) -> Result<(), RenderError> {
        self.push(Op::Base(base_dir.to_path_buf()));
        Ok(())
    }

    fn inject_text_size_override(&mut self, size: &str) -> Result<(), RenderError> {
        self.push(Op::TextSize(size.to_string()));
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.push(Op::Viewport(width, height));
        self.width = width;
        self.height = height;
        Ok(())
    }

    fn set_scroll_offset(&mut self, offset: u32) -> Result<(), RenderError> {
        self.push(Op::Scroll(offset));
        self.scroll = offset;
        Ok(())
    }

    fn measure_total_height(&mut self) -> Result<u32, RenderError> {
        self.push(Op::Measure);
        Ok(self.doc()?.total_height)
    }

    fn capture_grayscale(&mut self) -> Result<GrayImage, RenderError> {
        if self.fail_capture_at == Some(self.captures) {
            return Err(RenderError::new(RenderErrorKind::Closed, "target crashed"));
        }
        self.captures += 1;
        let top = self.effective_scroll();
        let (width, height) = (self.width, self.height);
        self.push(Op::Capture { top, height });
        let doc = self.doc()?;
        Ok(GrayImage::from_fn(width, height, |_, y| {
            if doc.is_ink(top + y) {
                Luma([INK])
            } else {
                Luma([PAPER])
            }
        }))
    }

    fn settle(&mut self, delay: Duration) -> Result<(), RenderError> {
        self.push(Op::Settle(delay));
        Ok(())
    }
}

pub fn document(spine_index: usize, name: &str) -> ContentDocument {
    let path = PathBuf::from("/book/OEBPS").join(name);
    ContentDocument {
        spine_index,
        id: format!("item{}", spine_index),
        href: name.to_string(),
        base_dir: PathBuf::from("/book/OEBPS"),
        path,
    }
}

/// Sink that keeps every page in memory.
#[derive(Default)]
pub struct RecordingSink {
    pub pages: Vec<(PageRecord, GrayImage)>,
}

impl PageSink for RecordingSink {
    fn write_page(&mut self, page: &PageRecord, capture: GrayImage) -> Result<(), PaginateError> {
        self.pages.push((page.clone(), capture));
        Ok(())
    }
}

/// Sink that only counts, dropping captures immediately.
#[derive(Default)]
pub struct CountingSink {
    pub count: usize,
    pub heights: Vec<u32>,
}

impl PageSink for CountingSink {
    fn write_page(&mut self, page: &PageRecord, capture: GrayImage) -> Result<(), PaginateError> {
        drop(capture);
        self.count += 1;
        self.heights.push(page.height);
        Ok(())
    }
}
