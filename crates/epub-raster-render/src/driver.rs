//! Pagination driver: walks each content document top to bottom and emits
//! one page per accepted break.

use std::time::Instant;

use epub_raster::ContentDocument;
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::PaginateError;
use crate::locator::{BreakKind, BreakLocator};
use crate::options::PaginationOptions;
use crate::session::{RenderError, RenderSession};

/// Receives each accepted page capture, in order.
pub trait PageSink {
    /// Persist one page. `capture` is the authoritative grayscale capture.
    fn write_page(&mut self, page: &PageRecord, capture: GrayImage) -> Result<(), PaginateError>;
}

impl<K: PageSink + ?Sized> PageSink for &mut K {
    fn write_page(&mut self, page: &PageRecord, capture: GrayImage) -> Result<(), PaginateError> {
        (**self).write_page(page, capture)
    }
}

/// Metadata of one emitted page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Global page index, contiguous from 0 across the whole run.
    pub index: usize,
    /// Spine position of the source document.
    pub spine_index: usize,
    /// Manifest href of the source document.
    pub href: String,
    /// Scroll offset of the page top within its document.
    pub top: u32,
    /// Accepted page height.
    pub height: u32,
    /// How the height was chosen.
    pub kind: BreakKind,
}

/// Run-wide page counter. Starts at 0, advances once per emitted page.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PageCounter(usize);

impl PageCounter {
    /// Counter positioned before the first page.
    pub fn new() -> Self {
        Self(0)
    }

    /// Index the next emitted page will receive.
    pub fn next_index(&self) -> usize {
        self.0
    }

    fn advance(&mut self) {
        self.0 += 1;
    }
}

/// Lifecycle of one document inside the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentPhase {
    /// Nothing loaded yet.
    Idle,
    /// Document loaded, base path and text size applied.
    Loaded,
    /// Total height being measured.
    Measuring,
    /// Emitting pages.
    Paging,
    /// All content covered.
    Done,
}

/// Per-document mutable state, owned by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderState {
    /// Current lifecycle phase.
    pub phase: DocumentPhase,
    /// Scroll offset of the next page top.
    pub current_top: u32,
    /// Total content height, fixed once measured.
    pub total_height: u32,
    /// Height of the viewport as last set, for measuring or a page capture.
    pub viewport_height: u32,
}

impl RenderState {
    fn new() -> Self {
        Self {
            phase: DocumentPhase::Idle,
            current_top: 0,
            total_height: 0,
            viewport_height: 0,
        }
    }

    fn transition(&mut self, next: DocumentPhase) {
        log::trace!("document phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    fn remaining(&self) -> u32 {
        self.total_height.saturating_sub(self.current_top)
    }
}

/// Outcome of one document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentSummary {
    /// Spine position of the document.
    pub spine_index: usize,
    /// Measured content height.
    pub total_height: u32,
    /// Accepted page heights, top to bottom.
    pub page_heights: Vec<u32>,
    /// Pages taken at the floor without a clean bottom row.
    pub forced_pages: usize,
    /// Captures spent searching for breaks.
    pub probes: u64,
}

/// Outcome of a whole run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// One entry per document, in reading order.
    pub documents: Vec<DocumentSummary>,
    /// Total pages emitted.
    pub page_count: usize,
}

/// Drives a [`RenderSession`] through every document and feeds a [`PageSink`].
#[derive(Clone, Debug)]
pub struct Paginator {
    opts: PaginationOptions,
    locator: BreakLocator,
}

impl Paginator {
    /// Validate options and build a driver.
    pub fn new(opts: PaginationOptions) -> Result<Self, PaginateError> {
        let opts = opts.normalized();
        opts.validate()?;
        Ok(Self {
            locator: BreakLocator::new(&opts),
            opts,
        })
    }

    /// Options in effect.
    pub fn options(&self) -> &PaginationOptions {
        &self.opts
    }

    /// Break locator used for every page.
    pub fn locator(&self) -> &BreakLocator {
        &self.locator
    }

    /// Paginate documents in order with one continuous page sequence.
    ///
    /// The first failure aborts the run; pages already written stay written.
    pub fn paginate_all<S, K>(
        &self,
        session: &mut S,
        sink: &mut K,
        documents: &[ContentDocument],
    ) -> Result<RunSummary, PaginateError>
    where
        S: RenderSession + ?Sized,
        K: PageSink + ?Sized,
    {
        let mut counter = PageCounter::new();
        let mut summary = RunSummary::default();
        for document in documents {
            let doc_summary = self.paginate_document(session, sink, document, &mut counter)?;
            summary.documents.push(doc_summary);
        }
        summary.page_count = counter.next_index();
        Ok(summary)
    }

    /// Paginate one document, continuing the global sequence in `counter`.
    pub fn paginate_document<S, K>(
        &self,
        session: &mut S,
        sink: &mut K,
        document: &ContentDocument,
        counter: &mut PageCounter,
    ) -> Result<DocumentSummary, PaginateError>
    where
        S: RenderSession + ?Sized,
        K: PageSink + ?Sized,
    {
        let started = Instant::now();
        let tag = |err: RenderError| PaginateError::Render(err.with_document(document.href.as_str()));
        log::info!("Processing {}", document.file_name());

        let mut state = RenderState::new();
        session.load(document).map_err(tag)?;
        session
            .set_base_resource_path(&document.base_dir)
            .map_err(tag)?;
        session
            .inject_text_size_override(&self.opts.text_size)
            .map_err(tag)?;
        state.transition(DocumentPhase::Loaded);

        // Reflow at the page width before reading scrollHeight.
        session
            .set_viewport(self.opts.width, self.opts.base_height)
            .map_err(tag)?;
        state.viewport_height = self.opts.base_height;
        state.transition(DocumentPhase::Measuring);
        state.total_height = session.measure_total_height().map_err(tag)?;
        log::debug!(
            "{}: total height {}px",
            document.href,
            state.total_height
        );

        let mut summary = DocumentSummary {
            spine_index: document.spine_index,
            total_height: state.total_height,
            page_heights: Vec::new(),
            forced_pages: 0,
            probes: 0,
        };

        state.transition(DocumentPhase::Paging);
        while state.current_top < state.total_height {
            let located = self
                .locator
                .locate(session, state.current_top, state.remaining())
                .map_err(tag)?;
            let height = located.height;

            session.set_viewport(self.opts.width, height).map_err(tag)?;
            session.set_scroll_offset(state.current_top).map_err(tag)?;
            session.settle(self.opts.capture_settle()).map_err(tag)?;
            let capture = session.capture_grayscale().map_err(tag)?;
            state.viewport_height = height;

            let record = PageRecord {
                index: counter.next_index(),
                spine_index: document.spine_index,
                href: document.href.clone(),
                top: state.current_top,
                height,
                kind: located.kind,
            };
            sink.write_page(&record, capture)?;
            counter.advance();

            summary.page_heights.push(height);
            summary.probes += u64::from(located.probes);
            if located.kind == BreakKind::Forced {
                summary.forced_pages += 1;
            }
            state.current_top = state.current_top.saturating_add(height);
        }
        state.transition(DocumentPhase::Done);

        log::debug!(
            "{}: {} pages, {} probes, {} forced in {}ms",
            document.href,
            summary.page_heights.len(),
            summary.probes,
            summary.forced_pages,
            started.elapsed().as_millis()
        );
        Ok(summary)
    }
}
