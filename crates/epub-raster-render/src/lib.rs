//! Adaptive pagination engine for `epub-raster`.
//!
//! Slices each content document into pages as tall as possible (up to the
//! configured height) without cutting a line of text at the bottom edge, and
//! writes every page as a black/white bitmap. The rendering engine is reached
//! only through [`RenderSession`], so any engine (or a synthetic double) can
//! drive the same [`BreakLocator`] and [`Paginator`].

#![cfg_attr(
    not(test),
    deny(
        clippy::disallowed_methods,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::todo,
        clippy::unimplemented
    )
)]

mod driver;
mod error;
mod locator;
mod options;
mod session;
mod writer;

pub use driver::{
    DocumentPhase, DocumentSummary, PageCounter, PageRecord, PageSink, Paginator, RenderState,
    RunSummary,
};
pub use error::PaginateError;
pub use locator::{bottom_row_is_clean, BreakKind, BreakLocator, LocatedBreak, PageCandidate};
pub use options::{
    PaginationOptions, DEFAULT_BASE_HEIGHT, DEFAULT_CAPTURE_SETTLE_MS, DEFAULT_PROBE_SETTLE_MS,
    DEFAULT_TEXT_SIZE, DEFAULT_THRESHOLD, DEFAULT_WIDTH, MIN_HEIGHT_PERCENT,
};
pub use session::{RenderError, RenderErrorKind, RenderSession};
pub use writer::{
    binarize, binarize_in_place, check_output_dir, page_file_name, prepare_output_dir,
    ManifestPage, PngPageWriter, RunManifest, WriteSummary, MANIFEST_FILE_NAME,
};
