//! epub-raster -- EPUB spine extraction for browser-driven rasterization
//!
//! Unpacks an EPUB container, reads `META-INF/container.xml` and the OPF
//! package document, and yields the linear reading order as a list of
//! content documents on disk. The pagination engine in `epub-raster-render`
//! consumes that list.
//!
//! ```rust,no_run
//! # fn example() -> Result<(), epub_raster::EpubError> {
//! let book = epub_raster::open_book("book.epub")?;
//! for doc in book.content_documents() {
//!     println!("{} -> {}", doc.href, doc.path.display());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![cfg_attr(
    not(test),
    deny(
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::todo,
        clippy::unimplemented
    )
)]

pub mod book;
pub mod container;
pub mod error;
pub mod spine;
pub mod zip;

pub use book::{open_book, open_book_with_options, ContentDocument, ExtractOptions, ExtractedBook};
pub use error::{EpubError, ZipError, ZipErrorKind};
pub use spine::Spine;
pub use zip::ZipLimits;
