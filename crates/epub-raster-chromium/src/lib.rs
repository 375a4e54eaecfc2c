//! Headless Chromium backend for `epub-raster`.
//!
//! [`ChromiumSession`] implements [`epub_raster_render::RenderSession`] on top
//! of one browser tab, so the pagination engine can slice real XHTML layout
//! into pages.

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

mod script;
mod session;

pub use session::{ChromiumOptions, ChromiumSession};
