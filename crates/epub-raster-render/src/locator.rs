//! Clean-break search.
//!
//! A page height is "clean" when the bottom pixel row of the capture at that
//! height holds no ink: any pixel darker than the threshold there means a
//! glyph was cut by the page edge.

use std::time::Duration;

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::options::PaginationOptions;
use crate::session::{RenderError, RenderSession};

/// How an accepted page height was chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// Tallest probed height whose bottom row was clean.
    Clean,
    /// No probed height was clean; the floor height was taken anyway.
    Forced,
    /// Remaining content was shorter than the floor; taken without probing.
    Short,
}

/// A hypothetical page under evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageCandidate {
    /// Scroll offset of the page top.
    pub top: u32,
    /// Viewport height being tested.
    pub height: u32,
}

/// Result of one clean-break search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocatedBreak {
    /// Accepted page height.
    pub height: u32,
    /// How the height was chosen.
    pub kind: BreakKind,
    /// Number of captures spent.
    pub probes: u32,
}

/// Finds the tallest viewport that does not cut a line of text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreakLocator {
    width: u32,
    base_height: u32,
    min_height: u32,
    threshold: u8,
    settle: Duration,
}

impl BreakLocator {
    /// Build a locator from run options.
    pub fn new(opts: &PaginationOptions) -> Self {
        Self {
            width: opts.width,
            base_height: opts.base_height,
            min_height: opts.min_page_height(),
            threshold: opts.threshold,
            settle: opts.probe_settle(),
        }
    }

    /// Floor below which probing stops.
    pub fn min_height(&self) -> u32 {
        self.min_height
    }

    /// Search heights from `min(max_candidate, base_height)` down to the floor.
    ///
    /// Returns the first (tallest) clean height. When none is clean the floor
    /// is returned as a forced accept. When `max_candidate` is already below
    /// the floor it is returned as-is without any capture.
    pub fn locate<S>(
        &self,
        session: &mut S,
        top: u32,
        max_candidate: u32,
    ) -> Result<LocatedBreak, RenderError>
    where
        S: RenderSession + ?Sized,
    {
        let start = max_candidate.min(self.base_height);
        if start < self.min_height {
            log::trace!("top={} remaining={} below floor, no probe", top, start);
            return Ok(LocatedBreak {
                height: start,
                kind: BreakKind::Short,
                probes: 0,
            });
        }

        let mut probes = 0u32;
        for height in (self.min_height..=start).rev() {
            let candidate = PageCandidate { top, height };
            probes += 1;
            if self.probe(session, candidate)? {
                log::debug!(
                    "clean break at top={} height={} after {} probes",
                    top,
                    height,
                    probes
                );
                return Ok(LocatedBreak {
                    height,
                    kind: BreakKind::Clean,
                    probes,
                });
            }
        }

        log::debug!(
            "no clean break at top={} in {}..={}, forcing {}",
            top,
            self.min_height,
            start,
            self.min_height
        );
        Ok(LocatedBreak {
            height: self.min_height,
            kind: BreakKind::Forced,
            probes,
        })
    }

    fn probe<S>(&self, session: &mut S, candidate: PageCandidate) -> Result<bool, RenderError>
    where
        S: RenderSession + ?Sized,
    {
        session.set_viewport(self.width, candidate.height)?;
        session.set_scroll_offset(candidate.top)?;
        session.settle(self.settle)?;
        let capture = session.capture_grayscale()?;
        Ok(bottom_row_is_clean(&capture, self.threshold))
    }
}

/// True when no pixel in the last row is strictly darker than `threshold`.
///
/// An empty image has no row to cut and counts as clean.
pub fn bottom_row_is_clean(image: &GrayImage, threshold: u8) -> bool {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return true;
    }
    let stride = width as usize;
    let row_start = stride * (height as usize - 1);
    image
        .as_raw()
        .get(row_start..row_start + stride)
        .map_or(true, |row| row.iter().all(|&px| px >= threshold))
}
