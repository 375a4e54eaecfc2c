use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::PaginateError;

/// Default page width in pixels.
pub const DEFAULT_WIDTH: u32 = 758;
/// Default maximum page height in pixels.
pub const DEFAULT_BASE_HEIGHT: u32 = 940;
/// Default white threshold.
pub const DEFAULT_THRESHOLD: u8 = 220;
/// Default forced body font size.
pub const DEFAULT_TEXT_SIZE: &str = "16px";
/// Default wait before each exploratory capture.
pub const DEFAULT_PROBE_SETTLE_MS: u64 = 50;
/// Default wait before each page capture.
pub const DEFAULT_CAPTURE_SETTLE_MS: u64 = 100;

/// Pages never shrink below this share of the base height (in percent),
/// except for the final sliver of a document.
pub const MIN_HEIGHT_PERCENT: u32 = 30;

const MAX_DIMENSION: u32 = 16_384;
const MAX_SETTLE_MS: u64 = 10_000;
const MAX_CONFIG_BYTES: u64 = 64 * 1024;

/// Pagination settings for a whole run.
///
/// Settle delays are empirical: they must cover the engine's re-layout
/// latency after a resize. Against a real browser anything under one frame
/// (~16 ms) risks capturing stale pixels; synthetic sessions may use 0.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationOptions {
    /// Page width in pixels, fixed for the run.
    pub width: u32,
    /// Maximum page height in pixels.
    pub base_height: u32,
    /// Brightness threshold: pixels above it are white.
    pub threshold: u8,
    /// CSS size expression forced onto the document body (`16px`, `1.2em`).
    pub text_size: String,
    /// Wait before each exploratory capture, in milliseconds.
    pub probe_settle_ms: u64,
    /// Wait before each page capture, in milliseconds.
    pub capture_settle_ms: u64,
}

impl Default for PaginationOptions {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            base_height: DEFAULT_BASE_HEIGHT,
            threshold: DEFAULT_THRESHOLD,
            text_size: DEFAULT_TEXT_SIZE.to_string(),
            probe_settle_ms: DEFAULT_PROBE_SETTLE_MS,
            capture_settle_ms: DEFAULT_CAPTURE_SETTLE_MS,
        }
    }
}

impl PaginationOptions {
    /// Options for a display of `width` x `base_height` pixels.
    pub fn for_display(width: u32, base_height: u32) -> Self {
        Self {
            width,
            base_height,
            ..Self::default()
        }
    }

    /// Set the white threshold.
    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the forced body font size.
    pub fn with_text_size(mut self, text_size: impl Into<String>) -> Self {
        self.text_size = text_size.into();
        self
    }

    /// Set both settle delays in milliseconds.
    pub fn with_settle_ms(mut self, probe: u64, capture: u64) -> Self {
        self.probe_settle_ms = probe;
        self.capture_settle_ms = capture;
        self
    }

    /// Floor for accepted heights: `floor(base_height * 0.3)`, at least 1.
    pub fn min_page_height(&self) -> u32 {
        let floor = u64::from(self.base_height) * u64::from(MIN_HEIGHT_PERCENT) / 100;
        (floor as u32).max(1)
    }

    /// Wait before each exploratory capture.
    pub fn probe_settle(&self) -> Duration {
        Duration::from_millis(self.probe_settle_ms)
    }

    /// Wait before each page capture.
    pub fn capture_settle(&self) -> Duration {
        Duration::from_millis(self.capture_settle_ms)
    }

    /// Clamp delays into a sane range and trim the text size.
    pub fn normalized(mut self) -> Self {
        self.probe_settle_ms = self.probe_settle_ms.min(MAX_SETTLE_MS);
        self.capture_settle_ms = self.capture_settle_ms.min(MAX_SETTLE_MS);
        self.text_size = self.text_size.trim().to_string();
        self
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), PaginateError> {
        if self.width == 0 || self.width > MAX_DIMENSION {
            return Err(PaginateError::InvalidOptions(format!(
                "width must be in 1..={}, got {}",
                MAX_DIMENSION, self.width
            )));
        }
        if self.base_height == 0 || self.base_height > MAX_DIMENSION {
            return Err(PaginateError::InvalidOptions(format!(
                "height must be in 1..={}, got {}",
                MAX_DIMENSION, self.base_height
            )));
        }
        if self.text_size.is_empty() {
            return Err(PaginateError::InvalidOptions(
                "text size must not be empty".to_string(),
            ));
        }
        if self
            .text_size
            .chars()
            .any(|c| matches!(c, ';' | '{' | '}' | '<' | '>' | '"' | '\'' | '\\' | '`'))
        {
            return Err(PaginateError::InvalidOptions(format!(
                "text size '{}' is not a plain CSS size",
                self.text_size
            )));
        }
        Ok(())
    }

    /// Read options from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, PaginateError> {
        let invalid = |msg: String| {
            PaginateError::InvalidOptions(format!("config {}: {}", path.display(), msg))
        };
        let file = File::open(path).map_err(|e| invalid(e.to_string()))?;
        let mut payload = Vec::with_capacity(1024);
        file.take(MAX_CONFIG_BYTES + 1)
            .read_to_end(&mut payload)
            .map_err(|e| invalid(e.to_string()))?;
        if payload.len() as u64 > MAX_CONFIG_BYTES {
            return Err(invalid(format!("larger than {} bytes", MAX_CONFIG_BYTES)));
        }
        let opts: Self = serde_json::from_slice(&payload).map_err(|e| invalid(e.to_string()))?;
        Ok(opts.normalized())
    }
}
