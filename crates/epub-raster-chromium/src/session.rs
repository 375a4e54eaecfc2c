use std::path::{Path, PathBuf};
use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use epub_raster::ContentDocument;
use epub_raster_render::{RenderError, RenderErrorKind, RenderSession};
use futures::StreamExt;
use image::{GrayImage, ImageFormat, Luma, RgbImage};
use serde_json::Value;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::script;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Browser launch settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChromiumOptions {
    /// Browser executable. Auto-detected when `None`.
    pub executable: Option<PathBuf>,
    /// Keep Chromium's sandbox enabled. Containers running as root need it off.
    pub sandbox: bool,
    /// Initial window and page viewport size, at a device scale of 1.
    pub window: (u32, u32),
    /// Upper bound on a single DevTools request.
    pub request_timeout: Duration,
}

impl Default for ChromiumOptions {
    fn default() -> Self {
        Self {
            executable: None,
            sandbox: true,
            window: (
                epub_raster_render::DEFAULT_WIDTH,
                epub_raster_render::DEFAULT_BASE_HEIGHT,
            ),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ChromiumOptions {
    /// Use a specific browser binary.
    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    /// Enable or disable the browser sandbox.
    pub fn with_sandbox(mut self, enabled: bool) -> Self {
        self.sandbox = enabled;
        self
    }

    /// Set the initial window size.
    pub fn with_window(mut self, width: u32, height: u32) -> Self {
        self.window = (width, height);
        self
    }
}

/// One headless Chromium tab driven over the DevTools protocol.
///
/// Owns a private tokio runtime and blocks on every command, so callers see
/// a synchronous [`RenderSession`].
pub struct ChromiumSession {
    runtime: Runtime,
    browser: Option<Browser>,
    page: Page,
    handler: JoinHandle<()>,
}

impl ChromiumSession {
    /// Launch a browser and open a blank tab.
    pub fn launch(opts: &ChromiumOptions) -> Result<Self, RenderError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| RenderError::new(RenderErrorKind::Launch, e.to_string()))?;

        let mut builder = BrowserConfig::builder()
            .window_size(opts.window.0, opts.window.1)
            .viewport(Viewport {
                width: opts.window.0,
                height: opts.window.1,
                device_scale_factor: Some(1.0),
                ..Viewport::default()
            })
            .request_timeout(opts.request_timeout);
        if let Some(path) = opts.executable.as_ref() {
            builder = builder.chrome_executable(path);
        }
        if !opts.sandbox {
            builder = builder.no_sandbox();
        }
        let config = builder
            .build()
            .map_err(|msg| RenderError::new(RenderErrorKind::Launch, msg))?;

        let (browser, handler, page) = runtime.block_on(async {
            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(cdp(RenderErrorKind::Launch))?;
            let handler = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(err) = event {
                        log::debug!("devtools handler: {}", err);
                    }
                }
                log::debug!("devtools connection closed");
            });
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(cdp(RenderErrorKind::Launch))?;
            Ok::<_, RenderError>((browser, handler, page))
        })?;
        log::info!("Launched headless Chromium");

        Ok(Self {
            runtime,
            browser: Some(browser),
            page,
            handler,
        })
    }

    /// Close the browser and wait for the process to exit.
    pub fn close(mut self) -> Result<(), RenderError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), RenderError> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };
        let result = self.runtime.block_on(async {
            browser.close().await.map_err(cdp(RenderErrorKind::Closed))?;
            browser
                .wait()
                .await
                .map_err(|e| RenderError::new(RenderErrorKind::Closed, e.to_string()))?;
            Ok(())
        });
        self.handler.abort();
        result
    }

    fn ensure_open(&self) -> Result<(), RenderError> {
        if self.browser.is_none() {
            return Err(RenderError::new(
                RenderErrorKind::Closed,
                "browser already closed",
            ));
        }
        Ok(())
    }

    fn evaluate(&self, expression: String, kind: RenderErrorKind) -> Result<Value, RenderError> {
        self.ensure_open()?;
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|msg| RenderError::new(kind, msg))?;
        let page = &self.page;
        self.runtime.block_on(async {
            let result = page.evaluate_expression(params).await.map_err(cdp(kind))?;
            Ok(result.value().cloned().unwrap_or(Value::Null))
        })
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            log::warn!("failed to close browser: {}", err);
        }
    }
}

impl RenderSession for ChromiumSession {
    fn load(&mut self, document: &ContentDocument) -> Result<(), RenderError> {
        self.ensure_open()?;
        let url = script::file_url(&document.path, false);
        log::debug!("loading {}", url);
        let page = &self.page;
        self.runtime.block_on(async {
            page.goto(url.as_str())
                .await
                .map_err(cdp(RenderErrorKind::Load))?;
            page.wait_for_navigation()
                .await
                .map_err(cdp(RenderErrorKind::Load))?;
            Ok::<_, RenderError>(())
        })?;
        self.evaluate(script::fonts_ready(), RenderErrorKind::Load)?;
        Ok(())
    }

    fn set_base_resource_path(&mut self, base_dir: &Path) -> Result<(), RenderError> {
        let url = script::file_url(base_dir, true);
        self.evaluate(script::set_base_href(&url), RenderErrorKind::Script)?;
        Ok(())
    }

    fn inject_text_size_override(&mut self, size: &str) -> Result<(), RenderError> {
        self.evaluate(script::text_size_override(size), RenderErrorKind::Script)?;
        Ok(())
    }

    fn set_viewport(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        self.ensure_open()?;
        let params = SetDeviceMetricsOverrideParams::new(
            i64::from(width),
            i64::from(height),
            1.0,
            false,
        );
        let page = &self.page;
        self.runtime.block_on(async {
            page.execute(params)
                .await
                .map_err(cdp(RenderErrorKind::Viewport))?;
            Ok(())
        })
    }

    fn set_scroll_offset(&mut self, offset: u32) -> Result<(), RenderError> {
        self.evaluate(script::set_scroll_top(offset), RenderErrorKind::Script)?;
        Ok(())
    }

    fn measure_total_height(&mut self) -> Result<u32, RenderError> {
        let value = self.evaluate(script::total_height(), RenderErrorKind::Script)?;
        let height = value.as_f64().ok_or_else(|| {
            RenderError::new(
                RenderErrorKind::Script,
                format!("scrollHeight is not a number: {}", value),
            )
        })?;
        Ok(height.max(0.0).round().min(f64::from(u32::MAX)) as u32)
    }

    fn capture_grayscale(&mut self) -> Result<GrayImage, RenderError> {
        self.ensure_open()?;
        let page = &self.page;
        let png = self.runtime.block_on(async {
            page.screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(cdp(RenderErrorKind::Capture))
        })?;
        let image = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .map_err(|e| RenderError::new(RenderErrorKind::Decode, e.to_string()))?;
        Ok(rec601_luma(&image.to_rgb8()))
    }

    fn settle(&mut self, delay: Duration) -> Result<(), RenderError> {
        if !delay.is_zero() {
            self.runtime.block_on(tokio::time::sleep(delay));
        }
        let painted = self.evaluate(script::next_frame(), RenderErrorKind::Script)?;
        if painted != Value::Bool(true) {
            log::trace!("frame wait fell back to timer");
        }
        Ok(())
    }
}

fn cdp(kind: RenderErrorKind) -> impl Fn(CdpError) -> RenderError {
    move |err| RenderError::new(kind, err.to_string())
}

/// Luminance with ITU-R BT.601 weights, truncated. The white threshold is
/// calibrated against these rather than the BT.709 weights `image` uses.
pub(crate) fn rec601_luma(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = (u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114) / 1000;
        Luma([luma.min(255) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn luma_of(pixel: [u8; 3]) -> u8 {
        rec601_luma(&RgbImage::from_pixel(1, 1, Rgb(pixel))).get_pixel(0, 0).0[0]
    }

    #[test]
    fn luma_uses_bt601_weights() {
        assert_eq!(luma_of([255, 255, 255]), 255);
        assert_eq!(luma_of([0, 0, 0]), 0);
        assert_eq!(luma_of([255, 0, 0]), 76);
        assert_eq!(luma_of([0, 255, 0]), 149);
        assert_eq!(luma_of([0, 0, 255]), 29);
    }

    #[test]
    fn light_magenta_stays_paper_at_the_default_threshold() {
        // BT.709 weights land near 215, which reads as ink at 220.
        let luma = luma_of([255, 200, 255]);
        assert_eq!(luma, 222);
        assert!(luma >= epub_raster_render::DEFAULT_THRESHOLD);
    }

    #[test]
    fn dimensions_are_preserved() {
        let gray = rec601_luma(&RgbImage::new(7, 3));
        assert_eq!(gray.dimensions(), (7, 3));
    }
}
