//! Page-side JavaScript used by the Chromium session.
//!
//! Every snippet is a self-invoking expression so it can be sent as a plain
//! `Runtime.evaluate` expression. Values from Rust are embedded as JSON
//! string literals, never spliced raw.

use std::path::{Component, Path};

/// Id of the `<style>` element carrying the text-size override.
pub(crate) const TEXT_SIZE_STYLE_ID: &str = "epub-raster-text-size";

/// Upper bound on waiting for animation frames in a background tab.
const FRAME_FALLBACK_MS: u32 = 100;

/// Element whose `scrollTop`/`scrollHeight` represent the document.
const SCROLLER: &str = "(document.scrollingElement || document.documentElement || document.body)";

/// `file://` URL for an absolute path, each segment percent-encoded.
pub(crate) fn file_url(path: &Path, directory: bool) -> String {
    let mut url = String::from("file://");
    for component in path.components() {
        if let Component::Normal(segment) = component {
            url.push('/');
            url.push_str(&urlencoding::encode(&segment.to_string_lossy()));
        }
    }
    if directory || url.len() == "file://".len() {
        url.push('/');
    }
    url
}

fn js_string(value: &str) -> String {
    // Serializing a str cannot fail.
    serde_json::to_string(value).unwrap_or_else(|_| String::from("\"\""))
}

/// Point relative resources at `base_url` via a leading `<base>` element.
pub(crate) fn set_base_href(base_url: &str) -> String {
    format!(
        "(() => {{\
           const head = document.head || document.documentElement;\
           let base = head.querySelector('base');\
           if (!base) {{ base = document.createElement('base'); head.prepend(base); }}\
           base.href = {};\
           return true;\
         }})()",
        js_string(base_url)
    )
}

/// Force the body font size and hide scrollbars so the right edge stays paper.
pub(crate) fn text_size_override(size: &str) -> String {
    let css = format!(
        "body {{ font-size: {} !important; }} \
         html {{ scrollbar-width: none; }} \
         ::-webkit-scrollbar {{ display: none; }}",
        size
    );
    format!(
        "(() => {{\
           const root = document.head || document.documentElement;\
           let style = document.getElementById({id});\
           if (!style) {{ style = document.createElement('style'); style.id = {id}; root.appendChild(style); }}\
           style.textContent = {css};\
           return true;\
         }})()",
        id = js_string(TEXT_SIZE_STYLE_ID),
        css = js_string(&css)
    )
}

/// Resolves once web fonts are ready.
pub(crate) fn fonts_ready() -> String {
    "(document.fonts ? document.fonts.ready.then(() => true) : true)".to_string()
}

pub(crate) fn total_height() -> String {
    format!("{}.scrollHeight", SCROLLER)
}

pub(crate) fn set_scroll_top(offset: u32) -> String {
    format!(
        "(() => {{ const el = {}; el.scrollTop = {}; return el.scrollTop; }})()",
        SCROLLER, offset
    )
}

/// Resolves after two animation frames, i.e. once a frame has been painted.
pub(crate) fn next_frame() -> String {
    format!(
        "new Promise(resolve => {{\
           const timer = setTimeout(() => resolve(false), {});\
           requestAnimationFrame(() => requestAnimationFrame(() => {{ clearTimeout(timer); resolve(true); }}));\
         }})",
        FRAME_FALLBACK_MS
    )
}
