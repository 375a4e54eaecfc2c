//! OPF package document parsing: manifest and reading order.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::EpubError;

/// One `<item>` from the OPF manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestItem {
    /// Manifest id referenced by spine itemrefs.
    pub id: String,
    /// Href relative to the package document, as written.
    pub href: String,
    /// Declared media type (may be empty).
    pub media_type: String,
}

/// One `<itemref>` from the OPF spine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpineItem {
    /// Manifest id this itemref points at.
    pub idref: String,
    /// False for `linear="no"` auxiliary content.
    pub linear: bool,
}

/// Parsed OPF package: manifest entries plus spine order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Spine {
    /// Manifest items in document order.
    pub manifest: Vec<ManifestItem>,
    /// Spine itemrefs in reading order.
    pub items: Vec<SpineItem>,
}

impl Spine {
    /// Manifest item with the given id.
    pub fn manifest_item(&self, id: &str) -> Option<&ManifestItem> {
        self.manifest.iter().find(|item| item.id == id)
    }

    /// Linear spine entries resolved against the manifest, in reading order.
    ///
    /// Itemrefs whose idref is absent from the manifest are dropped.
    pub fn linear_items(&self) -> impl Iterator<Item = (usize, &ManifestItem)> + '_ {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.linear)
            .filter_map(move |(idx, item)| self.manifest_item(&item.idref).map(|m| (idx, m)))
    }
}

#[derive(Default)]
struct ParseState {
    saw_package: bool,
    saw_spine: bool,
    in_manifest: bool,
    in_spine: bool,
}

/// Parse an OPF package document.
pub fn parse_spine(content: &[u8]) -> Result<Spine, EpubError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::with_capacity(512);

    let mut spine = Spine::default();
    let mut state = ParseState::default();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => handle_element(&reader, &e, false, &mut state, &mut spine)?,
            Event::Empty(e) => handle_element(&reader, &e, true, &mut state, &mut spine)?,
            Event::End(e) => match e.local_name().as_ref() {
                b"manifest" => state.in_manifest = false,
                b"spine" => state.in_spine = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !state.saw_package {
        return Err(EpubError::ManifestParse(
            "package element not found".to_string(),
        ));
    }
    if !state.saw_spine {
        return Err(EpubError::ManifestParse("spine element not found".to_string()));
    }
    Ok(spine)
}

fn handle_element(
    reader: &Reader<&[u8]>,
    e: &BytesStart<'_>,
    is_empty: bool,
    state: &mut ParseState,
    spine: &mut Spine,
) -> Result<(), EpubError> {
    match e.local_name().as_ref() {
        b"package" => state.saw_package = true,
        b"manifest" => state.in_manifest = !is_empty,
        b"spine" => {
            state.saw_spine = true;
            state.in_spine = !is_empty;
        }
        b"item" if state.in_manifest => {
            let mut id = None;
            let mut href = None;
            let mut media_type = String::new();
            for attr in e.attributes().flatten() {
                let value = decode_attr(reader, attr.value.as_ref())?;
                match attr.key.local_name().as_ref() {
                    b"id" => id = Some(value),
                    b"href" => href = Some(value),
                    b"media-type" => media_type = value,
                    _ => {}
                }
            }
            match (id, href) {
                (Some(id), Some(href)) => spine.manifest.push(ManifestItem {
                    id,
                    href,
                    media_type,
                }),
                _ => log::warn!("manifest item without id or href skipped"),
            }
        }
        b"itemref" if state.in_spine => {
            let mut idref = None;
            let mut linear = true;
            for attr in e.attributes().flatten() {
                let value = decode_attr(reader, attr.value.as_ref())?;
                match attr.key.local_name().as_ref() {
                    b"idref" => idref = Some(value),
                    b"linear" => linear = value.trim() != "no",
                    _ => {}
                }
            }
            if let Some(idref) = idref {
                spine.items.push(SpineItem { idref, linear });
            }
        }
        _ => {}
    }
    Ok(())
}

fn decode_attr(reader: &Reader<&[u8]>, raw: &[u8]) -> Result<String, EpubError> {
    let value = reader
        .decoder()
        .decode(raw)
        .map_err(|e| EpubError::ManifestParse(e.to_string()))?;
    Ok(unescape_attr(value.as_ref()))
}

/// Resolve XML character and predefined entity references in an attribute value.
///
/// Malformed references are left as written.
pub(crate) fn unescape_attr(value: &str) -> String {
    match quick_xml::escape::unescape(value) {
        Ok(Cow::Borrowed(s)) => s.to_string(),
        Ok(Cow::Owned(s)) => s,
        Err(_) => value.to_string(),
    }
}
