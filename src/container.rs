//! `META-INF/container.xml` parsing.

use quick_xml::events::Event;
use quick_xml::reader::Reader;

use crate::error::EpubError;

/// Archive path of the OCF container descriptor.
pub const CONTAINER_PATH: &str = "META-INF/container.xml";

/// Return the `full-path` of the first `<rootfile>` in a container descriptor.
///
/// Namespace prefixes are ignored; only local names are matched.
pub fn parse_container(content: &[u8]) -> Result<String, EpubError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::with_capacity(256);

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                for attr in e.attributes().flatten() {
                    if attr.key.local_name().as_ref() == b"full-path" {
                        let value = reader
                            .decoder()
                            .decode(attr.value.as_ref())
                            .map_err(|e| EpubError::ManifestParse(e.to_string()))?;
                        let path = crate::spine::unescape_attr(value.as_ref());
                        if path.is_empty() {
                            return Err(EpubError::ManifestParse(
                                "rootfile has empty full-path".to_string(),
                            ));
                        }
                        return Ok(path);
                    }
                }
                return Err(EpubError::ManifestParse(
                    "rootfile missing full-path attribute".to_string(),
                ));
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Err(EpubError::ManifestParse(
        "No rootfile in container.xml".to_string(),
    ))
}
