//! Builds small EPUB archives on disk for integration tests.

use std::path::{Path, PathBuf};

pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;

pub fn chapter_xhtml(title: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>{0}</title></head>\
         <body><h1>{0}</h1><p>Lorem ipsum dolor sit amet.</p></body></html>",
        title
    )
}

/// Package document with one manifest item per `(id, href, linear)` and the
/// spine in the given order.
pub fn package_opf(items: &[(&str, &str, bool)]) -> String {
    let mut manifest = String::new();
    let mut spine = String::new();
    for (id, href, linear) in items {
        manifest.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
            id, href
        ));
        if *linear {
            spine.push_str(&format!("    <itemref idref=\"{}\"/>\n", id));
        } else {
            spine.push_str(&format!("    <itemref idref=\"{}\" linear=\"no\"/>\n", id));
        }
    }
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\" unique-identifier=\"uid\">\n\
           <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\"><dc:title>Fixture</dc:title></metadata>\n\
           <manifest>\n{}  </manifest>\n\
           <spine>\n{}  </spine>\n\
         </package>\n",
        manifest, spine
    )
}

#[derive(Default)]
pub struct EpubFixture {
    files: Vec<(String, Vec<u8>)>,
    deflate: bool,
}

impl EpubFixture {
    /// Archive with only the `mimetype` entry.
    pub fn new() -> Self {
        Self::default().file("mimetype", "application/epub+zip")
    }

    /// Container, package and one chapter per `(id, href, linear)`.
    pub fn book(items: &[(&str, &str, bool)]) -> Self {
        let mut fixture = Self::new()
            .file("META-INF/container.xml", CONTAINER_XML)
            .file("OEBPS/content.opf", package_opf(items));
        for (id, href, _) in items {
            let name = format!("OEBPS/{}", urlencoding::decode(href).unwrap());
            fixture = fixture.file(&name, chapter_xhtml(id));
        }
        fixture
    }

    pub fn file(mut self, name: &str, data: impl AsRef<[u8]>) -> Self {
        self.files.push((name.to_string(), data.as_ref().to_vec()));
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.files.retain(|(n, _)| n != name);
        self
    }

    pub fn deflated(mut self) -> Self {
        self.deflate = true;
        self
    }

    pub fn write_to(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.to_zip()).unwrap();
        path
    }

    pub fn to_zip(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut central = Vec::new();
        for (name, data) in &self.files {
            let offset = out.len() as u32;
            let crc = crc32fast::hash(data);
            let stored = !self.deflate || name == "mimetype";
            let (method, payload): (u16, Vec<u8>) = if stored {
                (0, data.clone())
            } else {
                (8, miniz_oxide::deflate::compress_to_vec(data, 6))
            };

            out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
            out.extend_from_slice(&20u16.to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(&method.to_le_bytes());
            out.extend_from_slice(&[0u8; 4]);
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            out.extend_from_slice(&(name.len() as u16).to_le_bytes());
            out.extend_from_slice(&0u16.to_le_bytes());
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(&payload);

            central.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&20u16.to_le_bytes());
            central.extend_from_slice(&0u16.to_le_bytes());
            central.extend_from_slice(&method.to_le_bytes());
            central.extend_from_slice(&[0u8; 4]);
            central.extend_from_slice(&crc.to_le_bytes());
            central.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            central.extend_from_slice(&(data.len() as u32).to_le_bytes());
            central.extend_from_slice(&(name.len() as u16).to_le_bytes());
            central.extend_from_slice(&[0u8; 12]);
            central.extend_from_slice(&offset.to_le_bytes());
            central.extend_from_slice(name.as_bytes());
        }
        let cd_offset = out.len() as u32;
        out.extend_from_slice(&central);
        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        out.extend_from_slice(&[0u8; 4]);
        out.extend_from_slice(&(self.files.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.files.len() as u16).to_le_bytes());
        out.extend_from_slice(&(central.len() as u32).to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }
}
