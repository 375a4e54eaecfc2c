//! Minimal ZIP reader for EPUB containers.
//!
//! Reads the central directory once, then inflates entries on demand.
//! Supports stored (0) and deflate (8) entries; ZIP64 and encryption are
//! rejected. Every entry is CRC-checked after decompression.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};

use crate::error::{EpubError, ZipError, ZipErrorKind};

const SIG_LOCAL_HEADER: u32 = 0x0403_4b50;
const SIG_CENTRAL_HEADER: u32 = 0x0201_4b50;
const SIG_END_OF_CENTRAL_DIR: u32 = 0x0605_4b50;

const LOCAL_HEADER_LEN: usize = 30;
const CENTRAL_HEADER_LEN: usize = 46;
const END_OF_CENTRAL_DIR_LEN: usize = 22;
const MAX_COMMENT_LEN: usize = u16::MAX as usize;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;
const FLAG_ENCRYPTED: u16 = 0x0001;

/// Limits applied while reading an archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZipLimits {
    /// Maximum number of central-directory entries.
    pub max_entries: usize,
    /// Maximum decompressed size of any single entry.
    pub max_entry_bytes: usize,
    /// Maximum decompressed size across all extracted entries.
    pub max_total_bytes: usize,
}

impl Default for ZipLimits {
    fn default() -> Self {
        Self {
            max_entries: 16 * 1024,
            max_entry_bytes: 64 * 1024 * 1024,
            max_total_bytes: 1024 * 1024 * 1024,
        }
    }
}

/// One central-directory record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZipEntry {
    /// Entry name as stored (forward-slash separated).
    pub name: String,
    /// Compression method.
    pub method: u16,
    /// General purpose flags.
    pub flags: u16,
    /// CRC-32 of the decompressed data.
    pub crc32: u32,
    /// Stored (compressed) size in bytes.
    pub compressed_size: u32,
    /// Decompressed size in bytes.
    pub uncompressed_size: u32,
    /// Offset of the local header from the start of the archive.
    pub local_header_offset: u32,
}

impl ZipEntry {
    /// Directory entries end with `/` and carry no data.
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Random-access ZIP archive over any seekable reader.
pub struct ZipArchive<R> {
    reader: R,
    entries: Vec<ZipEntry>,
    limits: ZipLimits,
    archive_len: u64,
}

impl<R: Read + Seek> ZipArchive<R> {
    /// Open an archive with default limits.
    pub fn new(reader: R) -> Result<Self, ZipError> {
        Self::with_limits(reader, ZipLimits::default())
    }

    /// Open an archive and read its central directory.
    pub fn with_limits(mut reader: R, limits: ZipLimits) -> Result<Self, ZipError> {
        let entries = read_central_directory(&mut reader, limits)?;
        let archive_len = reader
            .seek(SeekFrom::End(0))
            .map_err(|e| ZipError::new(ZipErrorKind::BadHeader).with_detail(e.to_string()))?;
        Ok(Self {
            reader,
            entries,
            limits,
            archive_len,
        })
    }

    /// Central-directory entries in archive order.
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Look up an entry by exact name.
    pub fn find(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Read and decompress one entry.
    pub fn read_entry(&mut self, entry: &ZipEntry) -> Result<Vec<u8>, ZipError> {
        let fail = |kind: ZipErrorKind| ZipError::new(kind).with_entry(entry.name.as_str());

        if entry.flags & FLAG_ENCRYPTED != 0 {
            return Err(fail(ZipErrorKind::Encrypted));
        }
        let uncompressed = entry.uncompressed_size as usize;
        if uncompressed > self.limits.max_entry_bytes {
            return Err(fail(ZipErrorKind::LimitExceeded).with_detail(format!(
                "entry size {} > max_entry_bytes {}",
                uncompressed, self.limits.max_entry_bytes
            )));
        }

        self.reader
            .seek(SeekFrom::Start(u64::from(entry.local_header_offset)))
            .map_err(|e| fail(ZipErrorKind::BadHeader).with_detail(e.to_string()))?;
        let mut header = [0u8; LOCAL_HEADER_LEN];
        self.reader
            .read_exact(&mut header)
            .map_err(|e| fail(ZipErrorKind::BadHeader).with_detail(e.to_string()))?;
        if le_u32(&header, 0) != SIG_LOCAL_HEADER {
            return Err(fail(ZipErrorKind::BadHeader).with_detail("local header signature"));
        }
        let name_len = u64::from(le_u16(&header, 26));
        let extra_len = u64::from(le_u16(&header, 28));
        self.reader
            .seek(SeekFrom::Current((name_len + extra_len) as i64))
            .map_err(|e| fail(ZipErrorKind::BadHeader).with_detail(e.to_string()))?;

        // Sizes come from the archive itself; bound them before allocating.
        let data_start = self
            .reader
            .stream_position()
            .map_err(|e| fail(ZipErrorKind::BadHeader).with_detail(e.to_string()))?;
        let compressed = u64::from(entry.compressed_size);
        let available = self.archive_len.saturating_sub(data_start);
        if compressed > available {
            return Err(fail(ZipErrorKind::BadHeader).with_detail(format!(
                "compressed size {} exceeds the {} bytes left in the archive",
                compressed, available
            )));
        }
        if entry.method == METHOD_STORED && entry.compressed_size != entry.uncompressed_size {
            return Err(fail(ZipErrorKind::SizeMismatch).with_detail(format!(
                "stored entry has compressed size {} but size {}",
                entry.compressed_size, entry.uncompressed_size
            )));
        }

        let mut raw = vec![0u8; entry.compressed_size as usize];
        self.reader
            .read_exact(&mut raw)
            .map_err(|e| fail(ZipErrorKind::BadHeader).with_detail(e.to_string()))?;

        let data = match entry.method {
            METHOD_STORED => raw,
            METHOD_DEFLATE => miniz_oxide::inflate::decompress_to_vec_with_limit(
                &raw,
                self.limits.max_entry_bytes,
            )
            .map_err(|e| fail(ZipErrorKind::Inflate).with_detail(format!("{:?}", e.status)))?,
            other => return Err(fail(ZipErrorKind::UnsupportedMethod(other))),
        };

        if data.len() != uncompressed {
            return Err(fail(ZipErrorKind::SizeMismatch).with_detail(format!(
                "expected {} bytes, got {}",
                uncompressed,
                data.len()
            )));
        }
        if crc32fast::hash(&data) != entry.crc32 {
            return Err(fail(ZipErrorKind::CrcMismatch));
        }
        Ok(data)
    }

    /// Read an entry by name, `None` when the archive has no such entry.
    pub fn read_by_name(&mut self, name: &str) -> Result<Option<Vec<u8>>, ZipError> {
        let Some(entry) = self.find(name).cloned() else {
            return Ok(None);
        };
        self.read_entry(&entry).map(Some)
    }

    /// Extract every file entry beneath `root`, returning the number written.
    ///
    /// Entry names that are absolute or climb out of `root` are rejected.
    pub fn extract_all(&mut self, root: &Path) -> Result<usize, EpubError> {
        let entries = self.entries.clone();
        let mut total_bytes = 0usize;
        let mut written = 0usize;
        for entry in entries.iter().filter(|entry| !entry.is_dir()) {
            let target = root.join(sanitize_entry_path(&entry.name)?);
            let data = self.read_entry(entry)?;
            total_bytes = total_bytes.saturating_add(data.len());
            if total_bytes > self.limits.max_total_bytes {
                return Err(ZipError::new(ZipErrorKind::LimitExceeded)
                    .with_entry(entry.name.as_str())
                    .with_detail(format!(
                        "total extracted bytes exceed max_total_bytes {}",
                        self.limits.max_total_bytes
                    ))
                    .into());
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, &data)?;
            written += 1;
        }
        log::debug!(
            "extracted {} entries ({} bytes) to {}",
            written,
            total_bytes,
            root.display()
        );
        Ok(written)
    }
}

/// Map a ZIP entry name to a relative path that stays inside the extraction root.
pub fn sanitize_entry_path(name: &str) -> Result<PathBuf, ZipError> {
    let unsafe_path = || ZipError::new(ZipErrorKind::UnsafePath).with_entry(name);
    if name.starts_with('/') || name.contains('\\') || name.contains('\0') {
        return Err(unsafe_path());
    }
    let mut out = PathBuf::new();
    for segment in name.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(unsafe_path()),
            _ => {}
        }
        match Path::new(segment).components().next() {
            Some(Component::Normal(_)) => out.push(segment),
            _ => return Err(unsafe_path()),
        }
    }
    if out.as_os_str().is_empty() {
        return Err(unsafe_path());
    }
    Ok(out)
}

fn read_central_directory<R: Read + Seek>(
    reader: &mut R,
    limits: ZipLimits,
) -> Result<Vec<ZipEntry>, ZipError> {
    let io_fail = |e: std::io::Error| ZipError::new(ZipErrorKind::BadHeader).with_detail(e.to_string());

    let file_len = reader.seek(SeekFrom::End(0)).map_err(io_fail)?;
    let tail_len = file_len.min((END_OF_CENTRAL_DIR_LEN + MAX_COMMENT_LEN) as u64);
    if tail_len < END_OF_CENTRAL_DIR_LEN as u64 {
        return Err(ZipError::new(ZipErrorKind::MissingEndOfCentralDirectory));
    }
    reader
        .seek(SeekFrom::Start(file_len - tail_len))
        .map_err(io_fail)?;
    let mut tail = vec![0u8; tail_len as usize];
    reader.read_exact(&mut tail).map_err(io_fail)?;

    let eocd = (0..=tail.len() - END_OF_CENTRAL_DIR_LEN)
        .rev()
        .find(|&pos| le_u32(&tail, pos) == SIG_END_OF_CENTRAL_DIR)
        .ok_or_else(|| ZipError::new(ZipErrorKind::MissingEndOfCentralDirectory))?;

    let entry_count = le_u16(&tail, eocd + 10);
    let cd_size = le_u32(&tail, eocd + 12);
    let cd_offset = le_u32(&tail, eocd + 16);
    if entry_count == u16::MAX || cd_size == u32::MAX || cd_offset == u32::MAX {
        return Err(ZipError::new(ZipErrorKind::Zip64Unsupported));
    }
    let entry_count = usize::from(entry_count);
    if entry_count > limits.max_entries {
        return Err(ZipError::new(ZipErrorKind::LimitExceeded).with_detail(format!(
            "{} entries > max_entries {}",
            entry_count, limits.max_entries
        )));
    }
    if u64::from(cd_offset) + u64::from(cd_size) > file_len {
        return Err(ZipError::new(ZipErrorKind::BadHeader)
            .with_detail("central directory extends past end of archive"));
    }

    reader
        .seek(SeekFrom::Start(u64::from(cd_offset)))
        .map_err(io_fail)?;
    let mut cd = vec![0u8; cd_size as usize];
    reader.read_exact(&mut cd).map_err(io_fail)?;

    let mut entries = Vec::with_capacity(entry_count);
    let mut pos = 0usize;
    for _ in 0..entry_count {
        if pos + CENTRAL_HEADER_LEN > cd.len() || le_u32(&cd, pos) != SIG_CENTRAL_HEADER {
            return Err(ZipError::new(ZipErrorKind::BadHeader)
                .with_detail(format!("central header at offset {}", pos)));
        }
        let name_len = usize::from(le_u16(&cd, pos + 28));
        let extra_len = usize::from(le_u16(&cd, pos + 30));
        let comment_len = usize::from(le_u16(&cd, pos + 32));
        let name_start = pos + CENTRAL_HEADER_LEN;
        let name_end = name_start + name_len;
        if name_end > cd.len() {
            return Err(ZipError::new(ZipErrorKind::BadHeader).with_detail("entry name truncated"));
        }
        let compressed_size = le_u32(&cd, pos + 20);
        let uncompressed_size = le_u32(&cd, pos + 24);
        let local_header_offset = le_u32(&cd, pos + 42);
        if compressed_size == u32::MAX
            || uncompressed_size == u32::MAX
            || local_header_offset == u32::MAX
        {
            return Err(ZipError::new(ZipErrorKind::Zip64Unsupported));
        }
        entries.push(ZipEntry {
            name: String::from_utf8_lossy(&cd[name_start..name_end]).into_owned(),
            flags: le_u16(&cd, pos + 8),
            method: le_u16(&cd, pos + 10),
            crc32: le_u32(&cd, pos + 16),
            compressed_size,
            uncompressed_size,
            local_header_offset,
        });
        pos = name_end + extra_len + comment_len;
    }
    Ok(entries)
}

fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
