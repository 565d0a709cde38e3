use std::io;
use std::path::{Component, Path};

use tar::{Builder, EntryType, Header, PaxExtensions};

use crate::error::{PackError, PackResult};

/// Size of one tar block.
pub const BLOCK_SIZE: usize = 512;

/// Kind of a tar archive member.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TarEntryKind {
    File,
    Directory,
    /// Links, devices, fifos... skipped by every consumer.
    Other,
}

impl TarEntryKind {
    fn from_entry_type(ty: EntryType) -> Self {
        match ty {
            EntryType::Regular | EntryType::Continuous => Self::File,
            EntryType::Directory => Self::Directory,
            _ => Self::Other,
        }
    }
}

/// Decoded header of an archive member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TarEntryHeader {
    /// Member path with any trailing `/` removed.
    pub path: String,
    pub size: u64,
    pub kind: TarEntryKind,
}

impl TarEntryHeader {
    pub fn is_file(&self) -> bool {
        self.kind == TarEntryKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == TarEntryKind::Directory
    }
}

/// Number of zero bytes needed after `size` bytes of data.
pub fn padding_len(size: u64) -> usize {
    let rem = (size % BLOCK_SIZE as u64) as usize;
    if rem == 0 {
        0
    } else {
        BLOCK_SIZE - rem
    }
}

/// Reject paths that would escape the archive root.
pub fn validate_path(path: &str) -> PackResult<()> {
    let escapes = path.is_empty()
        || Path::new(path)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(PackError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Encode the header block(s) for a regular file of `size` bytes.
///
/// Paths longer than the classic name field get a GNU long-name record in
/// front of the real header.
pub fn encode_file_header(path: &str, size: u64) -> PackResult<Vec<u8>> {
    validate_path(path)?;
    let mut header = Header::new_gnu();
    header.set_size(size);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_entry_type(EntryType::Regular);

    // An empty body makes the builder emit header blocks only.
    let mut builder = Builder::new(Vec::with_capacity(BLOCK_SIZE * 3));
    builder
        .append_data(&mut header, path, io::empty())
        .map_err(|e| PackError::InvalidPath(format!("{path}: {e}")))?;
    Ok(std::mem::take(builder.get_mut()))
}

/// The two zero blocks that terminate an archive.
pub fn end_of_archive() -> [u8; BLOCK_SIZE * 2] {
    [0u8; BLOCK_SIZE * 2]
}

/// Raw header as read from the archive, before extension records are applied.
pub(crate) struct RawHeader {
    pub entry_type: EntryType,
    pub path: Vec<u8>,
    pub size: u64,
}

/// Decode one header block. `offset` is only used for error reporting.
pub(crate) fn decode_header(block: &[u8; BLOCK_SIZE], offset: u64) -> PackResult<RawHeader> {
    let header = Header::from_byte_slice(block);

    let stored = header.cksum().map_err(|e| PackError::CorruptHeader {
        offset,
        reason: e.to_string(),
    })?;
    let computed = block[..148]
        .iter()
        .chain(&block[156..])
        .fold(8 * u32::from(b' '), |acc, b| acc + u32::from(*b));
    if stored != computed {
        return Err(PackError::ChecksumMismatch(offset));
    }

    let size = header.entry_size().map_err(|e| PackError::CorruptHeader {
        offset,
        reason: e.to_string(),
    })?;

    Ok(RawHeader {
        entry_type: header.entry_type(),
        path: header.path_bytes().into_owned(),
        size,
    })
}

/// Build the public header from a raw header and the path/size overrides
/// collected from preceding extension records.
pub(crate) fn finish_header(
    raw: RawHeader,
    path_override: Option<Vec<u8>>,
    size_override: Option<u64>,
) -> TarEntryHeader {
    let path_bytes = path_override.unwrap_or(raw.path);
    let path = String::from_utf8_lossy(&path_bytes);
    let path = path.trim_end_matches('\0').trim_end_matches('/');
    let path = path.strip_prefix("./").unwrap_or(path).to_string();
    TarEntryHeader {
        path,
        size: size_override.unwrap_or(raw.size),
        kind: TarEntryKind::from_entry_type(raw.entry_type),
    }
}

/// Parse PAX extended header records, returning the `path` and `size`
/// overrides if present. Parsing stops at the first malformed record.
pub(crate) fn parse_pax(data: &[u8]) -> (Option<Vec<u8>>, Option<u64>) {
    let mut path = None;
    let mut size = None;
    for record in PaxExtensions::new(data).map_while(Result::ok) {
        match record.key_bytes() {
            b"path" => path = Some(record.value_bytes().to_vec()),
            b"size" => size = record.value().ok().and_then(|v| v.parse().ok()),
            _ => {}
        }
    }
    (path, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(bytes: &[u8]) -> [u8; BLOCK_SIZE] {
        let mut b = [0u8; BLOCK_SIZE];
        b.copy_from_slice(&bytes[..BLOCK_SIZE]);
        b
    }

    #[test]
    fn padding_rounds_to_block() {
        assert_eq!(padding_len(0), 0);
        assert_eq!(padding_len(1), 511);
        assert_eq!(padding_len(512), 0);
        assert_eq!(padding_len(513), 511);
    }

    #[test]
    fn short_path_is_one_block() {
        let bytes = encode_file_header("folder/and/file", 4).unwrap();
        assert_eq!(bytes.len(), BLOCK_SIZE);
        let raw = decode_header(&block(&bytes), 0).unwrap();
        let header = finish_header(raw, None, None);
        assert_eq!(header.path, "folder/and/file");
        assert_eq!(header.size, 4);
        assert!(header.is_file());
    }

    #[test]
    fn long_path_gets_gnu_record() {
        let path = format!("{}/file", "d".repeat(150));
        let bytes = encode_file_header(&path, 10).unwrap();
        // long-name header + one record block + real header
        assert_eq!(bytes.len(), BLOCK_SIZE * 3);
        let raw = decode_header(&block(&bytes), 0).unwrap();
        assert_eq!(raw.entry_type, EntryType::GNULongName);
        assert_eq!(raw.size, path.len() as u64 + 1);
    }

    #[test]
    fn corrupted_checksum_is_detected() {
        let mut bytes = encode_file_header("file", 4).unwrap();
        bytes[0] ^= 0xff;
        let err = decode_header(&block(&bytes), 1024).err().unwrap();
        assert!(matches!(err, PackError::ChecksumMismatch(1024)));
    }

    #[test]
    fn escaping_paths_are_rejected() {
        assert!(encode_file_header("../etc/passwd", 1).is_err());
        assert!(encode_file_header("/abs", 1).is_err());
        assert!(encode_file_header("", 1).is_err());
        assert!(encode_file_header("ok/./fine", 1).is_ok());
    }

    #[test]
    fn pax_records_override_path_and_size() {
        let data = b"23 path=some/long/name\n12 size=123\n20 mtime=1600000000\n";
        let (path, size) = parse_pax(data);
        assert_eq!(path.as_deref(), Some(&b"some/long/name"[..]));
        assert_eq!(size, Some(123));
    }

    #[test]
    fn malformed_pax_is_ignored() {
        let (path, size) = parse_pax(b"garbage");
        assert!(path.is_none());
        assert!(size.is_none());
    }

    #[test]
    fn leading_dot_slash_and_trailing_slash_are_trimmed() {
        let raw = RawHeader {
            entry_type: EntryType::Directory,
            path: b"./folder/".to_vec(),
            size: 0,
        };
        let header = finish_header(raw, None, None);
        assert_eq!(header.path, "folder");
        assert!(header.is_directory());
    }
}
