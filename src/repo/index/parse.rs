use tracing::trace;

use super::{IndexEntry, IndexHeader};
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::filemode::FileMode;
use crate::util::align_to_n;

const HEADER_SIZE: usize = 12;
const CHECKSUM_SIZE: usize = 20;
/// Size of an entry's fixed-width fields, up to the start of the path.
pub(super) const ENTRY_FIXED_SIZE: usize = 62;

fn malformed(reason: impl Into<String>) -> Error {
    Error::MalformedIndex(reason.into())
}

pub fn parse_index(bytes: &[u8]) -> Result<Vec<IndexEntry>> {
    if bytes.len() < HEADER_SIZE + CHECKSUM_SIZE {
        return Err(malformed(format!("file is only {} bytes long", bytes.len())));
    }

    let (body, checksum) = bytes.split_at(bytes.len() - CHECKSUM_SIZE);
    let expected = Digest::new(body);
    if expected.0[..] != *checksum {
        return Err(malformed(format!(
            "checksum mismatch: expected {expected}, found {}",
            hex::encode(checksum)
        )));
    }

    let header = parse_index_header(body)?;
    if !header.has_valid_magic() {
        return Err(malformed(format!(
            "invalid signature {:?}, expected \"DIRC\"",
            String::from_utf8_lossy(&header.magic)
        )));
    }
    if header.version != IndexHeader::VERSION {
        return Err(malformed(format!(
            "only version {} is supported (this is version {})",
            IndexHeader::VERSION,
            header.version
        )));
    }

    trace!("Reading {} index entries", header.num_entries);

    let mut reader = Reader {
        bytes: body,
        offset: HEADER_SIZE,
    };
    // The header count is untrusted. Each entry needs at least its fixed fields.
    let max_entries = (body.len() - HEADER_SIZE) / ENTRY_FIXED_SIZE;
    let mut entries = Vec::with_capacity((header.num_entries as usize).min(max_entries));
    for _ in 0..header.num_entries {
        entries.push(parse_index_entry(&mut reader)?);
    }

    if reader.offset != body.len() {
        trace!("This index has extensions. Ignoring...")
    }

    Ok(entries)
}

fn parse_index_header(bytes: &[u8]) -> Result<IndexHeader> {
    let mut reader = Reader { bytes, offset: 0 };
    Ok(IndexHeader {
        magic: reader.array()?,
        version: reader.u32()?,
        num_entries: reader.u32()?,
    })
}

/// A cursor over the index body that fails with `MalformedIndex` instead of reading past the end.
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let slc = self
            .bytes
            .get(self.offset..self.offset + len)
            .ok_or_else(|| malformed(format!("unexpected end of data at offset {}", self.offset)))?;
        self.offset += len;
        Ok(slc)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let slc = self.take(N)?;
        // `take` returned exactly N bytes
        Ok(slc.try_into().unwrap_or([0; N]))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }
}

fn parse_index_entry(reader: &mut Reader) -> Result<IndexEntry> {
    let start = reader.offset;

    let ctime_s = reader.u32()?;
    let ctime_n = reader.u32()?;

    let mtime_s = reader.u32()?;
    let mtime_n = reader.u32()?;

    let dev = reader.u32()?;
    let ino = reader.u32()?;

    let mode = FileMode(reader.u32()?);

    let uid = reader.u32()?;
    let gid = reader.u32()?;
    let siz = reader.u32()?;

    let oid = Digest(reader.array()?);
    let flags = reader.u16()?;

    let path = {
        let rest = &reader.bytes[reader.offset.min(reader.bytes.len())..];
        let len = memchr::memchr(b'\0', rest)
            .ok_or_else(|| malformed(format!("unterminated path in entry at offset {start}")))?;
        let name = reader.take(len)?;
        String::from_utf8(name.to_vec())
            .map_err(|_| malformed(format!("path in entry at offset {start} is not UTF-8")))?
    };
    if path.is_empty() {
        return Err(malformed(format!("empty path in entry at offset {start}")));
    }

    // The path is followed by 1-8 NUL bytes, padding the entry to a multiple of 8
    let end = start + align_to_n::<8>(ENTRY_FIXED_SIZE + path.len() + 1);
    if end > reader.bytes.len() {
        return Err(malformed(format!("truncated entry for {path:?}")));
    }
    reader.offset = end;

    Ok(IndexEntry {
        ctime_s,
        ctime_n,
        mtime_s,
        mtime_n,
        dev,
        ino,
        mode,
        uid,
        gid,
        siz,
        oid,
        flags,
        path,
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::write::write_index;
    use super::*;

    fn entry(path: &str, byte: u8) -> IndexEntry {
        IndexEntry {
            ctime_s: 1_600_000_000,
            ctime_n: 12,
            mtime_s: 1_600_000_001,
            mtime_n: 34,
            dev: 2049,
            ino: 1234,
            mode: FileMode::REGULAR,
            uid: 1000,
            gid: 1000,
            siz: 42,
            oid: Digest([byte; 20]),
            flags: path.len() as u16,
            path: path.to_owned(),
        }
    }

    #[test]
    fn entries_survive_a_write() -> Result<()> {
        // Path lengths chosen so that every amount of padding (1 to 8 bytes) shows up
        let entries: Vec<_> = ["a", "bb", "ccc", "dddd", "eeeee", "ffffff", "ggggggg", "hhhhhhhh"]
            .iter()
            .enumerate()
            .map(|(i, p)| entry(p, i as u8))
            .collect();

        let bytes = write_index(entries.iter())?;
        assert_eq!(&bytes[..4], b"DIRC");
        assert_eq!(parse_index(&bytes)?, entries);
        Ok(())
    }

    #[test]
    fn empty_index() -> Result<()> {
        let bytes = write_index(std::iter::empty())?;
        assert_eq!(bytes.len(), HEADER_SIZE + CHECKSUM_SIZE);
        assert!(parse_index(&bytes)?.is_empty());
        Ok(())
    }

    #[test]
    fn checksum_mismatch() -> Result<()> {
        let mut bytes = write_index([entry("file", 1)].iter())?;
        bytes[HEADER_SIZE + 3] ^= 0xff;
        let err = parse_index(&bytes).unwrap_err();
        assert!(matches!(err, Error::MalformedIndex(ref r) if r.contains("checksum")), "{err}");
        Ok(())
    }

    /// Re-seal a hand-modified body with a valid checksum.
    fn reseal(mut body: Vec<u8>) -> Vec<u8> {
        let checksum = Digest::new(&body);
        body.extend_from_slice(&checksum.0);
        body
    }

    #[test]
    fn rejects_bad_headers() -> Result<()> {
        let bytes = write_index(std::iter::empty())?;
        let body = bytes[..HEADER_SIZE].to_vec();

        let mut bad_magic = body.clone();
        bad_magic[..4].copy_from_slice(b"CRID");
        assert!(matches!(parse_index(&reseal(bad_magic)), Err(Error::MalformedIndex(_))));

        let mut bad_version = body.clone();
        bad_version[4..8].copy_from_slice(&3u32.to_be_bytes());
        assert!(matches!(parse_index(&reseal(bad_version)), Err(Error::MalformedIndex(_))));

        // Claims one entry but has none
        let mut too_many = body;
        too_many[8..12].copy_from_slice(&1u32.to_be_bytes());
        assert!(matches!(parse_index(&reseal(too_many)), Err(Error::MalformedIndex(_))));

        assert!(matches!(parse_index(b"DIRC"), Err(Error::MalformedIndex(_))));
        Ok(())
    }

    #[test]
    fn huge_entry_count_is_an_error() -> Result<()> {
        let entries = vec![entry("file", 7)];
        let bytes = write_index(entries.iter())?;
        let mut body = bytes[..bytes.len() - CHECKSUM_SIZE].to_vec();
        body[8..12].copy_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(parse_index(&reseal(body)), Err(Error::MalformedIndex(_))));
        Ok(())
    }

    #[test]
    fn ignores_extensions() -> Result<()> {
        let entries = vec![entry("file", 7)];
        let bytes = write_index(entries.iter())?;
        let mut body = bytes[..bytes.len() - CHECKSUM_SIZE].to_vec();
        body.extend_from_slice(b"TREE");
        body.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(parse_index(&reseal(body))?, entries);
        Ok(())
    }
}
