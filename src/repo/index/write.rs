use super::parse::ENTRY_FIXED_SIZE;
use super::{IndexEntry, IndexHeader};
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::util::align_to_n;

/// Serialise entries, which must already be in path order, into a complete index file
/// including the trailing checksum.
pub(super) fn write_index<'a>(
    entries: impl IntoIterator<Item = &'a IndexEntry>,
) -> Result<Vec<u8>> {
    let entries: Vec<_> = entries.into_iter().collect();
    let header = IndexHeader {
        magic: IndexHeader::MAGIC,
        version: IndexHeader::VERSION,
        num_entries: entries
            .len()
            .try_into()
            .map_err(|_| Error::MalformedIndex(format!("too many entries ({})", entries.len())))?,
    };

    let mut out = Vec::new();
    write_index_header(&header, &mut out);

    for entry in entries {
        write_index_entry(entry, &mut out);
    }

    let oid = Digest::new(&out);
    out.extend_from_slice(&oid.0);

    Ok(out)
}

fn write_index_header(hdr: &IndexHeader, dest: &mut Vec<u8>) {
    dest.extend_from_slice(&hdr.magic);
    dest.extend_from_slice(&hdr.version.to_be_bytes());
    dest.extend_from_slice(&hdr.num_entries.to_be_bytes());
}

fn write_index_entry(
    IndexEntry {
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
    }: &IndexEntry,
    out: &mut Vec<u8>,
) {
    let start_len = out.len();
    out.extend_from_slice(&ctime_s.to_be_bytes());
    out.extend_from_slice(&ctime_n.to_be_bytes());
    out.extend_from_slice(&mtime_s.to_be_bytes());
    out.extend_from_slice(&mtime_n.to_be_bytes());
    out.extend_from_slice(&dev.to_be_bytes());
    out.extend_from_slice(&ino.to_be_bytes());
    out.extend_from_slice(&mode.0.to_be_bytes());
    out.extend_from_slice(&uid.to_be_bytes());
    out.extend_from_slice(&gid.to_be_bytes());
    out.extend_from_slice(&siz.to_be_bytes());
    out.extend_from_slice(&oid.0);
    out.extend_from_slice(&flags.to_be_bytes());
    debug_assert_eq!(out.len() - start_len, ENTRY_FIXED_SIZE);

    out.extend_from_slice(path.as_bytes());

    // At least one NUL terminates the path; more pad the entry to a multiple of 8
    let padded_len = align_to_n::<8>(ENTRY_FIXED_SIZE + path.len() + 1);
    out.resize(start_len + padded_len, b'\0');
}
