use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt::Display;

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::filemode::FileMode;

use super::{ObjectKind, Storable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: FileMode,
    pub name: String,
    pub oid: Digest,
}

impl TreeEntry {
    pub fn new(mode: FileMode, name: impl Into<String>, oid: Digest) -> Self {
        Self {
            mode,
            name: name.into(),
            oid,
        }
    }

    pub fn is_tree(&self) -> bool {
        self.mode.is_directory()
    }

    /// Canonical tree order: byte-wise on the name, with directories compared as though their
    /// name ended in `'/'`.
    ///
    /// This places `a.txt` < `dir/` < `z.txt`, and `a.x` < `b/`.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        let sort_key = |e: &Self| {
            let suffix = e.is_tree().then_some(b'/');
            e.name.as_bytes().iter().copied().chain(suffix).collect::<Vec<_>>()
        };
        sort_key(self).cmp(&sort_key(other))
    }
}

/// A directory snapshot. Entries are always held in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Wrap entries that are already in canonical order.
    pub fn new(entries: Vec<TreeEntry>) -> Result<Self> {
        check_order(&entries)?;
        Ok(Self { entries })
    }

    /// Sort `entries` into canonical order. Duplicate names are still rejected.
    pub fn from_unsorted(mut entries: Vec<TreeEntry>) -> Result<Self> {
        entries.sort_by(TreeEntry::canonical_cmp);
        Self::new(entries)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes).map(|entries| Self { entries })
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TreeEntry> {
        self.entries
    }

    pub fn get(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storable for Tree {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Tree
    }

    fn payload(&self) -> Cow<'_, [u8]> {
        Cow::Owned(encode_unchecked(&self.entries))
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for entry in &self.entries {
            let kind = if entry.is_tree() {
                ObjectKind::Tree
            } else {
                ObjectKind::Blob
            };
            writeln!(f, "{:06o} {} {}\t{}", entry.mode, kind, entry.oid, entry.name)?;
        }
        Ok(())
    }
}

/// Entries must be strictly increasing, and no name may appear twice. A file and a directory
/// with the same name need not be adjacent (`a`, `a.txt`, `a/`), hence the set.
fn check_order(entries: &[TreeEntry]) -> Result<()> {
    for pair in entries.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        if a.canonical_cmp(b) != Ordering::Less {
            return Err(Error::UnsortedTree(a.name.clone(), b.name.clone()));
        }
    }

    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if !seen.insert(entry.name.as_str()) {
            return Err(Error::UnsortedTree(entry.name.clone(), entry.name.clone()));
        }
    }
    Ok(())
}

/// Serialise entries as `"{mode} {name}\0{20 byte oid}"` records.
///
/// Fails with [`Error::UnsortedTree`] rather than re-sorting if the entries are not in canonical
/// order.
pub fn encode(entries: &[TreeEntry]) -> Result<Vec<u8>> {
    check_order(entries)?;
    Ok(encode_unchecked(entries))
}

fn encode_unchecked(entries: &[TreeEntry]) -> Vec<u8> {
    let mut data = Vec::new();
    for entry in entries {
        data.extend_from_slice(format!("{:o} ", entry.mode).as_bytes());
        data.extend_from_slice(entry.name.as_bytes());
        data.push(b'\0');
        data.extend_from_slice(&*entry.oid);
    }
    data
}

pub fn decode(mut bytes: &[u8]) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();

    while !bytes.is_empty() {
        let space = memchr::memchr(b' ', bytes)
            .ok_or_else(|| Error::MalformedTree("truncated entry: missing mode".into()))?;
        let mode = FileMode::parse_tree_mode(&bytes[..space]).ok_or_else(|| {
            Error::MalformedTree(format!(
                "invalid mode {:?}",
                String::from_utf8_lossy(&bytes[..space])
            ))
        })?;
        bytes = &bytes[space + 1..];

        let nul = memchr::memchr(b'\0', bytes)
            .ok_or_else(|| Error::MalformedTree("truncated entry: unterminated name".into()))?;
        let name = std::str::from_utf8(&bytes[..nul])
            .map_err(|_| Error::MalformedTree("entry name is not valid UTF-8".into()))?;
        if name.is_empty() || name.contains('/') {
            return Err(Error::MalformedTree(format!("invalid entry name {name:?}")));
        }
        bytes = &bytes[nul + 1..];

        if bytes.len() < 20 {
            return Err(Error::MalformedTree(format!(
                "truncated object id for {name:?}: {} trailing bytes",
                bytes.len()
            )));
        }
        let (oid, rest) = bytes.split_at(20);
        let oid = Digest::from_bytes(oid)
            .ok_or_else(|| Error::MalformedTree("truncated object id".into()))?;
        bytes = rest;

        entries.push(TreeEntry::new(mode, name, oid));
    }

    Ok(entries)
}
