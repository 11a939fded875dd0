use crate::digest::Digest;
use crate::error::{Error, IoResultExt, Result};
use crate::filemode::FileMode;
use crate::storable::blob::Blob;
use crate::storable::commit::Commit;
use crate::storable::tree::Tree;
use crate::storable::{Object, ObjectKind, Storable};
use crate::util;

use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Write};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::*;

/// Content-addressed object storage under `objects/`.
#[derive(Debug, Clone)]
pub struct Database {
    database_root: Utf8PathBuf,
}

impl Database {
    pub fn new(meta_dir: impl AsRef<Utf8Path>) -> Self {
        Self {
            database_root: meta_dir.as_ref().join("objects"),
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.database_root
    }

    /// The id `payload` would be stored under, without writing anything.
    pub fn hash(kind: ObjectKind, payload: &[u8]) -> Digest {
        Digest::for_object(kind, payload)
    }

    /// Write an object, returning its id.
    ///
    /// Storing is idempotent: an object that already exists is left untouched. New objects are
    /// written to a temporary file in the bucket directory and renamed into place.
    pub fn store(&self, kind: ObjectKind, payload: &[u8]) -> Result<Digest> {
        let oid = Digest::for_object(kind, payload);
        let object_path = self.object_path(&oid);

        if object_path.exists() {
            trace!(%oid, "Object already in database");
            return Ok(oid);
        }

        trace!(%oid, %kind, len = payload.len(), "Writing object to database");

        let dirname = object_path
            .parent()
            .ok_or_else(|| Error::io(&object_path, ErrorKind::InvalidInput.into()))?;
        std::fs::create_dir_all(dirname).at(dirname)?;

        let mut e = ZlibEncoder::new(Vec::with_capacity(payload.len()), Compression::default());
        e.write_all(&kind.header(payload.len()))
            .and_then(|_| e.write_all(payload))
            .at(&object_path)?;
        let compressed_bytes = e.finish().at(&object_path)?;

        let temp_path = dirname.join(util::tmp_file_name("tmp_obj_"));
        let written = std::fs::write(&temp_path, compressed_bytes)
            .at(&temp_path)
            .and_then(|_| std::fs::rename(&temp_path, &object_path).at(&object_path));
        if written.is_err() {
            let _ = std::fs::remove_file(&temp_path);
        }
        written?;

        Ok(oid)
    }

    pub fn store_object<T: Storable>(&self, obj: &T) -> Result<Digest> {
        self.store(obj.kind(), &obj.payload())
    }

    fn object_path(&self, oid: &Digest) -> Utf8PathBuf {
        let oid = oid.to_hex();
        let (prefix, suffix) = oid.split_at(2);
        self.database_root.join(prefix).join(suffix)
    }

    pub fn exists(&self, oid: &Digest) -> bool {
        self.object_path(oid).is_file()
    }

    pub fn load(&self, oid: &Digest) -> Result<Object> {
        trace!(%oid, "Reading object from database");

        let object_path = self.object_path(oid);
        let compressed = match std::fs::read(&object_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(Error::ObjectNotFound(*oid)),
            Err(e) => return Err(Error::io(object_path, e)),
        };

        let corrupt = |reason: String| Error::CorruptObject { oid: *oid, reason };

        let mut bytes = Vec::new();
        ZlibDecoder::new(&*compressed)
            .read_to_end(&mut bytes)
            .map_err(|e| corrupt(format!("decompression failed: {e}")))?;

        let nul_idx = memchr::memchr(b'\0', &bytes)
            .ok_or_else(|| corrupt("missing header terminator".into()))?;
        let header = &bytes[..nul_idx];
        let space_idx = memchr::memchr(b' ', header)
            .ok_or_else(|| corrupt("missing space in header".into()))?;

        let kind = ObjectKind::from_bytes(&header[..space_idx]).ok_or_else(|| {
            corrupt(format!(
                "unknown object type {:?}",
                String::from_utf8_lossy(&header[..space_idx])
            ))
        })?;
        let declared_len = std::str::from_utf8(&header[space_idx + 1..])
            .ok()
            .and_then(|len| len.parse::<usize>().ok())
            .ok_or_else(|| corrupt("invalid length in header".into()))?;

        bytes.drain(..=nul_idx);
        if bytes.len() != declared_len {
            return Err(corrupt(format!(
                "header declares {declared_len} bytes, found {}",
                bytes.len()
            )));
        }

        Ok(Object {
            oid: *oid,
            kind,
            payload: bytes,
        })
    }

    pub fn load_blob(&self, oid: &Digest) -> Result<Blob> {
        self.load(oid)?.into_blob()
    }

    pub fn load_tree(&self, oid: &Digest) -> Result<Tree> {
        self.load(oid)?.into_tree()
    }

    pub fn load_commit(&self, oid: &Digest) -> Result<Commit> {
        self.load(oid)?.into_commit()
    }

    /// Every blob reachable from the tree `oid`, keyed by its path relative to that tree.
    ///
    /// Subtrees are walked with an explicit stack.
    pub fn flatten_tree(&self, oid: &Digest) -> Result<BTreeMap<Utf8PathBuf, (FileMode, Digest)>> {
        let mut files = BTreeMap::new();
        let mut pending = vec![(Utf8PathBuf::new(), *oid)];

        while let Some((prefix, oid)) = pending.pop() {
            for entry in self.load_tree(&oid)?.into_entries() {
                let path = prefix.join(&entry.name);
                if entry.is_tree() {
                    pending.push((path, entry.oid));
                } else {
                    files.insert(path, (entry.mode, entry.oid));
                }
            }
        }

        Ok(files)
    }

    /// All object ids whose hex form starts with `prefix`.
    pub fn find_by_prefix(&self, prefix: &str) -> Result<Vec<Digest>> {
        if prefix.len() < 2 || !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Ok(Vec::new());
        }
        let prefix = prefix.to_ascii_lowercase();
        let (bucket, rest) = prefix.split_at(2);
        let bucket_path = self.database_root.join(bucket);

        let dir = match std::fs::read_dir(&bucket_path) {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(bucket_path, e)),
        };

        let mut found = Vec::new();
        for entry in dir {
            let entry = entry.at(&bucket_path)?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(rest) {
                if let Ok(oid) = format!("{bucket}{name}").parse() {
                    found.push(oid);
                }
            }
        }
        found.sort();
        Ok(found)
    }
}
