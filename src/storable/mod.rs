pub mod blob;
pub mod commit;
pub mod tree;

use std::borrow::Cow;
use std::fmt::Display;

use crate::digest::Digest;
use crate::error::{Error, Result};

use blob::Blob;
use commit::Commit;
use tree::Tree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
}

impl ObjectKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            b"blob" => Some(ObjectKind::Blob),
            b"tree" => Some(ObjectKind::Tree),
            b"commit" => Some(ObjectKind::Commit),
            _ => None,
        }
    }

    /// The `"{kind} {len}\0"` header that prefixes every stored object.
    pub fn header(self, len: usize) -> Vec<u8> {
        format!("{} {}\0", self.as_str(), len).into_bytes()
    }
}

impl Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything that can be written to the object database.
pub trait Storable {
    fn kind(&self) -> ObjectKind;

    /// The serialised payload, without the `"{kind} {len}\0"` header.
    fn payload(&self) -> Cow<'_, [u8]>;

    /// Returns the storable uncompressed but formatted `"{type} {len}\0{data}"`.
    /// e.g.
    /// a blob `"hello\n"` becomes `"blob 6\0hello\n"`
    fn formatted(&self) -> Vec<u8> {
        let payload = self.payload();
        let mut out = self.kind().header(payload.len());
        out.extend_from_slice(&payload);
        out
    }

    fn oid(&self) -> Digest {
        Digest::for_object(self.kind(), &self.payload())
    }
}

/// A raw object as read back from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    pub oid: Digest,
    pub kind: ObjectKind,
    pub payload: Vec<u8>,
}

impl Object {
    fn expect_kind(&self, expected: ObjectKind) -> Result<()> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(Error::UnexpectedKind {
                oid: self.oid,
                expected,
                found: self.kind,
            })
        }
    }

    pub fn into_blob(self) -> Result<Blob> {
        self.expect_kind(ObjectKind::Blob)?;
        Ok(Blob::new(self.payload))
    }

    pub fn into_tree(self) -> Result<Tree> {
        self.expect_kind(ObjectKind::Tree)?;
        Tree::decode(&self.payload)
    }

    pub fn into_commit(self) -> Result<Commit> {
        self.expect_kind(ObjectKind::Commit)?;
        Commit::parse(&self.payload)
    }
}
