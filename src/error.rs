use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::digest::Digest;
use crate::storable::ObjectKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("object not found: {0}")]
    ObjectNotFound(Digest),

    #[error("corrupt object {oid}: {reason}")]
    CorruptObject { oid: Digest, reason: String },

    #[error("object {oid} is a {found}, expected a {expected}")]
    UnexpectedKind {
        oid: Digest,
        expected: ObjectKind,
        found: ObjectKind,
    },

    #[error("malformed tree: {0}")]
    MalformedTree(String),

    #[error("tree entries out of order: {0:?} cannot precede {1:?}")]
    UnsortedTree(String, String),

    #[error("malformed commit: {0}")]
    MalformedCommit(String),

    #[error("malformed index: {0}")]
    MalformedIndex(String),

    #[error("a ref named '{0}' already exists")]
    RefAlreadyExists(String),

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("'{0}' is not a valid ref name")]
    InvalidRefName(String),

    #[error("the branch '{0}' is not fully merged")]
    NotMerged(String),

    #[error("cannot delete branch '{0}': it is checked out")]
    BranchCheckedOut(String),

    #[error("branch '{0}' has no commits yet")]
    NoCommits(String),

    #[error("short object id {0} is ambiguous")]
    AmbiguousRevision(String),

    #[error("invalid ignore pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("unable to lock {0}: lockfile already exists")]
    Locked(Utf8PathBuf),

    #[error("no identity configured: set {0}")]
    MissingIdentity(&'static str),

    #[error("invalid date in {var}: {value:?}, expected \"<unix seconds> <+|-HHMM>\"")]
    InvalidDate { var: &'static str, value: String },

    #[error("not a rit repository (or any parent up to /): {0}")]
    NotARepository(Utf8PathBuf),

    #[error("{0} is outside the repository")]
    OutsideRepository(Utf8PathBuf),

    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("local changes would be overwritten: {}", .0.join(", "))]
    DirtyWorktree(Vec<String>),

    #[error("untracked files would be overwritten: {}", .0.join(", "))]
    UntrackedOverwritten(Vec<String>),

    #[error("{path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn io(path: impl AsRef<Utf8Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_owned(),
            source,
        }
    }

    /// Returns `true` if this is an I/O error caused by a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

impl From<walkdir::Error> for Error {
    fn from(e: walkdir::Error) -> Self {
        let path = e
            .path()
            .map(|p| Utf8PathBuf::from(p.to_string_lossy().into_owned()))
            .unwrap_or_default();
        Error::Io {
            path,
            source: e.into(),
        }
    }
}

/// Attach the path that was being operated on to an `io::Result`.
pub trait IoResultExt<T> {
    fn at(self, path: impl AsRef<Utf8Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at(self, path: impl AsRef<Utf8Path>) -> Result<T> {
        self.map_err(|e| Error::io(path, e))
    }
}
