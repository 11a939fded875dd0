use std::io::ErrorKind;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::*;
use walkdir::WalkDir;

use crate::digest::Digest;
use crate::error::{Error, IoResultExt, Result};
use crate::lock::LockedFile;

pub const HEADS_PREFIX: &str = "refs/heads/";
pub const TAGS_PREFIX: &str = "refs/tags/";

/// Contains all characters that cannot appear in a ref name.
///
/// In git, the character `'*'` is allowed in ref names if the environment variable
/// `REFNAME_REFSPEC_PATTERN` is set. Rit does not allow this, so `'*'` appears in this array.
///
/// See: <https://github.com/git/git/blob/795ea8776befc95ea2becd8020c7a284677b4161/refs.c#L48-L57>
const DISALLOWED_CHARACTERS: [char; 40] = [
    '\x01', '\x02', '\x03', '\x04', '\x05', '\x06', '\x07', '\x08', '\t', '\n', '\x0b', '\x0c',
    '\r', '\x0e', '\x0f', '\x10', '\x11', '\x12', '\x13', '\x14', '\x15', '\x16', '\x17', '\x18',
    '\x19', '\x1a', '\x1b', '\x1c', '\x1d', '\x1e', '\x1f', ' ', '*', ':', '?', '[', '\\', '^',
    '~', '\x7f',
];

/// Check whether a string is a valid ref name.
///
/// Disallowed names are any name where:
///
/// - it is empty, or is exactly `"@"`
/// - it (or any path component) begins with `'.'`
/// - it contains double dots `".."` or an empty component (`"//"`)
/// - it contains ASCII control characters
/// - it contains ':', '?', '[', '\', '^', '~', SP, or TAB anywhere
/// - it contains `'*'` or NUL
/// - it begins or ends with `'/'`
/// - it ends with `".lock"`
/// - it contains `"@{"`
///
/// See: <https://github.com/git/git/blob/795ea8776befc95ea2becd8020c7a284677b4161/refs.c#L59-L77>
pub fn is_valid_ref_name(name: &str) -> bool {
    !(name.is_empty()
        || name == "@"
        || name.chars().any(|c| c == '\0' || DISALLOWED_CHARACTERS.contains(&c))
        || name.starts_with('.')
        || name.starts_with('/')
        || name.contains("/.")
        || name.contains("..")
        || name.contains("//")
        || name.ends_with('/')
        || name.ends_with(".lock")
        || name.contains("@{"))
}

/// The value of HEAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    /// `ref: refs/heads/<branch>`, stored as the full ref path.
    Symbolic(String),
    Detached(Digest),
}

impl Head {
    /// The branch HEAD points at, if it is symbolic and points into `refs/heads/`.
    pub fn branch(&self) -> Option<&str> {
        match self {
            Head::Symbolic(r) => r.strip_prefix(HEADS_PREFIX),
            Head::Detached(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub name: String,
    pub oid: Digest,
    pub current: bool,
}

/// Named pointers to commits, stored as loose files under the metadata directory.
#[derive(Debug, Clone)]
pub struct Refs {
    meta_dir: Utf8PathBuf,
}

impl Refs {
    pub fn new(meta_dir: impl AsRef<Utf8Path>) -> Self {
        Self {
            meta_dir: meta_dir.as_ref().to_owned(),
        }
    }

    pub fn head_path(&self) -> Utf8PathBuf {
        self.meta_dir.join("HEAD")
    }

    fn ref_path(&self, full_name: &str) -> Utf8PathBuf {
        self.meta_dir.join(full_name)
    }

    /// Parse HEAD. A `ref: <path>` line is symbolic, anything else is taken as a raw hash.
    pub fn read_head(&self) -> Result<Head> {
        let path = self.head_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::RefNotFound("HEAD".into()))
            }
            Err(e) => return Err(Error::io(path, e)),
        };
        let contents = contents.trim();

        if let Some(target) = contents.strip_prefix("ref:") {
            Ok(Head::Symbolic(target.trim().to_owned()))
        } else {
            Digest::from_str(contents)
                .map(Head::Detached)
                .map_err(|_| Error::RefNotFound(format!("HEAD (invalid contents {contents:?})")))
        }
    }

    pub fn set_head_to_branch(&self, name: &str) -> Result<()> {
        if !is_valid_ref_name(name) {
            return Err(Error::InvalidRefName(name.to_owned()));
        }
        trace!(branch = name, "Pointing HEAD at branch");
        LockedFile::write_file(
            self.head_path(),
            format!("ref: {HEADS_PREFIX}{name}\n").as_bytes(),
        )
    }

    pub fn set_head_detached(&self, oid: &Digest) -> Result<()> {
        trace!(%oid, "Detaching HEAD");
        LockedFile::write_file(self.head_path(), format!("{oid}\n").as_bytes())
    }

    /// Read a ref by its full name (`refs/heads/main`). Returns `None` if no such ref exists.
    pub fn read_ref(&self, full_name: &str) -> Result<Option<Digest>> {
        let path = self.ref_path(full_name);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) if path.is_dir() => {
                trace!(%path, error=%e, "Ref path is a directory");
                return Ok(None);
            }
            Err(e) => return Err(Error::io(path, e)),
        };
        let contents = contents.trim();
        Digest::from_str(contents)
            .map(Some)
            .map_err(|_| Error::RefNotFound(format!("{full_name} (invalid contents {contents:?})")))
    }

    /// Point the ref `full_name` at `oid`, creating it if needed.
    pub fn update_ref(&self, full_name: &str, oid: &Digest) -> Result<()> {
        trace!(name = full_name, %oid, "Updating ref");
        let path = self.ref_path(full_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).at(parent)?;
        }
        LockedFile::write_file(&path, format!("{oid}\n").as_bytes())
    }

    /// Point whatever HEAD refers to at `oid`: the checked-out branch, or HEAD itself when
    /// detached.
    pub fn update_head(&self, oid: &Digest) -> Result<()> {
        match self.read_head()? {
            Head::Symbolic(target) => self.update_ref(&target, oid),
            Head::Detached(_) => self.set_head_detached(oid),
        }
    }

    /// The commit HEAD currently resolves to, or `None` on an unborn branch.
    pub fn head_commit(&self) -> Result<Option<Digest>> {
        match self.read_head()? {
            Head::Symbolic(target) => self.read_ref(&target),
            Head::Detached(oid) => Ok(Some(oid)),
        }
    }

    fn create(&self, full_name: &str, short_name: &str, at: &Digest) -> Result<()> {
        if !is_valid_ref_name(short_name) {
            return Err(Error::InvalidRefName(short_name.to_owned()));
        }
        let path = self.ref_path(full_name);
        if path.exists() {
            return Err(Error::RefAlreadyExists(short_name.to_owned()));
        }
        self.update_ref(full_name, at)
    }

    fn delete(&self, full_name: &str, short_name: &str) -> Result<Digest> {
        let oid = self
            .read_ref(full_name)?
            .ok_or_else(|| Error::RefNotFound(short_name.to_owned()))?;
        let path = self.ref_path(full_name);
        std::fs::remove_file(&path).at(&path)?;
        self.prune_empty_parents(&path);
        Ok(oid)
    }

    /// Remove directories left empty by deleting a nested ref like `feature/foo`.
    fn prune_empty_parents(&self, path: &Utf8Path) {
        let refs_root = self.meta_dir.join("refs");
        let mut dir = path.parent();
        while let Some(d) = dir {
            // Never remove `refs/` or a namespace such as `refs/heads/`
            if d.parent() == Some(refs_root.as_path()) || !d.starts_with(&refs_root) {
                break;
            }
            // Fails (and stops) as soon as a directory is not empty
            if std::fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }

    pub fn create_branch(&self, name: &str, at: &Digest) -> Result<()> {
        debug!(branch = name, %at, "Creating branch");
        self.create(&format!("{HEADS_PREFIX}{name}"), name, at)
    }

    /// Remove a branch ref without any safety checks. See `Repo::delete_branch` for the checked
    /// version.
    pub fn remove_branch(&self, name: &str) -> Result<Digest> {
        self.delete(&format!("{HEADS_PREFIX}{name}"), name)
    }

    pub fn read_branch(&self, name: &str) -> Result<Option<Digest>> {
        self.read_ref(&format!("{HEADS_PREFIX}{name}"))
    }

    /// All branches sorted by name, with the checked-out one flagged.
    pub fn list_branches(&self) -> Result<Vec<Branch>> {
        let current = self.read_head()?;
        let current = current.branch();

        Ok(self
            .list_namespace(HEADS_PREFIX)?
            .into_iter()
            .map(|(name, oid)| Branch {
                current: current == Some(name.as_str()),
                name,
                oid,
            })
            .collect())
    }

    pub fn create_tag(&self, name: &str, at: &Digest) -> Result<()> {
        debug!(tag = name, %at, "Creating tag");
        self.create(&format!("{TAGS_PREFIX}{name}"), name, at)
    }

    pub fn delete_tag(&self, name: &str) -> Result<Digest> {
        self.delete(&format!("{TAGS_PREFIX}{name}"), name)
    }

    pub fn read_tag(&self, name: &str) -> Result<Option<Digest>> {
        self.read_ref(&format!("{TAGS_PREFIX}{name}"))
    }

    pub fn list_tags(&self) -> Result<Vec<(String, Digest)>> {
        self.list_namespace(TAGS_PREFIX)
    }

    /// Every ref under `prefix`, as `(name relative to prefix, oid)`, sorted by name.
    fn list_namespace(&self, prefix: &str) -> Result<Vec<(String, Digest)>> {
        let root = self.ref_path(prefix);
        if !root.is_dir() {
            return Ok(Vec::new());
        }

        let mut refs = Vec::new();
        for entry in WalkDir::new(&root).min_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = Utf8Path::from_path(entry.path())
                .ok_or_else(|| Error::NonUtf8Path(entry.path().to_owned()))?;
            let name = match path.strip_prefix(&root) {
                Ok(name) => name.as_str().to_owned(),
                Err(_) => continue,
            };
            if name.ends_with(".lock") {
                continue;
            }
            if let Some(oid) = self.read_ref(&format!("{prefix}{name}"))? {
                refs.push((name, oid));
            }
        }
        refs.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        Ok(refs)
    }
}
