use std::fs::Metadata;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use tracing::*;
use walkdir::{DirEntry, WalkDir};

use super::database::Database;
use super::ignore::IgnoreMatcher;
use crate::digest::Digest;
use crate::error::{Error, IoResultExt, Result};
use crate::filemode::FileMode;
use crate::storable::tree::{Tree, TreeEntry};
use crate::storable::ObjectKind;

/// The checked-out files of a repository.
#[derive(Debug, Clone)]
pub struct Workspace {
    root_path: Utf8PathBuf,
}

fn utf8_path(path: &Path) -> Result<&Utf8Path> {
    Utf8Path::from_path(path).ok_or_else(|| Error::NonUtf8Path(path.to_owned()))
}

impl Workspace {
    pub fn new(root_path: impl AsRef<Utf8Path>) -> Self {
        Self {
            root_path: root_path.as_ref().to_owned(),
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root_path
    }

    /// Turn a user supplied path (absolute, or relative to the root) into a normalised path
    /// relative to the root. The root itself is the empty path.
    pub fn relativize(&self, path: &Utf8Path) -> Result<Utf8PathBuf> {
        let relative = if path.is_absolute() {
            path.strip_prefix(&self.root_path)
                .map_err(|_| Error::OutsideRepository(path.to_owned()))?
        } else {
            path
        };

        let mut normalised = Utf8PathBuf::new();
        for component in relative.components() {
            match component {
                Utf8Component::CurDir => {}
                Utf8Component::ParentDir => {
                    if !normalised.pop() {
                        return Err(Error::OutsideRepository(path.to_owned()));
                    }
                }
                Utf8Component::Normal(c) => normalised.push(c),
                Utf8Component::RootDir | Utf8Component::Prefix(_) => {
                    return Err(Error::OutsideRepository(path.to_owned()))
                }
            }
        }
        Ok(normalised)
    }

    fn relative_entry_path<'a>(&self, entry: &'a DirEntry) -> Result<&'a Utf8Path> {
        let path = utf8_path(entry.path())?;
        Ok(path.strip_prefix(&self.root_path).unwrap_or(path))
    }

    fn is_excluded(&self, entry: &DirEntry, ignore: &IgnoreMatcher) -> bool {
        match self.relative_entry_path(entry) {
            Ok(path) => ignore.is_ignored(path, entry.file_type().is_dir()),
            // Surface the error when the entry is visited
            Err(_) => false,
        }
    }

    /// Every regular file and symlink under `path`, relative to the root and sorted.
    ///
    /// Ignored files, and everything inside ignored directories, are skipped.
    pub fn list_files(&self, path: &Utf8Path, ignore: &IgnoreMatcher) -> Result<Vec<Utf8PathBuf>> {
        let start = self.root_path.join(path);
        let mut files = Vec::new();

        let walker = WalkDir::new(&start)
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e, ignore));

        for entry in walker {
            let entry = entry?;
            let file_type = entry.file_type();
            if file_type.is_dir() {
                continue;
            }
            let path = self.relative_entry_path(&entry)?;
            if file_type.is_file() || file_type.is_symlink() {
                trace!(%path, "Found file");
                files.push(path.to_owned());
            } else {
                debug!(%path, "Skipping special file");
            }
        }

        files.sort_unstable_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(files)
    }

    /// `lstat` a path relative to the root. Returns `None` if nothing exists there.
    pub fn stat(&self, path: &Utf8Path) -> Result<Option<Metadata>> {
        let full_path = self.root_path.join(path);
        match full_path.symlink_metadata() {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(full_path, e)),
        }
    }

    /// The bytes that represent a file in the object database: its contents, or for a symlink
    /// the path it points to.
    pub fn read(&self, path: &Utf8Path, metadata: &Metadata) -> Result<Vec<u8>> {
        let full_path = self.root_path.join(path);
        if metadata.file_type().is_symlink() {
            let target = std::fs::read_link(&full_path).at(&full_path)?;
            let target = utf8_path(&target)?;
            Ok(target.as_str().as_bytes().to_vec())
        } else {
            std::fs::read(&full_path).at(&full_path)
        }
    }

    /// Hash a file without storing it. Returns `None` if the file does not exist.
    pub fn hash_file(&self, path: &Utf8Path) -> Result<Option<(FileMode, Digest)>> {
        let metadata = match self.stat(path)? {
            Some(metadata) if !metadata.is_dir() => metadata,
            _ => return Ok(None),
        };
        let data = self.read(path, &metadata)?;
        Ok(Some((
            FileMode::from_metadata(&metadata),
            Digest::for_object(ObjectKind::Blob, &data),
        )))
    }

    /// Store the directory `path` (relative to the root) as a tree, returning its id.
    ///
    /// Files are stored as blobs and subdirectories as subtrees, children before parents.
    /// Ignored paths and empty directories are left out, so the result matches a tree built
    /// from an index holding the same files.
    pub fn build_tree(
        &self,
        database: &Database,
        path: &Utf8Path,
        ignore: &IgnoreMatcher,
    ) -> Result<Digest> {
        let start = self.root_path.join(path);
        trace!(path=%start, "Building tree from directory");

        // `pending[d]` collects entries found at depth `d`, waiting for their parent directory
        // (at depth `d - 1`) to be visited. `contents_first` guarantees children come first.
        let mut pending: Vec<Vec<TreeEntry>> = Vec::new();

        let walker = WalkDir::new(&start)
            .contents_first(true)
            .into_iter()
            .filter_entry(|e| !self.is_excluded(e, ignore));

        for entry in walker {
            let entry = entry?;
            let depth = entry.depth();
            if pending.len() < depth + 2 {
                pending.resize_with(depth + 2, Vec::new);
            }

            let file_type = entry.file_type();
            let name = entry
                .file_name()
                .to_str()
                .ok_or_else(|| Error::NonUtf8Path(entry.path().to_owned()))?
                .to_owned();

            if file_type.is_dir() {
                let children = std::mem::take(&mut pending[depth + 1]);
                if depth == 0 {
                    let tree = Tree::from_unsorted(children)?;
                    return database.store_object(&tree);
                }
                if children.is_empty() {
                    trace!(path=?entry.path(), "Skipping empty directory");
                    continue;
                }
                let tree = Tree::from_unsorted(children)?;
                let oid = database.store_object(&tree)?;
                pending[depth].push(TreeEntry::new(FileMode::DIRECTORY, name, oid));
            } else if file_type.is_file() || file_type.is_symlink() {
                let path = self.relative_entry_path(&entry)?;
                let metadata = entry.path().symlink_metadata().at(path)?;
                let data = self.read(path, &metadata)?;
                let oid = database.store(ObjectKind::Blob, &data)?;
                pending[depth].push(TreeEntry::new(FileMode::from_metadata(&metadata), name, oid));
            }
        }

        // The walk always ends by visiting `start` itself, unless `start` is not a directory
        Err(Error::io(
            &start,
            std::io::Error::new(ErrorKind::Other, "not a directory"),
        ))
    }

    /// Write a file into the working tree, replacing whatever was at `path` before.
    pub fn write_file(&self, path: &Utf8Path, data: &[u8], mode: FileMode) -> Result<()> {
        let full_path = self.root_path.join(path);
        trace!(path=%full_path, mode=?mode, "Writing file to workspace");

        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent).at(parent)?;
        }

        match full_path.symlink_metadata() {
            Ok(m) if m.is_dir() => std::fs::remove_dir_all(&full_path).at(&full_path)?,
            Ok(_) => std::fs::remove_file(&full_path).at(&full_path)?,
            Err(_) => {}
        }

        if mode.is_symlink() {
            let target = std::str::from_utf8(data)
                .map_err(|_| Error::io(&full_path, ErrorKind::InvalidData.into()))?;
            std::os::unix::fs::symlink(target, &full_path).at(&full_path)?;
        } else {
            std::fs::write(&full_path, data).at(&full_path)?;
            let permissions = if mode.is_executable() { 0o755 } else { 0o644 };
            std::fs::set_permissions(&full_path, std::fs::Permissions::from_mode(permissions))
                .at(&full_path)?;
        }
        Ok(())
    }

    /// Delete a file, then any directories the deletion left empty.
    pub fn remove_file(&self, path: &Utf8Path) -> Result<()> {
        let full_path = self.root_path.join(path);
        trace!(path=%full_path, "Removing file from workspace");
        match std::fs::remove_file(&full_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(Error::io(full_path, e)),
        }

        let mut dir = path.parent();
        while let Some(d) = dir.filter(|d| !d.as_str().is_empty()) {
            if std::fs::remove_dir(self.root_path.join(d)).is_err() {
                break;
            }
            dir = d.parent();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs::Permissions;

    use pretty_assertions::assert_eq;
    use tempdir::TempDir;

    use super::*;

    fn workspace() -> (TempDir, Workspace, Database) {
        let dir = TempDir::new("rit").unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().to_owned();
        let database = Database::new(root.join(".rit"));
        (dir, Workspace::new(&root), database)
    }

    #[test]
    fn relativize_paths() -> Result<()> {
        let (_dir, ws, _) = workspace();
        assert_eq!(ws.relativize(Utf8Path::new("a/./b/../c"))?, "a/c");
        assert_eq!(ws.relativize(Utf8Path::new("."))?, "");
        assert_eq!(ws.relativize(&ws.root().join("x/y"))?, "x/y");
        assert!(matches!(
            ws.relativize(Utf8Path::new("../escape")),
            Err(Error::OutsideRepository(_))
        ));
        assert!(matches!(
            ws.relativize(Utf8Path::new("/somewhere/else")),
            Err(Error::OutsideRepository(_))
        ));
        Ok(())
    }

    #[test]
    fn list_files_skips_ignored() -> Result<()> {
        let (_dir, ws, _) = workspace();
        let root = ws.root().to_owned();
        crate::create_test_files!(root, ["b.txt", "a/x.o", "a/y.c", "build/out", ".rit/HEAD"]);
        let ignore = IgnoreMatcher::parse("*.o\nbuild/\n")?;

        assert_eq!(ws.list_files(Utf8Path::new(""), &ignore)?, ["a/y.c", "b.txt"]);
        assert_eq!(ws.list_files(Utf8Path::new("a"), &ignore)?, ["a/y.c"]);
        Ok(())
    }

    #[test]
    fn build_tree_matches_git() -> Result<()> {
        let (_dir, ws, db) = workspace();
        let root = ws.root().to_owned();
        crate::create_test_files!(root, ["a/b/c.txt"]);
        std::fs::create_dir_all(root.join("empty/dir")).unwrap();

        let oid = ws.build_tree(&db, Utf8Path::new(""), &IgnoreMatcher::default())?;
        assert_eq!(oid.to_hex(), "86fd91b1c8d427d3577466833d9d686e85cd48df");
        assert!(db.exists(&"c3b2f03652d76b13a2ddb3a5da088ce7b203b3c8".parse().unwrap()));
        assert!(db.exists(&"bfc88425b0e2f167af3f1cfa9db193edf752b13b".parse().unwrap()));
        Ok(())
    }

    #[test]
    fn build_tree_records_modes() -> Result<()> {
        let (_dir, ws, db) = workspace();
        let root = ws.root().to_owned();
        crate::create_test_files!(root, ["file1", "file2", "file3"]);
        std::fs::set_permissions(root.join("file1"), Permissions::from_mode(0o644)).unwrap();
        std::fs::set_permissions(root.join("file2"), Permissions::from_mode(0o755)).unwrap();
        std::fs::set_permissions(root.join("file3"), Permissions::from_mode(0o655)).unwrap();
        std::os::unix::fs::symlink("file1", root.join("link")).unwrap();

        let oid = ws.build_tree(&db, Utf8Path::new(""), &IgnoreMatcher::default())?;
        let tree = db.load_tree(&oid)?;
        let modes: Vec<_> = tree.entries().iter().map(|e| (e.name.as_str(), e.mode)).collect();
        assert_eq!(
            modes,
            [
                ("file1", FileMode::REGULAR),
                ("file2", FileMode::EXECUTABLE),
                ("file3", FileMode::REGULAR),
                ("link", FileMode::SYMLINK),
            ]
        );
        assert_eq!(db.load_blob(&tree.entries()[3].oid)?.data(), b"file1");
        Ok(())
    }

    #[test]
    fn write_and_remove_files() -> Result<()> {
        let (_dir, ws, _) = workspace();
        ws.write_file(Utf8Path::new("a/b/run.sh"), b"#!/bin/sh\n", FileMode::EXECUTABLE)?;
        ws.write_file(Utf8Path::new("a/link"), b"b/run.sh", FileMode::SYMLINK)?;

        let (mode, _) = ws.hash_file(Utf8Path::new("a/b/run.sh"))?.unwrap();
        assert_eq!(mode, FileMode::EXECUTABLE);
        let (mode, oid) = ws.hash_file(Utf8Path::new("a/link"))?.unwrap();
        assert_eq!(mode, FileMode::SYMLINK);
        assert_eq!(oid, Digest::for_object(ObjectKind::Blob, b"b/run.sh"));

        ws.remove_file(Utf8Path::new("a/b/run.sh"))?;
        assert!(!ws.root().join("a/b").exists());
        assert!(ws.root().join("a").exists());
        assert_eq!(ws.hash_file(Utf8Path::new("a/b/run.sh"))?, None);
        Ok(())
    }
}
