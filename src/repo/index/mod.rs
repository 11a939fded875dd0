mod parse;
mod write;

use std::collections::BTreeMap;
use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::*;

use super::database::Database;
use super::ignore::IgnoreMatcher;
use super::workspace::Workspace;
use crate::digest::Digest;
use crate::error::{Error, IoResultExt, Result};
use crate::filemode::FileMode;
use crate::lock::LockedFile;
use crate::storable::tree::{Tree, TreeEntry};
use crate::storable::ObjectKind;

struct IndexHeader {
    magic: [u8; 4],
    version: u32,
    num_entries: u32,
}

impl IndexHeader {
    const MAGIC: [u8; 4] = *b"DIRC";
    const VERSION: u32 = 2;

    fn has_valid_magic(&self) -> bool {
        self.magic == Self::MAGIC
    }
}

/// One staged file. Mirrors an entry of git's version 2 index.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct IndexEntry {
    ctime_s: u32,
    ctime_n: u32,

    mtime_s: u32,
    mtime_n: u32,

    dev: u32,
    ino: u32,

    mode: FileMode,

    uid: u32,
    gid: u32,
    siz: u32,
    oid: Digest,
    flags: u16,
    path: String,
}

impl IndexEntry {
    const MAX_PATH_SIZE: u16 = 0xfff;

    /// Build an entry from a file's `lstat` metadata. The on-disk format only has room for 32
    /// bits per field, so larger values are truncated the same way git truncates them.
    pub fn create(path: &Utf8Path, oid: Digest, metadata: &Metadata) -> Self {
        let flags = path
            .as_str()
            .len()
            .try_into()
            .unwrap_or(Self::MAX_PATH_SIZE)
            .min(Self::MAX_PATH_SIZE);

        Self {
            ctime_s: metadata.ctime() as u32,
            ctime_n: metadata.ctime_nsec() as u32,
            mtime_s: metadata.mtime() as u32,
            mtime_n: metadata.mtime_nsec() as u32,
            dev: metadata.dev() as u32,
            ino: metadata.ino() as u32,
            mode: FileMode::from_metadata(metadata),
            uid: metadata.uid(),
            gid: metadata.gid(),
            siz: metadata.size() as u32,
            oid,
            flags,
            path: path.as_str().to_owned(),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        Utf8Path::new(&self.path)
    }

    pub fn oid(&self) -> &Digest {
        &self.oid
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn size(&self) -> u32 {
        self.siz
    }

    /// Modification time as `(seconds, nanoseconds)`.
    pub fn mtime(&self) -> (u32, u32) {
        (self.mtime_s, self.mtime_n)
    }

    /// The directories containing this entry, outermost first. `a/b/c.txt` gives `a`, `a/b`.
    pub fn parents(&self) -> impl Iterator<Item = &str> {
        self.path.match_indices('/').map(|(i, _)| &self.path[..i])
    }
}

/// The staging area: a table of path -> staged blob, persisted as a whole file.
#[derive(Debug)]
pub struct Index {
    path: Utf8PathBuf,
    // Keyed by the path string so iteration follows git's byte-wise index order
    entries: BTreeMap<String, IndexEntry>,
}

impl Index {
    /// An empty index that will be saved to `path`.
    pub fn new(path: impl AsRef<Utf8Path>) -> Self {
        Self {
            path: path.as_ref().to_owned(),
            entries: BTreeMap::new(),
        }
    }

    /// Read the index at `path`. A missing file is an empty index.
    pub fn load(path: impl AsRef<Utf8Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(%path, "No index file, starting empty");
                return Ok(Self::new(path));
            }
            Err(e) => return Err(Error::io(path, e)),
        };

        let entries = parse::parse_index(&bytes)?
            .into_iter()
            .map(|e| (e.path.clone(), e))
            .collect::<BTreeMap<_, _>>();

        trace!(%path, "Opened index with {} entries", entries.len());

        Ok(Self {
            path: path.to_owned(),
            entries,
        })
    }

    /// Replace the index file with the current entries.
    ///
    /// The new contents are written to `index.lock` and renamed over the old file, so a failure
    /// leaves the previous index intact.
    pub fn save(&self) -> Result<()> {
        trace!(path=%self.path, "Writing index with {} entries", self.entries.len());
        let bytes = write::write_index(self.entries.values())?;
        LockedFile::write_file(&self.path, &bytes)
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> + '_ {
        self.entries.values()
    }

    pub fn get(&self, path: &Utf8Path) -> Option<&IndexEntry> {
        self.entries.get(path.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Whether `path` is staged, either as a file or as a directory containing staged files.
    pub fn is_tracked(&self, path: &Utf8Path) -> bool {
        self.entries.contains_key(path.as_str()) || self.children_of(path.as_str()).next().is_some()
    }

    fn children_of<'a>(&'a self, dir: &str) -> impl Iterator<Item = &'a String> + 'a {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        self.entries
            .range(prefix.clone()..)
            .map(|(k, _)| k)
            .take_while(move |k| k.starts_with(&prefix))
    }

    /// Insert or replace an entry, discarding entries it cannot coexist with.
    pub fn add(&mut self, entry: IndexEntry) {
        trace!(path = entry.path, oid=%entry.oid, "Adding entry to index");
        self.discard_conflicts(&entry);
        self.entries.insert(entry.path.clone(), entry);
    }

    /// A file replaces any directory of the same name, and a directory replaces any file of the
    /// same name as one of its parents.
    fn discard_conflicts(&mut self, entry: &IndexEntry) {
        for dir in entry.parents() {
            if self.entries.remove(dir).is_some() {
                debug!(path = dir, "Removing file replaced by directory");
            }
        }
        self.remove_children(&entry.path);
    }

    fn remove_children(&mut self, dir: &str) {
        let children: Vec<String> = self.children_of(dir).cloned().collect();
        for child in children {
            debug!(path = child, "Removing entry under replaced directory");
            self.entries.remove(&child);
        }
    }

    /// Unstage `path`, and everything below it if it is a directory. Returns whether anything
    /// was removed.
    pub fn remove(&mut self, path: &Utf8Path) -> bool {
        let before = self.entries.len();
        if !path.as_str().is_empty() {
            self.entries.remove(path.as_str());
        }
        self.remove_children(path.as_str());
        before != self.entries.len()
    }

    /// Hash and store the current contents of `path` (relative to the workspace root) and
    /// stage them. The file is always re-read and re-hashed.
    pub fn stage(
        &mut self,
        database: &Database,
        workspace: &Workspace,
        path: &Utf8Path,
    ) -> Result<Digest> {
        let full_path = workspace.root().join(path);
        let metadata = workspace
            .stat(path)?
            .ok_or_else(|| Error::io(&full_path, std::io::ErrorKind::NotFound.into()))?;
        if metadata.is_dir() {
            return Err(Error::io(
                &full_path,
                std::io::Error::new(std::io::ErrorKind::Other, "is a directory"),
            ));
        }

        let data = workspace.read(path, &metadata)?;
        let oid = database.store(ObjectKind::Blob, &data)?;
        // Stat again after reading: the entry should describe the file the blob came from
        let metadata = full_path.symlink_metadata().at(&full_path)?;
        self.add(IndexEntry::create(path, oid, &metadata));
        Ok(oid)
    }

    /// Stage every non-ignored file under `dir`, and unstage files under `dir` that no longer
    /// exist. Returns the staged paths.
    pub fn stage_directory(
        &mut self,
        database: &Database,
        workspace: &Workspace,
        dir: &Utf8Path,
        ignore: &IgnoreMatcher,
    ) -> Result<Vec<Utf8PathBuf>> {
        let files = workspace.list_files(dir, ignore)?;
        for file in &files {
            self.stage(database, workspace, file)?;
        }

        let missing: Vec<String> = self
            .children_of(dir.as_str())
            .filter(|path| workspace.root().join(path).symlink_metadata().is_err())
            .cloned()
            .collect();
        for path in missing {
            debug!(%path, "Unstaging deleted file");
            self.entries.remove(&path);
        }

        Ok(files)
    }

    /// Store the staged files as a hierarchy of trees, returning the root tree's id.
    ///
    /// Entries are grouped by directory and the deepest directories are written first, so every
    /// tree only references objects that are already stored.
    pub fn build_tree(&self, database: &Database) -> Result<Digest> {
        let mut dirs: BTreeMap<&str, Vec<TreeEntry>> = BTreeMap::new();
        dirs.insert("", Vec::new());

        for entry in self.entries.values() {
            for dir in entry.parents() {
                dirs.entry(dir).or_default();
            }
            let (dir, name) = split_parent(&entry.path);
            dirs.entry(dir)
                .or_default()
                .push(TreeEntry::new(entry.mode, name, entry.oid));
        }

        let mut order: Vec<&str> = dirs.keys().copied().collect();
        order.sort_by_key(|dir| std::cmp::Reverse(depth(dir)));

        for dir in order {
            let entries = dirs.remove(dir).unwrap_or_default();
            let tree = Tree::from_unsorted(entries)?;
            let oid = database.store_object(&tree)?;
            trace!(dir, %oid, "Stored tree");

            if dir.is_empty() {
                return Ok(oid);
            }
            let (parent, name) = split_parent(dir);
            dirs.entry(parent)
                .or_default()
                .push(TreeEntry::new(FileMode::DIRECTORY, name, oid));
        }

        unreachable!("the root directory is always present and always visited last")
    }
}

fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", path),
    }
}

fn depth(dir: &str) -> usize {
    if dir.is_empty() {
        0
    } else {
        dir.matches('/').count() + 1
    }
}

#[cfg(test)]
mod tests {
    use std::fs::Permissions;
    use std::os::unix::prelude::PermissionsExt;

    use pretty_assertions::assert_eq;
    use tempdir::TempDir;

    use super::*;

    struct Fixture {
        _dir: TempDir,
        root: Utf8PathBuf,
        database: Database,
        workspace: Workspace,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new("rit").unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().to_owned();
        Fixture {
            database: Database::new(root.join(".rit")),
            workspace: Workspace::new(&root),
            root,
            _dir: dir,
        }
    }

    fn paths(index: &Index) -> Vec<&str> {
        index.entries().map(|e| e.path().as_str()).collect()
    }

    #[test]
    fn missing_file_is_empty() -> Result<()> {
        let f = fixture();
        let index = Index::load(f.root.join(".rit/index"))?;
        assert!(index.is_empty());
        Ok(())
    }

    #[test]
    fn save_and_load() -> Result<()> {
        let f = fixture();
        let root = &f.root;
        crate::create_test_files!(root, ["file1", "a/b/c.txt"]);
        std::fs::create_dir_all(root.join(".rit")).unwrap();

        let mut index = Index::new(root.join(".rit/index"));
        let oid = index.stage(&f.database, &f.workspace, Utf8Path::new("a/b/c.txt"))?;
        index.stage(&f.database, &f.workspace, Utf8Path::new("file1"))?;
        index.save()?;
        assert!(!root.join(".rit/index.lock").exists());

        let loaded = Index::load(root.join(".rit/index"))?;
        assert_eq!(paths(&loaded), ["a/b/c.txt", "file1"]);

        let entry = loaded.get(Utf8Path::new("a/b/c.txt")).unwrap();
        assert_eq!(entry, index.get(Utf8Path::new("a/b/c.txt")).unwrap());
        assert_eq!(entry.oid(), &oid);
        assert_eq!(oid.to_hex(), "bfc88425b0e2f167af3f1cfa9db193edf752b13b");
        assert_eq!(entry.size(), "\"a/b/c.txt\"-contents\n".len() as u32);
        assert_eq!(entry.mode(), FileMode::REGULAR);
        Ok(())
    }

    #[test]
    fn restaging_rehashes_content() -> Result<()> {
        let f = fixture();
        let root = &f.root;
        crate::create_test_files!(root, ["file1"]);

        let mut index = Index::new(root.join(".rit/index"));
        let before = index.stage(&f.database, &f.workspace, Utf8Path::new("file1"))?;
        assert_eq!(
            index.stage(&f.database, &f.workspace, Utf8Path::new("file1"))?,
            before
        );

        // Same size, same mtime: only the content tells them apart
        let mtime = filetime::FileTime::from_last_modification_time(
            &std::fs::metadata(root.join("file1")).unwrap(),
        );
        std::fs::write(root.join("file1"), "\"file1\"-CONTENTS\n").unwrap();
        filetime::set_file_mtime(root.join("file1"), mtime).unwrap();

        let after = index.stage(&f.database, &f.workspace, Utf8Path::new("file1"))?;
        assert_ne!(before, after);
        assert_eq!(index.len(), 1);
        Ok(())
    }

    #[test]
    fn stage_missing_file_fails() {
        let f = fixture();
        let mut index = Index::new(f.root.join(".rit/index"));
        let err = index
            .stage(&f.database, &f.workspace, Utf8Path::new("nope"))
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[test]
    /// Stage "file1" and "file2". Then delete "file1" and stage "file1/file3" in its place.
    ///
    /// "file1" cannot exist alongside "file1/file3", so it should be dropped from the index.
    fn dir_replaces_file() -> Result<()> {
        let f = fixture();
        let root = &f.root;
        crate::create_test_files!(root, ["file1", "file2"]);

        let mut index = Index::new(root.join(".rit/index"));
        index.stage(&f.database, &f.workspace, Utf8Path::new("file1"))?;
        index.stage(&f.database, &f.workspace, Utf8Path::new("file2"))?;

        std::fs::remove_file(root.join("file1")).unwrap();
        crate::create_test_files!(root, ["file1/file3"]);
        index.stage(&f.database, &f.workspace, Utf8Path::new("file1/file3"))?;

        assert_eq!(paths(&index), ["file1/file3", "file2"]);
        Ok(())
    }

    #[test]
    /// Stage a file with the same name as a previously staged directory.
    ///
    /// The directory, and everything inside it, should be dropped from the index.
    fn file_replaces_dir() -> Result<()> {
        let f = fixture();
        let root = &f.root;
        crate::create_test_files!(root, ["file1/file2/file3", "file1/file2/file4", "file1.txt", "file5"]);

        let mut index = Index::new(root.join(".rit/index"));
        index.stage_directory(&f.database, &f.workspace, Utf8Path::new(""), &IgnoreMatcher::default())?;
        assert_eq!(
            paths(&index),
            ["file1.txt", "file1/file2/file3", "file1/file2/file4", "file5"]
        );

        std::fs::remove_dir_all(root.join("file1")).unwrap();
        crate::create_test_files!(root, ["file1"]);
        index.stage(&f.database, &f.workspace, Utf8Path::new("file1"))?;

        assert_eq!(paths(&index), ["file1", "file1.txt", "file5"]);
        Ok(())
    }

    #[test]
    fn stage_directory_respects_ignores_and_deletions() -> Result<()> {
        let f = fixture();
        let root = &f.root;
        crate::create_test_files!(root, ["src/main.rs", "src/lib.rs", "src/lib.o", "README"]);
        let ignore = IgnoreMatcher::parse("*.o\n")?;

        let mut index = Index::new(root.join(".rit/index"));
        let staged =
            index.stage_directory(&f.database, &f.workspace, Utf8Path::new(""), &ignore)?;
        assert_eq!(staged, ["README", "src/lib.rs", "src/main.rs"]);

        std::fs::remove_file(root.join("src/lib.rs")).unwrap();
        std::fs::remove_file(root.join("README")).unwrap();
        index.stage_directory(&f.database, &f.workspace, Utf8Path::new("src"), &ignore)?;

        // README is outside `src`, so it stays staged
        assert_eq!(paths(&index), ["README", "src/main.rs"]);
        Ok(())
    }

    #[test]
    fn remove_entries() -> Result<()> {
        let f = fixture();
        let root = &f.root;
        crate::create_test_files!(root, ["a/b/c.txt", "a/d.txt", "ab"]);

        let mut index = Index::new(root.join(".rit/index"));
        index.stage_directory(&f.database, &f.workspace, Utf8Path::new(""), &IgnoreMatcher::default())?;

        assert!(index.is_tracked(Utf8Path::new("a")));
        assert!(index.remove(Utf8Path::new("a/b")));
        assert_eq!(paths(&index), ["a/d.txt", "ab"]);
        assert!(!index.remove(Utf8Path::new("missing")));
        assert!(index.remove(Utf8Path::new("a")));
        assert_eq!(paths(&index), ["ab"]);
        assert!(!index.is_tracked(Utf8Path::new("a")));
        Ok(())
    }

    #[test]
    fn tree_from_index_matches_tree_from_directory() -> Result<()> {
        let f = fixture();
        let root = &f.root;
        crate::create_test_files!(root, ["file1", "file2", "a/b/c.txt", "a/b.txt", "a.txt", "z/y/x"]);
        std::fs::set_permissions(root.join("file2"), Permissions::from_mode(0o755)).unwrap();
        std::os::unix::fs::symlink("file1", root.join("link")).unwrap();

        let ignore = IgnoreMatcher::default();
        let mut index = Index::new(root.join(".rit/index"));
        index.stage_directory(&f.database, &f.workspace, Utf8Path::new(""), &ignore)?;

        let from_index = index.build_tree(&f.database)?;
        let from_directory = f.workspace.build_tree(&f.database, Utf8Path::new(""), &ignore)?;
        assert_eq!(from_index, from_directory);
        Ok(())
    }

    #[test]
    fn tree_from_index_matches_git() -> Result<()> {
        let f = fixture();
        let root = &f.root;
        crate::create_test_files!(root, ["a/b/c.txt"]);

        let mut index = Index::new(root.join(".rit/index"));
        index.stage(&f.database, &f.workspace, Utf8Path::new("a/b/c.txt"))?;
        assert_eq!(
            index.build_tree(&f.database)?.to_hex(),
            "86fd91b1c8d427d3577466833d9d686e85cd48df"
        );

        assert_eq!(
            Index::new(root.join(".rit/index")).build_tree(&f.database)?.to_hex(),
            "4b825dc642cb6eb9a060e54bf8d69288fbee4904"
        );
        Ok(())
    }
}
