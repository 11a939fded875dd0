use std::collections::BTreeMap;
use std::fmt::Display;

use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;
use tap::Tap;
use tracing::trace;

use super::history::ResolvedHead;
use super::index::IndexEntry;
use super::Repo;
use crate::digest::Digest;
use crate::filemode::FileMode;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Change {
    /// Staged, and differs from HEAD or is absent from it
    IndexAdded,
    IndexModified,
    IndexRemoved,
    /// The working copy differs from what is staged
    Modified,
    Removed,
    Untracked,
}

impl Change {
    pub fn is_staged(self) -> bool {
        matches!(
            self,
            Change::IndexAdded | Change::IndexModified | Change::IndexRemoved
        )
    }

    /// Long form, as shown in `status` listings.
    pub fn describe(self) -> &'static str {
        match self {
            Change::IndexAdded => "new file",
            Change::IndexModified | Change::Modified => "modified",
            Change::IndexRemoved | Change::Removed => "deleted",
            Change::Untracked => "untracked",
        }
    }
}

impl Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::Untracked => write!(f, "??"),
            Change::Modified => write!(f, " M"),
            Change::Removed => write!(f, " D"),
            Change::IndexAdded => write!(f, "A "),
            Change::IndexRemoved => write!(f, "D "),
            Change::IndexModified => write!(f, "M "),
        }
    }
}

/// The differences between the working tree, the index, and the HEAD commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    /// Sorted by path. A path can appear twice, once staged and once unstaged.
    changes: Vec<(Utf8PathBuf, Change)>,
}

impl Status {
    pub fn changes(&self) -> &[(Utf8PathBuf, Change)] {
        &self.changes
    }

    pub fn is_clean(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn staged(&self) -> impl Iterator<Item = (&Utf8Path, Change)> + '_ {
        self.iter().filter(|(_, c)| c.is_staged())
    }

    pub fn unstaged(&self) -> impl Iterator<Item = (&Utf8Path, Change)> + '_ {
        self.iter()
            .filter(|(_, c)| !c.is_staged() && *c != Change::Untracked)
    }

    pub fn untracked(&self) -> impl Iterator<Item = &Utf8Path> + '_ {
        self.iter()
            .filter(|(_, c)| *c == Change::Untracked)
            .map(|(p, _)| p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Utf8Path, Change)> + '_ {
        self.changes.iter().map(|(p, c)| (p.as_path(), *c))
    }
}

impl Repo {
    /// Files of the HEAD commit's tree, or nothing on an unborn branch.
    pub(super) fn head_files(&self) -> Result<BTreeMap<Utf8PathBuf, (FileMode, Digest)>> {
        match self.resolve_head()? {
            ResolvedHead::Commit(oid) => {
                let commit = self.database.load_commit(&oid)?;
                self.database.flatten_tree(&commit.tree)
            }
            ResolvedHead::NoCommits(_) => Ok(BTreeMap::new()),
        }
    }

    /// Compare the working tree against the index, and the index against HEAD.
    ///
    /// Files are compared by content hash and mode only, never by timestamps. Working tree
    /// files are hashed in parallel.
    pub fn status(&self) -> Result<Status> {
        let index = self.index()?;
        let ignore = self.ignore_matcher()?;
        let head = self.head_files()?;
        let files = self.workspace.list_files(Utf8Path::new(""), &ignore)?;

        let untracked = files
            .into_iter()
            .filter(|path| index.get(path).is_none())
            .map(|path| (path, Change::Untracked));

        let entries: Vec<&IndexEntry> = index.entries().collect();
        let tracked = entries
            .par_iter()
            .map(|entry| self.classify_entry(entry, &head))
            .collect::<Result<Vec<_>>>()?;

        let removed_from_index = head
            .keys()
            .filter(|path| index.get(path).is_none())
            .map(|path| (path.clone(), Change::IndexRemoved));

        let changes = untracked
            .chain(tracked.into_iter().flatten())
            .chain(removed_from_index)
            .collect::<Vec<_>>()
            .tap_mut(|v| v.sort_unstable());

        trace!("Found {} changes", changes.len());
        Ok(Status { changes })
    }

    fn classify_entry(
        &self,
        entry: &IndexEntry,
        head: &BTreeMap<Utf8PathBuf, (FileMode, Digest)>,
    ) -> Result<Vec<(Utf8PathBuf, Change)>> {
        let path = entry.path();
        let mut changes = Vec::new();

        match head.get(path) {
            None => changes.push((path.to_owned(), Change::IndexAdded)),
            Some(&(mode, oid)) if mode != entry.mode() || oid != *entry.oid() => {
                changes.push((path.to_owned(), Change::IndexModified))
            }
            Some(_) => {}
        }

        match self.workspace.hash_file(path)? {
            None => changes.push((path.to_owned(), Change::Removed)),
            Some((mode, oid)) if mode != entry.mode() || oid != *entry.oid() => {
                changes.push((path.to_owned(), Change::Modified))
            }
            Some(_) => {}
        }

        Ok(changes)
    }
}
