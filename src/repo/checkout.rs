use std::collections::{BTreeMap, BTreeSet};

use camino::Utf8PathBuf;
use tracing::*;

use super::ignore::IgnoreMatcher;
use super::index::Index;
use super::refs::is_valid_ref_name;
use super::status::Change;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::filemode::FileMode;

impl super::Repo {
    /// Switch the working tree, index and HEAD to `target`, returning the commit checked out.
    ///
    /// A branch name leaves HEAD attached to that branch. Any other revision detaches HEAD.
    /// Uncommitted changes to tracked files make this fail with [`Error::DirtyWorktree`], and
    /// untracked files in the way of the target's files make it fail with
    /// [`Error::UntrackedOverwritten`]. With `force`, both are overwritten. Untracked files the
    /// target does not touch are left alone.
    pub fn checkout(&self, target: &str, force: bool) -> Result<Digest> {
        let branch_tip = if is_valid_ref_name(target) {
            self.refs.read_branch(target)?
        } else {
            None
        };
        let (oid, branch) = match branch_tip {
            Some(oid) => (oid, Some(target)),
            None => (self.resolve_revision(target)?, None),
        };
        trace!(target, %oid, force, "Checking out");

        let tree = self.database.load_commit(&oid)?.tree;
        let target_files = self.database.flatten_tree(&tree)?;

        let tracked: BTreeSet<Utf8PathBuf> = self
            .index()?
            .entries()
            .map(|e| e.path().to_owned())
            .chain(self.head_files()?.into_keys())
            .collect();

        if !force {
            let dirty: Vec<String> = self
                .status()?
                .iter()
                .filter(|(_, change)| *change != Change::Untracked)
                .map(|(path, _)| path.to_string())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            if !dirty.is_empty() {
                return Err(Error::DirtyWorktree(dirty));
            }

            let blocking = self.untracked_in_the_way(&target_files, &tracked)?;
            if !blocking.is_empty() {
                return Err(Error::UntrackedOverwritten(blocking));
            }
        }

        for path in tracked.iter().filter(|p| !target_files.contains_key(*p)) {
            debug!(%path, "Removing file absent from target");
            self.workspace.remove_file(path)?;
        }

        let mut index = Index::new(&self.index_path);
        for (path, &(mode, blob)) in &target_files {
            if self.workspace.hash_file(path)? != Some((mode, blob)) {
                let data = self.database.load_blob(&blob)?.into_data();
                self.workspace.write_file(path, &data, mode)?;
            }
            index.stage(&self.database, &self.workspace, path)?;
        }
        index.save()?;

        match branch {
            Some(name) => self.refs.set_head_to_branch(name)?,
            None => self.refs.set_head_detached(&oid)?,
        }
        Ok(oid)
    }

    /// Untracked paths that writing `target_files` would replace, sorted.
    ///
    /// That is an untracked file with other contents at a target path, anything untracked inside
    /// a directory where a target file goes, or an untracked file where a target directory goes.
    /// Ignored files count too, since they would be lost just the same.
    fn untracked_in_the_way(
        &self,
        target_files: &BTreeMap<Utf8PathBuf, (FileMode, Digest)>,
        tracked: &BTreeSet<Utf8PathBuf>,
    ) -> Result<Vec<String>> {
        let everything = IgnoreMatcher::default();
        let mut blocking = BTreeSet::new();

        'files: for (path, &entry) in target_files {
            if tracked.contains(path) {
                continue;
            }

            // Outermost first, since nothing can be looked up beneath a file
            let mut dirs: Vec<_> = path.ancestors().skip(1).collect();
            dirs.pop();
            for dir in dirs.into_iter().rev() {
                match self.workspace.stat(dir)? {
                    Some(metadata) if metadata.is_dir() => {}
                    Some(_) => {
                        if !tracked.contains(dir) {
                            blocking.insert(dir.to_string());
                        }
                        continue 'files;
                    }
                    None => continue 'files,
                }
            }

            match self.workspace.stat(path)? {
                None => {}
                Some(metadata) if metadata.is_dir() => {
                    let inside = self.workspace.list_files(path, &everything)?;
                    blocking.extend(
                        inside
                            .iter()
                            .filter(|p| !tracked.contains(p.as_path()))
                            .map(Utf8PathBuf::to_string),
                    );
                }
                Some(_) => {
                    if self.workspace.hash_file(path)? != Some(entry) {
                        blocking.insert(path.to_string());
                    }
                }
            }
        }

        if !blocking.is_empty() {
            debug!(?blocking, "Untracked files block checkout");
        }
        Ok(blocking.into_iter().collect())
    }
}
