use tracing::*;

use crate::digest::Digest;
use crate::error::{Error, Result};

impl super::Repo {
    /// Create a branch at `start`, or at HEAD when no start revision is given.
    pub fn create_branch(&self, name: &str, start: Option<&str>) -> Result<Digest> {
        let oid = match start {
            Some(rev) => self.resolve_revision(rev)?,
            None => self.head_commit()?,
        };
        self.refs.create_branch(name, &oid)?;
        Ok(oid)
    }

    /// Delete a branch, returning the commit it pointed at.
    ///
    /// Unless `force` is set, the branch must be merged: its commit has to be reachable from
    /// HEAD. The checked-out branch can never be deleted.
    pub fn delete_branch(&self, name: &str, force: bool) -> Result<Digest> {
        if self.refs.read_head()?.branch() == Some(name) {
            return Err(Error::BranchCheckedOut(name.to_owned()));
        }

        let oid = self
            .refs
            .read_branch(name)?
            .ok_or_else(|| Error::RefNotFound(name.to_owned()))?;

        if !force {
            let merged = match self.refs.head_commit()? {
                Some(tip) => self.is_ancestor(&oid, &tip)?,
                None => false,
            };
            if !merged {
                debug!(branch = name, %oid, "Refusing to delete unmerged branch");
                return Err(Error::NotMerged(name.to_owned()));
            }
        }

        self.refs.remove_branch(name)
    }

    /// Create a lightweight tag at `target`, or at HEAD when no target is given.
    pub fn create_tag(&self, name: &str, target: Option<&str>) -> Result<Digest> {
        let oid = match target {
            Some(rev) => self.resolve_revision(rev)?,
            None => self.head_commit()?,
        };
        self.refs.create_tag(name, &oid)?;
        Ok(oid)
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8Path;
    use pretty_assertions::assert_eq;
    use tempdir::TempDir;

    use super::super::Repo;
    use super::*;
    use crate::storable::commit::{Signature, Timestamp};
    use crate::storable::tree::Tree;
    use crate::test::{COMMIT_EMAIL, COMMIT_NAME};

    fn commit(repo: &Repo, parents: &[Digest], message: &str) -> Digest {
        let tree = repo
            .database()
            .store_object(&Tree::new(Vec::new()).unwrap())
            .unwrap();
        let sig = Signature::new(COMMIT_NAME, COMMIT_EMAIL, Timestamp::new(1_650_000_000, 0));
        repo.create_commit(tree, parents.to_vec(), sig.clone(), sig, message)
            .unwrap()
    }

    #[test]
    fn unborn_branch_has_nothing_to_branch_from() -> Result<()> {
        let dir = TempDir::new("rit").unwrap();
        let repo = Repo::init(Utf8Path::from_path(dir.path()).unwrap())?;
        assert!(matches!(
            repo.create_branch("topic", None),
            Err(Error::NoCommits(b)) if b == "main"
        ));
        Ok(())
    }

    #[test]
    fn delete_checks_merge_state() -> Result<()> {
        let dir = TempDir::new("rit").unwrap();
        let repo = Repo::init(Utf8Path::from_path(dir.path()).unwrap())?;

        let base = commit(&repo, &[], "base");
        repo.refs().update_head(&base)?;
        let merged = repo.create_branch("merged", None)?;
        assert_eq!(merged, base);

        let ahead = commit(&repo, &[base], "ahead");
        repo.refs().create_branch("ahead", &ahead)?;

        assert!(matches!(
            repo.delete_branch("main", false),
            Err(Error::BranchCheckedOut(_))
        ));
        assert!(matches!(
            repo.delete_branch("ahead", false),
            Err(Error::NotMerged(_))
        ));
        assert!(matches!(
            repo.delete_branch("missing", true),
            Err(Error::RefNotFound(_))
        ));

        assert_eq!(repo.delete_branch("merged", false)?, base);
        assert_eq!(repo.delete_branch("ahead", true)?, ahead);

        let names: Vec<_> = repo
            .refs()
            .list_branches()?
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, ["main"]);
        Ok(())
    }

    #[test]
    fn tags_resolve_revisions() -> Result<()> {
        let dir = TempDir::new("rit").unwrap();
        let repo = Repo::init(Utf8Path::from_path(dir.path()).unwrap())?;
        let base = commit(&repo, &[], "base");
        let next = commit(&repo, &[base], "next");
        repo.refs().update_head(&next)?;

        assert_eq!(repo.create_tag("v1", Some("HEAD^"))?, base);
        assert_eq!(repo.create_tag("v2", None)?, next);
        assert!(matches!(
            repo.create_tag("v1", None),
            Err(Error::RefAlreadyExists(_))
        ));
        assert_eq!(
            repo.refs().list_tags()?,
            [("v1".to_owned(), base), ("v2".to_owned(), next)]
        );
        Ok(())
    }
}
