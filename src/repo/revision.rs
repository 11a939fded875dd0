//! A revision is valid if it matches the following (informally defined) context-free grammar:
//! `<rev>` = `<refname>`
//! `<rev>` = `<rev>^`
//! `<rev>` = `<rev>~<num>`
//! `<num>` = a natural number
//! `<refname>` = a branch name | a tag name | a sha1 hash or a prefix of one | "HEAD" or '@'

use std::str::FromStr;

use tracing::debug;

use super::refs::is_valid_ref_name;
use super::Repo;
use crate::digest::Digest;
use crate::error::{Error, Result};

/// Shortest hash prefix accepted as a revision.
pub const MIN_PREFIX_LEN: usize = 4;

#[derive(Debug, PartialEq, Eq)]
pub struct Rev {
    refname: Refname,
    distance: u64,
}

impl Rev {
    pub fn parse(mut input: &str) -> Result<Self> {
        let original = input;
        let invalid = || Error::RefNotFound(original.to_owned());

        let mut distance: u64 = 0;
        loop {
            if let Some(rest) = input.strip_suffix('^') {
                distance = distance.checked_add(1).ok_or_else(invalid)?;
                input = rest;
            } else if let Some(idx) = input.rfind('~') {
                let n = input[idx + 1..].parse::<u64>().map_err(|_| invalid())?;
                distance = distance.checked_add(n).ok_or_else(invalid)?;
                input = &input[..idx];
            } else {
                let refname = Refname::parse(input).ok_or_else(invalid)?;
                break Ok(Rev { refname, distance });
            }
        }
    }

    /// Resolve to a commit id, following first parents `distance` times.
    pub fn resolve(self, repo: &Repo) -> Result<Digest> {
        let Self { refname, distance } = self;

        let mut oid = refname.resolve(repo)?;
        for _ in 0..distance {
            let commit = repo.database.load_commit(&oid)?;
            oid = *commit
                .first_parent()
                .ok_or_else(|| Error::RefNotFound(format!("{oid}~1 (root commit has no parent)")))?;
        }

        // Make sure the end result is a commit
        repo.database.load_commit(&oid)?;
        Ok(oid)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Refname {
    BranchTag(String),
    Sha1(Digest),
    PartialSha1(String),
    Head,
}

impl Refname {
    fn parse(input: &str) -> Option<Self> {
        if matches!(input, "HEAD" | "@") {
            return Some(Self::Head);
        }

        if let Ok(digest) = Digest::from_str(input) {
            return Some(Self::Sha1(digest));
        }

        if input.len() >= MIN_PREFIX_LEN
            && input.len() < Digest::HEX_LEN
            && input.chars().all(|c| c.is_ascii_hexdigit())
        {
            return Some(Self::PartialSha1(input.to_owned()));
        }

        is_valid_ref_name(input).then(|| Self::BranchTag(input.to_owned()))
    }

    fn resolve(&self, repo: &Repo) -> Result<Digest> {
        fn branchtag(name: &str, repo: &Repo) -> Result<Option<Digest>> {
            if let Some(oid) = repo.refs.read_branch(name)? {
                return Ok(Some(oid));
            }
            repo.refs.read_tag(name)
        }

        match self {
            Refname::Head => repo.head_commit(),

            Refname::Sha1(oid) => {
                if repo.database.exists(oid) {
                    Ok(*oid)
                } else {
                    Err(Error::ObjectNotFound(*oid))
                }
            }

            Refname::PartialSha1(candidate) => {
                // Refs take precedence, so a branch called `cafe` is not shadowed by an object
                if let Some(oid) = branchtag(candidate, repo)? {
                    return Ok(oid);
                }

                let candidates = repo.database.find_by_prefix(candidate)?;
                match candidates.as_slice() {
                    [] => Err(Error::RefNotFound(candidate.clone())),
                    [oid] => Ok(*oid),
                    _ => {
                        debug!(
                            prefix = candidate,
                            count = candidates.len(),
                            "Ambiguous object prefix"
                        );
                        Err(Error::AmbiguousRevision(candidate.clone()))
                    }
                }
            }

            Refname::BranchTag(name) => {
                branchtag(name, repo)?.ok_or_else(|| Error::RefNotFound(name.clone()))
            }
        }
    }
}

impl Repo {
    /// Turn user input such as `main`, `v1.0`, `HEAD~2` or `3f2a9c1` into a commit id.
    pub fn resolve_revision(&self, text: &str) -> Result<Digest> {
        Rev::parse(text)?.resolve(self)
    }
}


#[cfg(test)]
mod evaluator_tests {
    use camino::Utf8Path;
    use pretty_assertions::assert_eq;
    use tempdir::TempDir;

    use super::*;
    use crate::storable::commit::{Signature, Timestamp};
    use crate::storable::tree::Tree;
    use crate::test::{COMMIT_EMAIL, COMMIT_NAME};

    fn init_repo(dir: &Utf8Path) -> Result<(Repo, Vec<Digest>)> {
        let repo = Repo::init(dir)?;
        let tree = repo.database().store_object(&Tree::new(Vec::new())?)?;

        let mut commits: Vec<Digest> = Vec::new();
        for (i, message) in ["zero", "one", "two", "three", "four"].iter().enumerate() {
            let sig = Signature::new(COMMIT_NAME, COMMIT_EMAIL, Timestamp::new(i as i64, 0));
            let parents = commits.last().copied().into_iter().collect();
            let oid = repo.create_commit(tree, parents, sig.clone(), sig, message)?;
            repo.refs().update_head(&oid)?;
            commits.push(oid);
        }
        repo.refs().create_branch("master", &commits[4])?;
        repo.refs().create_tag("v0", &commits[0])?;

        Ok((repo, commits))
    }

    #[test]
    fn works() -> Result<()> {
        let dir = TempDir::new("rit").unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();

        let (repo, commits) = init_repo(dir)?;
        let message = |rev: &str| -> Result<String> {
            let oid = repo.resolve_revision(rev)?;
            Ok(repo.database().load_commit(&oid)?.message)
        };

        assert_eq!(message("HEAD")?, "four");
        assert_eq!(message("@^")?, "three");
        assert_eq!(message("HEAD^^")?, "two");
        assert_eq!(message("HEAD~0")?, "four");
        assert_eq!(message("HEAD~4")?, "zero");
        assert_eq!(message("master~1")?, "three");
        assert_eq!(message("main")?, "four");
        assert_eq!(message("v0")?, "zero");
        assert_eq!(message(&commits[3].to_hex())?, "three");
        assert_eq!(message(&commits[3].to_hex()[..7])?, "three");

        assert!(matches!(
            repo.resolve_revision("HEAD~5"),
            Err(Error::RefNotFound(_))
        ));
        assert!(matches!(
            repo.resolve_revision(&Digest::NULL.to_hex()),
            Err(Error::ObjectNotFound(_))
        ));
        assert!(matches!(
            repo.resolve_revision("nope"),
            Err(Error::RefNotFound(_))
        ));

        // Trees are objects, but not revisions
        let tree = repo.database().load_commit(&commits[0])?.tree;
        assert!(matches!(
            repo.resolve_revision(&tree.to_hex()),
            Err(Error::UnexpectedKind { .. })
        ));
        Ok(())
    }

    #[test]
    fn short_prefixes() -> Result<()> {
        let dir = TempDir::new("rit").unwrap();
        let dir = Utf8Path::from_path(dir.path()).unwrap();
        let (repo, commits) = init_repo(dir)?;

        // Three characters is too short to be a prefix, so it's looked up as a ref
        assert!(matches!(
            repo.resolve_revision(&commits[1].to_hex()[..3]),
            Err(Error::RefNotFound(_))
        ));
        Ok(())
    }
}
