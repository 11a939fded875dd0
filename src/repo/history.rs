use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::*;

use super::database::Database;
use super::refs::Head;
use super::Repo;
use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::storable::commit::{Commit, Signature};

/// What HEAD resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedHead {
    Commit(Digest),
    /// HEAD names a branch that has no commits yet.
    NoCommits(String),
}

/// A commit waiting to be yielded, ordered newest first.
struct Queued {
    when: i64,
    seq: Reverse<u64>,
    oid: Digest,
    commit: Commit,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.when, self.seq).cmp(&(other.when, other.seq))
    }
}

/// A lazy walk over the commit graph, newest commits first.
///
/// Commits are only loaded as the walk reaches them. Every commit is yielded at most once, so
/// the walk terminates on any DAG, diamonds included.
pub struct History<'d> {
    database: &'d Database,
    follow_all_parents: bool,
    visited: HashSet<Digest>,
    queue: BinaryHeap<Queued>,
    // Commits to load before the next one is yielded. Errors loading them surface on that call.
    unexplored: Vec<Digest>,
    seq: u64,
}

impl<'d> History<'d> {
    pub fn new(
        database: &'d Database,
        starts: impl IntoIterator<Item = Digest>,
        follow_all_parents: bool,
    ) -> Self {
        Self {
            database,
            follow_all_parents,
            visited: HashSet::new(),
            queue: BinaryHeap::new(),
            unexplored: starts.into_iter().collect(),
            seq: 0,
        }
    }

    fn explore(&mut self) -> Result<()> {
        while let Some(oid) = self.unexplored.pop() {
            if !self.visited.insert(oid) {
                continue;
            }
            trace!(%oid, "Loading commit");
            let commit = self.database.load_commit(&oid)?;
            self.seq += 1;
            self.queue.push(Queued {
                when: commit.committer.when.unix,
                seq: Reverse(self.seq),
                oid,
                commit,
            });
        }
        Ok(())
    }
}

impl Iterator for History<'_> {
    type Item = Result<(Digest, Commit)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.explore() {
            return Some(Err(e));
        }

        let Queued { oid, commit, .. } = self.queue.pop()?;
        if self.follow_all_parents {
            // Reversed so the first parent is loaded first and wins timestamp ties
            self.unexplored.extend(commit.parents.iter().rev());
        } else {
            self.unexplored.extend(commit.first_parent());
        }
        Some(Ok((oid, commit)))
    }
}

/// Every commit reachable from any branch or HEAD, for drawing the commit graph.
#[derive(Debug, Default)]
pub struct ReachableCommits {
    /// Newest first.
    pub commits: Vec<(Digest, Commit)>,
    /// `(parent, child)` pairs.
    pub edges: Vec<(Digest, Digest)>,
    /// Ref names pointing at each commit: branches, `HEAD` and `tag: <name>`.
    pub labels: HashMap<Digest, Vec<String>>,
}

impl Repo {
    /// Store a new commit. The tree and parents are not checked for existence.
    pub fn create_commit(
        &self,
        tree: Digest,
        parents: Vec<Digest>,
        author: Signature,
        committer: Signature,
        message: &str,
    ) -> Result<Digest> {
        let commit = Commit::new(tree, parents, author, committer, message);
        let oid = self.database.store_object(&commit)?;
        debug!(%oid, %tree, "Created commit");
        Ok(oid)
    }

    pub fn resolve_head(&self) -> Result<ResolvedHead> {
        match self.refs.read_head()? {
            Head::Detached(oid) => Ok(ResolvedHead::Commit(oid)),
            Head::Symbolic(target) => match self.refs.read_ref(&target)? {
                Some(oid) => Ok(ResolvedHead::Commit(oid)),
                None => Ok(ResolvedHead::NoCommits(
                    target
                        .strip_prefix(super::refs::HEADS_PREFIX)
                        .unwrap_or(&target)
                        .to_owned(),
                )),
            },
        }
    }

    /// The commit HEAD points at, failing with `NoCommits` on an unborn branch.
    pub fn head_commit(&self) -> Result<Digest> {
        match self.resolve_head()? {
            ResolvedHead::Commit(oid) => Ok(oid),
            ResolvedHead::NoCommits(branch) => Err(Error::NoCommits(branch)),
        }
    }

    pub fn walk_history(&self, start: Digest, follow_all_parents: bool) -> History<'_> {
        History::new(&self.database, [start], follow_all_parents)
    }

    /// History from HEAD. Empty on an unborn branch.
    pub fn log(&self, follow_all_parents: bool) -> Result<History<'_>> {
        let starts = match self.resolve_head()? {
            ResolvedHead::Commit(oid) => vec![oid],
            ResolvedHead::NoCommits(_) => Vec::new(),
        };
        Ok(History::new(&self.database, starts, follow_all_parents))
    }

    /// Whether `ancestor` is reachable from `descendant`. A commit is its own ancestor.
    pub fn is_ancestor(&self, ancestor: &Digest, descendant: &Digest) -> Result<bool> {
        for item in self.walk_history(*descendant, true) {
            let (oid, _) = item?;
            if oid == *ancestor {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Walk every parent of every branch tip and of HEAD, recording the edges between commits
    /// and which refs point where.
    pub fn collect_all_reachable(&self) -> Result<ReachableCommits> {
        let mut labels: HashMap<Digest, Vec<String>> = HashMap::new();
        let mut starts = Vec::new();

        for branch in self.refs.list_branches()? {
            labels.entry(branch.oid).or_default().push(branch.name);
            starts.push(branch.oid);
        }
        if let ResolvedHead::Commit(oid) = self.resolve_head()? {
            labels.entry(oid).or_default().push("HEAD".to_owned());
            starts.push(oid);
        }
        for (name, oid) in self.refs.list_tags()? {
            labels.entry(oid).or_default().push(format!("tag: {name}"));
        }

        let mut reachable = ReachableCommits {
            labels,
            ..Default::default()
        };
        for item in History::new(&self.database, starts, true) {
            let (oid, commit) = item?;
            reachable
                .edges
                .extend(commit.parents.iter().map(|&parent| (parent, oid)));
            reachable.commits.push((oid, commit));
        }

        trace!(
            commits = reachable.commits.len(),
            edges = reachable.edges.len(),
            "Collected reachable commits"
        );
        Ok(reachable)
    }
}
