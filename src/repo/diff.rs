use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::trace;

use super::Repo;
use crate::diff::{diff_lines, render_unified};
use crate::digest::Digest;
use crate::filemode::FileMode;
use crate::Result;

/// Unchanged lines kept around each change.
pub const CONTEXT_LINES: usize = 3;

const NO_NEWLINE_AT_EOF: &str = "\\ No newline at end of file";

type Snapshot = BTreeMap<Utf8PathBuf, (FileMode, Digest)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffBody {
    /// Rendered unified hunks. Empty when only the mode changed.
    Text(String),
    /// At least one side is not UTF-8.
    Binary,
}

/// The difference between two versions of one file. A missing side means the file was added
/// or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: Utf8PathBuf,
    pub a: Option<(FileMode, Digest)>,
    pub b: Option<(FileMode, Digest)>,
    pub body: DiffBody,
}

impl Display for FileDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = &self.path;
        writeln!(f, "diff --git a/{path} b/{path}")?;

        let (a_oid, b_oid) = match (self.a, self.b) {
            (None, Some((mode, oid))) => {
                writeln!(f, "new file mode {mode:o}")?;
                (Digest::NULL, oid)
            }
            (Some((mode, oid)), None) => {
                writeln!(f, "deleted file mode {mode:o}")?;
                (oid, Digest::NULL)
            }
            (Some((a_mode, a_oid)), Some((b_mode, b_oid))) => {
                if a_mode != b_mode {
                    writeln!(f, "old mode {a_mode:o}")?;
                    writeln!(f, "new mode {b_mode:o}")?;
                }
                (a_oid, b_oid)
            }
            (None, None) => return Ok(()),
        };

        if a_oid == b_oid {
            return Ok(());
        }
        match (self.a, self.b) {
            (Some((a_mode, _)), Some((b_mode, _))) if a_mode == b_mode => {
                writeln!(f, "index {}..{} {:o}", a_oid.short(), b_oid.short(), a_mode)?
            }
            _ => writeln!(f, "index {}..{}", a_oid.short(), b_oid.short())?,
        }

        let a_path = match self.a {
            Some(_) => format!("a/{path}"),
            None => "/dev/null".to_owned(),
        };
        let b_path = match self.b {
            Some(_) => format!("b/{path}"),
            None => "/dev/null".to_owned(),
        };

        match &self.body {
            DiffBody::Binary => writeln!(f, "Binary files {a_path} and {b_path} differ"),
            DiffBody::Text(hunks) => {
                writeln!(f, "--- {a_path}")?;
                writeln!(f, "+++ {b_path}")?;
                f.write_str(hunks)
            }
        }
    }
}

/// Where the new side of a diff reads file contents from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Database,
    Workspace,
}

impl Repo {
    /// Changes in the working tree that have not been staged.
    pub fn diff_worktree(&self) -> Result<Vec<FileDiff>> {
        let index = self.index()?;

        let mut staged = Snapshot::new();
        let mut worktree = Snapshot::new();
        for entry in index.entries() {
            let path = entry.path().to_owned();
            if let Some(file) = self.workspace.hash_file(&path)? {
                worktree.insert(path.clone(), file);
            }
            staged.insert(path, (entry.mode(), *entry.oid()));
        }

        self.diff_snapshots(&staged, &worktree, Source::Workspace)
    }

    /// Changes staged in the index relative to HEAD.
    pub fn diff_cached(&self) -> Result<Vec<FileDiff>> {
        let head = self.head_files()?;
        let staged: Snapshot = self
            .index()?
            .entries()
            .map(|e| (e.path().to_owned(), (e.mode(), *e.oid())))
            .collect();

        self.diff_snapshots(&head, &staged, Source::Database)
    }

    /// Changes between the trees of two commits.
    pub fn diff_commits(&self, a: &Digest, b: &Digest) -> Result<Vec<FileDiff>> {
        let a_tree = self.database.load_commit(a)?.tree;
        let b_tree = self.database.load_commit(b)?.tree;
        let a_files = self.database.flatten_tree(&a_tree)?;
        let b_files = self.database.flatten_tree(&b_tree)?;

        self.diff_snapshots(&a_files, &b_files, Source::Database)
    }

    fn diff_snapshots(&self, a: &Snapshot, b: &Snapshot, b_source: Source) -> Result<Vec<FileDiff>> {
        let paths: BTreeSet<&Utf8PathBuf> = a.keys().chain(b.keys()).collect();

        let mut diffs = Vec::new();
        for path in paths {
            let a_file = a.get(path).copied();
            let b_file = b.get(path).copied();
            if a_file == b_file {
                continue;
            }
            trace!(%path, "Diffing file");

            let a_data = match a_file {
                Some((_, oid)) => Some(self.database.load_blob(&oid)?.into_data()),
                None => None,
            };
            let b_data = match (b_file, b_source) {
                (Some(_), Source::Workspace) => Some(self.read_worktree_file(path)?),
                (Some((_, oid)), Source::Database) => {
                    Some(self.database.load_blob(&oid)?.into_data())
                }
                (None, _) => None,
            };

            diffs.push(FileDiff {
                path: path.clone(),
                a: a_file,
                b: b_file,
                body: diff_body(a_data.as_deref(), b_data.as_deref()),
            });
        }

        Ok(diffs)
    }

    fn read_worktree_file(&self, path: &Utf8Path) -> Result<Vec<u8>> {
        let full_path = self.root.join(path);
        let metadata = self
            .workspace
            .stat(path)?
            .ok_or_else(|| crate::Error::io(&full_path, std::io::ErrorKind::NotFound.into()))?;
        self.workspace.read(path, &metadata)
    }
}

fn diff_body(a: Option<&[u8]>, b: Option<&[u8]>) -> DiffBody {
    fn as_text(data: Option<&[u8]>) -> Option<&str> {
        match data {
            Some(data) => std::str::from_utf8(data).ok(),
            None => Some(""),
        }
    }

    match (as_text(a), as_text(b)) {
        (Some(a), Some(b)) => {
            let (a, b) = (split_lines(a), split_lines(b));
            let a: Vec<&str> = a.iter().map(Cow::as_ref).collect();
            let b: Vec<&str> = b.iter().map(Cow::as_ref).collect();
            let script = diff_lines(&a, &b);
            DiffBody::Text(render_unified(&a, &b, &script, CONTEXT_LINES))
        }
        _ => DiffBody::Binary,
    }
}

/// Split on `\n` only, so a `\r` stays part of its line. A last line without a newline carries
/// git's marker, which also makes it differ from the same text with one.
fn split_lines(text: &str) -> Vec<Cow<'_, str>> {
    text.split_inclusive('\n')
        .map(|line| match line.strip_suffix('\n') {
            Some(line) => Cow::Borrowed(line),
            None => Cow::Owned(format!("{line}\n{NO_NEWLINE_AT_EOF}")),
        })
        .collect()
}
