mod add;
mod branch;
mod checkout;
mod commit;
pub mod database;
pub mod diff;
pub mod history;
pub mod ignore;
pub mod index;
pub mod refs;
pub mod revision;
pub mod status;
pub mod workspace;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::*;

use database::Database;
use ignore::IgnoreMatcher;
use index::Index;
use refs::{Refs, HEADS_PREFIX};
use workspace::Workspace;

use crate::error::{Error, IoResultExt, Result};

/// Name of the metadata directory at the root of every working tree.
pub const META_DIR: &str = ".rit";
/// Name of the ignore-rule file at the root of every working tree.
pub const IGNORE_FILE: &str = ".ritignore";
/// Branch HEAD points at in a freshly initialised repository.
pub const DEFAULT_BRANCH: &str = "main";

/// A handle on one repository: its working tree, object database, refs and index.
///
/// Every operation goes through a `Repo`, so several repositories can be used side by side.
#[derive(Debug)]
pub struct Repo {
    root: Utf8PathBuf,
    meta_dir: Utf8PathBuf,
    database: Database,
    refs: Refs,
    workspace: Workspace,
    index_path: Utf8PathBuf,
}

impl Repo {
    fn new(root: Utf8PathBuf) -> Self {
        let meta_dir = root.join(META_DIR);
        Self {
            database: Database::new(&meta_dir),
            refs: Refs::new(&meta_dir),
            workspace: Workspace::new(&root),
            index_path: meta_dir.join("index"),
            meta_dir,
            root,
        }
    }

    /// Create an empty repository in `root`, with HEAD on an unborn `main` branch.
    ///
    /// Running this on an existing repository leaves it untouched.
    pub fn init(root: impl AsRef<Utf8Path>) -> Result<Self> {
        let repo = Self::new(root.as_ref().to_owned());
        trace!(path=%repo.root, "Initialising repo");

        if repo.meta_dir.exists() {
            warn!(path=%repo.meta_dir, "Repo already exists, init will do nothing");
            return Ok(repo);
        }

        for d in ["objects", "refs/heads", "refs/tags"] {
            let dir = repo.meta_dir.join(d);
            trace!(path=%dir, "Creating directory");
            std::fs::create_dir_all(&dir).at(&dir)?;
        }
        let head = repo.refs.head_path();
        std::fs::write(&head, format!("ref: {HEADS_PREFIX}{DEFAULT_BRANCH}\n")).at(&head)?;

        Ok(repo)
    }

    /// Open the repository whose working tree is exactly `root`.
    pub fn open(root: impl AsRef<Utf8Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.join(META_DIR).is_dir() {
            return Err(Error::NotARepository(root.to_owned()));
        }
        trace!(path=%root, "Opened repo");
        Ok(Self::new(root.to_owned()))
    }

    /// Open the repository containing `start`, looking in `start` and then each of its parents.
    pub fn discover(start: impl AsRef<Utf8Path>) -> Result<Self> {
        let start = start.as_ref();
        start
            .ancestors()
            .find(|dir| dir.join(META_DIR).is_dir())
            .ok_or_else(|| Error::NotARepository(start.to_owned()))
            .and_then(Self::open)
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn meta_dir(&self) -> &Utf8Path {
        &self.meta_dir
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Read the index from disk. A repository with nothing staged has an empty index.
    pub fn index(&self) -> Result<Index> {
        Index::load(&self.index_path)
    }

    /// The rules in the root `.ritignore`, or no rules if there is none.
    pub fn ignore_matcher(&self) -> Result<IgnoreMatcher> {
        IgnoreMatcher::load(&self.root)
    }
}
