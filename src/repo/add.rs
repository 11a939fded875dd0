use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, trace};

use crate::error::{Error, Result};

impl super::Repo {
    /// Add paths to the index, returning the files that were staged.
    ///
    /// Directories are added recursively, skipping ignored files. A path that no longer exists
    /// but is tracked has its removal staged. The index is saved once, after every path has
    /// been processed, so a failure leaves it unchanged.
    ///
    /// If `paths` is empty, do nothing.
    pub fn add(&self, paths: &[Utf8PathBuf]) -> Result<Vec<Utf8PathBuf>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let mut index = self.index()?;
        let ignore = self.ignore_matcher()?;
        let mut staged = Vec::new();

        for path in paths {
            let path = self.workspace.relativize(path)?;
            trace!(%path, "Adding path to index");

            match self.workspace.stat(&path)? {
                Some(metadata) if metadata.is_dir() => {
                    staged.extend(index.stage_directory(
                        &self.database,
                        &self.workspace,
                        &path,
                        &ignore,
                    )?);
                }
                Some(_) if ignore.is_ignored(&path, false) => {
                    debug!(%path, "Not adding ignored file");
                }
                Some(_) => {
                    index.stage(&self.database, &self.workspace, &path)?;
                    staged.push(path);
                }
                None if index.is_tracked(&path) => {
                    debug!(%path, "Staging removal of deleted path");
                    index.remove(&path);
                }
                None => {
                    return Err(Error::io(
                        self.root.join(&path),
                        std::io::ErrorKind::NotFound.into(),
                    ))
                }
            }
        }

        index.save()?;
        Ok(staged)
    }

    pub fn add_all(&self) -> Result<Vec<Utf8PathBuf>> {
        self.add(&[Utf8Path::new(".").to_owned()])
    }
}
