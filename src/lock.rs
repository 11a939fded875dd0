use std::{
    fs::File,
    io::{ErrorKind, Write},
    ops::{Deref, DerefMut},
};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{trace, warn};

use crate::error::{Error, IoResultExt, Result};

/// Exclusive access to a file that is about to be replaced as a whole.
///
/// New contents are written to `<path>.lock`. [`LockedFile::commit`] renames the lockfile over
/// `path`, so readers only ever see the old file or the new one. Dropping the lock without
/// committing removes the lockfile and leaves `path` untouched.
pub struct LockedFile {
    guarded_path: Utf8PathBuf,
    lock_path: Utf8PathBuf,
    lockfile: File,
    committed: bool,
}

impl Deref for LockedFile {
    type Target = File;

    fn deref(&self) -> &Self::Target {
        &self.lockfile
    }
}
impl DerefMut for LockedFile {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.lockfile
    }
}

impl LockedFile {
    /// Take the lock on `path`. Fails with [`Error::Locked`] if another writer holds it.
    pub fn acquire(path: impl AsRef<Utf8Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .ok_or_else(|| Error::io(path, ErrorKind::InvalidInput.into()))?;
        let lock_path = path.with_file_name(format!("{file_name}.lock"));

        match File::options()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::Locked(path.to_owned())),
            Err(e) => Err(Error::io(&lock_path, e)),
            Ok(lockfile) => {
                trace!(path=%lock_path, "Acquired lock");
                Ok(Self {
                    guarded_path: path.to_owned(),
                    lock_path,
                    lockfile,
                    committed: false,
                })
            }
        }
    }

    /// Replace the guarded file with everything written so far.
    pub fn commit(mut self) -> Result<()> {
        self.lockfile.flush().at(&self.lock_path)?;
        self.lockfile.sync_all().at(&self.lock_path)?;
        std::fs::rename(&self.lock_path, &self.guarded_path).at(&self.guarded_path)?;
        self.committed = true;
        Ok(())
    }

    /// Convenience for the common case of replacing a file with `contents`.
    pub fn write_file(path: impl AsRef<Utf8Path>, contents: &[u8]) -> Result<()> {
        let mut lock = Self::acquire(path)?;
        let lock_path = lock.lock_path.clone();
        lock.write_all(contents).at(lock_path)?;
        lock.commit()
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = std::fs::remove_file(&self.lock_path) {
                warn!(path=%self.lock_path, error=%e, "Failed to remove stale lockfile");
            }
        }
    }
}
