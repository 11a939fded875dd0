mod checkout;
mod status;

use camino::{Utf8Path, Utf8PathBuf};
use tempdir::TempDir;

use crate::digest::Digest;
use crate::repo::Repo;
use crate::storable::commit::{Signature, Timestamp};
use crate::Result;

pub const COMMIT_NAME: &str = "Jamie Quigley";
pub const COMMIT_EMAIL: &str = "jamie@quigley.xyz";

/// Write `"<path>"-contents\n` to each path under `root`, creating parent directories.
#[macro_export]
macro_rules! create_test_files {
    ($root:ident, [$($path:expr),* $(,)?]) => {{
        use std::io::Write;
        $({
            let path = $root.join($path);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            writeln!(
                std::fs::File::create(&path).unwrap(),
                concat!(stringify!($path), "-contents")
            )
            .unwrap();
        })*
    }};
}

/// A fixed signature, so commit ids are reproducible.
pub fn signature() -> Signature {
    Signature::new(COMMIT_NAME, COMMIT_EMAIL, Timestamp::new(1_668_000_000, 0))
}

pub fn commit(repo: &Repo, message: &str) -> Result<Digest> {
    repo.commit_as(message, signature(), signature())
}

/// An initialised repository in a fresh temporary directory. Keep the `TempDir` alive for as
/// long as the repository is used.
pub fn empty_repo() -> Result<(TempDir, Utf8PathBuf, Repo)> {
    let dir = TempDir::new("rit").unwrap();
    let root = Utf8Path::from_path(dir.path()).unwrap().to_owned();
    let repo = Repo::init(&root)?;
    Ok((dir, root, repo))
}
