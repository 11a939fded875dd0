use camino::Utf8PathBuf;
use pretty_assertions::assert_eq;
use tempdir::TempDir;

use crate::digest::Digest;
use crate::repo::refs::Head;
use crate::repo::Repo;
use crate::test::{commit, empty_repo};
use crate::{Error, Result};

struct Fixture {
    _dir: TempDir,
    root: Utf8PathBuf,
    repo: Repo,
    first: Digest,
    second: Digest,
}

/// `topic` holds file1 and a/b/c.txt. `main` is one commit further on: file1 changed, file2
/// added, and a/b/c.txt deleted.
fn fixture() -> Result<Fixture> {
    let (dir, root, repo) = empty_repo()?;
    crate::create_test_files!(root, ["file1", "a/b/c.txt"]);
    repo.add_all()?;
    let first = commit(&repo, "first")?;
    repo.create_branch("topic", None)?;

    std::fs::write(root.join("file1"), "changed\n").unwrap();
    crate::create_test_files!(root, ["file2"]);
    std::fs::remove_dir_all(root.join("a")).unwrap();
    repo.add_all()?;
    let second = commit(&repo, "second")?;

    Ok(Fixture {
        _dir: dir,
        root,
        repo,
        first,
        second,
    })
}

fn read(root: &Utf8PathBuf, path: &str) -> Option<String> {
    std::fs::read_to_string(root.join(path)).ok()
}

#[test]
fn switch_branches() -> Result<()> {
    let f = fixture()?;

    assert_eq!(f.repo.checkout("topic", false)?, f.first);
    assert_eq!(read(&f.root, "file1").as_deref(), Some("\"file1\"-contents\n"));
    assert_eq!(
        read(&f.root, "a/b/c.txt").as_deref(),
        Some("\"a/b/c.txt\"-contents\n")
    );
    assert_eq!(read(&f.root, "file2"), None);
    assert_eq!(f.repo.refs().read_head()?.branch(), Some("topic"));
    assert!(f.repo.status()?.is_clean());

    assert_eq!(f.repo.checkout("main", false)?, f.second);
    assert_eq!(read(&f.root, "file1").as_deref(), Some("changed\n"));
    assert!(!f.root.join("a").exists());
    assert!(f.root.join("file2").is_file());
    assert_eq!(f.repo.refs().read_head()?.branch(), Some("main"));
    assert!(f.repo.status()?.is_clean());
    Ok(())
}

#[test]
fn detach_at_revision() -> Result<()> {
    let f = fixture()?;

    assert_eq!(f.repo.checkout("HEAD^", false)?, f.first);
    assert_eq!(f.repo.refs().read_head()?, Head::Detached(f.first));
    assert!(f.repo.status()?.is_clean());

    assert_eq!(f.repo.checkout(&f.second.to_hex(), false)?, f.second);
    assert_eq!(f.repo.refs().read_head()?, Head::Detached(f.second));
    assert_eq!(f.repo.refs().read_branch("main")?, Some(f.second));
    Ok(())
}

#[test]
fn refuses_to_overwrite_changes() -> Result<()> {
    let f = fixture()?;
    std::fs::write(f.root.join("file1"), "local edit\n").unwrap();
    let root = &f.root;
    crate::create_test_files!(root, ["scratch"]);

    match f.repo.checkout("topic", false) {
        Err(Error::DirtyWorktree(paths)) => assert_eq!(paths, ["file1"]),
        other => panic!("expected a dirty worktree error, got {other:?}"),
    }
    assert_eq!(f.repo.refs().read_head()?.branch(), Some("main"));
    assert_eq!(read(&f.root, "file1").as_deref(), Some("local edit\n"));

    f.repo.checkout("topic", true)?;
    assert_eq!(read(&f.root, "file1").as_deref(), Some("\"file1\"-contents\n"));
    // Untracked files the target does not touch are left alone
    assert!(f.root.join("scratch").is_file());
    Ok(())
}

#[test]
fn refuses_to_overwrite_untracked_files() -> Result<()> {
    let f = fixture()?;
    std::fs::create_dir_all(f.root.join("a/b")).unwrap();
    std::fs::write(f.root.join("a/b/c.txt"), "precious untracked\n").unwrap();

    match f.repo.checkout("topic", false) {
        Err(Error::UntrackedOverwritten(paths)) => assert_eq!(paths, ["a/b/c.txt"]),
        other => panic!("expected untracked files in the way, got {other:?}"),
    }
    assert_eq!(read(&f.root, "a/b/c.txt").as_deref(), Some("precious untracked\n"));
    assert_eq!(read(&f.root, "file1").as_deref(), Some("changed\n"));
    assert_eq!(f.repo.refs().read_head()?.branch(), Some("main"));

    f.repo.checkout("topic", true)?;
    assert_eq!(
        read(&f.root, "a/b/c.txt").as_deref(),
        Some("\"a/b/c.txt\"-contents\n")
    );
    Ok(())
}

#[test]
/// A directory where a file goes, or a file where a directory goes, blocks the checkout too.
fn refuses_to_replace_untracked_paths_of_another_type() -> Result<()> {
    let f = fixture()?;
    let root = &f.root;
    crate::create_test_files!(root, ["a/b/c.txt/notes"]);
    match f.repo.checkout("topic", false) {
        Err(Error::UntrackedOverwritten(paths)) => assert_eq!(paths, ["a/b/c.txt/notes"]),
        other => panic!("expected untracked files in the way, got {other:?}"),
    }
    assert!(f.root.join("a/b/c.txt/notes").is_file());

    std::fs::remove_dir_all(f.root.join("a")).unwrap();
    crate::create_test_files!(root, ["a"]);
    match f.repo.checkout("topic", false) {
        Err(Error::UntrackedOverwritten(paths)) => assert_eq!(paths, ["a"]),
        other => panic!("expected untracked files in the way, got {other:?}"),
    }
    assert_eq!(read(&f.root, "a").as_deref(), Some("\"a\"-contents\n"));
    Ok(())
}

#[test]
fn untracked_copy_of_target_file_is_kept() -> Result<()> {
    let f = fixture()?;
    let root = &f.root;
    crate::create_test_files!(root, ["a/b/c.txt"]);

    assert_eq!(f.repo.checkout("topic", false)?, f.first);
    assert!(f.repo.status()?.is_clean());
    Ok(())
}

#[test]
fn unknown_target() -> Result<()> {
    let f = fixture()?;
    assert!(matches!(
        f.repo.checkout("nowhere", false),
        Err(Error::RefNotFound(_))
    ));
    Ok(())
}
