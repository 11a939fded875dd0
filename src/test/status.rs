use std::io::Write;
use std::os::unix::prelude::PermissionsExt;

use camino::{Utf8Path, Utf8PathBuf};
use pretty_assertions::assert_eq;
use rand::prelude::*;
use tempdir::TempDir;

use crate::repo::status::Change;
use crate::repo::Repo;
use crate::test::{commit, empty_repo};
use crate::Result;

fn init_repo() -> Result<(TempDir, Utf8PathBuf, Repo)> {
    let (dir, root, repo) = empty_repo()?;
    crate::create_test_files!(root, ["file1", "file2", "file3", "file4"]);
    repo.add_all()?;
    commit(&repo, "test")?;
    Ok((dir, root, repo))
}

fn changes(repo: &Repo) -> Result<Vec<(String, Change)>> {
    Ok(repo
        .status()?
        .iter()
        .map(|(path, change)| (path.to_string(), change))
        .collect())
}

fn append(path: &Utf8Path, text: &str) {
    write!(
        std::fs::File::options().append(true).open(path).unwrap(),
        "{text}"
    )
    .unwrap();
}

#[test]
fn test_staged_before_first_commit() -> Result<()> {
    let (_dir, root, repo) = empty_repo()?;
    assert!(repo.status()?.is_clean());

    crate::create_test_files!(root, ["new.txt"]);
    assert_eq!(changes(&repo)?, [("new.txt".to_owned(), Change::Untracked)]);

    repo.add_all()?;
    let status = repo.status()?;
    assert_eq!(
        status.staged().collect::<Vec<_>>(),
        [(Utf8Path::new("new.txt"), Change::IndexAdded)]
    );
    assert_eq!(status.unstaged().count(), 0);

    commit(&repo, "add new.txt")?;
    assert!(repo.status()?.is_clean());
    Ok(())
}

#[test]
fn test_untracked() -> Result<()> {
    let (_dir, root, repo) = init_repo()?;
    assert!(repo.status()?.is_clean());

    crate::create_test_files!(root, ["file5", "file6", "file7", "dir/file8"]);
    let status = repo.status()?;
    assert_eq!(
        status.untracked().map(Utf8Path::as_str).collect::<Vec<_>>(),
        ["dir/file8", "file5", "file6", "file7"]
    );
    assert_eq!(status.changes().len(), 4);
    Ok(())
}

#[test]
fn test_ignored_files_are_not_untracked() -> Result<()> {
    let (_dir, root, repo) = init_repo()?;
    std::fs::write(root.join(".ritignore"), "*.log\n!keep.log\n").unwrap();
    crate::create_test_files!(root, ["debug.log", "keep.log"]);

    assert_eq!(changes(&repo)?, [("keep.log".to_owned(), Change::Untracked)]);
    Ok(())
}

#[test]
fn test_change_file_contents() -> Result<()> {
    let (_dir, root, repo) = init_repo()?;
    append(&root.join("file1"), "-changed");

    assert_eq!(changes(&repo)?, [("file1".to_owned(), Change::Modified)]);
    Ok(())
}

#[test]
fn test_change_file_mode() -> Result<()> {
    let (_dir, root, repo) = init_repo()?;

    let permissions = std::fs::Permissions::from_mode(0o755);
    std::fs::set_permissions(root.join("file1"), permissions).unwrap();

    assert_eq!(changes(&repo)?, [("file1".to_owned(), Change::Modified)]);
    Ok(())
}

#[test]
fn test_change_file_preserve_size() -> Result<()> {
    let (_dir, root, repo) = init_repo()?;

    let path = root.join("file1");
    let len = std::fs::metadata(&path).unwrap().len();
    // Printable bytes that never spell out the original contents
    let new_contents: Vec<u8> = (0..len).map(|_| thread_rng().gen_range(b'0'..=b'9')).collect();
    std::fs::write(&path, &new_contents).unwrap();
    assert_eq!(std::fs::metadata(&path).unwrap().len(), len);

    assert_eq!(changes(&repo)?, [("file1".to_owned(), Change::Modified)]);
    Ok(())
}

#[test]
fn test_no_change_touched() -> Result<()> {
    let (_dir, root, repo) = init_repo()?;

    filetime::set_file_mtime(root.join("file1"), filetime::FileTime::from_unix_time(0, 0))
        .unwrap();
    assert!(repo.status()?.is_clean());
    Ok(())
}

#[test]
fn test_delete_file() -> Result<()> {
    let (_dir, root, repo) = init_repo()?;
    std::fs::remove_file(root.join("file1")).unwrap();

    assert_eq!(changes(&repo)?, [("file1".to_owned(), Change::Removed)]);
    Ok(())
}

#[test]
fn test_index_add() -> Result<()> {
    let (_dir, root, repo) = init_repo()?;
    crate::create_test_files!(root, ["file5", "file6", "file7", "file8"]);
    repo.add_all()?;

    let status = repo.status()?;
    assert_eq!(status.changes().len(), 4);
    assert!(status.iter().all(|(_, c)| c == Change::IndexAdded));
    Ok(())
}

#[test]
fn test_index_modify() -> Result<()> {
    let (_dir, root, repo) = init_repo()?;
    append(&root.join("file1"), "-changed");
    repo.add_all()?;

    assert_eq!(changes(&repo)?, [("file1".to_owned(), Change::IndexModified)]);
    Ok(())
}

#[test]
/// A file can be staged and then changed again, showing up on both sides.
fn test_staged_and_modified() -> Result<()> {
    let (_dir, root, repo) = init_repo()?;
    append(&root.join("file2"), "-staged");
    repo.add_all()?;
    append(&root.join("file2"), "-unstaged");

    assert_eq!(
        changes(&repo)?,
        [
            ("file2".to_owned(), Change::IndexModified),
            ("file2".to_owned(), Change::Modified),
        ]
    );
    Ok(())
}

#[test]
fn test_index_remove() -> Result<()> {
    let (_dir, root, repo) = init_repo()?;
    std::fs::remove_file(root.join("file1")).unwrap();
    repo.add_all()?;

    assert_eq!(changes(&repo)?, [("file1".to_owned(), Change::IndexRemoved)]);
    Ok(())
}
