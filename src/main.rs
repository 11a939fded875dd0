mod interface;

use std::io::Write;
use std::process::exit;

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::Context;
pub use color_eyre::Result;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use rit::graph;
use rit::repo::diff::FileDiff;
use rit::repo::status::Change;
use rit::storable::ObjectKind;
use rit::{Digest, Repo};

use crate::interface::*;

use clap::Parser;
use once_cell::sync::Lazy;
use tracing_subscriber::prelude::*;

static ARGS: Lazy<Opt> = Lazy::new(Opt::parse);

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    Lazy::force(&ARGS);

    let path = match ARGS.path {
        Some(ref path) => path
            .canonicalize_utf8()
            .wrap_err(format!("Directory not found: '{path}'"))?,
        None => Utf8PathBuf::try_from(std::env::current_dir()?.canonicalize()?)?,
    };

    match &ARGS.command {
        Command::Init => {
            let repo = Repo::init(&path)?;
            println!("Initialised empty rit repository in {}", repo.meta_dir());
            return Ok(());
        }
        Command::HashObject { write: false, file } => {
            let data = std::fs::read(file).wrap_err(format!("Could not read '{file}'"))?;
            println!("{}", Digest::for_object(ObjectKind::Blob, &data));
            return Ok(());
        }
        _ => {}
    }

    let repo = Repo::discover(&path)?;
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    match &ARGS.command {
        Command::Init => unreachable!(),
        Command::Add { path: paths } => {
            let paths: Vec<Utf8PathBuf> = paths.iter().map(|p| path.join(p)).collect();
            repo.add(&paths)?;
        }
        Command::Commit { message } => {
            let commit_id = repo.commit(message)?;
            let summary = message.lines().next().unwrap_or_default();
            println!("[{}] {summary}", commit_id.short());
        }
        Command::Status { short } => print_status(&repo, &mut stdout, *short)?,
        Command::Log {
            oneline,
            all_parents,
        } => print_log(&repo, &mut stdout, *oneline, *all_parents)?,
        Command::Branch {
            name,
            start,
            delete,
            force_delete,
        } => match name {
            None => {
                for branch in repo.refs().list_branches()? {
                    if branch.current {
                        stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
                        writeln!(stdout, "* {}", branch.name)?;
                        stdout.reset()?;
                    } else {
                        writeln!(stdout, "  {}", branch.name)?;
                    }
                }
            }
            Some(name) if *delete || *force_delete => {
                let oid = repo.delete_branch(name, *force_delete)?;
                println!("Deleted branch {name} (was {}).", oid.short());
            }
            Some(name) => {
                repo.create_branch(name, start.as_deref())?;
            }
        },
        Command::Tag {
            name,
            target,
            delete,
        } => match name {
            None => {
                for (tag, _) in repo.refs().list_tags()? {
                    println!("{tag}");
                }
            }
            Some(name) if *delete => {
                let oid = repo.refs().delete_tag(name)?;
                println!("Deleted tag '{name}' (was {}).", oid.short());
            }
            Some(name) => {
                repo.create_tag(name, target.as_deref())?;
            }
        },
        Command::Checkout { target, force } => {
            let oid = repo.checkout(target, *force)?;
            match repo.refs().read_head()?.branch() {
                Some(branch) => eprintln!("Switched to branch '{branch}'"),
                None => {
                    let commit = repo.database().load_commit(&oid)?;
                    eprintln!("HEAD is now at {} {}", oid.short(), commit.summary());
                }
            }
        }
        Command::Diff { cached, revisions } => {
            let diffs = match (revisions.as_slice(), *cached) {
                ([], false) => repo.diff_worktree()?,
                ([], true) => repo.diff_cached()?,
                ([a], _) => repo.diff_commits(&repo.resolve_revision(a)?, &repo.head_commit()?)?,
                ([a, b], _) => {
                    repo.diff_commits(&repo.resolve_revision(a)?, &repo.resolve_revision(b)?)?
                }
                _ => unreachable!("clap limits diff to two revisions"),
            };
            print_diffs(&mut stdout, &diffs)?;
        }
        Command::Graph { format } => {
            let reachable = repo.collect_all_reachable()?;
            write!(stdout, "{}", graph::render(&reachable, *format))?;
        }
        Command::HashObject { write: true, file } => {
            let data = std::fs::read(file).wrap_err(format!("Could not read '{file}'"))?;
            println!("{}", repo.database().store(ObjectKind::Blob, &data)?);
        }
        Command::HashObject { write: false, .. } => unreachable!(),
        Command::CatFile(args) => cat_file(&repo, args)?,
        Command::LsTree {
            recursive,
            revision,
        } => {
            let tree = repo
                .database()
                .load_commit(&repo.resolve_revision(revision)?)?
                .tree;
            if *recursive {
                for (path, (mode, oid)) in repo.database().flatten_tree(&tree)? {
                    println!("{mode:06o} blob {oid}\t{path}");
                }
            } else {
                print!("{}", repo.database().load_tree(&tree)?);
            }
        }
        Command::WriteTree => {
            let tree = repo.index()?.build_tree(repo.database())?;
            println!("{tree}");
        }
    }
    Ok(())
}

fn print_status(repo: &Repo, stdout: &mut StandardStream, short: bool) -> Result<()> {
    let status = repo.status()?;

    if short {
        for (path, change) in status.iter() {
            let colour = if change.is_staged() {
                Color::Green
            } else {
                Color::Red
            };
            stdout.set_color(ColorSpec::new().set_fg(Some(colour)))?;
            write!(stdout, "{change}")?;
            stdout.reset()?;
            writeln!(stdout, " {path}")?;
        }
        return Ok(());
    }

    match repo.refs().read_head()?.branch() {
        Some(branch) => writeln!(stdout, "On branch {branch}")?,
        None => writeln!(stdout, "HEAD detached at {}", repo.head_commit()?.short())?,
    }
    if status.is_clean() {
        writeln!(stdout, "nothing to commit, working tree clean")?;
        return Ok(());
    }

    let sections: [(&str, Vec<(&Utf8Path, Change)>, Color); 3] = [
        ("Changes to be committed:", status.staged().collect(), Color::Green),
        (
            "Changes not staged for commit:",
            status.unstaged().collect(),
            Color::Red,
        ),
        (
            "Untracked files:",
            status.untracked().map(|p| (p, Change::Untracked)).collect(),
            Color::Red,
        ),
    ];
    for (title, changes, colour) in sections {
        if changes.is_empty() {
            continue;
        }
        writeln!(stdout, "\n{title}")?;
        stdout.set_color(ColorSpec::new().set_fg(Some(colour)))?;
        for (path, change) in changes {
            match change {
                Change::Untracked => writeln!(stdout, "\t{path}")?,
                _ => writeln!(stdout, "\t{:<12}{path}", format!("{}:", change.describe()))?,
            }
        }
        stdout.reset()?;
    }
    Ok(())
}

fn print_log(
    repo: &Repo,
    stdout: &mut StandardStream,
    oneline: bool,
    all_parents: bool,
) -> Result<()> {
    let yellow = ColorSpec::new().set_fg(Some(Color::Yellow)).clone();

    for item in repo.log(all_parents)? {
        let (oid, commit) = item?;

        if oneline {
            stdout.set_color(&yellow)?;
            write!(stdout, "{}", oid.short())?;
            stdout.reset()?;
            writeln!(stdout, " {}", commit.summary())?;
            continue;
        }

        stdout.set_color(&yellow)?;
        writeln!(stdout, "commit {oid}")?;
        stdout.reset()?;
        if commit.is_merge() {
            let parents: Vec<String> = commit.parents.iter().map(Digest::short).collect();
            writeln!(stdout, "Merge: {}", parents.join(" "))?;
        }
        let author = &commit.author;
        writeln!(stdout, "Author: {} <{}>", author.name, author.email)?;
        match author.when.to_datetime() {
            Some(date) => writeln!(stdout, "Date:   {}", date.format("%a %b %e %H:%M:%S %Y %z"))?,
            None => writeln!(stdout, "Date:   {}", author.when)?,
        }
        writeln!(stdout)?;
        for line in commit.message.lines() {
            writeln!(stdout, "    {line}")?;
        }
        writeln!(stdout)?;
    }
    Ok(())
}

fn print_diffs(stdout: &mut StandardStream, diffs: &[FileDiff]) -> Result<()> {
    for diff in diffs {
        let text = diff.to_string();
        for line in text.lines() {
            let mut spec = ColorSpec::new();
            if line.starts_with("diff --git")
                || line.starts_with("--- ")
                || line.starts_with("+++ ")
                || line.starts_with("index ")
            {
                spec.set_bold(true);
            } else if line.starts_with("@@") {
                spec.set_fg(Some(Color::Cyan));
            } else if line.starts_with('+') {
                spec.set_fg(Some(Color::Green));
            } else if line.starts_with('-') {
                spec.set_fg(Some(Color::Red));
            }
            stdout.set_color(&spec)?;
            write!(stdout, "{line}")?;
            stdout.reset()?;
            writeln!(stdout)?;
        }
    }
    Ok(())
}

/// Accept a full object id, a unique abbreviation of any object, or a revision.
fn resolve_object(repo: &Repo, text: &str) -> Result<Digest> {
    if let Ok(oid) = text.parse::<Digest>() {
        return Ok(oid);
    }
    match repo.database().find_by_prefix(text)?.as_slice() {
        [oid] if text.len() >= 4 => return Ok(*oid),
        [_, _, ..] if text.len() >= 4 => {
            return Err(rit::Error::AmbiguousRevision(text.to_owned()).into())
        }
        _ => {}
    }
    Ok(repo.resolve_revision(text)?)
}

fn cat_file(repo: &Repo, args: &CatFile) -> Result<()> {
    match args {
        CatFile::Exists { object } => {
            let Ok(oid) = resolve_object(repo, object) else {
                eprintln!("Not a valid object name: {object}");
                exit(1);
            };
            if let Err(e) = repo.database().load(&oid) {
                eprintln!("{e}");
                exit(1);
            }
        }
        CatFile::PrettyPrint { object } => {
            let object = repo.database().load(&resolve_object(repo, object)?)?;
            match object.kind {
                ObjectKind::Blob => std::io::stdout().write_all(&object.payload)?,
                ObjectKind::Tree => print!("{}", object.into_tree()?),
                ObjectKind::Commit => print!("{}", object.into_commit()?),
            }
        }
        CatFile::Type { object } => {
            let object = repo.database().load(&resolve_object(repo, object)?)?;
            println!("{}", object.kind);
        }
        CatFile::Size { object } => {
            let object = repo.database().load(&resolve_object(repo, object)?)?;
            println!("{}", object.payload.len());
        }
    }
    Ok(())
}
