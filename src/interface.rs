use camino::Utf8PathBuf;
use clap::Parser;
use clap::Subcommand;

use rit::graph::GraphFormat;

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Create an empty repository
    Init,

    /// Stage files, or whole directories, for the next commit
    Add {
        #[arg(env = "RIT_ADD_PATH", num_args = 1.., required = true)]
        path: Vec<Utf8PathBuf>,
    },

    /// Record the staged changes as a new commit
    Commit {
        #[arg(short, long, env = "RIT_COMMIT_MESSAGE")]
        message: String,
    },

    /// Show staged, unstaged and untracked changes
    Status {
        /// Two-letter status codes only
        #[arg(short, long)]
        short: bool,
    },

    /// Show commits reachable from HEAD, newest first
    Log {
        #[arg(long)]
        oneline: bool,

        /// Follow every parent of merge commits, not only the first
        #[arg(long)]
        all_parents: bool,
    },

    /// List, create or delete branches
    Branch {
        name: Option<String>,

        /// Revision to start the new branch at. Defaults to HEAD
        #[arg(requires = "name")]
        start: Option<String>,

        /// Delete a branch that is merged into HEAD
        #[arg(short, long, requires = "name", conflicts_with = "force_delete")]
        delete: bool,

        /// Delete a branch even if it is not merged
        #[arg(short = 'D', requires = "name")]
        force_delete: bool,
    },

    /// List, create or delete tags
    Tag {
        name: Option<String>,

        /// Revision to tag. Defaults to HEAD
        #[arg(requires = "name")]
        target: Option<String>,

        #[arg(short, long, requires = "name")]
        delete: bool,
    },

    /// Switch to a branch, or detach HEAD at a revision
    Checkout {
        target: String,

        /// Discard local changes to tracked files
        #[arg(short, long)]
        force: bool,
    },

    /// Show changes as unified diffs
    ///
    /// With no revisions, compares the working tree with the index. With two, compares their
    /// trees. With one, compares it with HEAD.
    Diff {
        /// Compare the index with HEAD instead
        #[arg(long, alias = "staged", conflicts_with = "revisions")]
        cached: bool,

        #[arg(num_args = 0..=2)]
        revisions: Vec<String>,
    },

    /// Draw every commit reachable from a branch or HEAD
    Graph {
        #[arg(short, long, default_value = "ascii")]
        format: GraphFormat,
    },

    /// Compute the object id of a file, optionally storing it
    HashObject {
        #[arg(short)]
        write: bool,

        file: Utf8PathBuf,
    },

    #[command(subcommand)]
    CatFile(CatFile),

    /// List the contents of a commit's tree
    LsTree {
        /// Recurse into subtrees, listing files only
        #[arg(short)]
        recursive: bool,

        #[arg(default_value = "HEAD")]
        revision: String,
    },

    /// Store the index as a tree and print its id
    WriteTree,
}

#[derive(Clone, Debug, Subcommand)]
pub enum CatFile {
    /// Exit with status `ExitCode::SUCCESS` if `object` exists and is a valid object. If
    /// `object` is corrupt or missing, exit with status `ExitCode::FAILURE`, and print an
    /// error to stderr.
    #[command(short_flag = 'e')]
    Exists {
        #[arg(value_name = "object")]
        object: String,
    },

    /// Pretty-print the contents of `object` based on its type
    #[command(short_flag = 'p')]
    PrettyPrint {
        #[arg(value_name = "object")]
        object: String,
    },

    /// Print the type of `object` to stdout
    #[command(short_flag = 't')]
    Type {
        #[arg(value_name = "object")]
        object: String,
    },

    /// Print the size of `object` to stdout
    #[command(short_flag = 's')]
    Size {
        #[arg(value_name = "object")]
        object: String,
    },
}

/// A version control system that reads and writes git's object format.
#[derive(Debug, Parser)]
#[command(name = "rit", version)]
pub struct Opt {
    #[command(subcommand)]
    pub command: Command,

    /// Run as if started in this directory
    #[arg(short = 'C', global = true)]
    pub path: Option<Utf8PathBuf>,
}
