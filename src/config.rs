//! Identity and timestamps for new commits, read from the environment.

use tracing::trace;

use crate::error::{Error, Result};
use crate::storable::commit::{Signature, Timestamp};

/// Where settings are read from. The process environment in practice, a map in tests.
pub trait Env {
    fn get(&self, name: &str) -> Option<String>;

    fn first_of(&self, names: &[&str]) -> Option<String> {
        names.iter().find_map(|name| self.get(name))
    }
}

/// The real process environment. Empty variables count as unset.
pub struct ProcessEnv;

impl Env for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }
}

fn timestamp(env: &impl Env, var_name: &'static str) -> Result<Option<Timestamp>> {
    match env.get(var_name) {
        Some(date) => match Timestamp::parse(&date) {
            Some(when) => Ok(Some(when)),
            None => Err(Error::InvalidDate {
                var: var_name,
                value: date,
            }),
        },
        None => Ok(None),
    }
}

/// The author of new commits.
///
/// The name comes from `RIT_AUTHOR_NAME`, falling back to `GIT_AUTHOR_NAME`,
/// `GIT_COMMITTER_NAME` and finally the login name. The email comes from `RIT_AUTHOR_EMAIL` or
/// `GIT_AUTHOR_EMAIL`. `RIT_AUTHOR_DATE` (`"{unix} {+|-}HHMM"`) pins the time, which is
/// otherwise now.
pub fn author(env: &impl Env) -> Result<Signature> {
    let name = env
        .first_of(&[
            "RIT_AUTHOR_NAME",
            "GIT_AUTHOR_NAME",
            "GIT_COMMITTER_NAME",
            "USER",
            "USERNAME",
        ])
        .ok_or(Error::MissingIdentity("RIT_AUTHOR_NAME"))?;
    let email = env
        .first_of(&["RIT_AUTHOR_EMAIL", "GIT_AUTHOR_EMAIL"])
        .ok_or(Error::MissingIdentity("RIT_AUTHOR_EMAIL"))?;
    let when = timestamp(env, "RIT_AUTHOR_DATE")?.unwrap_or_else(Timestamp::now);

    trace!(%name, %email, %when, "Read author from environment");
    Ok(Signature::new(name, email, when))
}

/// The committer of new commits: `RIT_COMMITTER_*` where set, otherwise the author.
pub fn committer(env: &impl Env, author: &Signature) -> Result<Signature> {
    let name = env
        .get("RIT_COMMITTER_NAME")
        .unwrap_or_else(|| author.name.clone());
    let email = env
        .get("RIT_COMMITTER_EMAIL")
        .unwrap_or_else(|| author.email.clone());
    let when = timestamp(env, "RIT_COMMITTER_DATE")?.unwrap_or(author.when);
    Ok(Signature::new(name, email, when))
}

pub fn author_from_env() -> Result<Signature> {
    author(&ProcessEnv)
}

pub fn committer_from_env(author: &Signature) -> Result<Signature> {
    committer(&ProcessEnv, author)
}
