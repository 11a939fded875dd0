use std::borrow::Cow;
use std::fmt::{Display, Write as _};

use chrono::{DateTime, FixedOffset, Local, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::digest::Digest;
use crate::error::{Error, Result};

use super::{ObjectKind, Storable};

/// A point in time, as recorded in a commit: seconds since the epoch plus the author's UTC
/// offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub unix: i64,
    /// Offset from UTC, in minutes.
    pub offset: i32,
}

impl Timestamp {
    pub fn new(unix: i64, offset: i32) -> Self {
        Self { unix, offset }
    }

    pub fn now() -> Self {
        let now = Local::now();
        Self {
            unix: now.timestamp(),
            offset: now.offset().local_minus_utc() / 60,
        }
    }

    /// Parse `"{unix} {+|-}{HHMM}"`.
    pub fn parse(s: &str) -> Option<Self> {
        let (unix, offset) = s.trim().split_once(' ')?;
        Some(Self {
            unix: unix.parse().ok()?,
            offset: parse_offset(offset)?,
        })
    }

    pub fn to_datetime(self) -> Option<DateTime<FixedOffset>> {
        FixedOffset::east_opt(self.offset * 60)?
            .timestamp_opt(self.unix, 0)
            .single()
    }
}

fn parse_offset(s: &str) -> Option<i32> {
    if s.len() != 5 || !s.is_char_boundary(1) {
        return None;
    }
    let (sign, digits) = s.split_at(1);
    let sign = match sign {
        "+" => 1,
        "-" => -1,
        _ => return None,
    };
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    Some(sign * (hours * 60 + minutes))
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.offset < 0 { '-' } else { '+' };
        let offset = self.offset.abs();
        write!(
            f,
            "{} {}{:02}{:02}",
            self.unix,
            sign,
            offset / 60,
            offset % 60
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub when: Timestamp,
}

impl Signature {
    pub fn new(name: impl Into<String>, email: impl Into<String>, when: Timestamp) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            when,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        static SIGNATURE_REGEX: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"^(.*) <(.*)> (-?\d+) ([+-]\d{4})$").unwrap());

        let caps = SIGNATURE_REGEX
            .captures(s)
            .ok_or_else(|| Error::MalformedCommit(format!("invalid signature: {s:?}")))?;

        let unix = caps[3]
            .parse()
            .map_err(|_| Error::MalformedCommit(format!("invalid timestamp: {:?}", &caps[3])))?;
        let offset = parse_offset(&caps[4])
            .ok_or_else(|| Error::MalformedCommit(format!("invalid timezone: {:?}", &caps[4])))?;

        Ok(Self {
            name: caps[1].to_owned(),
            email: caps[2].to_owned(),
            when: Timestamp { unix, offset },
        })
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}> {}", self.name, self.email, self.when)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: Digest,
    pub parents: Vec<Digest>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl Commit {
    pub fn new(
        tree: Digest,
        parents: Vec<Digest>,
        author: Signature,
        committer: Signature,
        message: impl Into<String>,
    ) -> Self {
        Self {
            tree,
            parents,
            author,
            committer,
            message: message.into(),
        }
    }

    pub fn first_parent(&self) -> Option<&Digest> {
        self.parents.first()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// The first line of the message.
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }

    fn serialise(&self) -> String {
        let mut out = String::new();
        // Writing to a String is infallible
        let _ = writeln!(out, "tree {}", self.tree);
        for parent in &self.parents {
            let _ = writeln!(out, "parent {parent}");
        }
        let _ = writeln!(out, "author {}", self.author);
        let _ = writeln!(out, "committer {}", self.committer);
        out.push('\n');
        out.push_str(&self.message);
        out
    }

    /// Parse a commit payload.
    ///
    /// Headers that aren't understood (`gpgsig`, `encoding`, `mergetag`, ...) are skipped along
    /// with their continuation lines.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| Error::MalformedCommit("commit is not valid UTF-8".into()))?;

        let (headers, message) = match text.split_once("\n\n") {
            Some((headers, message)) => (headers, message),
            None => (text.strip_suffix('\n').unwrap_or(text), ""),
        };

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for line in headers.lines() {
            if line.starts_with(' ') {
                continue;
            }
            let (key, value) = line.split_once(' ').unwrap_or((line, ""));
            match key {
                "tree" if tree.is_none() => tree = Some(parse_oid(value)?),
                "parent" => parents.push(parse_oid(value)?),
                "author" => author = Some(Signature::parse(value)?),
                "committer" => committer = Some(Signature::parse(value)?),
                "tree" => return Err(Error::MalformedCommit("duplicate tree header".into())),
                _ => {}
            }
        }

        Ok(Self {
            tree: tree.ok_or_else(|| Error::MalformedCommit("missing tree header".into()))?,
            parents,
            author: author.ok_or_else(|| Error::MalformedCommit("missing author".into()))?,
            committer: committer
                .ok_or_else(|| Error::MalformedCommit("missing committer".into()))?,
            message: message.to_owned(),
        })
    }
}

fn parse_oid(s: &str) -> Result<Digest> {
    s.parse()
        .map_err(|_| Error::MalformedCommit(format!("invalid object id {s:?}")))
}

impl Storable for Commit {
    fn kind(&self) -> ObjectKind {
        ObjectKind::Commit
    }

    fn payload(&self) -> Cow<'_, [u8]> {
        Cow::Owned(self.serialise().into_bytes())
    }
}

impl Display for Commit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.serialise())
    }
}
