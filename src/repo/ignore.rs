use camino::Utf8Path;
use regex::Regex;
use tracing::trace;

use crate::error::{Error, IoResultExt, Result};

use super::{IGNORE_FILE, META_DIR};

#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pub pattern: String,
    pub negated: bool,
    pub directory_only: bool,
    regex: Regex,
}

impl IgnoreRule {
    /// Parse one line of an ignore file. Blank lines and comments yield `None`.
    fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim_end_matches(['\r', '\n']);
        let line = trim_unescaped_trailing_spaces(line);
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let (negated, rest) = match line.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let (directory_only, rest) = match rest.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        // A slash anywhere but the end ties the pattern to the repository root
        let (anchored, body) = match rest.strip_prefix('/') {
            Some(body) => (true, body),
            None => (rest.contains('/'), rest),
        };

        if body.is_empty() {
            return Err(Error::InvalidPattern {
                pattern: line.to_owned(),
                reason: "empty pattern".into(),
            });
        }

        let invalid = |reason: String| Error::InvalidPattern {
            pattern: line.to_owned(),
            reason,
        };

        let glob = glob_to_regex(body).map_err(invalid)?;
        let regex = if anchored {
            format!("^{glob}$")
        } else {
            format!("^(?:.*/)?{glob}$")
        };
        let regex = Regex::new(&regex).map_err(|e| invalid(e.to_string()))?;

        Ok(Some(Self {
            pattern: line.to_owned(),
            negated,
            directory_only,
            regex,
        }))
    }

    fn matches(&self, path: &str, is_dir: bool) -> bool {
        (is_dir || !self.directory_only) && self.regex.is_match(path)
    }
}

fn trim_unescaped_trailing_spaces(line: &str) -> &str {
    let trimmed = line.trim_end_matches(' ');
    if trimmed.ends_with('\\') && trimmed.len() < line.len() {
        // Keep the escaped space
        &line[..trimmed.len() + 1]
    } else {
        trimmed
    }
}

/// Translate a gitignore-style glob into a regex fragment.
///
/// `*` and `?` never match `/`; `**` as a whole path component matches any number of
/// directories.
fn glob_to_regex(glob: &str) -> std::result::Result<String, String> {
    let chars: Vec<char> = glob.chars().collect();
    let mut out = String::new();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                let at_start = i == 0 || chars[i - 1] == '/';
                let next = chars.get(i + 2);
                if at_start && next == Some(&'/') {
                    // `**/`: zero or more leading directories
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else if at_start && next.is_none() {
                    // trailing `/**`: everything inside
                    out.push_str(".*");
                    i += 2;
                } else {
                    out.push_str("[^/]*");
                    i += 2;
                }
            }
            '*' => {
                out.push_str("[^/]*");
                i += 1;
            }
            '?' => {
                out.push_str("[^/]");
                i += 1;
            }
            '[' => {
                let close = chars[i + 1..]
                    .iter()
                    .skip(1)
                    .position(|&c| c == ']')
                    .map(|p| i + 2 + p)
                    .ok_or_else(|| "unterminated character class".to_owned())?;
                out.push('[');
                let mut class = &chars[i + 1..close];
                if let Some(('!' | '^', rest)) = class.split_first() {
                    out.push('^');
                    class = rest;
                }
                for (j, &c) in class.iter().enumerate() {
                    if c == '-' && j != 0 && j != class.len() - 1 {
                        out.push('-');
                    } else {
                        out.push_str(&regex::escape(&c.to_string()));
                    }
                }
                out.push(']');
                i = close + 1;
            }
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| "trailing backslash".to_owned())?;
                out.push_str(&regex::escape(&escaped.to_string()));
                i += 2;
            }
            c => {
                out.push_str(&regex::escape(&c.to_string()));
                i += 1;
            }
        }
    }

    Ok(out)
}

/// Ordered gitignore-style exclusion rules. Later rules override earlier ones.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    rules: Vec<IgnoreRule>,
}

impl IgnoreMatcher {
    pub fn parse(text: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for line in text.lines() {
            if let Some(rule) = IgnoreRule::parse(line)? {
                rules.push(rule);
            }
        }
        trace!("Loaded {} ignore rules", rules.len());
        Ok(Self { rules })
    }

    /// Read the ignore file at the root of a working tree. A missing file means no rules.
    pub fn load(root: &Utf8Path) -> Result<Self> {
        let path = root.join(IGNORE_FILE);
        match std::fs::read_to_string(&path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).at(path),
        }
    }

    pub fn rules(&self) -> &[IgnoreRule] {
        &self.rules
    }

    /// Whether `path` (relative to the repository root) is excluded.
    ///
    /// The metadata directory and the ignore file are always excluded. A path inside an
    /// excluded directory is excluded too, whatever later rules say about the path itself.
    pub fn is_ignored(&self, path: &Utf8Path, is_dir: bool) -> bool {
        let path = path.as_str().trim_start_matches("./");
        if path.is_empty() || path == "." {
            return false;
        }
        if path == IGNORE_FILE || path.split('/').next() == Some(META_DIR) {
            return true;
        }

        let mut ancestors = path.match_indices('/').map(|(i, _)| &path[..i]);
        if ancestors.any(|dir| self.last_match(dir, true) == Some(true)) {
            return true;
        }

        self.last_match(path, is_dir).unwrap_or(false)
    }

    /// The polarity of the last rule matching `path`, if any rule matches.
    fn last_match(&self, path: &str, is_dir: bool) -> Option<bool> {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matches(path, is_dir))
            .map(|rule| !rule.negated)
    }
}
