use std::fmt::Write as _;

/// Compute the changes needed to turn `a` into `b`, using the Myers diff algorithm.
///
/// Only insertions and deletions are returned, in order, so identical inputs give an empty
/// script. Where several minimal scripts exist, deletions come before insertions.
pub fn diff_lines(a: &[&str], b: &[&str]) -> Vec<Edit> {
    align(a, b)
        .into_iter()
        .filter(|edit| edit.kind != EditKind::Equal)
        .collect()
}

/// Like [`diff_lines`], but including the unchanged lines.
pub fn align(a: &[&str], b: &[&str]) -> Vec<Edit> {
    let myers = Myers { a, b };
    myers.diff()
}

#[derive(Debug)]
struct Myers<'a, 'b> {
    a: &'b [&'a str],
    b: &'b [&'a str],
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EditKind {
    Insert,
    Delete,
    Equal,
}

/// One line of an edit script. `a_line` and `b_line` index into the old and new lines.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Edit {
    pub kind: EditKind,
    pub a_line: Option<usize>,
    pub b_line: Option<usize>,
}

impl Edit {
    fn new(kind: EditKind, a_line: Option<usize>, b_line: Option<usize>) -> Self {
        Edit {
            kind,
            a_line,
            b_line,
        }
    }

    pub fn insert(b_line: usize) -> Self {
        Self::new(EditKind::Insert, None, Some(b_line))
    }

    pub fn delete(a_line: usize) -> Self {
        Self::new(EditKind::Delete, Some(a_line), None)
    }

    pub fn equal(a_line: usize, b_line: usize) -> Self {
        Self::new(EditKind::Equal, Some(a_line), Some(b_line))
    }

    fn prefix(&self) -> char {
        match self.kind {
            EditKind::Insert => '+',
            EditKind::Delete => '-',
            EditKind::Equal => ' ',
        }
    }
}

impl<'a> Myers<'a, '_> {
    fn diff(&self) -> Vec<Edit> {
        let mut diff = Vec::with_capacity(self.a.len().max(self.b.len()));
        self.backtrack(|prev_x, prev_y, x, y| {
            if x == prev_x {
                diff.push(Edit::insert(prev_y));
            } else if y == prev_y {
                diff.push(Edit::delete(prev_x));
            } else {
                diff.push(Edit::equal(prev_x, prev_y));
            }
        });

        diff.reverse();
        diff
    }

    fn backtrack<F>(&self, mut callback: F)
    where
        F: FnMut(usize, usize, usize, usize),
    {
        let mut x = self.a.len() as isize;
        let mut y = self.b.len() as isize;

        for (d, v) in self.shortest_edit().iter().enumerate().rev() {
            let d = d as isize;
            // Each snapshot holds diagonals `-d - 1..=d + 1`
            let at = |k: isize| v[(k + d + 1) as usize];

            let k = x - y;
            let prev_k = if (k == -d) || ((k != d) && at(k - 1) < at(k + 1)) {
                k + 1
            } else {
                k - 1
            };
            let prev_x = at(prev_k);
            let prev_y = prev_x - prev_k;

            while x > prev_x && y > prev_y {
                callback((x - 1) as usize, (y - 1) as usize, x as usize, y as usize);
                x -= 1;
                y -= 1;
            }
            if d > 0 {
                callback(prev_x as usize, prev_y as usize, x as usize, y as usize);
            }
            x = prev_x;
            y = prev_y;
        }
    }

    /// `v` is indexed by `k + offset`, so that every `k` in `-max - 1..=max + 1` fits.
    fn offset(&self) -> isize {
        (self.a.len() + self.b.len()) as isize + 1
    }

    /// The furthest-reaching `x` on each diagonal `k`, for every edit distance `d` up to the
    /// shortest one. Step `d` only keeps diagonals `-d - 1..=d + 1`.
    fn shortest_edit(&self) -> Vec<Vec<isize>> {
        let n = self.a.len() as isize;
        let m = self.b.len() as isize;
        let max = n + m;
        let offset = self.offset();

        let mut v = vec![0; (2 * offset + 1) as usize];
        let mut trace = Vec::new();

        for d in 0..=max {
            let window = (offset - d - 1) as usize..=(offset + d + 1) as usize;
            trace.push(v[window].to_vec());

            for k in (-d..=d).step_by(2) {
                let at = |k: isize| v[(k + offset) as usize];
                let mut x = if (k == -d) || ((k != d) && (at(k - 1) < at(k + 1))) {
                    at(k + 1)
                } else {
                    at(k - 1) + 1
                };

                let mut y = x - k;

                while x < n && y < m && self.a[x as usize] == self.b[y as usize] {
                    x += 1;
                    y += 1;
                }

                v[(k + offset) as usize] = x;

                if x >= n && y >= m {
                    return trace;
                }
            }
        }

        // d == max always reaches the end
        trace
    }
}

/// A group of nearby changes with their surrounding context.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Hunk {
    /// 1-based. When `a_count` is 0 this is the line the insertion follows.
    pub a_start: usize,
    pub a_count: usize,
    pub b_start: usize,
    pub b_count: usize,
    pub edits: Vec<Edit>,
}

impl Hunk {
    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.a_start, self.a_count, self.b_start, self.b_count
        )
    }
}

/// Rebuild the full alignment from a changes-only script: every line not mentioned is equal.
fn fill_equal(script: &[Edit], a_len: usize, b_len: usize) -> Vec<Edit> {
    fn catch_up(
        full: &mut Vec<Edit>,
        i: &mut usize,
        j: &mut usize,
        until_a: usize,
        until_b: usize,
    ) {
        while *i < until_a && *j < until_b {
            full.push(Edit::equal(*i, *j));
            *i += 1;
            *j += 1;
        }
    }

    let mut full = Vec::with_capacity(a_len.max(b_len));
    let (mut i, mut j) = (0, 0);

    for edit in script {
        match edit.kind {
            EditKind::Delete => {
                let a_line = edit.a_line.unwrap_or(i);
                catch_up(&mut full, &mut i, &mut j, a_line, usize::MAX);
                full.push(*edit);
                i += 1;
            }
            EditKind::Insert => {
                let b_line = edit.b_line.unwrap_or(j);
                catch_up(&mut full, &mut i, &mut j, usize::MAX, b_line);
                full.push(*edit);
                j += 1;
            }
            EditKind::Equal => {}
        }
    }
    catch_up(&mut full, &mut i, &mut j, a_len, b_len);

    full
}

/// Split an alignment into hunks, keeping `context` unchanged lines around each change.
/// Changes separated by at most `2 * context` unchanged lines share a hunk.
pub fn hunks(script: &[Edit], a_len: usize, b_len: usize, context: usize) -> Vec<Hunk> {
    let full = fill_equal(script, a_len, b_len);

    // Lines of a and b consumed before each position in `full`
    let mut consumed = Vec::with_capacity(full.len() + 1);
    let (mut a_pos, mut b_pos) = (0, 0);
    for edit in &full {
        consumed.push((a_pos, b_pos));
        if edit.kind != EditKind::Insert {
            a_pos += 1;
        }
        if edit.kind != EditKind::Delete {
            b_pos += 1;
        }
    }
    consumed.push((a_pos, b_pos));

    let changes: Vec<usize> = full
        .iter()
        .enumerate()
        .filter(|(_, e)| e.kind != EditKind::Equal)
        .map(|(i, _)| i)
        .collect();

    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for &idx in &changes {
        match ranges.last_mut() {
            Some((_, end)) if idx - *end - 1 <= 2 * context => *end = idx,
            _ => ranges.push((idx, idx)),
        }
    }

    ranges
        .into_iter()
        .map(|(first, last)| {
            let start = first.saturating_sub(context);
            let end = (last + context + 1).min(full.len());
            let edits = full[start..end].to_vec();

            let a_count = edits.iter().filter(|e| e.kind != EditKind::Insert).count();
            let b_count = edits.iter().filter(|e| e.kind != EditKind::Delete).count();
            let (a_before, b_before) = consumed[start];

            Hunk {
                a_start: if a_count == 0 { a_before } else { a_before + 1 },
                a_count,
                b_start: if b_count == 0 { b_before } else { b_before + 1 },
                b_count,
                edits,
            }
        })
        .collect()
}

/// Render `script` (as returned by [`diff_lines`]) as unified diff hunks.
pub fn render_unified(a: &[&str], b: &[&str], script: &[Edit], context: usize) -> String {
    let mut out = String::new();
    for hunk in hunks(script, a.len(), b.len(), context) {
        out.push_str(&hunk.header());
        out.push('\n');
        for edit in &hunk.edits {
            let line = match edit.kind {
                EditKind::Insert => edit.b_line.and_then(|i| b.get(i)),
                _ => edit.a_line.and_then(|i| a.get(i)),
            };
            // Writing to a String is infallible
            let _ = writeln!(out, "{}{}", edit.prefix(), line.copied().unwrap_or_default());
        }
    }
    out
}
