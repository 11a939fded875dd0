use std::fmt::Write as _;
use std::str::FromStr;

use crate::digest::Digest;
use crate::repo::history::ReachableCommits;

/// Output formats for the commit graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphFormat {
    /// One line per commit, newest first.
    #[default]
    Ascii,
    Mermaid,
    Dot,
}

impl FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ascii" => Ok(Self::Ascii),
            "mermaid" => Ok(Self::Mermaid),
            "dot" | "graphviz" => Ok(Self::Dot),
            _ => Err(format!(
                "unknown graph format '{s}', expected one of: ascii, mermaid, dot"
            )),
        }
    }
}

/// Render the commits and edges collected by
/// [`Repo::collect_all_reachable`](crate::Repo::collect_all_reachable).
pub fn render(graph: &ReachableCommits, format: GraphFormat) -> String {
    match format {
        GraphFormat::Ascii => render_ascii(graph),
        GraphFormat::Mermaid => render_mermaid(graph),
        GraphFormat::Dot => render_dot(graph),
    }
}

fn labels(graph: &ReachableCommits, oid: &Digest) -> Option<String> {
    graph
        .labels
        .get(oid)
        .filter(|l| !l.is_empty())
        .map(|l| l.join(", "))
}

// Writing to a String never fails, so the results of write! are ignored below.

fn render_ascii(graph: &ReachableCommits) -> String {
    let mut out = String::new();
    for (oid, commit) in &graph.commits {
        let _ = write!(out, "{} {}", if commit.is_merge() { "M" } else { "*" }, oid.short());
        if let Some(labels) = labels(graph, oid) {
            let _ = write!(out, " ({labels})");
        }
        let _ = writeln!(out, " {}", commit.summary());
    }
    out
}

fn render_mermaid(graph: &ReachableCommits) -> String {
    let escape = |s: &str| s.replace('"', "#quot;");

    let mut out = String::from("graph TD\n");
    for (oid, commit) in &graph.commits {
        let mut text = format!("{}: {}", oid.short(), escape(commit.summary()));
        if let Some(labels) = labels(graph, oid) {
            let _ = write!(text, "<br/>{}", escape(&labels));
        }
        let id = format!("C{}", oid.short());
        if commit.is_merge() {
            let _ = writeln!(out, "    {id}{{{{\"{text}\"}}}}");
        } else {
            let _ = writeln!(out, "    {id}[\"{text}\"]");
        }
    }
    for (parent, child) in &graph.edges {
        let _ = writeln!(out, "    C{} --> C{}", parent.short(), child.short());
    }
    out
}

fn render_dot(graph: &ReachableCommits) -> String {
    let escape = |s: &str| s.replace('\\', "\\\\").replace('"', "\\\"");

    let mut out = String::from("digraph GitGraph {\n    rankdir=LR;\n    node [shape=box];\n");
    for (oid, commit) in &graph.commits {
        let mut text = format!("{}\\n{}", oid.short(), escape(commit.summary()));
        if let Some(labels) = labels(graph, oid) {
            let _ = write!(text, "\\n[{}]", escape(&labels));
        }
        let shape = if commit.is_merge() { ", shape=diamond" } else { "" };
        let _ = writeln!(out, "    \"{}\" [label=\"{text}\"{shape}];", oid.short());
    }
    for (parent, child) in &graph.edges {
        let _ = writeln!(out, "    \"{}\" -> \"{}\";", parent.short(), child.short());
    }
    out.push_str("}\n");
    out
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::storable::commit::{Commit, Signature, Timestamp};

    fn commit(parents: Vec<Digest>, message: &str) -> Commit {
        let sig = Signature::new("A", "a@example.com", Timestamp::new(0, 0));
        Commit::new(Digest::NULL, parents, sig.clone(), sig, message)
    }

    fn diamond() -> (ReachableCommits, [Digest; 4]) {
        let ids = [b"root", b"left", b"rght", b"merg"].map(|b| Digest::new(b));
        let [root, left, right, merge] = ids;
        let graph = ReachableCommits {
            commits: vec![
                (merge, commit(vec![left, right], "Merge \"right\"\n")),
                (right, commit(vec![root], "right\n")),
                (left, commit(vec![root], "left\n")),
                (root, commit(vec![], "root\n")),
            ],
            edges: vec![(left, merge), (right, merge), (root, right), (root, left)],
            labels: HashMap::from([(merge, vec!["main".to_owned(), "HEAD".to_owned()])]),
        };
        (graph, ids)
    }

    #[test]
    fn parse_format() {
        assert_eq!("Mermaid".parse::<GraphFormat>(), Ok(GraphFormat::Mermaid));
        assert_eq!("dot".parse::<GraphFormat>(), Ok(GraphFormat::Dot));
        assert_eq!("ascii".parse::<GraphFormat>(), Ok(GraphFormat::Ascii));
        assert!("svg".parse::<GraphFormat>().is_err());
    }

    #[test]
    fn ascii() {
        let (graph, [root, left, right, merge]) = diamond();
        assert_eq!(
            render(&graph, GraphFormat::Ascii),
            format!(
                "M {} (main, HEAD) Merge \"right\"\n* {} right\n* {} left\n* {} root\n",
                merge.short(),
                right.short(),
                left.short(),
                root.short()
            )
        );
    }

    #[test]
    fn mermaid() {
        let (graph, [root, left, _, merge]) = diamond();
        let out = render(&graph, GraphFormat::Mermaid);
        let lines: Vec<_> = out.lines().collect();

        assert_eq!(lines[0], "graph TD");
        assert_eq!(
            lines[1],
            format!(
                "    C{m}{{{{\"{m}: Merge #quot;right#quot;<br/>main, HEAD\"}}}}",
                m = merge.short()
            )
        );
        assert_eq!(
            lines[4],
            format!("    C{r}[\"{r}: root\"]", r = root.short())
        );
        assert!(lines.contains(&format!("    C{} --> C{}", left.short(), merge.short()).as_str()));
        assert_eq!(lines.len(), 9);
    }

    #[test]
    fn dot() {
        let (graph, [root, left, _, merge]) = diamond();
        let out = render(&graph, GraphFormat::Dot);

        assert!(out.starts_with("digraph GitGraph {\n    rankdir=LR;\n"));
        assert!(out.ends_with("}\n"));
        assert!(out.contains(&format!(
            "    \"{m}\" [label=\"{m}\\nMerge \\\"right\\\"\\n[main, HEAD]\", shape=diamond];\n",
            m = merge.short()
        )));
        assert!(out.contains(&format!("    \"{}\" -> \"{}\";\n", root.short(), left.short())));
    }
}
