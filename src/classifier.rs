//! Decides whether a file's diff is a "simple" change (constant values or
//! identifier renames only) that can be extracted into its own pull request.
//!
//! The heuristic works on diff-line text alone. It never parses the target
//! language, so anything borderline is rejected.

use serde::Serialize;
use std::fmt;

use crate::types::{FileChange, FileStatus};

/// Diffs with more added + removed lines than this are never simple.
pub const MAX_CHANGED_LINES: usize = 20;

/// Substrings that mark a changed line as structural: definitions, imports,
/// decorators and control-flow openers.
pub const STRUCTURAL_TOKENS: &[&str] = &[
    "class ", "def ", "import ", "from ", "@", "if ", "for ", "while ", "try:", "except",
    "finally:",
];

/// A changed line whose content starts with this many spaces is an indentation change.
pub const INDENT_WIDTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierConfig {
    pub max_changed_lines: usize,
    pub structural_tokens: Vec<String>,
    pub indent_width: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            max_changed_lines: MAX_CHANGED_LINES,
            structural_tokens: STRUCTURAL_TOKENS.iter().map(ToString::to_string).collect(),
            indent_width: INDENT_WIDTH,
        }
    }
}

impl ClassifierConfig {
    fn structural_token(&self, content: &str) -> Option<&str> {
        self.structural_tokens
            .iter()
            .map(String::as_str)
            .find(|token| content.contains(token))
    }

    fn is_indented(&self, content: &str) -> bool {
        self.indent_width > 0
            && content.len() >= self.indent_width
            && content.bytes().take(self.indent_width).all(|b| b == b' ')
    }
}

/// One line of a unified diff hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLine<'a> {
    Added(&'a str),
    Removed(&'a str),
    Context(&'a str),
}

impl<'a> DiffLine<'a> {
    /// The line text without its diff marker.
    #[must_use]
    pub const fn content(&self) -> &'a str {
        match *self {
            Self::Added(s) | Self::Removed(s) | Self::Context(s) => s,
        }
    }

    #[must_use]
    pub const fn is_change(&self) -> bool {
        matches!(self, Self::Added(_) | Self::Removed(_))
    }
}

/// Iterator over the hunk lines of a unified diff.
///
/// File headers (`diff --git`, `index`, `---`, `+++`, mode lines) between a
/// `diff --git` line and the next `@@` are skipped. Input without a
/// `diff --git` line is treated as bare hunk content.
pub struct DiffLines<'a> {
    lines: std::str::Lines<'a>,
    in_hunk: bool,
}

#[must_use]
pub fn parse_diff(diff: &str) -> DiffLines<'_> {
    DiffLines {
        lines: diff.lines(),
        in_hunk: true,
    }
}

impl<'a> Iterator for DiffLines<'a> {
    type Item = DiffLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            if line.starts_with("diff --git ") {
                self.in_hunk = false;
                continue;
            }
            if line.starts_with("@@") {
                self.in_hunk = true;
                continue;
            }
            if !self.in_hunk || line.starts_with('\\') {
                continue;
            }
            return Some(if let Some(rest) = line.strip_prefix('+') {
                DiffLine::Added(rest)
            } else if let Some(rest) = line.strip_prefix('-') {
                DiffLine::Removed(rest)
            } else {
                DiffLine::Context(line.strip_prefix(' ').unwrap_or(line))
            });
        }
    }
}

/// Why a change was not considered simple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    NotModified { status: FileStatus },
    MissingFromWorktree,
    TooManyLines { changed: usize, limit: usize },
    StructuralToken { token: String, line: String },
    IndentationChange { line: String },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotModified { status } => write!(f, "file is not modified in place ({status})"),
            Self::MissingFromWorktree => f.write_str("file is missing from the working tree"),
            Self::TooManyLines { changed, limit } => {
                write!(f, "{changed} lines changed (limit {limit})")
            }
            Self::StructuralToken { token, line } => {
                write!(f, "structural token {token:?} in {line:?}")
            }
            Self::IndentationChange { line } => write!(f, "indentation change in {line:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Simple,
    NotSimple(Rejection),
}

impl Verdict {
    #[must_use]
    pub const fn is_simple(&self) -> bool {
        matches!(self, Self::Simple)
    }

    #[must_use]
    pub const fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Simple => None,
            Self::NotSimple(rejection) => Some(rejection),
        }
    }
}

/// Classifies a file change.
///
/// `in_worktree` tells whether the path currently exists in the working tree.
/// Added and deleted files are rejected before any diff gate runs.
#[must_use]
pub fn classify(
    change: &FileChange,
    in_worktree: bool,
    diff: &str,
    config: &ClassifierConfig,
) -> Verdict {
    if change.status != FileStatus::Modified {
        return Verdict::NotSimple(Rejection::NotModified {
            status: change.status,
        });
    }
    if !in_worktree {
        return Verdict::NotSimple(Rejection::MissingFromWorktree);
    }
    for line in diff.lines() {
        if line.starts_with("@@") {
            break;
        }
        if line.starts_with("new file mode") {
            return Verdict::NotSimple(Rejection::NotModified {
                status: FileStatus::Added,
            });
        }
        if line.starts_with("deleted file mode") {
            return Verdict::NotSimple(Rejection::NotModified {
                status: FileStatus::Deleted,
            });
        }
    }
    classify_diff(diff, config)
}

/// Runs the size, structural-token and indentation gates over a diff.
#[must_use]
pub fn classify_diff(diff: &str, config: &ClassifierConfig) -> Verdict {
    let changed: Vec<DiffLine<'_>> = parse_diff(diff).filter(DiffLine::is_change).collect();

    if changed.len() > config.max_changed_lines {
        return Verdict::NotSimple(Rejection::TooManyLines {
            changed: changed.len(),
            limit: config.max_changed_lines,
        });
    }

    for line in &changed {
        let content = line.content();
        if let Some(token) = config.structural_token(content) {
            return Verdict::NotSimple(Rejection::StructuralToken {
                token: token.to_string(),
                line: content.to_string(),
            });
        }
        if config.is_indented(content) {
            return Verdict::NotSimple(Rejection::IndentationChange {
                line: content.to_string(),
            });
        }
    }

    Verdict::Simple
}
