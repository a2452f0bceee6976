use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
}

impl FileStatus {
    /// Maps a `git diff --name-status` code to a status.
    ///
    /// Only `A` and `D` are distinguished; every other code (`M`, `T`, ...) is a modification.
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.chars().next() {
            Some('A') => Self::Added,
            Some('D') => Self::Deleted,
            _ => Self::Modified,
        }
    }

    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Added => 'A',
            Self::Modified => 'M',
            Self::Deleted => 'D',
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileChange {
    pub path: String,
    pub status: FileStatus,
}

impl FileChange {
    #[must_use]
    pub fn new(path: impl Into<String>, status: FileStatus) -> Self {
        Self {
            path: path.into(),
            status,
        }
    }
}

/// A pair of revisions to compare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRange {
    pub base: String,
    pub head: String,
    /// Compare `head` against the merge base of both revisions (`base...head`)
    /// instead of against `base` itself (`base..head`).
    pub merge_base: bool,
}

impl RevisionRange {
    #[must_use]
    pub fn new(base: impl Into<String>, head: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            head: head.into(),
            merge_base: false,
        }
    }

    #[must_use]
    pub fn from_merge_base(base: impl Into<String>, head: impl Into<String>) -> Self {
        Self {
            merge_base: true,
            ..Self::new(base, head)
        }
    }

    /// The revision range as git expects it on the command line.
    #[must_use]
    pub fn spec(&self) -> String {
        let dots = if self.merge_base { "..." } else { ".." };
        format!("{}{dots}{}", self.base, self.head)
    }
}

impl fmt::Display for RevisionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec())
    }
}
