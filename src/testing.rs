//! In-memory `Git`, `Forge` and `Summarizer` fakes for unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io;

use crate::error::{Error, Result};
use crate::forge::{Forge, NewPullRequest, PullRequest};
use crate::git::Git;
use crate::review::Summarizer;
use crate::types::{FileChange, FileStatus, RevisionRange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitCall {
    Checkout(String),
    CreateBranch(String, String),
    CheckoutPaths(String, Vec<String>),
    Commit(String, Vec<String>),
    Push(String, String),
}

pub struct FakeGit {
    changes: Vec<FileChange>,
    diffs: HashMap<String, String>,
    worktree: HashMap<String, String>,
    unreadable: HashSet<String>,
    fail_push: bool,
    calls: RefCell<Vec<GitCall>>,
}

impl Default for FakeGit {
    fn default() -> Self {
        Self {
            changes: Vec::new(),
            diffs: HashMap::new(),
            worktree: HashMap::new(),
            unreadable: HashSet::new(),
            fail_push: false,
            calls: RefCell::new(Vec::new()),
        }
    }
}

impl FakeGit {
    /// A changed file that is present in the working tree.
    pub fn with_file(mut self, path: &str, status: FileStatus, diff: &str) -> Self {
        self.changes.push(FileChange::new(path, status));
        self.diffs.insert(path.to_string(), diff.to_string());
        self.worktree
            .insert(path.to_string(), format!("# contents of {path}\n"));
        self
    }

    pub fn with_deleted(mut self, path: &str) -> Self {
        self.changes.push(FileChange::new(path, FileStatus::Deleted));
        self.diffs
            .insert(path.to_string(), "@@ -1 +0,0 @@\n-X = 1\n".to_string());
        self
    }

    pub fn with_unreadable(mut self, path: &str) -> Self {
        self.changes.push(FileChange::new(path, FileStatus::Modified));
        self.unreadable.insert(path.to_string());
        self
    }

    pub fn failing_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    pub fn mutations(&self) -> Vec<GitCall> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: GitCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl Git for FakeGit {
    fn changed_files(&self, _range: &RevisionRange) -> Result<Vec<FileChange>> {
        Ok(self.changes.clone())
    }

    fn file_diff(&self, _range: &RevisionRange, path: &str) -> Result<String> {
        Ok(self.diffs.get(path).cloned().unwrap_or_default())
    }

    fn worktree_content(&self, path: &str) -> Result<Option<String>> {
        if self.unreadable.contains(path) {
            return Err(Error::IoError(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "permission denied",
            )));
        }
        Ok(self.worktree.get(path).cloned())
    }

    fn current_revision(&self) -> Result<String> {
        Ok("feature".to_string())
    }

    fn checkout(&self, revision: &str) -> Result<()> {
        self.record(GitCall::Checkout(revision.to_string()));
        Ok(())
    }

    fn create_branch(&self, name: &str, start_point: &str) -> Result<()> {
        self.record(GitCall::CreateBranch(
            name.to_string(),
            start_point.to_string(),
        ));
        Ok(())
    }

    fn checkout_paths(&self, revision: &str, paths: &[&str]) -> Result<()> {
        self.record(GitCall::CheckoutPaths(
            revision.to_string(),
            paths.iter().map(ToString::to_string).collect(),
        ));
        Ok(())
    }

    fn commit(&self, message: &str, paths: &[&str]) -> Result<()> {
        self.record(GitCall::Commit(
            message.to_string(),
            paths.iter().map(ToString::to_string).collect(),
        ));
        Ok(())
    }

    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.record(GitCall::Push(remote.to_string(), branch.to_string()));
        if self.fail_push {
            return Err(Error::GitCommandError("remote rejected".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingForge {
    opened: RefCell<Vec<NewPullRequest>>,
    comments: RefCell<Vec<(u64, String)>>,
}

impl RecordingForge {
    pub fn opened(&self) -> Vec<NewPullRequest> {
        self.opened.borrow().clone()
    }

    pub fn comments(&self) -> Vec<(u64, String)> {
        self.comments.borrow().clone()
    }
}

impl Forge for RecordingForge {
    fn open_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest> {
        let mut opened = self.opened.borrow_mut();
        opened.push(request.clone());
        let number = 99 + opened.len() as u64;
        Ok(PullRequest {
            number,
            html_url: format!("https://github.com/acme/widgets/pull/{number}"),
        })
    }

    fn comment_on_pull_request(&self, number: u64, body: &str) -> Result<()> {
        self.comments.borrow_mut().push((number, body.to_string()));
        Ok(())
    }
}

/// Answers every prompt with a fixed summary, failing for prompts that mention `fail_on`.
#[derive(Default)]
pub struct FakeSummarizer {
    pub fail_on: Option<String>,
    pub prompts: RefCell<Vec<String>>,
}

impl Summarizer for FakeSummarizer {
    fn summarize(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        match &self.fail_on {
            Some(needle) if prompt.contains(needle.as_str()) => Err(Error::LlmApiError {
                status: 500,
                body: "internal error".to_string(),
            }),
            _ => Ok("Looks fine.".to_string()),
        }
    }
}
