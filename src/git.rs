use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::types::{FileChange, FileStatus, RevisionRange};

/// Trait defining the version-control operations required by the library
pub trait Git {
    /// List the files changed between the two revisions of `range`, in the order git reports them
    ///
    /// # Errors
    ///
    /// Returns an error if the diff cannot be listed
    fn changed_files(&self, range: &RevisionRange) -> Result<Vec<FileChange>>;

    /// Get the unified diff of a single file between the two revisions of `range`
    ///
    /// # Errors
    ///
    /// Returns an error if the diff cannot be produced
    fn file_diff(&self, range: &RevisionRange, path: &str) -> Result<String>;

    /// Read a file from the working tree. `Ok(None)` means the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read as UTF-8 text
    fn worktree_content(&self, path: &str) -> Result<Option<String>>;

    /// The checked-out branch name, or the commit hash when `HEAD` is detached
    ///
    /// # Errors
    ///
    /// Returns an error if `HEAD` cannot be resolved
    fn current_revision(&self) -> Result<String>;

    /// Checkout a branch or commit
    ///
    /// # Errors
    ///
    /// Returns an error if the revision cannot be checked out
    fn checkout(&self, revision: &str) -> Result<()>;

    /// Create a new branch at `start_point` and check it out
    ///
    /// # Errors
    ///
    /// Returns an error if the branch cannot be created
    fn create_branch(&self, name: &str, start_point: &str) -> Result<()>;

    /// Replace the given paths in the working tree and index with their content at `revision`
    ///
    /// # Errors
    ///
    /// Returns an error if any path cannot be checked out
    fn checkout_paths(&self, revision: &str, paths: &[&str]) -> Result<()>;

    /// Commit the given paths only. Other staged or untracked files are left out.
    ///
    /// # Errors
    ///
    /// Returns an error if committing fails
    fn commit(&self, message: &str, paths: &[&str]) -> Result<()>;

    /// Push a local branch to a remote
    ///
    /// # Errors
    ///
    /// Returns an error if the push is rejected
    fn push(&self, remote: &str, branch: &str) -> Result<()>;
}

/// Implementation of Git operations using the local Git CLI
pub struct GitCli {
    repo_path: PathBuf,
    _temp_workspace: Option<tree_fs::Tree>, // To manage lifetime of temp dir
}

impl GitCli {
    /// Creates a new `GitCli` instance with the given repository path
    #[must_use]
    pub const fn new(repo_path: PathBuf) -> Self {
        Self {
            repo_path,
            _temp_workspace: None,
        }
    }

    /// Creates a new `GitCli` instance with a temporary workspace
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary workspace cannot be created
    pub fn new_with_temp_workspace() -> Result<Self> {
        debug!("Creating temporary workspace");
        let tree = tree_fs::TreeBuilder::default()
            .create()
            .map_err(|e| Error::TempDirError(e.to_string()))?;

        let repo_path = tree.root.clone();

        debug!("Temporary workspace created");

        Ok(Self {
            repo_path,
            _temp_workspace: Some(tree),
        })
    }

    #[must_use]
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Clone a Git repository from a URL into this instance's repository path
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be cloned
    #[instrument(skip(self), fields(url = %url, target_dir = %self.repo_path.display()))]
    pub fn clone_repo(&self, url: &str) -> Result<()> {
        let output = Command::new("git")
            .args(["clone", url, &self.repo_path.to_string_lossy()])
            .current_dir(std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")))
            .output()
            .map_err(|e| Error::GitCommandError(e.to_string()))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            debug!(error = %error, "Clone failed");
            return Err(Error::GitCommandError(error.to_string()));
        }

        debug!("Repository cloned successfully");
        Ok(())
    }

    /// Run a Git command with the given arguments and return its trimmed stdout
    ///
    /// # Errors
    ///
    /// Returns an error if the git command cannot be executed or exits unsuccessfully
    pub fn run_git_command(&self, args: &[&str]) -> Result<String> {
        self.run_git_command_raw(args).map(|s| s.trim().to_string())
    }

    /// Run a Git command and return its stdout untouched.
    #[instrument(skip(self), fields(args = ?args, repo_path = %self.repo_path.display()))]
    fn run_git_command_raw(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| Error::GitCommandError(e.to_string()))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            debug!(error = %error, "Git command failed");
            return Err(Error::GitCommandError(error.to_string()));
        }

        let result =
            String::from_utf8(output.stdout).map_err(|e| Error::GitCommandError(e.to_string()))?;

        debug!(
            output_length = result.len(),
            "Git command completed successfully"
        );
        Ok(result)
    }
}

/// Parses `git diff --name-status` output. Lines are `<code>\t<path>`.
fn parse_name_status(output: &str) -> Vec<FileChange> {
    output
        .lines()
        .filter_map(|line| {
            let (code, path) = line.split_once('\t')?;
            let path = path.trim();
            if path.is_empty() {
                return None;
            }
            Some(FileChange::new(path, FileStatus::from_code(code.trim())))
        })
        .collect()
}

impl Git for GitCli {
    #[instrument(skip(self), fields(range = %range))]
    fn changed_files(&self, range: &RevisionRange) -> Result<Vec<FileChange>> {
        let output =
            self.run_git_command(&["diff", "--name-status", "--no-renames", &range.spec()])?;
        let changes = parse_name_status(&output);
        debug!(count = changes.len(), "Changed files listed");
        Ok(changes)
    }

    #[instrument(skip(self), fields(range = %range, path = %path))]
    fn file_diff(&self, range: &RevisionRange, path: &str) -> Result<String> {
        self.run_git_command_raw(&["diff", "--no-renames", &range.spec(), "--", path])
    }

    #[instrument(skip(self), fields(path = %path))]
    fn worktree_content(&self, path: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.repo_path.join(path)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("File not present in working tree");
                Ok(None)
            }
            Err(e) => Err(Error::IoError(e)),
        }
    }

    fn current_revision(&self) -> Result<String> {
        match self.run_git_command(&["symbolic-ref", "--short", "-q", "HEAD"]) {
            Ok(branch) if !branch.is_empty() => Ok(branch),
            _ => self.run_git_command(&["rev-parse", "HEAD"]),
        }
    }

    #[instrument(skip(self), fields(revision = %revision, repo_path = %self.repo_path.display()))]
    fn checkout(&self, revision: &str) -> Result<()> {
        self.run_git_command(&["checkout", revision])?;
        debug!("Revision checked out successfully");
        Ok(())
    }

    #[instrument(skip(self), fields(branch = %name, start_point = %start_point))]
    fn create_branch(&self, name: &str, start_point: &str) -> Result<()> {
        self.run_git_command(&["checkout", "-b", name, start_point])?;
        debug!("Branch created");
        Ok(())
    }

    #[instrument(skip(self), fields(revision = %revision, paths = ?paths))]
    fn checkout_paths(&self, revision: &str, paths: &[&str]) -> Result<()> {
        let mut args = vec!["checkout", revision, "--"];
        args.extend_from_slice(paths);
        self.run_git_command(&args)?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn commit(&self, message: &str, paths: &[&str]) -> Result<()> {
        let mut args = vec!["commit", "-m", message, "--"];
        args.extend_from_slice(paths);
        self.run_git_command(&args)?;
        debug!("Changes committed");
        Ok(())
    }

    #[instrument(skip(self), fields(remote = %remote, branch = %branch))]
    fn push(&self, remote: &str, branch: &str) -> Result<()> {
        self.run_git_command(&["push", remote, branch])?;
        debug!("Branch pushed");
        Ok(())
    }
}
