pub use classifier::{ClassifierConfig, DiffLine, Rejection, Verdict};
pub use error::{Error, Result};
pub use forge::{Forge, GitHubForge, NewPullRequest, PullRequest};
pub use git::{Git, GitCli};
pub use review::{GeminiClient, ReviewConfig, Reviewer, Summarizer};
pub use splitter::{SplitConfig, SplitReport, Splitter};
pub use types::{FileChange, FileStatus, RevisionRange};

use std::path::Path;
use tracing::{debug, instrument};

pub mod classifier;
mod error;
pub mod forge;
mod git;
pub mod review;
pub mod splitter;
#[cfg(test)]
mod testing;
mod types;

/// Opens a local Git repository.
///
/// # Errors
///
/// Returns an error if the repository path does not exist.
pub fn new_from_local(repo_path: &Path) -> Result<GitCli> {
    if !repo_path.exists() {
        return Err(Error::ConfigError(format!(
            "repository path `{}` does not exist",
            repo_path.display()
        )));
    }
    Ok(GitCli::new(repo_path.to_path_buf()))
}

/// Clones a remote repository into a temporary workspace that lives as long as the returned `GitCli`.
///
/// # Errors
///
/// Returns an error if the workspace cannot be created or cloning fails.
pub fn new_from_remote(repo_url: &str) -> Result<GitCli> {
    let git = GitCli::new_with_temp_workspace()?;
    git.clone_repo(repo_url)?;
    debug!(repo_url = %repo_url, "Repository cloned successfully");
    Ok(git)
}

/// Top-level factory function to open a repository.
/// It determines whether the source is a local path or a remote URL and calls the appropriate constructor.
///
/// # Errors
///
/// when the repository could not be opened or cloned.
#[instrument]
pub fn open(repo: &str) -> Result<GitCli> {
    let is_url = repo.starts_with("https://") || repo.starts_with("git@");

    if is_url {
        debug!("Repository is a remote URL, creating from remote");
        new_from_remote(repo)
    } else {
        debug!("Repository is a local path, creating from local");
        new_from_local(Path::new(repo))
    }
}
