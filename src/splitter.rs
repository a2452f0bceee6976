//! Extracts the simple changes of a pull request into a follow-up pull request.

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::classifier::{self, ClassifierConfig, Rejection, Verdict};
use crate::error::Result;
use crate::forge::{Forge, NewPullRequest, PullRequest};
use crate::git::Git;
use crate::types::{FileChange, FileStatus, RevisionRange};

pub const DEFAULT_REMOTE: &str = "origin";
pub const DEFAULT_BRANCH_PREFIX: &str = "simple-changes";
pub const DEFAULT_COMMIT_MESSAGE: &str = "Simple changes: constants and name updates";

#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Target branch of the original pull request, without the remote prefix.
    pub base_ref: String,
    /// Source branch of the original pull request, without the remote prefix.
    pub head_ref: String,
    pub pr_number: u64,
    pub remote: String,
    pub branch_prefix: String,
    /// Overrides the generated `<prefix>-<timestamp>` branch name.
    pub branch_name: Option<String>,
    pub commit_message: String,
    pub dry_run: bool,
    pub classifier: ClassifierConfig,
}

impl SplitConfig {
    #[must_use]
    pub fn new(base_ref: impl Into<String>, head_ref: impl Into<String>, pr_number: u64) -> Self {
        Self {
            base_ref: base_ref.into(),
            head_ref: head_ref.into(),
            pr_number,
            remote: DEFAULT_REMOTE.to_string(),
            branch_prefix: DEFAULT_BRANCH_PREFIX.to_string(),
            branch_name: None,
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            dry_run: false,
            classifier: ClassifierConfig::default(),
        }
    }

    /// `<remote>/<base>..<remote>/<head>`
    #[must_use]
    pub fn range(&self) -> RevisionRange {
        RevisionRange::new(self.remote_ref(&self.base_ref), self.remote_ref(&self.head_ref))
    }

    fn remote_ref(&self, name: &str) -> String {
        format!("{}/{name}", self.remote)
    }

    #[must_use]
    pub fn branch_name_at(&self, now: NaiveDateTime) -> String {
        self.branch_name.clone().unwrap_or_else(|| {
            format!("{}-{}", self.branch_prefix, now.format("%Y%m%d-%H%M%S"))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub change: FileChange,
    pub verdict: Verdict,
}

impl Classification {
    #[must_use]
    pub const fn is_simple(&self) -> bool {
        self.verdict.is_simple()
    }
}

/// JSON shape of a classification.
#[derive(Debug, Serialize)]
pub struct ClassificationReport<'a> {
    pub path: &'a str,
    pub status: FileStatus,
    pub simple: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<&'a Rejection>,
}

impl<'a> From<&'a Classification> for ClassificationReport<'a> {
    fn from(classification: &'a Classification) -> Self {
        Self {
            path: &classification.change.path,
            status: classification.change.status,
            simple: classification.is_simple(),
            rejection: classification.verdict.rejection(),
        }
    }
}

/// A file left out of the run because it could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub change: FileChange,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Published {
    pub branch: String,
    pub pull_request: PullRequest,
}

#[derive(Debug, Default)]
pub struct SplitReport {
    pub classified: Vec<Classification>,
    pub skipped: Vec<SkippedFile>,
    pub published: Option<Published>,
}

impl SplitReport {
    pub fn simple_changes(&self) -> impl Iterator<Item = &FileChange> {
        self.classified
            .iter()
            .filter(|c| c.is_simple())
            .map(|c| &c.change)
    }
}

/// Classifies every file changed in `range`.
///
/// Files that cannot be read from the working tree are skipped.
///
/// # Errors
///
/// Returns an error if the changed files or a file's diff cannot be listed
pub fn classify_changes(
    git: &impl Git,
    range: &RevisionRange,
    config: &ClassifierConfig,
) -> Result<SplitReport> {
    let changes = git.changed_files(range)?;
    debug!(count = changes.len(), range = %range, "Classifying changed files");

    let mut report = SplitReport::default();
    for change in changes {
        info!(status = %change.status, path = %change.path, "Changed file");

        let in_worktree = match git.worktree_content(&change.path) {
            Ok(content) => content.is_some(),
            Err(e) => {
                warn!(path = %change.path, error = %e, "Skipping unreadable file");
                report.skipped.push(SkippedFile {
                    change,
                    error: e.to_string(),
                });
                continue;
            }
        };

        let diff = git.file_diff(range, &change.path)?;
        let verdict = classifier::classify(&change, in_worktree, &diff, config);
        match verdict.rejection() {
            None => debug!(path = %change.path, "Simple change"),
            Some(rejection) => debug!(path = %change.path, %rejection, "Structural change"),
        }
        report.classified.push(Classification { change, verdict });
    }
    Ok(report)
}

/// Drives classification and publication over a `Git` and a `Forge`.
pub struct Splitter<'a, G, F> {
    git: &'a G,
    forge: &'a F,
    config: &'a SplitConfig,
}

impl<'a, G: Git, F: Forge> Splitter<'a, G, F> {
    #[must_use]
    pub const fn new(git: &'a G, forge: &'a F, config: &'a SplitConfig) -> Self {
        Self { git, forge, config }
    }

    /// Classifies every file changed between base and head.
    ///
    /// # Errors
    ///
    /// Returns an error if the changed files or a file's diff cannot be listed
    #[instrument(skip(self), fields(base = %self.config.base_ref, head = %self.config.head_ref))]
    pub fn classify_changes(&self) -> Result<SplitReport> {
        classify_changes(self.git, &self.config.range(), &self.config.classifier)
    }

    /// Classifies the changes and, unless there are no simple ones or this is a dry run,
    /// publishes them as a new pull request.
    ///
    /// # Errors
    ///
    /// Returns an error if any git or forge operation fails
    pub fn run(&self) -> Result<SplitReport> {
        self.run_at(Local::now().naive_local())
    }

    /// Like [`Splitter::run`], naming the new branch after `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if any git or forge operation fails
    pub fn run_at(&self, now: NaiveDateTime) -> Result<SplitReport> {
        let mut report = self.classify_changes()?;

        let paths: Vec<&str> = report.simple_changes().map(|c| c.path.as_str()).collect();
        if paths.is_empty() {
            info!("No simple changes found");
            return Ok(report);
        }

        let branch = self.config.branch_name_at(now);
        if self.config.dry_run {
            info!(branch = %branch, files = ?paths, "Dry run, nothing published");
            return Ok(report);
        }

        let pull_request = self.publish(&branch, &paths)?;
        report.published = Some(Published {
            branch,
            pull_request,
        });
        Ok(report)
    }

    #[instrument(skip(self, paths), fields(files = paths.len()))]
    fn publish(&self, branch: &str, paths: &[&str]) -> Result<PullRequest> {
        let config = self.config;
        let original = self.git.current_revision()?;

        self.git
            .create_branch(branch, &config.remote_ref(&config.base_ref))?;
        let committed = self
            .git
            .checkout_paths(&config.remote_ref(&config.head_ref), paths)
            .and_then(|()| self.git.commit(&config.commit_message, paths))
            .and_then(|()| self.git.push(&config.remote, branch));
        let restored = self.git.checkout(&original);
        committed?;
        if let Err(e) = restored {
            warn!(revision = %original, error = %e, "Could not restore original checkout");
        }
        info!(branch = %branch, remote = %config.remote, "Branch pushed");

        let pull_request = self
            .forge
            .open_pull_request(&NewPullRequest {
                title: format!("Simple changes from #{}", config.pr_number),
                body: pull_request_body(config.pr_number, paths),
                head: branch.to_string(),
                base: config.base_ref.clone(),
            })
            .inspect_err(|_| {
                warn!(branch = %branch, "Branch was pushed but the pull request could not be opened");
            })?;
        info!(number = pull_request.number, url = %pull_request.html_url, "Pull request opened");

        self.forge.comment_on_pull_request(
            config.pr_number,
            &format!(
                "Simple changes from this pull request were extracted into #{}: {}",
                pull_request.number, pull_request.html_url
            ),
        )?;
        Ok(pull_request)
    }
}

fn pull_request_body(pr_number: u64, paths: &[&str]) -> String {
    let files: String = paths.iter().map(|p| format!("- `{p}`\n")).collect();
    format!(
        "This PR contains simple changes extracted from #{pr_number}.

These changes are limited to:
- Constant value updates
- Variable/function name changes
- No structural changes

Files:
{files}
Original PR: #{pr_number}
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::{FakeGit, GitCall, RecordingForge};
    use chrono::NaiveDate;

    const SIMPLE_DIFF: &str = "@@ -1 +1 @@\n-TIMEOUT = 30\n+TIMEOUT = 60\n";
    const STRUCTURAL_DIFF: &str = "@@ -1 +1,2 @@\n X = 1\n+def helper():\n";

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .and_then(|d| d.and_hms_opt(14, 5, 7))
            .expect("valid date")
    }

    fn git() -> FakeGit {
        FakeGit::default()
            .with_file("config.py", FileStatus::Modified, SIMPLE_DIFF)
            .with_file("app.py", FileStatus::Modified, STRUCTURAL_DIFF)
            .with_file("new.py", FileStatus::Added, "@@ -0,0 +1 @@\n+X = 1\n")
            .with_deleted("old.py")
    }

    #[test]
    fn generated_branch_name() {
        let config = SplitConfig::new("main", "feature", 7);
        assert_eq!(config.branch_name_at(now()), "simple-changes-20240309-140507");
        assert_eq!(config.range().spec(), "origin/main..origin/feature");
    }

    #[test]
    fn classifies_each_file() {
        let git = git();
        let forge = RecordingForge::default();
        let config = SplitConfig::new("main", "feature", 7);

        let report = Splitter::new(&git, &forge, &config)
            .classify_changes()
            .expect("classification succeeds");

        let simple: Vec<_> = report.simple_changes().map(|c| c.path.as_str()).collect();
        assert_eq!(simple, vec!["config.py"]);
        assert_eq!(report.classified.len(), 4);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn publishes_simple_changes() {
        let git = git();
        let forge = RecordingForge::default();
        let config = SplitConfig::new("main", "feature", 7);

        let report = Splitter::new(&git, &forge, &config)
            .run_at(now())
            .expect("split succeeds");

        let branch = "simple-changes-20240309-140507";
        assert_eq!(
            git.mutations(),
            vec![
                GitCall::CreateBranch(branch.into(), "origin/main".into()),
                GitCall::CheckoutPaths("origin/feature".into(), vec!["config.py".into()]),
                GitCall::Commit(DEFAULT_COMMIT_MESSAGE.into(), vec!["config.py".into()]),
                GitCall::Push("origin".into(), branch.into()),
                GitCall::Checkout("feature".into()),
            ]
        );

        let opened = forge.opened();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].title, "Simple changes from #7");
        assert_eq!(opened[0].head, branch);
        assert_eq!(opened[0].base, "main");
        assert!(opened[0].body.contains("- `config.py`"));

        let comments = forge.comments();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].0, 7);
        assert!(comments[0].1.contains("#100"));

        let published = report.published.expect("published");
        assert_eq!(published.branch, branch);
        assert_eq!(published.pull_request.number, 100);
    }

    #[test]
    fn no_simple_changes_is_a_no_op() {
        let git = FakeGit::default().with_file("app.py", FileStatus::Modified, STRUCTURAL_DIFF);
        let forge = RecordingForge::default();
        let config = SplitConfig::new("main", "feature", 7);

        let report = Splitter::new(&git, &forge, &config)
            .run_at(now())
            .expect("no-op succeeds");

        assert!(report.published.is_none());
        assert!(git.mutations().is_empty());
        assert!(forge.opened().is_empty());
        assert!(forge.comments().is_empty());
    }

    #[test]
    fn dry_run_publishes_nothing() {
        let git = git();
        let forge = RecordingForge::default();
        let config = SplitConfig {
            dry_run: true,
            ..SplitConfig::new("main", "feature", 7)
        };

        let report = Splitter::new(&git, &forge, &config)
            .run_at(now())
            .expect("dry run succeeds");

        assert_eq!(report.simple_changes().count(), 1);
        assert!(report.published.is_none());
        assert!(git.mutations().is_empty());
        assert!(forge.opened().is_empty());
    }

    #[test]
    fn unreadable_file_is_skipped() {
        let git = git().with_unreadable("broken.py");
        let forge = RecordingForge::default();
        let config = SplitConfig {
            branch_name: Some("extract".into()),
            ..SplitConfig::new("main", "feature", 7)
        };

        let report = Splitter::new(&git, &forge, &config)
            .run_at(now())
            .expect("split succeeds");

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].change.path, "broken.py");
        assert_eq!(report.classified.len(), 4);
        assert_eq!(
            report.published.map(|p| p.branch),
            Some("extract".to_string())
        );
    }

    #[test]
    fn push_failure_aborts_and_restores_checkout() {
        let git = git().failing_push();
        let forge = RecordingForge::default();
        let config = SplitConfig::new("main", "feature", 7);

        let result = Splitter::new(&git, &forge, &config).run_at(now());

        assert!(matches!(result, Err(Error::GitCommandError(_))));
        assert_eq!(
            git.mutations().last(),
            Some(&GitCall::Checkout("feature".into()))
        );
        assert!(forge.opened().is_empty());
    }
}
