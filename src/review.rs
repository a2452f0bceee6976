//! LLM-written summaries of the source files changed in a pull request.

use reqwest::blocking::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::git::Git;
use crate::types::{FileStatus, RevisionRange};

pub const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_EXTENSIONS: &[&str] = &[".py"];

/// Turns a prompt into text.
pub trait Summarizer {
    /// # Errors
    ///
    /// Returns an error if the model cannot be reached or its answer cannot be read
    fn summarize(&self, prompt: &str) -> Result<String>;
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    client: Client,
    api_url: String,
    model: String,
    api_key: SecretString,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GeminiClient {
    #[must_use]
    pub fn new(api_url: &str, model: &str, api_key: SecretString) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        }
    }
}

/// Drops the request URL from a transport error so it never lands in logs.
fn redact(e: reqwest::Error) -> Error {
    Error::HttpError(e.without_url())
}

fn first_text(body: &str) -> Result<String> {
    let response: GenerateResponse = serde_json::from_str(body)?;
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .map(|text| text.trim().to_string())
        .ok_or_else(|| Error::LlmResponseError(body.to_string()))
}

impl Summarizer for GeminiClient {
    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_length = prompt.len()))]
    fn summarize(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: prompt }],
            }],
        };
        let response = self
            .client
            .post(format!(
                "{}/v1/models/{}:generateContent",
                self.api_url, self.model
            ))
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&request)
            .send()
            .map_err(redact)?;

        let status = response.status();
        let body = response.text().map_err(redact)?;
        if !status.is_success() {
            debug!(status = status.as_u16(), "LLM request failed");
            return Err(Error::LlmApiError {
                status: status.as_u16(),
                body,
            });
        }
        first_text(&body)
    }
}

#[derive(Debug, Clone)]
pub struct ReviewConfig {
    pub range: RevisionRange,
    /// Only paths ending with one of these are reviewed.
    pub extensions: Vec<String>,
}

impl ReviewConfig {
    #[must_use]
    pub fn new(base: impl Into<String>, head: impl Into<String>) -> Self {
        Self {
            range: RevisionRange::from_merge_base(base, head),
            extensions: DEFAULT_EXTENSIONS.iter().map(ToString::to_string).collect(),
        }
    }

    fn matches(&self, path: &str) -> bool {
        self.extensions.iter().any(|ext| path.ends_with(ext.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    Summary(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReview {
    pub path: String,
    pub outcome: ReviewOutcome,
}

#[must_use]
pub fn review_prompt(path: &str, content: &str) -> String {
    format!(
        "provide a summary and analysis of this file:

Filename: {path}

Code:
{content}
"
    )
}

pub struct Reviewer<'a, G, S> {
    git: &'a G,
    summarizer: &'a S,
    config: &'a ReviewConfig,
}

impl<'a, G: Git, S: Summarizer> Reviewer<'a, G, S> {
    #[must_use]
    pub const fn new(git: &'a G, summarizer: &'a S, config: &'a ReviewConfig) -> Self {
        Self {
            git,
            summarizer,
            config,
        }
    }

    /// Summarizes every changed file matching the configured extensions.
    ///
    /// Unreadable files and failed model calls are recorded per file and do not stop the run.
    ///
    /// # Errors
    ///
    /// Returns an error if the changed files cannot be listed
    #[instrument(skip(self), fields(range = %self.config.range))]
    pub fn review(&self) -> Result<Vec<FileReview>> {
        let changes = self.git.changed_files(&self.config.range)?;
        let paths: Vec<String> = changes
            .into_iter()
            .filter(|c| c.status != FileStatus::Deleted && self.config.matches(&c.path))
            .map(|c| c.path)
            .collect();

        if paths.is_empty() {
            info!(extensions = ?self.config.extensions, "No matching files changed, nothing to review");
            return Ok(Vec::new());
        }
        debug!(files = ?paths, "Files to review");

        Ok(paths
            .into_iter()
            .map(|path| {
                let outcome = self.review_file(&path);
                FileReview { path, outcome }
            })
            .collect())
    }

    fn review_file(&self, path: &str) -> ReviewOutcome {
        let content = match self.git.worktree_content(path) {
            Ok(Some(content)) => content,
            Ok(None) => {
                warn!(path = %path, "File missing from working tree");
                return ReviewOutcome::Failed("file missing from working tree".to_string());
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to read file");
                return ReviewOutcome::Failed(e.to_string());
            }
        };

        match self.summarizer.summarize(&review_prompt(path, &content)) {
            Ok(summary) => ReviewOutcome::Summary(summary),
            Err(e) => {
                warn!(path = %path, error = %e, "Review failed");
                ReviewOutcome::Failed(e.to_string())
            }
        }
    }
}
