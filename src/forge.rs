//! Pull request publishing through a code-hosting API.

use reqwest::blocking::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{Error, Result};

pub const GITHUB_API_URL: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("pr-splitter/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    /// Branch holding the changes.
    pub head: String,
    /// Branch the changes should be merged into.
    pub base: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}

/// Trait defining the forge operations required by the library
pub trait Forge {
    /// Open a pull request
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it
    fn open_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest>;

    /// Post a comment on an existing pull request
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the API rejects it
    fn comment_on_pull_request(&self, number: u64, body: &str) -> Result<()>;
}

/// GitHub REST API client
pub struct GitHubForge {
    client: Client,
    api_url: String,
    repository: String,
    token: SecretString,
}

#[derive(Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

impl GitHubForge {
    /// `repository` is `owner/name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository name is malformed
    pub fn new(api_url: &str, repository: &str, token: SecretString) -> Result<Self> {
        match repository.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {}
            _ => {
                return Err(Error::ConfigError(format!(
                    "repository must be `owner/name`, got `{repository}`"
                )))
            }
        }

        Ok(Self {
            client: Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
            repository: repository.to_string(),
            token,
        })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/repos/{}/{path}", self.api_url, self.repository))
            .bearer_auth(self.token.expose_secret())
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", USER_AGENT)
    }
}

fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    debug!(status = status.as_u16(), body = %body, "Forge API request failed");
    Err(Error::ForgeApiError {
        status: status.as_u16(),
        body,
    })
}

impl Forge for GitHubForge {
    #[instrument(skip(self, request), fields(repository = %self.repository, head = %request.head, base = %request.base))]
    fn open_pull_request(&self, request: &NewPullRequest) -> Result<PullRequest> {
        let response = check_status(self.post("pulls").json(request).send()?)?;
        let pull_request: PullRequest = response.json()?;
        debug!(number = pull_request.number, url = %pull_request.html_url, "Pull request opened");
        Ok(pull_request)
    }

    #[instrument(skip(self, body), fields(repository = %self.repository))]
    fn comment_on_pull_request(&self, number: u64, body: &str) -> Result<()> {
        check_status(
            self.post(&format!("issues/{number}/comments"))
                .json(&CommentBody { body })
                .send()?,
        )?;
        debug!("Comment posted");
        Ok(())
    }
}
