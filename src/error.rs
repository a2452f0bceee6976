#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Git command failed: {0}")]
    GitCommandError(String),

    #[error("Failed to create temporary directory: {0}")]
    TempDirError(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Forge API error {status}: {body}")]
    ForgeApiError { status: u16, body: String },

    #[error("LLM API error {status}: {body}")]
    LlmApiError { status: u16, body: String },

    #[error("Unexpected LLM response: {0}")]
    LlmResponseError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
