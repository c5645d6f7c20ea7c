use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("the LLM backend is currently unavailable")]
    BackendUnavailable,

    #[error("backend error: {0}")]
    BackendError(String),

    #[error("failed to render the prompt: {0}")]
    PromptError(String),
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            PipelineError::BackendUnavailable
        } else {
            PipelineError::BackendError(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
