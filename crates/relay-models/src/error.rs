use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelCatalogError {
    #[error("the LLM backend is currently unavailable")]
    BackendUnavailable,

    #[error("backend error: {0}")]
    BackendError(String),
}

impl From<reqwest::Error> for ModelCatalogError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            ModelCatalogError::BackendUnavailable
        } else {
            ModelCatalogError::BackendError(e.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ModelCatalogError>;
