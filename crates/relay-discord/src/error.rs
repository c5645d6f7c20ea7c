use thiserror::Error;

/// Errors surfaced by the command adaptor. Each variant carries what the
/// command layer needs to render a user-visible message (§7).
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("missing argument `{arg}` for `{command}`")]
    ArgumentMissing { command: String, arg: String },

    #[error("session `{session}` references model `{model}`, which is no longer installed")]
    ModelUnavailable { session: String, model: String },

    #[error("session `{name}` not found")]
    SessionNotFound { name: String },

    #[error("session `{name}` already exists")]
    SessionAlreadyExists { name: String },

    #[error("the LLM backend is currently unavailable")]
    BackendUnavailable,

    #[error("backend error: {0}")]
    BackendError(String),

    #[error(transparent)]
    Session(#[from] relay_session::SessionError),

    #[error(transparent)]
    Pipeline(#[from] relay_stream::PipelineError),

    #[error(transparent)]
    Catalog(#[from] relay_models::ModelCatalogError),

    #[error("discord error: {0}")]
    Serenity(#[from] serenity::Error),
}

pub type Result<T> = std::result::Result<T, CommandError>;

impl CommandError {
    /// Render the user-visible message for this error, per §7's propagation
    /// policy (the command adaptor catches errors at its outer boundary).
    pub fn user_message(&self, admin_id: i64) -> String {
        match self {
            CommandError::BackendUnavailable => {
                "**The LLM backend is currently unavailable, try again later.**".to_string()
            }
            CommandError::BackendError(detail) => {
                format!("**Oops, an unknown error has happened: *{}***", detail)
            }
            CommandError::ModelUnavailable { session, model } => format!(
                "<@{}> session `{}` references model `{}`, which is no longer installed.",
                admin_id, session, model
            ),
            CommandError::SessionNotFound { name } => format!("Session `{}` not found.", name),
            CommandError::SessionAlreadyExists { name } => {
                format!("Session `{}` already exists.", name)
            }
            CommandError::ArgumentMissing { command, arg } => {
                format!("Missing argument `{}` for `{}`.", arg, command)
            }
            CommandError::Session(relay_session::SessionError::NotFound { name, .. }) => {
                format!("Session `{}` not found.", name)
            }
            CommandError::Session(e) => format!("Storage error: {}", e),
            CommandError::Pipeline(_) => {
                "**The LLM backend is currently unavailable, try again later.**".to_string()
            }
            CommandError::Catalog(relay_models::ModelCatalogError::BackendUnavailable) => {
                "**The LLM backend is currently unavailable, try again later.**".to_string()
            }
            CommandError::Catalog(relay_models::ModelCatalogError::BackendError(detail)) => {
                format!("**Oops, an unknown error has happened: *{}***", detail)
            }
            CommandError::Serenity(e) => format!("Discord error: {}", e),
        }
    }
}
