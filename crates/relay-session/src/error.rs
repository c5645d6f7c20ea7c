use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: owner {owner_id}, name {name}")]
    NotFound { owner_id: i64, name: String },

    #[error("session already exists: owner {owner_id}, name {name}")]
    AlreadyExists { owner_id: i64, name: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid session key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
