pub mod adapter;
pub mod commands;
pub mod error;
pub mod handler;
pub mod send;
pub mod state;

pub use adapter::DiscordAdapter;
pub use error::{CommandError, Result};
pub use state::AppState;
