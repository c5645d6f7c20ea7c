pub mod catalogue;
pub mod client;
pub mod error;
pub mod types;

pub use catalogue::ModelCatalogue;
pub use client::OllamaClient;
pub use error::{ModelCatalogError, Result};
pub use types::ChatModel;
