use relay_core::Config;
use relay_models::ModelCatalogue;
use relay_session::SessionStore;

/// Shared application state, constructed once at boot and handed to every
/// respond task and command handler via `Arc`.
pub struct AppState {
    pub config: Config,
    pub catalogue: ModelCatalogue,
    pub store: SessionStore,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, catalogue: ModelCatalogue, store: SessionStore) -> Self {
        Self {
            config,
            catalogue,
            store,
            http: reqwest::Client::new(),
        }
    }
}
