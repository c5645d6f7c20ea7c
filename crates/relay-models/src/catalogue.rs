use relay_core::config::ModelsConfig;
use tracing::instrument;

use crate::client::{find_context_length, human_readable_size, ModelSummary, OllamaClient};
use crate::error::Result;
use crate::types::{split_model_name, ChatModel, UNKNOWN_FIELD};

/// Joins the backend's installed-model list with the configured `[models.*]`
/// sections, keyed by prefix match.
pub struct ModelCatalogue {
    client: OllamaClient,
    configs: ModelsConfig,
}

impl ModelCatalogue {
    pub fn new(client: OllamaClient, configs: ModelsConfig) -> Self {
        Self { client, configs }
    }

    /// All installed models that have a bound `ModelConfig`.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<ChatModel>> {
        let raw = self.client.list().await?;
        let mut models = Vec::new();
        for summary in raw.models {
            let Some(raw_name) = summary.model.clone() else {
                continue;
            };
            let Some(config) = self.configs.find_for_model(&raw_name) else {
                continue;
            };
            models.push(self.to_chat_model(&raw_name, &summary, config.context_limit).await?);
        }
        Ok(models)
    }

    /// First installed model whose full name starts with `name_prefix` and has
    /// a bound config.
    #[instrument(skip(self))]
    pub async fn get(&self, name_prefix: &str) -> Result<Option<ChatModel>> {
        let raw = self.client.list().await?;
        for summary in raw.models {
            let Some(raw_name) = summary.model.clone() else {
                continue;
            };
            if !raw_name.starts_with(name_prefix) {
                continue;
            }
            let Some(config) = self.configs.find_for_model(&raw_name) else {
                continue;
            };
            return Ok(Some(
                self.to_chat_model(&raw_name, &summary, config.context_limit)
                    .await?,
            ));
        }
        Ok(None)
    }

    /// Convenience predicate used by the respond path.
    pub async fn exists(&self, full_name: &str) -> Result<bool> {
        Ok(self.get(full_name).await?.is_some())
    }

    async fn to_chat_model(
        &self,
        raw_name: &str,
        summary: &ModelSummary,
        context_override: Option<i64>,
    ) -> Result<ChatModel> {
        let context_length = match context_override {
            Some(limit) => limit,
            None => {
                let show = self.client.show(raw_name).await?;
                find_context_length(&show.model_info)
                    .unwrap_or(crate::types::UNKNOWN_CONTEXT_LENGTH)
            }
        };

        let (name, tag) = split_model_name(raw_name);
        let name = name.unwrap_or_else(|| raw_name.to_string());

        let size = summary
            .size
            .map(human_readable_size)
            .unwrap_or_else(|| UNKNOWN_FIELD.to_string());
        let (parameters_size, quant) = match &summary.details {
            Some(details) => (
                details
                    .parameter_size
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_FIELD.to_string()),
                details
                    .quantization_level
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_FIELD.to_string()),
            ),
            None => (UNKNOWN_FIELD.to_string(), UNKNOWN_FIELD.to_string()),
        };

        Ok(ChatModel {
            name,
            tag,
            size,
            parameters_size,
            quant,
            context_length,
        })
    }
}
