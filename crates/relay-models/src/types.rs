use relay_core::config::ModelConfig;

/// Placeholder used whenever the backend omits a field.
pub const UNKNOWN_FIELD: &str = "Unknown";
/// Sentinel context length when neither the config nor the backend supplies one.
pub const UNKNOWN_CONTEXT_LENGTH: i64 = -1;

/// A model as seen by the catalogue: backend metadata joined with its bound config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatModel {
    pub name: String,
    pub tag: Option<String>,
    pub size: String,
    pub parameters_size: String,
    pub quant: String,
    pub context_length: i64,
}

impl std::fmt::Display for ChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Split a full model name on its first `:` into `(name, tag)`.
///
/// Returns `(None, None)` for an empty string or a name with more than one
/// `:`; `(Some(name), None)` when there is no `:`; `(Some(name), Some(tag))`
/// for exactly one `:`.
pub fn split_model_name(full_name: &str) -> (Option<String>, Option<String>) {
    if full_name.is_empty() {
        return (None, None);
    }
    let parts: Vec<&str> = full_name.split(':').collect();
    match parts.as_slice() {
        [name] => (Some(name.to_string()), None),
        [name, tag] => (Some(name.to_string()), Some(tag.to_string())),
        _ => (None, None),
    }
}

/// Resolve the effective context length: explicit config override, else the
/// backend-reported value, else the unknown sentinel.
pub fn resolve_context_length(config: &ModelConfig, backend_reported: Option<i64>) -> i64 {
    config
        .context_limit
        .or(backend_reported)
        .unwrap_or(UNKNOWN_CONTEXT_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_model_name_cases() {
        assert_eq!(split_model_name(""), (None, None));
        assert_eq!(split_model_name("a:b:c"), (None, None));
        assert_eq!(
            split_model_name("a:b"),
            (Some("a".to_string()), Some("b".to_string()))
        );
        assert_eq!(split_model_name("a"), (Some("a".to_string()), None));
    }

    #[test]
    fn context_length_precedence() {
        let with_override = ModelConfig {
            thinking_prefix: None,
            thinking_suffix: None,
            tokenizer: None,
            context_limit: Some(4096),
        };
        assert_eq!(resolve_context_length(&with_override, Some(8192)), 4096);

        let without_override = ModelConfig {
            thinking_prefix: None,
            thinking_suffix: None,
            tokenizer: None,
            context_limit: None,
        };
        assert_eq!(resolve_context_length(&without_override, Some(8192)), 8192);
        assert_eq!(
            resolve_context_length(&without_override, None),
            UNKNOWN_CONTEXT_LENGTH
        );
    }
}
