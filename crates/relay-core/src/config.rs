use std::path::Path;

use indexmap::IndexMap;
use ini::Ini;
use tracing::{error, warn};

use crate::error::{ConfigError, Result};

/// Discord message length limit; the streaming pipeline truncates to this.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// Top-level config, loaded from a single INI file (`bot-config.ini` by default).
#[derive(Debug, Clone)]
pub struct Config {
    pub bot: BotConfig,
    pub admin: AdminConfig,
    pub models: ModelsConfig,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    pub discord_api_key: String,
    pub bot_prefix: String,
    pub edit_delay_seconds: f64,
    pub max_messages_for_context: usize,
    pub session_db_path: String,
    pub default_system_prompt: String,
    pub ollama_host: String,
}

/// Default Ollama-compatible backend URL, matching the `ollama` Python
/// package's own default when no host is otherwise configured.
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub id: i64,
}

/// `[models]` section plus every discovered `[models.<name>]` section.
///
/// `configs` is order-preserving: prefix lookup walks it in declaration order
/// and the first match wins.
#[derive(Debug, Clone)]
pub struct ModelsConfig {
    pub default_model: String,
    pub default_model_tag: Option<String>,
    pub excluded_models: Vec<String>,
    pub configs: IndexMap<String, ModelConfig>,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub thinking_prefix: Option<String>,
    pub thinking_suffix: Option<String>,
    pub tokenizer: Option<String>,
    pub context_limit: Option<i64>,
}

impl ModelsConfig {
    /// First configured key that is a prefix of `model_name`, declaration order preserved.
    pub fn find_for_model(&self, model_name: &str) -> Option<&ModelConfig> {
        self.configs
            .iter()
            .find(|(key, _)| model_name.starts_with(key.as_str()))
            .map(|(_, cfg)| cfg)
    }
}

impl Config {
    /// Load and validate the config at `path`.
    ///
    /// If the file does not exist, writes a seed config to the same path and
    /// exits the process non-zero so the operator can fill in credentials.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            error!(path = %path.display(), "config file not found, writing example config");
            write_seed_config(path)?;
            eprintln!(
                "Config file not found. An example has been written to {}. \
                 Fill it in and restart.",
                path.display()
            );
            std::process::exit(1);
        }

        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let bot = parse_bot(&ini)?;
        let admin = parse_admin(&ini)?;
        let models = parse_models(&ini)?;

        if models.excluded_models.contains(&models.default_model) {
            return Err(ConfigError::Invalid {
                field: "models.default_model".into(),
                reason: "default model cannot be one of the excluded models".into(),
            });
        }
        if !models.configs.contains_key(&models.default_model) {
            return Err(ConfigError::Invalid {
                field: "models.default_model".into(),
                reason: format!(
                    "no [models.{}] section declared for the default model",
                    models.default_model
                ),
            });
        }

        Ok(Config { bot, admin, models })
    }
}

fn get_required<'a>(ini: &'a Ini, section: &str, key: &str) -> Result<&'a str> {
    ini.section(Some(section))
        .and_then(|s| s.get(key))
        .ok_or_else(|| ConfigError::Invalid {
            field: format!("{}.{}", section, key),
            reason: "missing required key".into(),
        })
}

fn parse_bot(ini: &Ini) -> Result<BotConfig> {
    let discord_api_key = get_required(ini, "bot", "discord_api_key")?.to_string();
    if discord_api_key.is_empty() {
        return Err(ConfigError::Invalid {
            field: "bot.discord_api_key".into(),
            reason: "must not be empty".into(),
        });
    }

    let bot_prefix = get_required(ini, "bot", "bot_prefix")?.to_string();
    if bot_prefix.is_empty() {
        return Err(ConfigError::Invalid {
            field: "bot.bot_prefix".into(),
            reason: "must not be empty".into(),
        });
    }

    let edit_delay_raw = get_required(ini, "bot", "edit_delay_seconds")?;
    let edit_delay_seconds: f64 = edit_delay_raw.parse().map_err(|_| ConfigError::Invalid {
        field: "bot.edit_delay_seconds".into(),
        reason: format!("`{}` is not a valid number", edit_delay_raw),
    })?;
    if !(edit_delay_seconds > 0.0) {
        return Err(ConfigError::Invalid {
            field: "bot.edit_delay_seconds".into(),
            reason: "must be greater than 0".into(),
        });
    }

    let max_ctx_raw = get_required(ini, "bot", "max_messages_for_context")?;
    let max_messages_for_context: usize =
        max_ctx_raw.parse().map_err(|_| ConfigError::Invalid {
            field: "bot.max_messages_for_context".into(),
            reason: format!("`{}` is not a valid non-negative integer", max_ctx_raw),
        })?;

    let session_db_path = get_required(ini, "bot", "session_db_path")?.to_string();
    if session_db_path.is_empty() {
        return Err(ConfigError::Invalid {
            field: "bot.session_db_path".into(),
            reason: "must not be empty".into(),
        });
    }

    let default_system_prompt = ini
        .section(Some("bot"))
        .and_then(|s| s.get("default_system_prompt"))
        .unwrap_or("")
        .to_string();

    // Mirrors the `ollama` Python package's own `OLLAMA_HOST` env-var
    // convention: config wins, then the environment, then the package default.
    let ollama_host = ini
        .section(Some("bot"))
        .and_then(|s| s.get("ollama_host"))
        .map(String::from)
        .or_else(|| std::env::var("OLLAMA_HOST").ok())
        .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string());

    Ok(BotConfig {
        discord_api_key,
        bot_prefix,
        edit_delay_seconds,
        max_messages_for_context,
        session_db_path,
        default_system_prompt,
        ollama_host,
    })
}

fn parse_admin(ini: &Ini) -> Result<AdminConfig> {
    let raw = get_required(ini, "admin", "id")?;
    let id: i64 = raw.parse().map_err(|_| ConfigError::Invalid {
        field: "admin.id".into(),
        reason: format!("`{}` is not a valid integer", raw),
    })?;
    Ok(AdminConfig { id })
}

fn parse_models(ini: &Ini) -> Result<ModelsConfig> {
    let default_model = get_required(ini, "models", "default_model")?.to_string();
    let default_model_tag = ini
        .section(Some("models"))
        .and_then(|s| s.get("default_model_tag"))
        .map(String::from);
    let excluded_models = ini
        .section(Some("models"))
        .and_then(|s| s.get("excluded_models"))
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let mut configs = IndexMap::new();
    for (section_name, props) in ini.iter() {
        let Some(section_name) = section_name else {
            continue;
        };
        let Some(model_name) = section_name.strip_prefix("models.") else {
            continue;
        };

        let thinking_prefix = props.get("thinking_prefix").map(String::from);
        let thinking_suffix = props.get("thinking_suffix").map(String::from);
        if thinking_prefix.is_some() != thinking_suffix.is_some() {
            return Err(ConfigError::Invalid {
                field: format!("models.{}", model_name),
                reason: "thinking_prefix and thinking_suffix must both be set or both be absent"
                    .into(),
            });
        }

        let tokenizer = props.get("tokenizer").map(String::from);
        let context_limit = match props.get("context_limit") {
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| ConfigError::Invalid {
                field: format!("models.{}.context_limit", model_name),
                reason: format!("`{}` is not a valid integer", raw),
            })?),
            None => None,
        };

        configs.insert(
            model_name.to_string(),
            ModelConfig {
                thinking_prefix,
                thinking_suffix,
                tokenizer,
                context_limit,
            },
        );
    }

    if configs.is_empty() {
        warn!("no [models.*] sections declared in config");
    }

    Ok(ModelsConfig {
        default_model,
        default_model_tag,
        excluded_models,
        configs,
    })
}

fn write_seed_config(path: &Path) -> Result<()> {
    let mut ini = Ini::new();
    ini.with_section(Some("models"))
        .set("excluded_models", "model1, model2")
        .set("default_model", "qwen3-8b");
    ini.with_section(Some("admin")).set("id", "12345");
    ini.with_section(Some("bot"))
        .set("discord_api_key", "your_discord_api_key_here")
        .set("bot_prefix", "$")
        .set("edit_delay_seconds", "0.5")
        .set("max_messages_for_context", "20")
        .set("session_db_path", "sessions.db")
        .set("default_system_prompt", "")
        .set("ollama_host", DEFAULT_OLLAMA_HOST);
    ini.with_section(Some("models.qwen3-*"))
        .set("thinking_prefix", "<think>")
        .set("thinking_suffix", "</think>");

    ini.write_to_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_configs() -> IndexMap<String, ModelConfig> {
        let mut m = IndexMap::new();
        m.insert(
            "qwen3".to_string(),
            ModelConfig {
                thinking_prefix: Some("<think>".into()),
                thinking_suffix: Some("</think>".into()),
                tokenizer: None,
                context_limit: None,
            },
        );
        m.insert(
            "llama3".to_string(),
            ModelConfig {
                thinking_prefix: None,
                thinking_suffix: None,
                tokenizer: None,
                context_limit: Some(8192),
            },
        );
        m
    }

    #[test]
    fn prefix_lookup_first_match_wins() {
        let mc = ModelsConfig {
            default_model: "qwen3".into(),
            default_model_tag: None,
            excluded_models: vec![],
            configs: sample_configs(),
        };
        assert!(mc.find_for_model("qwen3-8b-instruct").is_some());
        assert!(mc.find_for_model("llama3:8b").is_some());
        assert!(mc.find_for_model("mistral-7b").is_none());
    }

    fn minimal_bot_section() -> String {
        "[bot]\n\
         discord_api_key = abc\n\
         bot_prefix = $\n\
         edit_delay_seconds = 0.5\n\
         max_messages_for_context = 20\n\
         session_db_path = sessions.db\n"
            .to_string()
    }

    #[test]
    fn thinking_prefix_without_suffix_is_rejected() {
        let ini = Ini::load_from_str(
            "[models.qwen3]\n\
             thinking_prefix = <think>\n",
        )
        .unwrap();
        let err = parse_models(&ini).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field, .. } if field == "models.qwen3"));
    }

    #[test]
    fn default_model_excluded_is_detected() {
        let ini = Ini::load_from_str(&format!(
            "{}\n[admin]\nid = 1\n\n[models]\n\
             default_model = qwen3\n\
             excluded_models = qwen3\n\n\
             [models.qwen3]\n",
            minimal_bot_section()
        ))
        .unwrap();

        let bot = parse_bot(&ini).unwrap();
        let admin = parse_admin(&ini).unwrap();
        let models = parse_models(&ini).unwrap();
        assert!(models.excluded_models.contains(&models.default_model));
        let _ = (bot, admin);
    }

    #[test]
    fn missing_default_model_section_leaves_configs_empty() {
        let ini = Ini::load_from_str(
            "[models]\n\
             default_model = qwen3\n",
        )
        .unwrap();
        let models = parse_models(&ini).unwrap();
        assert!(!models.configs.contains_key(&models.default_model));
    }

    #[test]
    fn ollama_host_falls_back_to_default_when_unset() {
        let ini = Ini::load_from_str(&minimal_bot_section()).unwrap();
        let bot = parse_bot(&ini).unwrap();
        // Only safe to assert the default when the env var truly isn't set in
        // this process; skip otherwise rather than flake on a polluted env.
        if std::env::var("OLLAMA_HOST").is_err() {
            assert_eq!(bot.ollama_host, DEFAULT_OLLAMA_HOST);
        }
    }

    #[test]
    fn ollama_host_from_ini_wins_over_default() {
        let ini = Ini::load_from_str(&format!(
            "{}ollama_host = http://example.internal:1234\n",
            minimal_bot_section()
        ))
        .unwrap();
        let bot = parse_bot(&ini).unwrap();
        assert_eq!(bot.ollama_host, "http://example.internal:1234");
    }
}
