use std::sync::{Arc, OnceLock};

use serenity::async_trait;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::UserId;
use serenity::prelude::{Context, EventHandler};
use tracing::info;

use crate::state::AppState;

/// Serenity event handler wired to the core pipeline.
///
/// Holds no mutable state of its own beyond the bot's own user id, resolved
/// once in `ready()` and consulted by the respond path to tag historical
/// messages as `assistant` vs `user` (§4.3).
pub struct DiscordHandler {
    pub state: Arc<AppState>,
    pub bot_id: OnceLock<UserId>,
}

impl DiscordHandler {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            bot_id: OnceLock::new(),
        }
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        self.bot_id.set(ready.user.id).ok();
        info!(name = %ready.user.name, "Discord bot connected");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let prefix = &self.state.config.bot.bot_prefix;
        let Some((command, args)) = parse_command(&msg.content, prefix) else {
            return;
        };

        let bot_id = self.bot_id.get().copied();
        let state = Arc::clone(&self.state);

        tokio::spawn(async move {
            crate::commands::dispatch(state, ctx, msg, &command, args, bot_id).await;
        });
    }
}

/// Split `content` into `(command, args)` when it starts with `prefix`.
///
/// `"$llm-new-session work"` with prefix `"$"` yields
/// `("llm-new-session", "work")`. Returns `None` for any message that
/// doesn't begin with the configured prefix.
fn parse_command(content: &str, prefix: &str) -> Option<(String, String)> {
    let trimmed = content.trim_start();
    let rest = trimmed.strip_prefix(prefix)?;
    if rest.is_empty() {
        return None;
    }
    match rest.split_once(char::is_whitespace) {
        Some((cmd, args)) => Some((cmd.to_string(), args.trim().to_string())),
        None => Some((rest.to_string(), String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_and_argument() {
        assert_eq!(
            parse_command("$llm-new-session work", "$"),
            Some(("llm-new-session".to_string(), "work".to_string()))
        );
    }

    #[test]
    fn command_without_args() {
        assert_eq!(
            parse_command("$llm-list-models", "$"),
            Some(("llm-list-models".to_string(), String::new()))
        );
    }

    #[test]
    fn non_prefixed_message_is_ignored() {
        assert_eq!(parse_command("hello there", "$"), None);
    }
}
