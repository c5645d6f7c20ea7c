//! Command adaptor: binds Discord prefix commands to `relay-session` /
//! `relay-models` / `relay-stream` core operations (§4.7).

use std::sync::Arc;
use std::time::Duration;

use serenity::model::channel::Message;
use serenity::model::id::UserId;
use serenity::prelude::Context;
use tokio::sync::mpsc;
use tracing::{info, warn};

use relay_session::{ChatMessage, ChatSession, MessageRole};

use crate::error::{CommandError, Result};
use crate::send;
use crate::state::AppState;

/// Dispatch a parsed `(command, args)` pair to the matching handler and
/// render exactly one reply, per §4.7's "all commands emit a single reply".
pub async fn dispatch(
    state: Arc<AppState>,
    ctx: Context,
    msg: Message,
    command: &str,
    args: String,
    bot_id: Option<UserId>,
) {
    if command == "llm" {
        respond(state, ctx, msg, args, bot_id).await;
        return;
    }

    let owner_id = msg.author.id.get() as i64;
    let admin_id = state.config.admin.id;

    let result = match command {
        "llm-new-session" => new_session(&state, owner_id, &args),
        "llm-list-sessions" => list_sessions(&state, owner_id),
        "llm-change-session" => change_session(&state, owner_id, &args),
        "llm-remove-session" => remove_session(&state, owner_id, &args),
        "llm-get-session-size" => get_session_size(&state, owner_id, &args),
        "llm-set-system-prompt" => set_system_prompt(&state, owner_id, &args),
        "llm-list-models" => list_models(&state).await,
        "llm-set-session-model" => set_session_model(&state, owner_id, &args).await,
        _ => return,
    };

    let reply = match result {
        Ok(text) => text,
        Err(e) => e.user_message(admin_id),
    };

    if let Err(e) = msg.reply(&ctx.http, reply).await {
        warn!(error = %e, command, "failed to send command reply");
    }
}

fn require_arg(command: &str, arg: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CommandError::ArgumentMissing {
            command: command.to_string(),
            arg: arg.to_string(),
        });
    }
    Ok(())
}

/// `$llm-new-session <name>` — create a persistent session for the invoking
/// user with the default model and default system prompt, and mark it active.
fn new_session(state: &AppState, owner_id: i64, name: &str) -> Result<String> {
    require_arg("llm-new-session", "name", name)?;

    if state.store.load(owner_id, name)?.is_some() {
        return Err(CommandError::SessionAlreadyExists {
            name: name.to_string(),
        });
    }

    let mut session = ChatSession::new(owner_id, name, state.config.models.default_model.clone());
    session.set_system_prompt(state.config.bot.default_system_prompt.clone());
    state.store.save(&session)?;
    state.store.mark_as_active(owner_id, name)?;

    info!(owner_id, name, "session created");
    Ok(format!(
        "*Created new session called `{}`, and switched to it*",
        name
    ))
}

/// `$llm-list-sessions` — list session names for the invoking user.
fn list_sessions(state: &AppState, owner_id: i64) -> Result<String> {
    let names = state.store.list_user_sessions(owner_id)?;
    if names.is_empty() {
        return Ok("You have no saved sessions.".to_string());
    }
    let lines: Vec<String> = names.iter().map(|n| format!("- {}", n)).collect();
    Ok(format!("**Your sessions:**\n{}", lines.join("\n")))
}

/// `$llm-change-session <name>` — mark a session active if it exists.
fn change_session(state: &AppState, owner_id: i64, name: &str) -> Result<String> {
    require_arg("llm-change-session", "name", name)?;

    if state.store.load(owner_id, name)?.is_none() {
        return Err(CommandError::SessionNotFound {
            name: name.to_string(),
        });
    }
    state.store.mark_as_active(owner_id, name)?;
    Ok(format!("*Switched to session {}*", name))
}

/// `$llm-remove-session <name>` — delete a session; cascades messages and
/// the active-session pointer (`SessionStore::delete`).
fn remove_session(state: &AppState, owner_id: i64, name: &str) -> Result<String> {
    require_arg("llm-remove-session", "name", name)?;

    match state.store.delete(owner_id, name) {
        Ok(()) => Ok(format!("*Removed session {}*", name)),
        Err(relay_session::SessionError::NotFound { .. }) => Err(CommandError::SessionNotFound {
            name: name.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// `$llm-get-session-size <name>` — message count and estimated token total
/// (§4.8: tokenizer path preferred, falls back to the word+special-char
/// estimator).
fn get_session_size(state: &AppState, owner_id: i64, name: &str) -> Result<String> {
    require_arg("llm-get-session-size", "name", name)?;

    let session = state
        .store
        .load(owner_id, name)?
        .ok_or_else(|| CommandError::SessionNotFound {
            name: name.to_string(),
        })?;

    let model_config = state.config.models.find_for_model(session.model());
    let estimated_tokens = match model_config.and_then(|c| c.tokenizer.as_deref()) {
        Some(tokenizer_path) => match relay_stream::prompt::build_raw_prompt(tokenizer_path, &session) {
            Ok(prompt) => prompt.token_length,
            Err(e) => {
                warn!(error = %e, "tokenizer prompt build failed, falling back to estimator");
                relay_stream::prompt::estimate_length(&session)
            }
        },
        None => relay_stream::prompt::estimate_length(&session),
    };

    Ok(format!(
        "*Session {} size: {} messages, ~{} tokens*",
        name,
        session.messages().len(),
        estimated_tokens
    ))
}

/// `$llm-set-system-prompt <text>` — update the invoking user's active
/// session's system prompt.
fn set_system_prompt(state: &AppState, owner_id: i64, text: &str) -> Result<String> {
    require_arg("llm-set-system-prompt", "prompt", text)?;

    let active = state
        .store
        .get_active_session(owner_id)?
        .ok_or_else(|| CommandError::SessionNotFound {
            name: "<no active session>".to_string(),
        })?;
    let mut session = state
        .store
        .load(owner_id, &active)?
        .ok_or_else(|| CommandError::SessionNotFound {
            name: active.clone(),
        })?;

    session.set_system_prompt(text.to_string());
    state.store.save(&session)?;

    Ok(format!("*System prompt set to: {}*", text))
}

/// `$llm-list-models` — catalogue entries formatted per §4.7.
async fn list_models(state: &AppState) -> Result<String> {
    let models = state.catalogue.list().await?;
    let excluded = &state.config.models.excluded_models;

    let lines: Vec<String> = models
        .iter()
        .filter(|m| !excluded.contains(&m.name))
        .map(|m| {
            let tag = m.tag.as_deref().unwrap_or("latest");
            let ctx_len = if m.context_length == relay_models::types::UNKNOWN_CONTEXT_LENGTH {
                "Unknown".to_string()
            } else {
                m.context_length.to_string()
            };
            format!(
                "- **{}:{}** - {}params, {}quant, {}ctx",
                m.name, tag, m.parameters_size, m.quant, ctx_len
            )
        })
        .collect();

    if lines.is_empty() {
        return Ok("No models available.".to_string());
    }
    Ok(format!("# Available models:\n{}", lines.join("\n")))
}

/// `$llm-set-session-model <name> <model>` — change a session's model,
/// validated against the catalogue.
async fn set_session_model(state: &AppState, owner_id: i64, args: &str) -> Result<String> {
    let (session_name, model_name) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
    let session_name = session_name.trim();
    let model_name = model_name.trim();

    require_arg("llm-set-session-model", "session_name", session_name)?;
    require_arg("llm-set-session-model", "model", model_name)?;

    let mut session = state
        .store
        .load(owner_id, session_name)?
        .ok_or_else(|| CommandError::SessionNotFound {
            name: session_name.to_string(),
        })?;

    if !state.catalogue.exists(model_name).await? {
        return Err(CommandError::ModelUnavailable {
            session: session_name.to_string(),
            model: model_name.to_string(),
        });
    }

    session.set_model(model_name);
    state.store.save(&session)?;

    Ok(format!(
        "*Session {} set to use model {}*",
        session_name, model_name
    ))
}

/// `$llm <prompt>` — the full respond path (§4.4).
async fn respond(state: Arc<AppState>, ctx: Context, msg: Message, prompt: String, bot_id: Option<UserId>) {
    if prompt.is_empty() {
        let _ = msg
            .reply(&ctx.http, "*Error: no message, what do you want me to respond to?*")
            .await;
        return;
    }

    let invoking_user_id = msg.author.id.get() as i64;
    let admin_id = state.config.admin.id;

    let placeholder = match send::post_placeholder(&ctx.http, &msg, "*Starting up...*").await {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, "failed to post placeholder reply");
            return;
        }
    };

    let active_name = state
        .store
        .get_active_session(invoking_user_id)
        .unwrap_or_else(|e| {
            warn!(error = %e, owner_id = invoking_user_id, "failed to read active session pointer");
            None
        });

    let (mut session, is_persistent) = match active_name {
        Some(name) => match state.store.load(invoking_user_id, &name) {
            Ok(Some(s)) => (s, true),
            _ => {
                warn!(owner_id = invoking_user_id, name, "active session pointer dangling, reconstructing from history");
                (build_temp_session(&state, &ctx, &msg, bot_id).await, false)
            }
        },
        None => {
            let _ = send::edit_plain(&ctx.http, msg.channel_id, placeholder.id, "*Reading chat history...*").await;
            (build_temp_session(&state, &ctx, &msg, bot_id).await, false)
        }
    };

    let _ = send::edit_plain(&ctx.http, msg.channel_id, placeholder.id, "*Processing messages...*").await;

    let mentions: Vec<(i64, &str)> = msg
        .mentions
        .iter()
        .map(|u| (u.id.get() as i64, u.name.as_str()))
        .collect();
    let user_message = ChatMessage::from_platform_message(
        msg.id.get() as i64,
        session.owner_id(),
        invoking_user_id,
        msg.author.name.clone(),
        session.name().to_string(),
        msg.timestamp.with_timezone(&chrono::Utc),
        MessageRole::User,
        &prompt,
        &mentions,
    );
    session.add_message(user_message);

    match state.catalogue.exists(session.model()).await {
        Ok(true) => {}
        Ok(false) => {
            let text = format!(
                "<@{}> session `{}` references model `{}`, which is no longer installed.",
                admin_id,
                session.name(),
                session.model()
            );
            let _ = send::edit_plain(&ctx.http, msg.channel_id, placeholder.id, &text).await;
            return;
        }
        Err(e) => {
            let text = CommandError::from(e).user_message(admin_id);
            let _ = send::edit_plain(&ctx.http, msg.channel_id, placeholder.id, &text).await;
            return;
        }
    }

    let model_config = state.config.models.find_for_model(session.model()).cloned();
    let tags = model_config.as_ref().and_then(|c| {
        match (&c.thinking_prefix, &c.thinking_suffix) {
            (Some(p), Some(s)) => Some((p.clone(), s.clone())),
            _ => None,
        }
    });

    let http = state.http.clone();
    let base_url = state.config.bot.ollama_host.clone();
    let model = session.model().to_string();
    let (tx, rx) = mpsc::channel(32);

    let use_raw_mode = model_config.as_ref().and_then(|c| c.tokenizer.clone());
    let stream_task: tokio::task::JoinHandle<()> = match use_raw_mode {
        Some(tokenizer_path) => match relay_stream::prompt::build_raw_prompt(&tokenizer_path, &session) {
            Ok(raw) => tokio::spawn(async move {
                relay_stream::stream_generate(&http, &base_url, &model, &raw.text, tx).await;
            }),
            Err(e) => {
                let text = format!("**Oops, an unknown error has happened: *{}***", e);
                let _ = send::edit_plain(&ctx.http, msg.channel_id, placeholder.id, &text).await;
                return;
            }
        },
        None => {
            let messages = relay_stream::prompt::build_chat_messages(&session);
            tokio::spawn(async move {
                relay_stream::stream_chat(&http, &base_url, &model, messages, tx).await;
            })
        }
    };

    let mut sink = send::DiscordSink::new(std::sync::Arc::clone(&ctx.http), msg.channel_id, placeholder.id);
    let edit_delay = Duration::from_secs_f64(state.config.bot.edit_delay_seconds);
    let result = relay_stream::run(rx, &mut sink, edit_delay, tags).await;
    let _ = stream_task.await;

    match result {
        Ok(rendered) => {
            if !rendered.content.is_empty() || !rendered.thoughts.is_empty() {
                session.add_message(ChatMessage {
                    id: placeholder.id.get() as i64,
                    owner_id: session.owner_id(),
                    sender_id: bot_id.map(|id| id.get() as i64).unwrap_or(-1),
                    sender_nickname: "assistant".to_string(),
                    session_name: session.name().to_string(),
                    timestamp: placeholder.timestamp.with_timezone(&chrono::Utc),
                    role: MessageRole::Assistant,
                    content: rendered.content,
                });
            }
            if is_persistent {
                if let Err(e) = state.store.save(&session) {
                    warn!(error = %e, session = session.name(), "failed to persist assistant turn");
                }
            }
        }
        Err(e) => {
            warn!(error = %e, session = session.name(), "streaming pipeline failed");
        }
    }
}

/// One-shot builder for the transient "no active session" path (§4.3, §9):
/// reconstructs a `ChatSession` from recent channel history and never
/// registers it in the persistent store.
async fn build_temp_session(state: &AppState, ctx: &Context, msg: &Message, bot_id: Option<UserId>) -> ChatSession {
    let limit = (state.config.bot.max_messages_for_context + 1).min(100) as u8;
    let history = send::fetch_history(&ctx.http, msg.channel_id, limit, msg.id)
        .await
        .unwrap_or_default();

    ChatSession::from_history(
        state.config.admin.id,
        msg.channel_id.get() as i64,
        state.config.models.default_model.clone(),
        state.config.bot.default_system_prompt.clone(),
        bot_id.map(|id| id.get() as i64).unwrap_or(-1),
        &history,
    )
}
