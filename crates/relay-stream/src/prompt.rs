use relay_session::{ChatSession, MessageRole};

/// A tokenized raw-mode prompt, ready to send to `/api/generate`.
pub struct RawPrompt {
    pub text: String,
    pub token_length: usize,
}

/// Render a session as chat-mode `{role, content}` pairs, where `content` is
/// `"@{nickname}:\n{text}"` for every turn.
pub fn build_chat_messages(session: &ChatSession) -> Vec<serde_json::Value> {
    session
        .messages()
        .iter()
        .map(|m| {
            let content = if m.role == MessageRole::System {
                m.content.clone()
            } else {
                m.to_string()
            };
            serde_json::json!({ "role": m.role.as_str(), "content": content })
        })
        .collect()
}

const SPECIAL_CHARS: &str = ",.'\"!@#$%^&*()_+-=[]{}|;:,.<>?/`~";

/// Word-plus-special-character estimate of a session's prompt size, used when
/// no tokenizer is configured for the model (§4.8).
pub fn estimate_length(session: &ChatSession) -> usize {
    session
        .messages()
        .iter()
        .map(|m| {
            let rendered = if m.role == MessageRole::System {
                m.content.clone()
            } else {
                m.to_string()
            };
            count_words_and_special_chars(&rendered)
        })
        .sum()
}

fn count_words_and_special_chars(text: &str) -> usize {
    let word_count = text.split_whitespace().count();
    let special_count = text.chars().filter(|c| SPECIAL_CHARS.contains(*c)).count();
    word_count + special_count
}

const DEFAULT_CHAT_TEMPLATE: &str = "\
{%- for message in messages -%}
<|{{ message.role }}|>
{{ message.content }}
{% endfor -%}
<|assistant|>
";

/// Render the session through the model's chat template and tokenize it,
/// for models configured with a `tokenizer` handle (raw mode, §4.4).
pub fn build_raw_prompt(
    tokenizer_path: &str,
    session: &ChatSession,
) -> crate::error::Result<RawPrompt> {
    use crate::error::PipelineError;

    let tokenizer = tokenizers::Tokenizer::from_file(tokenizer_path)
        .map_err(|e| PipelineError::PromptError(e.to_string()))?;

    let mut env = minijinja::Environment::new();
    env.add_template("chat", DEFAULT_CHAT_TEMPLATE)
        .map_err(|e| PipelineError::PromptError(e.to_string()))?;
    let template = env
        .get_template("chat")
        .map_err(|e| PipelineError::PromptError(e.to_string()))?;

    let messages: Vec<_> = session
        .messages()
        .iter()
        .map(|m| {
            minijinja::context! {
                role => m.role.as_str(),
                content => if m.role == MessageRole::System { m.content.clone() } else { m.to_string() },
            }
        })
        .collect();

    let text = template
        .render(minijinja::context! { messages })
        .map_err(|e| PipelineError::PromptError(e.to_string()))?;

    let encoding = tokenizer
        .encode(text.as_str(), false)
        .map_err(|e| PipelineError::PromptError(e.to_string()))?;

    Ok(RawPrompt {
        token_length: encoding.get_ids().len(),
        text,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_session::ChatMessage;
    use chrono::Utc;

    #[test]
    fn chat_messages_use_display_format_except_system() {
        let mut session = ChatSession::new(1, "main", "qwen3");
        session.set_system_prompt("be nice");
        session.add_message(ChatMessage {
            id: 1,
            owner_id: 1,
            sender_id: 2,
            sender_nickname: "alice".into(),
            session_name: "main".into(),
            timestamp: Utc::now(),
            role: MessageRole::User,
            content: "hi".into(),
        });

        let rendered = build_chat_messages(&session);
        assert_eq!(rendered[0]["content"], "be nice");
        assert_eq!(rendered[1]["content"], "@alice:\nhi");
    }

    #[test]
    fn estimate_length_counts_words_and_special_chars() {
        let mut session = ChatSession::new(1, "main", "qwen3");
        session.add_message(ChatMessage {
            id: 1,
            owner_id: 1,
            sender_id: 2,
            sender_nickname: "alice".into(),
            session_name: "main".into(),
            timestamp: Utc::now(),
            role: MessageRole::User,
            content: "hi, there!".into(),
        });
        // "@alice:\nhi, there!" -> words: "@alice:" "hi," "there!" = 3,
        // special chars: @ : , ! = 4
        assert_eq!(estimate_length(&session), 7);
    }
}
