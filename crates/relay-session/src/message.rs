use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Id reserved for the synthetic system-prompt message.
pub const SYSTEM_MESSAGE_ID: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "tool" => Ok(MessageRole::Tool),
            other => Err(format!("unknown message role: {other}")),
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dialogue turn. `id` is the chat-platform message id; `-1` marks the
/// synthetic system-prompt message inserted at the head of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub owner_id: i64,
    pub sender_id: i64,
    pub sender_nickname: String,
    pub session_name: String,
    pub timestamp: DateTime<Utc>,
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    /// Build a new turn from a chat-platform message, rewriting any mentions
    /// in `content` first.
    pub fn from_platform_message(
        id: i64,
        owner_id: i64,
        sender_id: i64,
        sender_nickname: impl Into<String>,
        session_name: impl Into<String>,
        timestamp: DateTime<Utc>,
        role: MessageRole,
        content: &str,
        mentions: &[(i64, &str)],
    ) -> Self {
        Self {
            id,
            owner_id,
            sender_id,
            sender_nickname: sender_nickname.into(),
            session_name: session_name.into(),
            timestamp,
            role,
            content: rewrite_mentions(content, mentions),
        }
    }

    /// The synthetic message inserted at the head of a session when a system
    /// prompt is set. Its timestamp sorts before anything a chat platform
    /// could produce.
    pub fn system_prompt(owner_id: i64, session_name: impl Into<String>, prompt: &str) -> Self {
        Self {
            id: SYSTEM_MESSAGE_ID,
            owner_id,
            sender_id: SYSTEM_MESSAGE_ID,
            sender_nickname: "system".to_string(),
            session_name: session_name.into(),
            timestamp: DateTime::<Utc>::MIN_UTC,
            role: MessageRole::System,
            content: prompt.to_string(),
        }
    }
}

impl std::fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}:\n{}", self.sender_nickname, self.content)
    }
}

/// Replace every `<@id>` occurrence with `<@name (UID: id)>` for each
/// `(id, name)` pair in `mentions`. Idempotent: the substituted form no
/// longer contains a bare `<@id>` token, so re-applying is a no-op.
pub fn rewrite_mentions(text: &str, mentions: &[(i64, &str)]) -> String {
    let mut out = text.to_string();
    for (id, name) in mentions {
        let needle = format!("<@{}>", id);
        let replacement = format!("<@{} (UID: {})>", name, id);
        out = out.replace(&needle, &replacement);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let msg = ChatMessage {
            id: 1,
            owner_id: 1,
            sender_id: 2,
            sender_nickname: "alice".into(),
            session_name: "main".into(),
            timestamp: Utc::now(),
            role: MessageRole::User,
            content: "hello".into(),
        };
        assert_eq!(msg.to_string(), "@alice:\nhello");
    }

    #[test]
    fn mention_rewrite_is_idempotent() {
        let mentions = [(42, "bob")];
        let once = rewrite_mentions("hi <@42>!", &mentions);
        assert_eq!(once, "hi <@bob (UID: 42)>!");
        let twice = rewrite_mentions(&once, &mentions);
        assert_eq!(once, twice);
    }

    #[test]
    fn mention_rewrite_no_match_is_noop() {
        let mentions = [(42, "bob")];
        let text = "no mentions here";
        assert_eq!(rewrite_mentions(text, &mentions), text);
    }
}
