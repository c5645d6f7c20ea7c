use chrono::{DateTime, Utc};

use crate::message::{ChatMessage, MessageRole};

/// A chat-platform message handed in by a channel adapter for history
/// reconstruction. Carries only what `ChatSession` needs, independent of any
/// particular chat library's types.
pub struct PlatformMessage {
    pub id: i64,
    pub sender_id: i64,
    pub sender_nickname: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub mentions: Vec<(i64, String)>,
}

/// An ordered dialogue plus `(model, system_prompt)` metadata.
///
/// This type has no knowledge of persistence — mutators update in-memory
/// state only. Callers that need durability pass the session to
/// `crate::store::SessionStore::save` explicitly after mutating it, rather
/// than coupling every setter to a write.
#[derive(Debug, Clone)]
pub struct ChatSession {
    owner_id: i64,
    name: String,
    model: String,
    system_prompt: String,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new(owner_id: i64, name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            owner_id,
            name: name.into(),
            model: model.into(),
            system_prompt: String::new(),
            messages: Vec::new(),
        }
    }

    pub fn owner_id(&self) -> i64 {
        self.owner_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Replace the system prompt. Drops any prior synthetic system message
    /// and, if the new prompt is non-empty, inserts a fresh one at the head.
    /// Calling this twice with the same prompt leaves the same observable
    /// state as calling it once.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
        self.messages.retain(|m| m.role != MessageRole::System);
        if !self.system_prompt.is_empty() {
            let synthetic = ChatMessage::system_prompt(self.owner_id, &self.name, &self.system_prompt);
            self.messages.push(synthetic);
        }
        self.sort();
    }

    /// Set the `system_prompt` field from a row already loaded from storage,
    /// without touching the message list — the synthetic system message for
    /// that prompt was already loaded alongside it. `set_system_prompt`
    /// cannot be reused here: it always re-derives the message list from the
    /// new prompt, which would duplicate the one just read from `messages`.
    pub(crate) fn set_system_prompt_field(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    /// Append a turn and keep the session sorted by timestamp.
    pub fn add_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.sort();
    }

    fn sort(&mut self) {
        self.messages.sort_by_key(|m| m.timestamp);
    }

    /// Build a transient, never-persisted session from recent channel
    /// history, for use when no active session exists.
    ///
    /// `history` must already be in chronological order with the triggering
    /// message excluded (callers pull and reverse the platform's history
    /// buffer before calling this).
    pub fn from_history(
        owner_id: i64,
        channel_id: i64,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        bot_user_id: i64,
        history: &[PlatformMessage],
    ) -> Self {
        let mut session = Self::new(owner_id, format!("Temp-{}", channel_id), model);
        session.set_system_prompt(system_prompt);
        for raw in history {
            let role = if raw.sender_id == bot_user_id {
                MessageRole::Assistant
            } else {
                MessageRole::User
            };
            let mentions: Vec<(i64, &str)> = raw
                .mentions
                .iter()
                .map(|(id, name)| (*id, name.as_str()))
                .collect();
            let message = ChatMessage::from_platform_message(
                raw.id,
                owner_id,
                raw.sender_id,
                raw.sender_nickname.clone(),
                session.name.clone(),
                raw.timestamp,
                role,
                &raw.content,
                &mentions,
            );
            session.add_message(message);
        }
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_system_prompt_is_idempotent() {
        let mut a = ChatSession::new(1, "main", "qwen3");
        a.set_system_prompt("be nice");
        let snapshot_once: Vec<_> = a.messages().to_vec();

        a.set_system_prompt("be nice");
        let snapshot_twice: Vec<_> = a.messages().to_vec();

        assert_eq!(snapshot_once, snapshot_twice);
        assert_eq!(a.messages().len(), 1);
    }

    #[test]
    fn clearing_system_prompt_removes_synthetic_message() {
        let mut session = ChatSession::new(1, "main", "qwen3");
        session.set_system_prompt("be nice");
        assert_eq!(session.messages().len(), 1);
        session.set_system_prompt("");
        assert!(session.messages().is_empty());
    }

    #[test]
    fn from_history_tags_bot_messages_as_assistant() {
        let history = vec![
            PlatformMessage {
                id: 1,
                sender_id: 99,
                sender_nickname: "alice".into(),
                timestamp: Utc::now(),
                content: "hi".into(),
                mentions: vec![],
            },
            PlatformMessage {
                id: 2,
                sender_id: 7,
                sender_nickname: "bot".into(),
                timestamp: Utc::now(),
                content: "hello there".into(),
                mentions: vec![],
            },
        ];
        let session = ChatSession::from_history(1, 555, "qwen3", "", 7, &history);
        assert_eq!(session.messages()[0].role, MessageRole::User);
        assert_eq!(session.messages()[1].role, MessageRole::Assistant);
        assert_eq!(session.name(), "Temp-555");
    }
}
