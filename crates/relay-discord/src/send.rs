//! Placeholder-message lifecycle: post, edit, and fetch channel history.
//!
//! The streaming pipeline in `relay-stream` is chat-library-agnostic — it
//! talks to a `relay_stream::pipeline::MessageSink`. [`DiscordSink`] is the
//! concrete implementation that edits a single Discord message in place.

use async_trait::async_trait;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::id::{ChannelId, MessageId};

use relay_session::PlatformMessage;
use relay_stream::PipelineError;

/// Edits one Discord message in place as the streaming pipeline renders new
/// state. Constructed once the placeholder reply has been posted.
pub struct DiscordSink {
    http: std::sync::Arc<Http>,
    channel_id: ChannelId,
    message_id: MessageId,
}

impl DiscordSink {
    pub fn new(http: std::sync::Arc<Http>, channel_id: ChannelId, message_id: MessageId) -> Self {
        Self {
            http,
            channel_id,
            message_id,
        }
    }
}

#[async_trait]
impl relay_stream::MessageSink for DiscordSink {
    async fn edit(&mut self, content: &str) -> Result<(), PipelineError> {
        self.channel_id
            .edit_message(
                &self.http,
                self.message_id,
                serenity::builder::EditMessage::new().content(content),
            )
            .await
            .map_err(|e| PipelineError::BackendError(e.to_string()))?;
        Ok(())
    }
}

/// Post the initial placeholder reply ("*Starting up...*") to a triggering
/// message, returning the new message so its id can be handed to a
/// [`DiscordSink`].
pub async fn post_placeholder(
    http: &Http,
    triggering_message: &Message,
    text: &str,
) -> Result<Message, serenity::Error> {
    triggering_message.reply(http, text).await
}

/// Edit an already-posted message to a fixed piece of text (used for the
/// placeholder's startup-phase updates and for terminal error messages).
pub async fn edit_plain(
    http: &Http,
    channel_id: ChannelId,
    message_id: MessageId,
    text: &str,
) -> Result<(), serenity::Error> {
    channel_id
        .edit_message(http, message_id, serenity::builder::EditMessage::new().content(text))
        .await?;
    Ok(())
}

/// Pull the last `limit` messages from `channel_id` (reverse-chronological as
/// Discord returns them), excluding the triggering message, and convert them
/// into `relay_session::PlatformMessage`s in chronological order — ready for
/// `ChatSession::from_history` (§4.3).
pub async fn fetch_history(
    http: &Http,
    channel_id: ChannelId,
    limit: u8,
    exclude: MessageId,
) -> Result<Vec<PlatformMessage>, serenity::Error> {
    let messages = channel_id
        .messages(
            http,
            serenity::builder::GetMessages::new().limit(limit),
        )
        .await?;

    let mut history: Vec<PlatformMessage> = messages
        .into_iter()
        .filter(|m| m.id != exclude)
        .map(|m| {
            let mentions = m
                .mentions
                .iter()
                .map(|u| (u.id.get() as i64, u.name.clone()))
                .collect();
            PlatformMessage {
                id: m.id.get() as i64,
                sender_id: m.author.id.get() as i64,
                sender_nickname: m.author.name.clone(),
                timestamp: m.timestamp.with_timezone(&chrono::Utc),
                content: m.content.clone(),
                mentions,
            }
        })
        .collect();

    // Discord returns newest-first; the session expects chronological order.
    history.reverse();
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_ordering_is_reversed_by_fetch() {
        // fetch_history's reversal is exercised end-to-end via serenity's
        // HTTP layer in integration; here we just pin the invariant that the
        // helper module compiles with the exposed PlatformMessage shape.
        let _ = PlatformMessage {
            id: 1,
            sender_id: 2,
            sender_nickname: "x".into(),
            timestamp: chrono::Utc::now(),
            content: String::new(),
            mentions: vec![],
        };
    }
}
