use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::backend::BackendEvent;
use crate::error::{PipelineError, Result};
use crate::thinking::{render, ThinkingParser};

const DISCORD_MESSAGE_LIMIT: usize = relay_core::config::DISCORD_MESSAGE_LIMIT;
const TRUNCATION_MARKER: &str = "…[truncated]";

/// Destination for the placeholder message's progressive edits. Implemented
/// by the Discord adapter; kept as a trait here so the pipeline has no
/// dependency on any particular chat library.
#[async_trait]
pub trait MessageSink: Send {
    async fn edit(&mut self, content: &str) -> std::result::Result<(), PipelineError>;
}

/// The assistant turn produced once the stream completes.
#[derive(Debug, Clone, Default)]
pub struct RenderedResponse {
    pub content: String,
    pub thoughts: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

/// Drive a backend event stream into rate-limited edits of a placeholder
/// message, per the edit-cadence algorithm: accumulate chunks into the
/// thinking parser, and whenever `edit_delay` has elapsed since the last
/// edit, render and push an update. One final edit is issued after the
/// stream ends if any text was produced.
pub async fn run(
    mut events: mpsc::Receiver<Result<BackendEvent>>,
    sink: &mut dyn MessageSink,
    edit_delay: Duration,
    tags: Option<(String, String)>,
) -> Result<RenderedResponse> {
    let mut parser = ThinkingParser::new(tags);
    let mut last_edit = Instant::now();
    let mut any_text = false;
    let mut tokens_in = 0;
    let mut tokens_out = 0;

    while let Some(event) = events.recv().await {
        match event? {
            BackendEvent::TextDelta(text) => {
                any_text = true;
                parser.append(&text);
                if last_edit.elapsed() >= edit_delay {
                    sink.edit(&truncate_for_platform(&render(&parser))).await?;
                    last_edit = Instant::now();
                }
            }
            BackendEvent::Done {
                tokens_in: ti,
                tokens_out: to,
            } => {
                tokens_in = ti;
                tokens_out = to;
            }
        }
    }

    if any_text {
        sink.edit(&truncate_for_platform(&render(&parser))).await?;
    }

    Ok(RenderedResponse {
        content: parser.content().to_string(),
        thoughts: parser.thoughts().to_string(),
        tokens_in,
        tokens_out,
    })
}

/// Truncate rendered content (never thoughts) to the platform's message
/// length limit, appending an elision marker when truncation occurs.
pub fn truncate_for_platform(rendered: &str) -> String {
    if rendered.chars().count() <= DISCORD_MESSAGE_LIMIT {
        return rendered.to_string();
    }
    let budget = DISCORD_MESSAGE_LIMIT.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut truncated: String = rendered.chars().take(budget).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        edits: Vec<String>,
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn edit(&mut self, content: &str) -> std::result::Result<(), PipelineError> {
            self.edits.push(content.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn issues_one_final_edit_when_delay_never_elapses() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(BackendEvent::TextDelta("hello".into())))
            .await
            .unwrap();
        tx.send(Ok(BackendEvent::TextDelta(" world".into())))
            .await
            .unwrap();
        tx.send(Ok(BackendEvent::Done {
            tokens_in: 10,
            tokens_out: 2,
        }))
        .await
        .unwrap();
        drop(tx);

        let mut sink = RecordingSink { edits: vec![] };
        let result = run(rx, &mut sink, Duration::from_secs(3600), None)
            .await
            .unwrap();

        assert_eq!(result.content, "hello world");
        assert_eq!(sink.edits, vec!["hello world".to_string()]);
    }

    #[tokio::test]
    async fn no_edit_when_stream_produced_no_text() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(Ok(BackendEvent::Done {
            tokens_in: 0,
            tokens_out: 0,
        }))
        .await
        .unwrap();
        drop(tx);

        let mut sink = RecordingSink { edits: vec![] };
        run(rx, &mut sink, Duration::from_millis(1), None)
            .await
            .unwrap();
        assert!(sink.edits.is_empty());
    }

    #[test]
    fn truncate_adds_marker_only_when_over_limit() {
        let short = "hello";
        assert_eq!(truncate_for_platform(short), short);

        let long = "x".repeat(DISCORD_MESSAGE_LIMIT + 50);
        let truncated = truncate_for_platform(&long);
        assert!(truncated.len() <= DISCORD_MESSAGE_LIMIT);
        assert!(truncated.ends_with(TRUNCATION_MARKER));
    }
}
