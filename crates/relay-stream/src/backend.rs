use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

/// One event out of the streaming backend consumer: either a text delta or
/// the terminal completion marker (with the fields persistence needs).
#[derive(Debug, Clone)]
pub enum BackendEvent {
    TextDelta(String),
    Done { tokens_in: u32, tokens_out: u32 },
}

/// Start a streaming chat-mode request (`POST /api/chat`).
///
/// Returns immediately; events arrive on the channel as the response streams.
/// The whole call runs inside the caller's `tokio::spawn`ed respond task, so
/// consuming the stream here never blocks the chat-platform's own event loop.
pub async fn stream_chat(
    http: &reqwest::Client,
    base_url: &str,
    model: &str,
    messages: Vec<serde_json::Value>,
    tx: mpsc::Sender<Result<BackendEvent>>,
) {
    let body = serde_json::json!({
        "model": model,
        "messages": messages,
        "stream": true,
    });
    stream_ndjson(http, &format!("{}/api/chat", base_url), body, tx, |chunk| {
        chunk.get("message").and_then(|m| m.get("content")).and_then(|c| c.as_str()).map(str::to_string)
    })
    .await;
}

/// Start a streaming raw-mode request (`POST /api/generate`).
pub async fn stream_generate(
    http: &reqwest::Client,
    base_url: &str,
    model: &str,
    prompt: &str,
    tx: mpsc::Sender<Result<BackendEvent>>,
) {
    let body = serde_json::json!({
        "model": model,
        "prompt": prompt,
        "raw": true,
        "stream": true,
    });
    stream_ndjson(
        http,
        &format!("{}/api/generate", base_url),
        body,
        tx,
        |chunk| chunk.get("response").and_then(|c| c.as_str()).map(str::to_string),
    )
    .await;
}

#[derive(Deserialize)]
struct Frame {
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(flatten)]
    rest: serde_json::Value,
}

async fn stream_ndjson(
    http: &reqwest::Client,
    url: &str,
    body: serde_json::Value,
    tx: mpsc::Sender<Result<BackendEvent>>,
    extract_text: impl Fn(&serde_json::Value) -> Option<String>,
) {
    let resp = match http.post(url).json(&body).send().await {
        Ok(r) => r,
        Err(e) => {
            let _ = tx.send(Err(PipelineError::from(e))).await;
            return;
        }
    };

    if let Err(e) = resp.error_for_status_ref() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        warn!(%status, body = %text, "backend returned an error status");
        let _ = tx.send(Err(PipelineError::from(e))).await;
        return;
    }

    let mut line_buf = String::new();
    let mut byte_stream = resp.bytes_stream();
    let mut tokens_in = 0u32;
    let mut tokens_out = 0u32;

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx.send(Err(PipelineError::from(e))).await;
                return;
            }
        };
        let Ok(text) = std::str::from_utf8(&chunk) else {
            continue;
        };
        line_buf.push_str(text);

        let lines: Vec<&str> = line_buf.split('\n').collect();
        let (complete, remainder) = lines.split_at(lines.len() - 1);
        let remainder = remainder.first().unwrap_or(&"").to_string();

        for line in complete {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let frame: Frame = match serde_json::from_str(line) {
                Ok(f) => f,
                Err(e) => {
                    warn!(line, err = %e, "failed to parse backend stream frame");
                    continue;
                }
            };

            if frame.done {
                tokens_in = frame.prompt_eval_count.unwrap_or(0);
                tokens_out = frame.eval_count.unwrap_or(0);
                continue;
            }

            if let Some(piece) = extract_text(&frame.rest) {
                if !piece.is_empty() {
                    debug!(len = piece.len(), "backend stream text delta");
                    if tx.send(Ok(BackendEvent::TextDelta(piece))).await.is_err() {
                        return;
                    }
                }
            }
        }

        line_buf = remainder;
    }

    let _ = tx
        .send(Ok(BackendEvent::Done {
            tokens_in,
            tokens_out,
        }))
        .await;
}
