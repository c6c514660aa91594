//! Streaming chat completions: a producer reads upstream SSE frames and a
//! consumer relays them to the client over a small bounded channel so a slow
//! client applies backpressure to the upstream read (spec §4.5, §5).

use std::convert::Infallible;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    error::{Error, Result},
    sse::Event,
    state::AppState,
};

/// Buffer depth for the producer/consumer channel (spec §5: "small, ≈16 frames").
const STREAM_BUFFER_FRAMES: usize = 16;

/// Best-effort token estimate used when no upstream `usage` block arrives
/// (spec §4.5): roughly 4 characters per token, a deterministic
/// approximation rather than a real tokeniser.
pub fn estimate_tokens(text: &str) -> i64 {
    ((text.chars().count() as f64) / 4.0).ceil() as i64
}

pub struct StreamOutcome {
    pub usage: Option<Value>,
    pub assistant_text: String,
}

/// Opens the upstream SSE stream and relays frames verbatim to the caller's
/// channel, returning a future that resolves to the terminal usage/metering
/// outcome once the upstream signals `[DONE]` or closes.
pub async fn relay_stream(
    state: &AppState,
    path: &str,
    body: &Value,
) -> Result<(ReceiverStream<std::result::Result<Event, Infallible>>, tokio::task::JoinHandle<StreamOutcome>)> {
    let breaker_name = format!("upstream:{path}");
    let kv = state.kv().await;
    let ttl_secs = state.config().upstream.call_timeout_secs.saturating_mul(10);

    if !state.breakers().allow_kv(kv.as_ref(), &breaker_name, ttl_secs).await {
        return Err(Error::Integration(format!(
            "circuit breaker open for upstream path '{path}'"
        )));
    }

    let upstream = &state.config().upstream;
    let url = format!("{}{}", upstream.openrouter_api_base.trim_end_matches('/'), path);

    let response = state
        .upstream_client()
        .post(&url)
        .bearer_auth(&upstream.openrouter_api_key)
        .json(body)
        .send()
        .await;

    let response = match response {
        Ok(r) if r.status().is_success() => {
            state.breakers().record_success_kv(kv.as_ref(), &breaker_name, ttl_secs).await;
            r
        }
        Ok(r) => {
            state.breakers().record_failure_kv(kv.as_ref(), &breaker_name, ttl_secs).await;
            return Err(Error::Integration(format!("upstream stream open failed: {}", r.status())));
        }
        Err(e) => {
            state.breakers().record_failure_kv(kv.as_ref(), &breaker_name, ttl_secs).await;
            return Err(Error::from(e));
        }
    };

    let (tx, rx) = mpsc::channel(STREAM_BUFFER_FRAMES);
    let mut byte_stream = response.bytes_stream();

    let handle = tokio::spawn(async move {
        let mut usage = None;
        let mut assistant_text = String::new();
        let mut line_buf = String::new();

        while let Some(chunk) = byte_stream.next().await {
            let Ok(bytes) = chunk else { break };
            line_buf.push_str(&String::from_utf8_lossy(&bytes));

            while let Some(pos) = line_buf.find('\n') {
                let line = line_buf[..pos].trim_end_matches('\r').to_string();
                line_buf.drain(..=pos);

                let Some(data) = line.strip_prefix("data: ") else { continue };

                if data == "[DONE]" {
                    if tx.send(Ok(Event::default().data("[DONE]"))).await.is_err() {
                        return StreamOutcome { usage, assistant_text };
                    }
                    return StreamOutcome { usage, assistant_text };
                }

                let Ok(frame): std::result::Result<Value, _> = serde_json::from_str(data) else {
                    continue;
                };

                if let Some(u) = frame.get("usage") {
                    usage = Some(u.clone());
                }
                if let Some(text) = frame
                    .get("choices")
                    .and_then(|c| c.get(0))
                    .and_then(|c| c.get("delta"))
                    .and_then(|d| d.get("content"))
                    .and_then(|c| c.as_str())
                {
                    assistant_text.push_str(text);
                }

                if tx.send(Ok(Event::default().data(data))).await.is_err() {
                    // Client disconnected: drop the upstream connection within
                    // this read cycle (spec §4.5 cancellation).
                    return StreamOutcome { usage, assistant_text };
                }
            }
        }

        StreamOutcome { usage, assistant_text }
    });

    Ok((ReceiverStream::new(rx), handle))
}
