//! SSE streaming engine
//!
//! Frames the HTTP body with `eventsource-stream`, hands each `data:` payload
//! to a provider-specific [`StreamDecoder`] and turns the resulting
//! [`StreamUpdate`]s into canonical chunks.
//!
//! End of stream is any of: the `[DONE]` sentinel, EOF, a decoder-reported
//! terminator event, or the first non-usage event after a finish reason.

use std::sync::Arc;

use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::Stream;
use futures_util::StreamExt;

use super::ChunkSender;
use super::tool_calls::{ToolCallAccumulator, ToolCallFragment};
use crate::error::LlmError;
use crate::metrics::MetricsRecorder;
use crate::types::{Choice, ChoiceDelta, Chunk, MessageRole, Usage};

/// Canonical update decoded from one provider event.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamUpdate {
    Meta {
        id: Option<String>,
        model: Option<String>,
    },
    Content(String),
    Reasoning(String),
    ToolCall(ToolCallFragment),
    Usage(Usage),
    Finish(String),
    /// Typed terminator event (e.g. Anthropic `message_stop`)
    End,
}

/// Provider-specific translation of SSE events.
pub trait StreamDecoder: Send + 'static {
    fn decode(&mut self, event: &Event) -> Result<Vec<StreamUpdate>, LlmError>;
}

/// Identity of the stream being driven.
#[derive(Clone)]
pub struct StreamContext {
    pub provider: String,
    pub model: String,
    pub metrics: Option<Arc<MetricsRecorder>>,
}

impl StreamContext {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn fail(&self, err: LlmError) -> LlmError {
        let err = err.in_context(&self.provider, "stream");
        if let Some(m) = &self.metrics {
            m.record_error(&self.model, err.kind());
        }
        err
    }
}

struct Assembly {
    id: String,
    model: String,
    created: i64,
    text: String,
    reasoning: String,
    tools: ToolCallAccumulator,
    usage: Option<Usage>,
    finish: Option<String>,
}

impl Assembly {
    fn new(ctx: &StreamContext) -> Self {
        Self {
            id: format!("{}-{}", ctx.provider, uuid::Uuid::new_v4().simple()),
            model: ctx.model.clone(),
            created: chrono::Utc::now().timestamp(),
            text: String::new(),
            reasoning: String::new(),
            tools: ToolCallAccumulator::new(),
            usage: None,
            finish: None,
        }
    }

    fn chunk(&self, delta: ChoiceDelta) -> Chunk {
        Chunk {
            id: self.id.clone(),
            model: self.model.clone(),
            created: self.created,
            content: delta.content.clone(),
            done: false,
            choices: vec![Choice {
                index: 0,
                message: None,
                delta: Some(delta),
                finish_reason: None,
            }],
            usage: None,
        }
    }

    fn terminal(mut self) -> Chunk {
        let tool_calls = self.tools.finish();
        let content = if self.text.is_empty() {
            self.reasoning.clone()
        } else {
            self.text
        };
        let reasoning = (!self.reasoning.is_empty()).then_some(self.reasoning);
        Chunk {
            id: self.id,
            model: self.model,
            created: self.created,
            content,
            done: true,
            choices: vec![Choice {
                index: 0,
                message: None,
                delta: Some(ChoiceDelta {
                    role: Some(MessageRole::Assistant),
                    content: String::new(),
                    reasoning,
                    tool_calls,
                }),
                finish_reason: self.finish,
            }],
            usage: self.usage,
        }
    }
}

fn frame_error<E: Into<LlmError>>(err: EventStreamError<E>) -> LlmError {
    match err {
        EventStreamError::Transport(e) => e.into(),
        EventStreamError::Utf8(e) => {
            LlmError::invalid_response(format!("invalid UTF-8 in event stream: {e}"))
        }
        EventStreamError::Parser(e) => {
            LlmError::invalid_response(format!("malformed event stream: {e}"))
        }
    }
}

/// Drive an SSE byte stream to completion, feeding chunks into `tx`.
pub async fn drive_sse<S, B, E, D>(bytes: S, mut decoder: D, ctx: StreamContext, tx: ChunkSender)
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<LlmError> + Send,
    D: StreamDecoder,
{
    let mut events = Box::pin(bytes.eventsource());
    let mut asm = Assembly::new(&ctx);
    let mut draining = false;

    loop {
        let next = tokio::select! {
            biased;
            _ = tx.token().cancelled() => return,
            next = events.next() => next,
        };
        let event = match next {
            None => break,
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                let _ = tx.send(Err(ctx.fail(frame_error(e)))).await;
                return;
            }
        };

        let data = event.data.trim();
        if data == "[DONE]" {
            break;
        }
        if data.is_empty() {
            continue;
        }

        let updates = match decoder.decode(&event) {
            Ok(updates) => updates,
            Err(e) => {
                let _ = tx.send(Err(ctx.fail(e))).await;
                return;
            }
        };

        let mut ended = false;
        let mut usage_only = true;
        for update in updates {
            match update {
                StreamUpdate::Meta { id, model } => {
                    if let Some(id) = id.filter(|s| !s.is_empty()) {
                        asm.id = id;
                    }
                    if let Some(model) = model.filter(|s| !s.is_empty()) {
                        asm.model = model;
                    }
                }
                StreamUpdate::Usage(usage) => asm.usage = Some(usage),
                StreamUpdate::End => ended = true,
                _ if draining => usage_only = false,
                StreamUpdate::Content(text) => {
                    usage_only = false;
                    if text.is_empty() {
                        continue;
                    }
                    asm.text.push_str(&text);
                    let chunk = asm.chunk(ChoiceDelta {
                        role: Some(MessageRole::Assistant),
                        content: text,
                        ..Default::default()
                    });
                    if !tx.send(Ok(chunk)).await {
                        return;
                    }
                }
                StreamUpdate::Reasoning(text) => {
                    usage_only = false;
                    if text.is_empty() {
                        continue;
                    }
                    asm.reasoning.push_str(&text);
                    let chunk = asm.chunk(ChoiceDelta {
                        role: Some(MessageRole::Assistant),
                        reasoning: Some(text),
                        ..Default::default()
                    });
                    if !tx.send(Ok(chunk)).await {
                        return;
                    }
                }
                StreamUpdate::ToolCall(fragment) => {
                    usage_only = false;
                    asm.tools.push(fragment);
                }
                StreamUpdate::Finish(reason) => {
                    if !reason.is_empty() {
                        asm.finish = Some(reason);
                    }
                }
            }
        }

        if ended || (draining && !usage_only) {
            break;
        }
        if asm.finish.is_some() {
            draining = true;
        }
    }

    if let (Some(metrics), Some(usage)) = (&ctx.metrics, asm.usage) {
        metrics.record_tokens(&asm.model, u64::from(usage.total_tokens));
    }
    let _ = tx.send(Ok(asm.terminal())).await;
}

/// Drive a streaming HTTP response.
pub async fn drive_sse_response<D: StreamDecoder>(
    response: reqwest::Response,
    decoder: D,
    ctx: StreamContext,
    tx: ChunkSender,
) {
    drive_sse(response.bytes_stream(), decoder, ctx, tx).await;
}
