//! SSE decoder for `streamGenerateContent?alt=sse`.
//!
//! Every event is a complete `GenerateContentResponse` carrying the next slice
//! of the candidate. Function calls arrive whole, one part per call.

use eventsource_stream::Event;

use super::transformers::{GenerateContentResponse, map_finish_reason, new_call_id};
use crate::error::LlmError;
use crate::streaming::{StreamDecoder, StreamUpdate, ToolCallFragment};

#[derive(Debug, Default)]
pub struct GeminiStreamDecoder {
    tool_calls: u32,
}

impl StreamDecoder for GeminiStreamDecoder {
    fn decode(&mut self, event: &Event) -> Result<Vec<StreamUpdate>, LlmError> {
        let raw: serde_json::Value = serde_json::from_str(&event.data)?;
        if let Some(error) = raw.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Err(LlmError::server(format!("stream error: {message}")));
        }
        let parsed: GenerateContentResponse = serde_json::from_value(raw)?;

        let mut out = Vec::new();
        if parsed.response_id.is_some() || parsed.model_version.is_some() {
            out.push(StreamUpdate::Meta {
                id: parsed.response_id,
                model: parsed.model_version,
            });
        }
        let mut finish = None;
        if let Some(candidate) = parsed.candidates.and_then(|c| c.into_iter().next()) {
            for part in candidate.content.parts {
                if let Some(call) = &part.function_call {
                    let mut fragment = ToolCallFragment::opening(new_call_id(), &call.name)
                        .with_index(self.tool_calls);
                    fragment.arguments = call.arguments();
                    self.tool_calls += 1;
                    out.push(StreamUpdate::ToolCall(fragment));
                }
                match part.text {
                    Some(text) if part.thought => out.push(StreamUpdate::Reasoning(text)),
                    Some(text) => out.push(StreamUpdate::Content(text)),
                    None => {}
                }
            }
            finish = candidate.finish_reason;
        }
        if let Some(usage) = &parsed.usage_metadata {
            out.push(StreamUpdate::Usage(usage.to_usage()));
        }
        if let Some(reason) = finish {
            out.push(StreamUpdate::Finish(map_finish_reason(
                &reason,
                self.tool_calls > 0,
            )));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::sse::tests::sse_event;
    use crate::streaming::{ChunkStream, StreamContext, drive_sse};
    use crate::types::Usage;
    use tokio_util::sync::CancellationToken;

    #[test]
    fn text_and_usage_slices() {
        let mut decoder = GeminiStreamDecoder::default();
        let updates = decoder
            .decode(&sse_event(
                "",
                r#"{"candidates":[{"content":{"parts":[{"text":"Hel"}]}}],
                    "usageMetadata":{"promptTokenCount":3,"candidatesTokenCount":1},
                    "modelVersion":"gemini-2.0-flash"}"#,
            ))
            .unwrap();
        assert_eq!(
            updates,
            vec![
                StreamUpdate::Meta {
                    id: None,
                    model: Some("gemini-2.0-flash".into())
                },
                StreamUpdate::Content("Hel".into()),
                StreamUpdate::Usage(Usage::new(3, 1)),
            ]
        );
    }

    #[test]
    fn error_payload_is_an_error() {
        let err = GeminiStreamDecoder::default()
            .decode(&sse_event("", r#"{"error":{"code":500,"message":"boom"}}"#))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Server);
    }

    #[tokio::test]
    async fn function_call_stream_reassembles() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Let me check\"}]}}]}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"functionCall\":",
            "{\"name\":\"get_weather\",\"args\":{\"city\":\"Paris\"}}}]},\"finishReason\":\"STOP\"}],",
            "\"usageMetadata\":{\"promptTokenCount\":10,\"candidatesTokenCount\":4,\"totalTokenCount\":14}}\n\n",
        );
        let bytes: Vec<Result<&'static [u8], LlmError>> = vec![Ok(body.as_bytes())];
        let mut stream = ChunkStream::spawn(CancellationToken::new(), move |tx| {
            drive_sse(
                futures::stream::iter(bytes),
                GeminiStreamDecoder::default(),
                StreamContext::new("gemini", "gemini-2.0-flash"),
                tx,
            )
        });
        let mut chunks = Vec::new();
        while let Some(item) = stream.next().await {
            chunks.push(item.unwrap());
        }
        stream.close().await;

        let last = chunks.last().unwrap();
        assert!(last.done);
        assert_eq!(last.content, "Let me check");
        assert_eq!(last.finish_reason(), Some("tool_calls"));
        assert_eq!(last.tool_calls().len(), 1);
        assert_eq!(last.tool_calls()[0].function.arguments, r#"{"city":"Paris"}"#);
        assert_eq!(last.usage, Some(Usage::new(10, 4)));
    }
}
