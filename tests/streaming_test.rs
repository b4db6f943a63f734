//! Streaming responses over real HTTP: delta order, tool-call reassembly,
//! terminal chunk contents and cancellation.

mod support;

use std::time::{Duration, Instant};

use serde_json::json;
use tokio_util::sync::CancellationToken;
use unillm::prelude::*;
use unillm::providers;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{openai_config, sse_body, sse_response, typed_sse_body};

fn frame(delta: serde_json::Value, finish: Option<&str>) -> serde_json::Value {
    json!({
        "id": "chatcmpl-s1",
        "object": "chat.completion.chunk",
        "model": "gpt-4o-mini",
        "choices": [{ "index": 0, "delta": delta, "finish_reason": finish }]
    })
}

async fn drain(mut stream: ChunkStream) -> (Vec<String>, Chunk) {
    let mut deltas = Vec::new();
    while let Some(item) = stream.next().await {
        let chunk = item.unwrap();
        if chunk.done {
            return (deltas, chunk);
        }
        deltas.push(chunk.content);
    }
    panic!("stream ended without a terminal chunk");
}

#[tokio::test]
async fn openai_stream_yields_deltas_then_terminal_chunk() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        frame(json!({"role": "assistant", "content": ""}), None),
        frame(json!({"content": "Hel"}), None),
        frame(json!({"content": "lo"}), None),
        frame(json!({"content": "!"}), Some("stop")),
        json!({
            "id": "chatcmpl-s1",
            "model": "gpt-4o-mini",
            "choices": [],
            "usage": { "prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10 }
        }),
    ]);
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({
            "stream": true,
            "stream_options": { "include_usage": true }
        })))
        .respond_with(sse_response(body))
        .expect(1)
        .mount(&server)
        .await;

    let provider = providers::openai(openai_config(&server)).unwrap();
    let stream = provider
        .generate(GenerateOptions::from_prompt("Say hello").with_stream(true))
        .await
        .unwrap();
    let (deltas, last) = drain(stream).await;

    assert_eq!(deltas, ["Hel", "lo", "!"]);
    assert_eq!(last.content, "Hello!");
    assert_eq!(last.id, "chatcmpl-s1");
    assert_eq!(last.finish_reason(), Some("stop"));
    assert_eq!(last.usage.map(|u| u.total_tokens), Some(10));
    assert_eq!(provider.metrics().total_tokens, 10);
}

#[tokio::test]
async fn streamed_tool_call_fragments_are_reassembled() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        frame(
            json!({"tool_calls": [{
                "index": 0, "id": "call_a", "type": "function",
                "function": { "name": "lookup", "arguments": "" }
            }]}),
            None,
        ),
        frame(
            json!({"tool_calls": [{ "index": 0, "function": { "arguments": "{\"q\":" } }]}),
            None,
        ),
        frame(
            json!({"tool_calls": [{
                "index": 1, "id": "call_b", "type": "function",
                "function": { "name": "clock", "arguments": "{}" }
            }]}),
            None,
        ),
        frame(
            json!({"tool_calls": [{ "index": 0, "function": { "arguments": "\"rust\"}" } }]}),
            None,
        ),
        frame(json!({}), Some("tool_calls")),
    ]);
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(sse_response(body))
        .mount(&server)
        .await;

    let provider = providers::openai(openai_config(&server)).unwrap();
    let last = provider
        .generate(
            GenerateOptions::from_prompt("look it up")
                .with_stream(true)
                .with_tools(vec![
                    Tool::function("lookup", "", json!({"type": "object"})),
                    Tool::function("clock", "", json!({"type": "object"})),
                ]),
        )
        .await
        .unwrap()
        .collect_response()
        .await
        .unwrap();

    assert_eq!(last.finish_reason(), Some("tool_calls"));
    let calls = last.tool_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].id, "call_a");
    assert_eq!(calls[0].function.name, "lookup");
    assert_eq!(calls[0].parsed_arguments().unwrap(), json!({"q": "rust"}));
    assert_eq!(calls[1].id, "call_b");
    assert_eq!(calls[1].function.name, "clock");
}

#[tokio::test]
async fn anthropic_typed_events_stream() {
    let server = MockServer::start().await;
    let body = typed_sse_body(&[
        (
            "message_start",
            json!({"type": "message_start", "message": {
                "id": "msg_s1", "model": "claude-sonnet-4-20250514",
                "usage": { "input_tokens": 9, "output_tokens": 0 }
            }}),
        ),
        (
            "content_block_start",
            json!({"type": "content_block_start", "index": 0,
                   "content_block": { "type": "text", "text": "" }}),
        ),
        ("ping", json!({"type": "ping"})),
        (
            "content_block_delta",
            json!({"type": "content_block_delta", "index": 0,
                   "delta": { "type": "text_delta", "text": "Bon" }}),
        ),
        (
            "content_block_delta",
            json!({"type": "content_block_delta", "index": 0,
                   "delta": { "type": "text_delta", "text": "jour" }}),
        ),
        (
            "content_block_stop",
            json!({"type": "content_block_stop", "index": 0}),
        ),
        (
            "message_delta",
            json!({"type": "message_delta", "delta": { "stop_reason": "end_turn" },
                   "usage": { "output_tokens": 4 }}),
        ),
        ("message_stop", json!({"type": "message_stop"})),
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(sse_response(body))
        .mount(&server)
        .await;

    let provider = providers::anthropic(
        ProviderConfig::new("anthropic")
            .with_base_url(server.uri())
            .with_api_key("ant-key"),
    )
    .unwrap();
    let stream = provider
        .generate(GenerateOptions::from_prompt("Salut").with_stream(true))
        .await
        .unwrap();
    let (deltas, last) = drain(stream).await;

    assert_eq!(deltas, ["Bon", "jour"]);
    assert_eq!(last.content, "Bonjour");
    assert_eq!(last.id, "msg_s1");
    assert_eq!(last.finish_reason(), Some("stop"));
    let usage = last.usage.unwrap();
    assert_eq!((usage.prompt_tokens, usage.completion_tokens), (9, 4));
}

#[tokio::test]
async fn mid_stream_error_event_surfaces_on_next() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        frame(json!({"content": "partial"}), None),
        json!({"error": { "message": "upstream overloaded" }}),
    ]);
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(sse_response(body))
        .mount(&server)
        .await;

    let provider = providers::openai(openai_config(&server)).unwrap();
    let mut stream = provider
        .generate(GenerateOptions::from_prompt("hi").with_stream(true))
        .await
        .unwrap();

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.content, "partial");
    let err = stream.next().await.unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Server);
    assert!(err.message.contains("upstream overloaded"));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn closed_stream_yields_nothing_more() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        frame(json!({"content": "one"}), None),
        frame(json!({"content": "two"}), None),
        frame(json!({"content": "three"}), Some("stop")),
    ]);
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(sse_response(body))
        .mount(&server)
        .await;

    let provider = providers::openai(openai_config(&server)).unwrap();
    let mut stream = provider
        .generate(GenerateOptions::from_prompt("count").with_stream(true))
        .await
        .unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap().content, "one");

    stream.close().await;
    assert!(stream.is_closed());
    assert!(stream.next().await.is_none());
    stream.close().await;
}

#[tokio::test]
async fn caller_cancellation_aborts_pending_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(support::completion("gpt-4o-mini", "too late"))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let provider = providers::openai(openai_config(&server)).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = provider
        .generate(GenerateOptions::from_prompt("hi").with_cancel(cancel))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(3));
}
