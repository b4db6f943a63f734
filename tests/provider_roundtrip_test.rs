//! Request shape and response normalization against mocked vendor endpoints.

mod support;

use std::time::Duration;

use serde_json::{Value, json};
use unillm::prelude::*;
use unillm::providers;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use support::{completion_response, openai_config};

fn body_of(req: &Request) -> Value {
    serde_json::from_slice(&req.body).unwrap_or(Value::Null)
}

#[tokio::test]
async fn openai_chat_request_shape_and_normalized_reply() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(|req: &Request| {
            let body = body_of(req);
            body["model"] == "gpt-4o"
                && body["messages"][0] == json!({"role": "system", "content": "be brief"})
                && body["messages"][1] == json!({"role": "user", "content": "Hello"})
                && body["max_tokens"] == 64
                && body["stop"] == json!(["END"])
                && body.get("stream_options").is_none()
        })
        .respond_with(completion_response("gpt-4o", "Hi there"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = providers::openai(openai_config(&server)).unwrap();
    let options = GenerateOptions::new(vec![
        ChatMessage::system("be brief"),
        ChatMessage::user("Hello"),
    ])
    .with_model("gpt-4o")
    .with_max_tokens(64)
    .with_stop(vec!["END".into()]);

    let reply = provider
        .generate(options)
        .await
        .unwrap()
        .collect_response()
        .await
        .unwrap();
    assert!(reply.done);
    assert_eq!(reply.content, "Hi there");
    assert_eq!(reply.model, "gpt-4o");
    assert_eq!(reply.finish_reason(), Some("stop"));
    assert_eq!(reply.usage.map(|u| u.total_tokens), Some(15));

    let metrics = provider.metrics();
    assert_eq!(metrics.request_count, 1);
    assert_eq!(metrics.success_count, 1);
    assert_eq!(metrics.total_tokens, 15);
}

#[tokio::test]
async fn openai_tool_call_reply_is_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(|req: &Request| {
            let body = body_of(req);
            body["tools"][0]["function"]["name"] == "get_weather" && body["tool_choice"] == "required"
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-2",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "get_weather", "arguments": "{\"city\":\"Paris\"}" }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        })))
        .mount(&server)
        .await;

    let tool = Tool::function(
        "get_weather",
        "Current weather for a city",
        json!({"type": "object", "properties": {"city": {"type": "string"}}}),
    );
    let provider = providers::openai(openai_config(&server)).unwrap();
    let reply = provider
        .generate(
            GenerateOptions::from_prompt("Weather in Paris?")
                .with_tools(vec![tool])
                .with_tool_choice(ToolChoice::Required),
        )
        .await
        .unwrap()
        .collect_response()
        .await
        .unwrap();

    assert_eq!(reply.finish_reason(), Some("tool_calls"));
    let calls = reply.tool_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "call_1");
    assert_eq!(calls[0].function.name, "get_weather");
    assert_eq!(calls[0].parsed_arguments().unwrap(), json!({"city": "Paris"}));
}

#[tokio::test]
async fn anthropic_messages_roundtrip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "ant-key"))
        .and(header("anthropic-version", providers::anthropic::API_VERSION))
        .and(|req: &Request| {
            let body = body_of(req);
            body["system"] == "be brief"
                && body["messages"].as_array().is_some_and(|m| m.len() == 1)
                && body["max_tokens"].as_u64().is_some_and(|n| n > 0)
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-sonnet-4-20250514",
            "content": [
                { "type": "thinking", "thinking": "short answer" },
                { "type": "text", "text": "Hello!" }
            ],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 12, "output_tokens": 3 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = providers::anthropic(
        ProviderConfig::new("anthropic")
            .with_base_url(server.uri())
            .with_api_key("ant-key"),
    )
    .unwrap();
    let reply = provider
        .generate(GenerateOptions::new(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("Hi"),
        ]))
        .await
        .unwrap()
        .collect_response()
        .await
        .unwrap();

    assert_eq!(reply.id, "msg_1");
    assert_eq!(reply.content, "Hello!");
    assert_eq!(reply.reasoning(), Some("short answer"));
    assert_eq!(reply.finish_reason(), Some("stop"));
    assert_eq!(reply.usage.map(|u| u.total_tokens), Some(15));
}

#[tokio::test]
async fn gemini_generate_content_roundtrip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .and(header("x-goog-api-key", "g-key"))
        .and(|req: &Request| {
            let body = body_of(req);
            body["contents"][0]["role"] == "user"
                && body["contents"][0]["parts"][0]["text"] == "Bonjour?"
                && body["generationConfig"]["temperature"].as_f64().is_some()
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Bonjour!" }] },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 4, "candidatesTokenCount": 2, "totalTokenCount": 6 },
            "modelVersion": "gemini-2.5-flash",
            "responseId": "resp-1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = providers::gemini(
        ProviderConfig::new("gemini")
            .with_base_url(server.uri())
            .with_api_key("g-key"),
    )
    .unwrap();
    let reply = provider
        .generate(
            GenerateOptions::from_prompt("Bonjour?")
                .with_model("gemini-2.5-flash")
                .with_temperature(0.2),
        )
        .await
        .unwrap()
        .collect_response()
        .await
        .unwrap();

    assert_eq!(reply.content, "Bonjour!");
    assert_eq!(reply.id, "resp-1");
    assert_eq!(reply.finish_reason(), Some("stop"));
    assert_eq!(reply.usage.map(|u| u.total_tokens), Some(6));
}

#[tokio::test]
async fn http_errors_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "message": "The model `gpt-9` does not exist", "type": "invalid_request_error" }
        })))
        .mount(&server)
        .await;

    let provider = providers::openai(openai_config(&server)).unwrap();
    let err = provider
        .generate(GenerateOptions::from_prompt("hi").with_model("gpt-9"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.status_code(), Some(404));
    assert_eq!(err.provider, "openai");

    let metrics = provider.metrics();
    assert_eq!(metrics.error_count, 1);
    assert_eq!(metrics.errors_by_kind.get(&ErrorKind::NotFound), Some(&1));
}

#[tokio::test]
async fn health_check_probes_model_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    let healthy = providers::openai(openai_config(&server)).unwrap();
    healthy.health_check().await.unwrap();

    let failing = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&failing)
        .await;
    let unhealthy = providers::openai(openai_config(&failing)).unwrap();
    let err = unhealthy.health_check().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Auth);
}

#[tokio::test]
async fn model_listing_is_cached_for_the_ttl() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": "gpt-4o", "object": "model" },
                { "id": "ft:gpt-4o:acme", "object": "model" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = providers::openai(
        openai_config(&server).with_model_cache_ttl(Duration::from_secs(300)),
    )
    .unwrap();
    let first = provider.list_models().await.unwrap();
    let second = provider.list_models().await.unwrap();
    assert_eq!(first, second);
    let ids: Vec<&str> = first.iter().map(|m| m.id.as_str()).collect();
    assert!(ids.contains(&"gpt-4o"));
    assert!(ids.contains(&"ft:gpt-4o:acme"));
}

#[tokio::test]
async fn model_listing_falls_back_to_static_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let provider = providers::openai(openai_config(&server)).unwrap();
    let models = provider.list_models().await.unwrap();
    assert!(models.iter().any(|m| m.id == "gpt-4o-mini"));
    assert!(models.iter().all(|m| m.provider == "openai"));
}

#[tokio::test]
async fn local_server_needs_no_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(|req: &Request| !req.headers.contains_key("authorization"))
        .respond_with(completion_response("qwen2.5-7b-instruct", "local hello"))
        .expect(1)
        .mount(&server)
        .await;

    let provider = providers::lmstudio(
        ProviderConfig::new("lmstudio")
            .with_base_url(server.uri())
            .with_default_model("qwen2.5-7b-instruct"),
    )
    .unwrap();
    let reply = provider
        .generate(GenerateOptions::from_prompt("hi"))
        .await
        .unwrap()
        .collect_response()
        .await
        .unwrap();
    assert_eq!(reply.content, "local hello");
}
