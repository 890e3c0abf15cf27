use std::time::Duration;

use httpmock::Method::POST;
use httpmock::MockServer;
use serde_json::json;
use todo_common::{ModelConfig, ModelProvider};
use todo_core::{Envelope, Message, Transcript};
use todo_model::{ChatBackend, ChatCompletionsClient, ModelError};

fn test_config(server: &MockServer) -> ModelConfig {
    ModelConfig {
        provider: ModelProvider::OpenAi,
        model_id: "gpt-test".to_string(),
        endpoint: Some(server.base_url()),
        timeout_ms: 2_000,
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 2,
        ..ModelConfig::default()
    }
}

fn transcript() -> Vec<Message> {
    let mut transcript = Transcript::with_system_prompt("You manage todos.");
    transcript.push_envelope(&Envelope::user("show me everything"));
    transcript.push_envelope(&Envelope::observation("[]"));
    transcript.messages().to_vec()
}

fn completion(content: &str) -> serde_json::Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "choices": [
            {
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }
        ]
    })
}

#[test]
fn sends_transcript_with_auth_and_json_mode() {
    let server = MockServer::start();
    let reply = r#"{"type":"output","output":"You have no todos."}"#;
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .header("authorization", "Bearer sk-test")
            .body_contains(r#""model":"gpt-test""#)
            .body_contains(r#""response_format":{"type":"json_object"}"#)
            .body_contains(r#""role":"developer""#)
            .body_contains(r#"show me everything"#);
        then.status(200)
            .header("content-type", "application/json")
            .json_body(completion(reply));
    });

    let client =
        ChatCompletionsClient::new(&test_config(&server), Some("sk-test".to_string()))
            .expect("client");
    let content = client.complete(&transcript()).expect("completion");

    assert_eq!(content, reply);
    mock.assert();
}

#[test]
fn json_mode_off_omits_response_format() {
    let server = MockServer::start();
    let with_format = server.mock(|when, then| {
        when.method(POST)
            .path("/chat/completions")
            .body_contains("response_format");
        then.status(500);
    });
    let plain = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).json_body(completion("{}"));
    });

    let config = ModelConfig {
        json_mode: false,
        ..test_config(&server)
    };
    let client = ChatCompletionsClient::new(&config, None).expect("client");
    client.complete(&transcript()).expect("completion");

    assert_eq!(with_format.hits(), 0);
    assert_eq!(plain.hits(), 1);
}

#[test]
fn server_errors_are_retried_up_to_max_attempts() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(503).body("overloaded");
    });

    let client = ChatCompletionsClient::new(&test_config(&server), None).expect("client");
    let err = client.complete(&transcript()).expect_err("should give up");

    match err {
        ModelError::Status {
            status,
            attempts,
            body,
        } => {
            assert_eq!(status, 503);
            assert_eq!(attempts, 3);
            assert_eq!(body, "overloaded");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(mock.hits(), 3);
}

#[test]
fn client_errors_are_not_retried() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(401).body(r#"{"error":"invalid api key"}"#);
    });

    let client = ChatCompletionsClient::new(&test_config(&server), Some("bad".to_string()))
        .expect("client");
    let err = client.complete(&transcript()).expect_err("unauthorized");

    assert!(matches!(err, ModelError::Status { status: 401, attempts: 1, .. }));
    assert_eq!(mock.hits(), 1);
}

#[test]
fn missing_content_is_a_malformed_response() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200).json_body(json!({ "choices": [] }));
    });

    let client = ChatCompletionsClient::new(&test_config(&server), None).expect("client");
    let err = client.complete(&transcript()).expect_err("no choices");
    assert!(matches!(err, ModelError::MalformedResponse(_)));
}

#[test]
fn slow_backend_hits_the_request_timeout() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/chat/completions");
        then.status(200)
            .delay(Duration::from_millis(500))
            .json_body(completion("{}"));
    });

    let config = ModelConfig {
        timeout_ms: 50,
        max_attempts: 2,
        ..test_config(&server)
    };
    let client = ChatCompletionsClient::new(&config, None).expect("client");
    let err = client.complete(&transcript()).expect_err("timeout");

    match err {
        ModelError::Transport { attempts, source } => {
            assert_eq!(attempts, 2);
            assert!(source.is_timeout());
        }
        other => panic!("unexpected error: {other}"),
    }
}
