//! # Gemini Provider Tests
//!
//! The `generateContent` wire format, checked against a mock Vertex AI server.

mod common;

use common::{setup_tracing, test_identity};
use nl2sql::{
    auth::StaticTokenSource,
    providers::ai::{
        gemini::{generate_content_url, vertex_base_url, GeminiProvider},
        AiProvider, Content, FunctionDeclaration, GenerateRequest,
    },
    Nl2SqlError,
};
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const MODEL_PATH: &str = "/v1/projects/test-project/locations/us-central1/publishers/google/models/gemini-2.5-flash:generateContent";

fn provider(server: &MockServer) -> GeminiProvider {
    GeminiProvider::for_model(
        &test_identity(),
        "gemini-2.5-flash",
        Some(&server.uri()),
        Box::new(StaticTokenSource::new("test-token")),
    )
    .unwrap()
}

fn request() -> GenerateRequest {
    GenerateRequest::new(
        "You are a data analyst.",
        vec![Content::user_text("How many rows?")],
        vec![FunctionDeclaration {
            name: "execute_sql".to_string(),
            description: "Run SQL".to_string(),
            parameters: json!({ "type": "OBJECT", "properties": {} }),
        }],
    )
}

#[test]
fn test_vertex_urls() {
    assert_eq!(
        vertex_base_url("us-central1"),
        "https://us-central1-aiplatform.googleapis.com"
    );
    assert_eq!(vertex_base_url("global"), "https://aiplatform.googleapis.com");
    assert_eq!(
        generate_content_url("https://example.com/", &test_identity(), "gemini-2.5-flash"),
        format!("https://example.com{MODEL_PATH}")
    );
}

#[tokio::test]
async fn test_generate_sends_request_and_parses_text() {
    setup_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "contents": [{ "role": "user", "parts": [{ "text": "How many rows?" }] }],
            "systemInstruction": { "parts": [{ "text": "You are a data analyst." }] },
            "tools": [{ "functionDeclarations": [{ "name": "execute_sql" }] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "thinking...", "thought": true },
                        { "text": "There are 32561 rows." }
                    ]
                },
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let content = provider(&server).generate(&request()).await.unwrap();

    assert_eq!(content.text(), "There are 32561 rows.");
    assert!(content.function_calls().is_empty());
}

#[tokio::test]
async fn test_generate_parses_function_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{
                        "functionCall": { "name": "execute_sql", "args": { "query": "SELECT COUNT(*) FROM t" } },
                        "thoughtSignature": "c2lnbmF0dXJl"
                    }]
                }
            }]
        })))
        .mount(&server)
        .await;

    let content = provider(&server).generate(&request()).await.unwrap();

    let calls = content.function_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].name, "execute_sql");
    assert_eq!(calls[0].args["query"], "SELECT COUNT(*) FROM t");
    assert_eq!(
        content.parts[0].thought_signature.as_deref(),
        Some("c2lnbmF0dXJl")
    );

    let echoed = serde_json::to_value(&content).unwrap();
    assert_eq!(echoed["parts"][0]["thoughtSignature"], "c2lnbmF0dXJl");
}

#[tokio::test]
async fn test_unauthorized_maps_to_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
        .mount(&server)
        .await;

    let err = provider(&server).generate(&request()).await.unwrap_err();

    assert!(matches!(err, Nl2SqlError::Authentication(_)));
    assert!(err
        .to_string()
        .contains("gcloud auth application-default login"));
}

#[tokio::test]
async fn test_server_error_maps_to_external_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend unavailable"))
        .mount(&server)
        .await;

    let err = provider(&server).generate(&request()).await.unwrap_err();

    assert!(matches!(err, Nl2SqlError::ExternalService(_)));
    assert!(err.to_string().contains("backend unavailable"));
}

#[tokio::test]
async fn test_blocked_prompt_without_candidates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(MODEL_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        })))
        .mount(&server)
        .await;

    let err = provider(&server).generate(&request()).await.unwrap_err();

    assert!(matches!(err, Nl2SqlError::ExternalService(_)));
    assert!(err.to_string().contains("SAFETY"));
}
