//! # Agent Engine Client Tests

mod common;

use common::{setup_tracing, test_identity};
use nl2sql::{
    auth::StaticTokenSource,
    engine::{parse_stream_events, AgentEngineClient},
    Nl2SqlError,
};
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path, query_param, query_param_is_missing},
    Mock, MockServer, ResponseTemplate,
};

const ENGINE: &str = "projects/test-project/locations/us-central1/reasoningEngines/123";

fn client(server: &MockServer) -> AgentEngineClient {
    AgentEngineClient::new(
        &test_identity(),
        Some(&server.uri()),
        Box::new(StaticTokenSource::new("test-token")),
    )
    .unwrap()
}

#[tokio::test]
async fn test_list_follows_pagination() {
    setup_tracing();
    let server = MockServer::start().await;
    let list_path = "/v1/projects/test-project/locations/us-central1/reasoningEngines";
    Mock::given(method("GET"))
        .and(path(list_path))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reasoningEngines": [{ "name": format!("{ENGINE}-b") }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(list_path))
        .and(query_param_is_missing("pageToken"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "reasoningEngines": [{ "name": ENGINE, "displayName": "NL2SQL Agent" }],
            "nextPageToken": "page-2"
        })))
        .mount(&server)
        .await;

    let engines = client(&server).list().await.unwrap();

    assert_eq!(engines.len(), 2);
    assert_eq!(engines[0].label(), "NL2SQL Agent");
    assert_eq!(engines[1].label(), format!("{ENGINE}-b"));
}

#[tokio::test]
async fn test_get_engine() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/{ENGINE}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": ENGINE,
            "displayName": "NL2SQL Agent",
            "createTime": "2025-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;

    let engine = client(&server).get(ENGINE).await.unwrap();
    assert_eq!(engine.display_name.as_deref(), Some("NL2SQL Agent"));
    assert_eq!(engine.create_time.as_deref(), Some("2025-01-01T00:00:00Z"));
}

#[tokio::test]
async fn test_missing_engine_is_external_service_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/{ENGINE}")))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let err = client(&server).get(ENGINE).await.unwrap_err();
    assert!(matches!(err, Nl2SqlError::ExternalService(_)));
}

#[tokio::test]
async fn test_create_session_posts_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v1/{ENGINE}:query")))
        .and(body_partial_json(json!({
            "classMethod": "create_session",
            "input": { "user_id": "user_1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": { "id": "remote-session-1", "userId": "user_1" }
        })))
        .mount(&server)
        .await;

    let id = client(&server).create_session(ENGINE, "user_1").await.unwrap();
    assert_eq!(id, "remote-session-1");
}

#[tokio::test]
async fn test_list_sessions_reads_session_objects() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v1/{ENGINE}:query")))
        .and(body_partial_json(json!({
            "classMethod": "list_sessions",
            "input": { "user_id": "user_1" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "output": {
                "sessions": [
                    { "id": "s1", "appName": "nl2sql_app", "userId": "user_1", "lastUpdateTime": 1735689600.5 },
                    { "id": "s2", "user_id": "user_1" }
                ]
            }
        })))
        .mount(&server)
        .await;

    let sessions = client(&server).list_sessions(ENGINE, "user_1").await.unwrap();

    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0].id, "s1");
    assert_eq!(sessions[0].app_name.as_deref(), Some("nl2sql_app"));
    assert_eq!(sessions[0].last_update_time, Some(1735689600.5));
    assert_eq!(sessions[1].user_id.as_deref(), Some("user_1"));
}

#[tokio::test]
async fn test_list_sessions_handles_empty_output() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("/v1/{ENGINE}:query")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "output": { "sessions": [] } })))
        .mount(&server)
        .await;

    let sessions = client(&server).list_sessions(ENGINE, "nobody").await.unwrap();
    assert!(sessions.is_empty());
}

#[tokio::test]
async fn test_stream_query_collects_events() {
    let server = MockServer::start().await;
    let body = [
        json!({
            "author": "nl2sql_agent",
            "content": { "parts": [{ "function_call": { "name": "execute_sql", "args": { "query": "SELECT 1" } } }] }
        })
        .to_string(),
        json!({ "author": "nl2sql_agent", "content": { "parts": [{ "text": "The answer is 1." }] } })
            .to_string(),
    ]
    .join("\n");
    Mock::given(method("POST"))
        .and(path(format!("/v1/{ENGINE}:streamQuery")))
        .and(body_partial_json(json!({
            "classMethod": "stream_query",
            "input": { "user_id": "user_1", "session_id": "s1", "message": "What is one?" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let events = client(&server)
        .stream_query(ENGINE, "user_1", "s1", "What is one?")
        .await
        .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].executed_sql, vec!["SELECT 1"]);
    assert_eq!(events[1].text, vec!["The answer is 1."]);
    assert_eq!(events[1].author.as_deref(), Some("nl2sql_agent"));
}

#[test]
fn test_parse_stream_events_reads_tool_call_actions() {
    let body = r#"
{"actions": {"tool_calls": [{"name": "bigquery_execute_sql", "args": {"query": "SELECT 2"}}, {"name": "list_table_ids", "args": {"dataset_id": "d"}}]}}
not json at all
{"content": {"parts": [{"functionCall": {"name": "execute_sql", "args": {"query": "SELECT 3"}}}, {"text": "two"}]}}
"#;

    let events = parse_stream_events(body);

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].executed_sql, vec!["SELECT 2"]);
    assert!(events[0].text.is_empty());
    assert_eq!(events[1].executed_sql, vec!["SELECT 3"]);
    assert_eq!(events[1].text, vec!["two"]);
}
