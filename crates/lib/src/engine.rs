//! # Agent Engine Client
//!
//! Talks to agents already deployed on Vertex AI Agent Engine (reasoning
//! engines): listing them, opening a remote session and streaming a query.

use crate::{
    auth::TokenSource,
    errors::Nl2SqlError,
    providers::{ai::gemini::vertex_base_url, ensure_success},
    resolver::RuntimeIdentity,
};
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

const SERVICE: &str = "Agent Engine";

/// A deployed agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningEngine {
    /// Full resource name, `projects/{p}/locations/{l}/reasoningEngines/{id}`.
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub update_time: Option<String>,
}

impl ReasoningEngine {
    /// The display name, or the resource name when none was set.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    reasoning_engines: Vec<ReasoningEngine>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    output: Value,
}

/// A session held by a deployed agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RemoteSession {
    pub id: String,
    #[serde(default, alias = "appName")]
    pub app_name: Option<String>,
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    /// Seconds since the Unix epoch.
    #[serde(default, alias = "lastUpdateTime")]
    pub last_update_time: Option<f64>,
}

/// What a single streamed event carried.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineEvent {
    pub author: Option<String>,
    pub text: Vec<String>,
    /// SQL sent to `execute_sql` in this event.
    pub executed_sql: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct AgentEngineClient {
    client: ReqwestClient,
    base_url: String,
    identity: RuntimeIdentity,
    tokens: Box<dyn TokenSource>,
}

impl AgentEngineClient {
    /// `base_url` overrides the regional Vertex AI host.
    pub fn new(
        identity: &RuntimeIdentity,
        base_url: Option<&str>,
        tokens: Box<dyn TokenSource>,
    ) -> Result<Self, Nl2SqlError> {
        let client = ReqwestClient::builder()
            .build()
            .map_err(Nl2SqlError::ReqwestClientBuild)?;
        let base_url = base_url
            .map(String::from)
            .unwrap_or_else(|| vertex_base_url(&identity.location))
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            client,
            base_url,
            identity: identity.clone(),
            tokens,
        })
    }

    fn resource_url(&self, resource: &str) -> String {
        format!("{}/v1/{}", self.base_url, resource.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, Nl2SqlError> {
        let token = self.tokens.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| Nl2SqlError::Request {
                service: SERVICE,
                source,
            })?;
        ensure_success(SERVICE, response).await
    }

    /// Lists every engine in the project and location, following pagination.
    pub async fn list(&self) -> Result<Vec<ReasoningEngine>, Nl2SqlError> {
        let url = format!(
            "{}/v1/projects/{}/locations/{}/reasoningEngines",
            self.base_url, self.identity.project_id, self.identity.location
        );
        let mut engines = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.client.get(&url);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }
            let page: ListResponse = self
                .send(request)
                .await?
                .json()
                .await
                .map_err(|source| Nl2SqlError::Deserialization {
                    service: SERVICE,
                    source,
                })?;
            engines.extend(page.reasoning_engines);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        debug!(count = engines.len(), "Listed reasoning engines");
        Ok(engines)
    }

    pub async fn get(&self, resource: &str) -> Result<ReasoningEngine, Nl2SqlError> {
        self.send(self.client.get(self.resource_url(resource)))
            .await?
            .json()
            .await
            .map_err(|source| Nl2SqlError::Deserialization {
                service: SERVICE,
                source,
            })
    }

    /// Calls `class_method` through the engine's `:query` endpoint and returns its output.
    async fn query_method(
        &self,
        resource: &str,
        class_method: &str,
        input: Value,
    ) -> Result<Value, Nl2SqlError> {
        let url = format!("{}:query", self.resource_url(resource));
        let body = json!({ "classMethod": class_method, "input": input });
        let response: QueryResponse = self
            .send(self.client.post(&url).json(&body))
            .await?
            .json()
            .await
            .map_err(|source| Nl2SqlError::Deserialization {
                service: SERVICE,
                source,
            })?;
        Ok(response.output)
    }

    /// Opens a session on the deployed agent and returns its id.
    pub async fn create_session(&self, resource: &str, user_id: &str) -> Result<String, Nl2SqlError> {
        let output = self
            .query_method(resource, "create_session", json!({ "user_id": user_id }))
            .await?;

        let id = match &output {
            Value::String(id) => Some(id.clone()),
            output => output.get("id").and_then(Value::as_str).map(String::from),
        };
        let id = id.ok_or_else(|| {
            Nl2SqlError::ExternalService(format!(
                "{SERVICE} create_session returned no session id: {output}"
            ))
        })?;
        info!(session_id = %id, "Created remote session");
        Ok(id)
    }

    /// Lists the sessions the deployed agent holds for `user_id`.
    pub async fn list_sessions(
        &self,
        resource: &str,
        user_id: &str,
    ) -> Result<Vec<RemoteSession>, Nl2SqlError> {
        let output = self
            .query_method(resource, "list_sessions", json!({ "user_id": user_id }))
            .await?;
        let sessions = match output {
            Value::Array(_) => output,
            Value::Null => Value::Array(Vec::new()),
            mut other => other
                .get_mut("sessions")
                .map(Value::take)
                .unwrap_or(Value::Array(Vec::new())),
        };
        let sessions: Vec<RemoteSession> = serde_json::from_value(sessions)?;
        debug!(count = sessions.len(), "Listed remote sessions");
        Ok(sessions)
    }

    /// Sends `message` to the deployed agent and collects the streamed events.
    pub async fn stream_query(
        &self,
        resource: &str,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> Result<Vec<EngineEvent>, Nl2SqlError> {
        let url = format!("{}:streamQuery", self.resource_url(resource));
        let body = json!({
            "classMethod": "stream_query",
            "input": {
                "user_id": user_id,
                "session_id": session_id,
                "message": message,
            },
        });
        let body = self
            .send(self.client.post(&url).json(&body))
            .await?
            .text()
            .await
            .map_err(|source| Nl2SqlError::Deserialization {
                service: SERVICE,
                source,
            })?;
        Ok(parse_stream_events(&body))
    }
}

/// Parses a newline-delimited JSON event stream. Lines that are not JSON
/// objects are skipped.
pub fn parse_stream_events(body: &str) -> Vec<EngineEvent> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<Value>(line) {
            Ok(value) if value.is_object() => Some(parse_event(&value)),
            Ok(_) => None,
            Err(e) => {
                debug!("Skipping non-JSON stream line: {e}");
                None
            }
        })
        .collect()
}

fn parse_event(event: &Value) -> EngineEvent {
    let mut parsed = EngineEvent {
        author: event.get("author").and_then(Value::as_str).map(String::from),
        ..Default::default()
    };

    let mut record_call = |call: &Value| {
        let is_sql = call
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|name| name.contains("execute_sql"));
        if let Some(sql) = call.pointer("/args/query").and_then(Value::as_str) {
            if is_sql && !sql.is_empty() {
                parsed.executed_sql.push(sql.to_string());
            }
        }
    };

    if let Some(calls) = event.pointer("/actions/tool_calls").and_then(Value::as_array) {
        calls.iter().for_each(&mut record_call);
    }
    let parts = event
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    for part in &parts {
        if let Some(call) = part.get("function_call").or_else(|| part.get("functionCall")) {
            record_call(call);
        }
    }
    for part in &parts {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            parsed.text.push(text.to_string());
        }
    }
    parsed
}
