//! Client for the Conversational Analytics API used by `ask_data_insights`.

use crate::{
    auth::TokenSource,
    config::TableReference,
    errors::Nl2SqlError,
    providers::ensure_success,
    resolver::RuntimeIdentity,
};
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

const SERVICE: &str = "Conversational Analytics API";
pub const DEFAULT_INSIGHTS_BASE_URL: &str = "https://geminidataanalytics.googleapis.com";

const INSIGHTS_SYSTEM_INSTRUCTION: &str = "Answer the question using only the referenced tables. \
Prefer concise answers and include the key numbers.";

/// Table reference as the tool receives it from the model.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct InsightsTable {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl From<&TableReference> for InsightsTable {
    fn from(table: &TableReference) -> Self {
        Self {
            project_id: table.project_id.clone(),
            dataset_id: table.dataset_id.clone(),
            table_id: table.table_id.clone(),
        }
    }
}

/// What the analytics service answered.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct InsightsAnswer {
    pub response: Vec<String>,
    pub generated_sql: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct DataInsightsClient {
    client: ReqwestClient,
    base_url: String,
    project_id: String,
    tokens: Box<dyn TokenSource>,
}

impl DataInsightsClient {
    pub fn new(
        identity: &RuntimeIdentity,
        base_url: Option<&str>,
        tokens: Box<dyn TokenSource>,
    ) -> Result<Self, Nl2SqlError> {
        let client = ReqwestClient::builder()
            .build()
            .map_err(Nl2SqlError::ReqwestClientBuild)?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(DEFAULT_INSIGHTS_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            project_id: identity.project_id.clone(),
            tokens,
        })
    }

    /// Asks a question about `tables` and collects the text and SQL of the reply.
    pub async fn ask(
        &self,
        question: &str,
        tables: &[InsightsTable],
    ) -> Result<InsightsAnswer, Nl2SqlError> {
        let url = format!(
            "{}/v1alpha/projects/{}/locations/global:chat",
            self.base_url, self.project_id
        );
        let table_references: Vec<Value> = tables
            .iter()
            .map(|t| {
                json!({
                    "projectId": t.project_id,
                    "datasetId": t.dataset_id,
                    "tableId": t.table_id,
                })
            })
            .collect();
        let body = json!({
            "project": format!("projects/{}", self.project_id),
            "messages": [{ "userMessage": { "text": question } }],
            "inlineContext": {
                "datasourceReferences": { "bq": { "tableReferences": table_references } },
                "systemInstruction": INSIGHTS_SYSTEM_INSTRUCTION,
            },
        });

        debug!(%url, tables = tables.len(), "--> Asking data insights");
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|source| Nl2SqlError::Request {
                service: SERVICE,
                source,
            })?;
        let response = ensure_success(SERVICE, response).await?;
        let messages: Vec<Value> =
            response
                .json()
                .await
                .map_err(|source| Nl2SqlError::Deserialization {
                    service: SERVICE,
                    source,
                })?;
        Ok(collect_answer(&messages))
    }
}

/// Extracts text parts and generated SQL from the streamed system messages.
pub fn collect_answer(messages: &[Value]) -> InsightsAnswer {
    let mut answer = InsightsAnswer::default();
    for message in messages.iter().filter_map(|m| m.get("systemMessage")) {
        if let Some(parts) = message.pointer("/text/parts").and_then(Value::as_array) {
            answer
                .response
                .extend(parts.iter().filter_map(Value::as_str).map(String::from));
        }
        if let Some(sql) = message.pointer("/data/generatedSql").and_then(Value::as_str) {
            answer.generated_sql.push(sql.to_string());
        }
    }
    answer
}
