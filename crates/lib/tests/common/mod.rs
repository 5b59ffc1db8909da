#![allow(dead_code)]
//! # Common Test Utilities
//!
//! Mock providers and project sources shared by the integration tests, so
//! tests run without cloud credentials or a gcloud installation.

use async_trait::async_trait;
use dotenvy::dotenv;
use nl2sql::{
    config::{AppConfig, BigQueryConfig, TableReference, WriteMode},
    providers::{
        ai::{AiProvider, Content, GenerateRequest, Part, Role},
        db::storage::Storage,
    },
    resolver::{ProjectSource, RuntimeIdentity},
    tools::Toolset,
    types::{QueryResult, Rows, TableField, TableSchema},
    Nl2SqlError,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, Once};

static INIT: Once = Once::new();

/// Initializes the tracing subscriber and loads .env for tests.
pub fn setup_tracing() {
    INIT.call_once(|| {
        dotenv().ok();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub const TEST_TABLE: &str = "test-project.census.adult_income";

pub fn test_identity() -> RuntimeIdentity {
    RuntimeIdentity {
        project_id: "test-project".to_string(),
        location: "us-central1".to_string(),
    }
}

pub fn test_bigquery_config(write_mode: WriteMode) -> BigQueryConfig {
    BigQueryConfig {
        table: Some(TEST_TABLE.to_string()),
        write_mode,
        ..Default::default()
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        project_id: Some("test-project".to_string()),
        bigquery: test_bigquery_config(WriteMode::Blocked),
        ..Default::default()
    }
}

/// A toolset over `storage` bound to the test table.
pub fn test_toolset(storage: MockStorage, write_mode: WriteMode) -> Toolset {
    let bigquery = test_bigquery_config(write_mode);
    let table = TableReference::parse(TEST_TABLE).unwrap();
    Toolset::new(Box::new(storage), &test_identity(), table, &bigquery)
}

// --- Mock AI Provider ---

/// Replays scripted model turns and records every request it receives.
#[derive(Clone, Debug, Default)]
pub struct MockAiProvider {
    pub requests: Arc<Mutex<Vec<GenerateRequest>>>,
    replies: Arc<Mutex<Vec<Content>>>,
}

impl MockAiProvider {
    pub fn new(replies: Vec<Content>) -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            replies: Arc::new(Mutex::new(replies.into_iter().rev().collect())),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> GenerateRequest {
        self.requests.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl AiProvider for MockAiProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<Content, Nl2SqlError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| model_text("Default mock response")))
    }
}

/// A model turn holding only text.
pub fn model_text(text: &str) -> Content {
    Content {
        role: Role::Model,
        parts: vec![Part::text(text)],
    }
}

/// A model turn requesting a single function call.
pub fn model_call(name: &str, args: Value) -> Content {
    Content {
        role: Role::Model,
        parts: vec![Part::function_call(name, args)],
    }
}

// --- Mock Storage ---

/// An in-memory warehouse that records the SQL it was asked to run.
#[derive(Clone, Debug)]
pub struct MockStorage {
    pub executed: Arc<Mutex<Vec<(String, String)>>>,
    pub rows: Rows,
    /// Reported total when the warehouse holds more rows than it returns.
    pub total_rows: Option<u64>,
}

impl MockStorage {
    pub fn new(rows: Rows) -> Self {
        Self {
            executed: Arc::new(Mutex::new(Vec::new())),
            rows,
            total_rows: None,
        }
    }

    pub fn with_total_rows(mut self, total_rows: u64) -> Self {
        self.total_rows = Some(total_rows);
        self
    }

    pub fn executed_sql(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .map(|(_, sql)| sql.clone())
            .collect()
    }
}

impl Default for MockStorage {
    fn default() -> Self {
        Self::new(vec![json!({ "education": "Bachelors", "count": 5355 })])
    }
}

#[async_trait]
impl Storage for MockStorage {
    fn name(&self) -> &str {
        "MockDB"
    }

    async fn list_dataset_ids(&self, _project_id: &str) -> Result<Vec<String>, Nl2SqlError> {
        Ok(vec!["census".to_string(), "insurance".to_string()])
    }

    async fn list_table_ids(
        &self,
        _project_id: &str,
        dataset_id: &str,
    ) -> Result<Vec<String>, Nl2SqlError> {
        match dataset_id {
            "census" => Ok(vec!["adult_income".to_string()]),
            other => Err(Nl2SqlError::ExternalService(format!(
                "dataset '{other}' not found"
            ))),
        }
    }

    async fn get_table_schema(
        &self,
        _table: &TableReference,
    ) -> Result<Arc<TableSchema>, Nl2SqlError> {
        Ok(Arc::new(TableSchema {
            fields: vec![
                TableField {
                    name: "age".to_string(),
                    r#type: "INTEGER".to_string(),
                    mode: Some("NULLABLE".to_string()),
                    description: None,
                },
                TableField {
                    name: "education".to_string(),
                    r#type: "STRING".to_string(),
                    mode: Some("NULLABLE".to_string()),
                    description: Some("Highest level of education".to_string()),
                },
            ],
        }))
    }

    async fn execute_sql(
        &self,
        project_id: &str,
        sql: &str,
        _max_rows: usize,
    ) -> Result<QueryResult, Nl2SqlError> {
        self.executed
            .lock()
            .unwrap()
            .push((project_id.to_string(), sql.to_string()));
        Ok(QueryResult {
            rows: self.rows.clone(),
            total_rows: self.total_rows.unwrap_or(self.rows.len() as u64),
        })
    }
}

// --- Fake project sources ---

/// A project source returning a fixed answer and counting lookups.
#[derive(Debug, Clone)]
pub struct FakeProjectSource {
    pub label: String,
    pub value: Option<String>,
    pub calls: Arc<Mutex<usize>>,
}

impl FakeProjectSource {
    pub fn new(label: &str, value: Option<&str>) -> Self {
        Self {
            label: label.to_string(),
            value: value.map(String::from),
            calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ProjectSource for FakeProjectSource {
    fn name(&self) -> &str {
        &self.label
    }

    fn remediation(&self) -> String {
        format!("configure {}", self.label)
    }

    async fn lookup(&self) -> Option<String> {
        *self.calls.lock().unwrap() += 1;
        self.value.clone()
    }
}
