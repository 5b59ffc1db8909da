//! # BigQuery Toolset
//!
//! The functions the model may call while answering a question. Each tool
//! takes JSON arguments produced by the model and returns a JSON object that
//! is sent back as the function response.

pub mod forecast;
pub mod insights;
pub mod sql_guard;

use crate::{
    config::{BigQueryConfig, TableReference, WriteMode},
    errors::Nl2SqlError,
    providers::{ai::FunctionDeclaration, db::storage::Storage},
    resolver::RuntimeIdentity,
};
use forecast::{build_forecast_sql, ForecastRequest};
use insights::{DataInsightsClient, InsightsTable};
use serde::Deserialize;
use serde_json::{json, Value};
use sql_guard::IdentifierKind;
use tracing::{info, warn};

pub const LIST_DATASET_IDS: &str = "list_dataset_ids";
pub const LIST_TABLE_IDS: &str = "list_table_ids";
pub const GET_TABLE_INFO: &str = "get_table_info";
pub const EXECUTE_SQL: &str = "execute_sql";
pub const FORECAST: &str = "forecast";
pub const ASK_DATA_INSIGHTS: &str = "ask_data_insights";

/// Every tool name, in declaration order.
pub const ALL_TOOLS: [&str; 6] = [
    LIST_DATASET_IDS,
    LIST_TABLE_IDS,
    GET_TABLE_INFO,
    EXECUTE_SQL,
    FORECAST,
    ASK_DATA_INSIGHTS,
];

#[derive(Deserialize)]
struct ProjectArgs {
    #[serde(default)]
    project_id: Option<String>,
}

#[derive(Deserialize)]
struct DatasetArgs {
    #[serde(default)]
    project_id: Option<String>,
    dataset_id: String,
}

#[derive(Deserialize)]
struct TableArgs {
    #[serde(default)]
    project_id: Option<String>,
    dataset_id: String,
    table_id: String,
}

#[derive(Deserialize)]
struct ExecuteSqlArgs {
    #[serde(default)]
    project_id: Option<String>,
    query: String,
}

#[derive(Deserialize)]
struct InsightsArgs {
    user_query_with_context: String,
    #[serde(default)]
    table_references: Vec<InsightsTable>,
}

/// The tools bound to one target table.
#[derive(Clone, Debug)]
pub struct Toolset {
    storage: Box<dyn Storage>,
    insights: Option<DataInsightsClient>,
    default_project: String,
    target_table: TableReference,
    write_mode: WriteMode,
    max_rows: usize,
    enabled: Vec<&'static str>,
}

impl Toolset {
    pub fn new(
        storage: Box<dyn Storage>,
        identity: &RuntimeIdentity,
        target_table: TableReference,
        bigquery: &BigQueryConfig,
    ) -> Self {
        Self {
            storage,
            insights: None,
            default_project: identity.project_id.clone(),
            target_table,
            write_mode: bigquery.write_mode,
            max_rows: bigquery.max_rows.max(1),
            enabled: ALL_TOOLS.to_vec(),
        }
    }

    /// Enables `ask_data_insights` through `client`.
    pub fn with_insights(mut self, client: DataInsightsClient) -> Self {
        self.insights = Some(client);
        self
    }

    /// Restricts the toolset to `names`. Unknown names are a configuration error.
    pub fn with_filter(mut self, names: Option<&[String]>) -> Result<Self, Nl2SqlError> {
        if let Some(names) = names {
            let mut enabled = Vec::with_capacity(names.len());
            for name in names {
                let tool = ALL_TOOLS
                    .iter()
                    .find(|t| **t == name.as_str())
                    .ok_or_else(|| {
                        Nl2SqlError::Configuration(format!(
                            "Unknown tool '{name}' in agent.tools. Available: {}",
                            ALL_TOOLS.join(", ")
                        ))
                    })?;
                enabled.push(*tool);
            }
            self.enabled = enabled;
        }
        Ok(self)
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    pub fn target_table(&self) -> &TableReference {
        &self.target_table
    }

    /// Names of the tools the model can actually call.
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.enabled
            .iter()
            .copied()
            .filter(|t| *t != ASK_DATA_INSIGHTS || self.insights.is_some())
            .collect()
    }

    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.tool_names()
            .into_iter()
            .map(|name| declaration(name, self.write_mode))
            .collect()
    }

    fn project_or_default(&self, project_id: Option<String>) -> String {
        project_id
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| self.default_project.clone())
    }

    /// The project to use, rejecting ids that are not plain identifiers.
    fn checked_project(&self, tool: &str, project_id: Option<String>) -> Result<String, Nl2SqlError> {
        let project = self.project_or_default(project_id);
        sql_guard::check_identifier(IdentifierKind::Project, &project)
            .map_err(|msg| Nl2SqlError::tool(tool, msg))?;
        Ok(project)
    }

    /// Runs tool `name` with the model-supplied `args`.
    pub async fn call(&self, name: &str, args: &Value) -> Result<Value, Nl2SqlError> {
        if !self.tool_names().iter().any(|t| *t == name) {
            return Err(Nl2SqlError::tool(name, "this tool is not available"));
        }
        info!(tool = name, %args, "Calling tool");

        match name {
            LIST_DATASET_IDS => {
                let args: ProjectArgs = parse_args(name, args)?;
                let project = self.checked_project(name, args.project_id)?;
                let ids = self.storage.list_dataset_ids(&project).await?;
                Ok(json!({ "dataset_ids": ids }))
            }
            LIST_TABLE_IDS => {
                let args: DatasetArgs = parse_args(name, args)?;
                let project = self.checked_project(name, args.project_id)?;
                sql_guard::check_identifier(IdentifierKind::Dataset, &args.dataset_id)
                    .map_err(|msg| Nl2SqlError::tool(name, msg))?;
                let ids = self
                    .storage
                    .list_table_ids(&project, &args.dataset_id)
                    .await?;
                Ok(json!({ "table_ids": ids }))
            }
            GET_TABLE_INFO => {
                let args: TableArgs = parse_args(name, args)?;
                let table = TableReference {
                    project_id: self.project_or_default(args.project_id),
                    dataset_id: args.dataset_id,
                    table_id: args.table_id,
                };
                let schema = self.storage.get_table_schema(&table).await?;
                Ok(json!({ "table": table.to_string(), "schema": *schema }))
            }
            EXECUTE_SQL => {
                let args: ExecuteSqlArgs = parse_args(name, args)?;
                sql_guard::check_write_mode(self.write_mode, &args.query)
                    .map_err(|msg| Nl2SqlError::tool(name, msg))?;
                let project = self.project_or_default(args.project_id);
                self.run_query(&project, &args.query).await
            }
            FORECAST => {
                let request: ForecastRequest = parse_args(name, args)?;
                let sql = build_forecast_sql(&request).map_err(|msg| Nl2SqlError::tool(name, msg))?;
                sql_guard::check_write_mode(self.write_mode, &sql)
                    .map_err(|msg| Nl2SqlError::tool(name, msg))?;
                let mut result = self.run_query(&self.default_project, &sql).await?;
                result["query"] = Value::String(sql);
                Ok(result)
            }
            ASK_DATA_INSIGHTS => {
                let args: InsightsArgs = parse_args(name, args)?;
                let client = self
                    .insights
                    .as_ref()
                    .ok_or_else(|| Nl2SqlError::tool(name, "data insights are not configured"))?;
                let tables = if args.table_references.is_empty() {
                    vec![InsightsTable::from(&self.target_table)]
                } else {
                    args.table_references
                };
                let answer = client.ask(&args.user_query_with_context, &tables).await?;
                Ok(json!({
                    "status": "SUCCESS",
                    "response": answer.response,
                    "generated_sql": answer.generated_sql,
                }))
            }
            other => Err(Nl2SqlError::tool(other, "unknown tool")),
        }
    }

    async fn run_query(&self, project: &str, sql: &str) -> Result<Value, Nl2SqlError> {
        let result = self.storage.execute_sql(project, sql, self.max_rows).await?;
        let mut rows = result.rows;
        let total = result.total_rows.max(rows.len() as u64);
        rows.truncate(self.max_rows);
        let truncated = total > rows.len() as u64;
        if truncated {
            warn!(total, max_rows = self.max_rows, "Truncating query result");
        }
        Ok(json!({
            "status": "SUCCESS",
            "rows": rows,
            "row_count": total,
            "truncated": truncated,
        }))
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, args: &Value) -> Result<T, Nl2SqlError> {
    let args = if args.is_null() { json!({}) } else { args.clone() };
    serde_json::from_value(args)
        .map_err(|e| Nl2SqlError::tool(tool, format!("invalid arguments: {e}")))
}

fn string_param(description: &str) -> Value {
    json!({ "type": "STRING", "description": description })
}

fn declaration(name: &'static str, write_mode: WriteMode) -> FunctionDeclaration {
    let (description, parameters) = match name {
        LIST_DATASET_IDS => (
            "List the BigQuery dataset ids in a Google Cloud project.".to_string(),
            json!({
                "type": "OBJECT",
                "properties": { "project_id": string_param("The Google Cloud project id.") },
            }),
        ),
        LIST_TABLE_IDS => (
            "List the table ids in a BigQuery dataset.".to_string(),
            json!({
                "type": "OBJECT",
                "properties": {
                    "project_id": string_param("The Google Cloud project id."),
                    "dataset_id": string_param("The BigQuery dataset id."),
                },
                "required": ["dataset_id"],
            }),
        ),
        GET_TABLE_INFO => (
            "Get the schema of a BigQuery table: column names, types, modes and descriptions."
                .to_string(),
            json!({
                "type": "OBJECT",
                "properties": {
                    "project_id": string_param("The Google Cloud project id."),
                    "dataset_id": string_param("The BigQuery dataset id."),
                    "table_id": string_param("The BigQuery table id."),
                },
                "required": ["dataset_id", "table_id"],
            }),
        ),
        EXECUTE_SQL => {
            let mode = match write_mode {
                WriteMode::Blocked => "Only a single read-only SELECT statement is permitted.",
                WriteMode::Allowed => "Any GoogleSQL statement is permitted.",
            };
            (
                format!("Run a GoogleSQL query in BigQuery and return the result rows. {mode}"),
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "project_id": string_param("The project to run the query job in."),
                        "query": string_param("The GoogleSQL query to execute."),
                    },
                    "required": ["query"],
                }),
            )
        }
        FORECAST => (
            "Forecast a time series with BigQuery AI.FORECAST (TimesFM).".to_string(),
            json!({
                "type": "OBJECT",
                "properties": {
                    "history_data": string_param("A fully-qualified table id or a SELECT query returning the history."),
                    "timestamp_col": string_param("The column holding the timestamps."),
                    "data_col": string_param("The column holding the values to forecast."),
                    "horizon": { "type": "INTEGER", "description": "Number of future points to forecast. Defaults to 10." },
                    "id_cols": {
                        "type": "ARRAY",
                        "items": { "type": "STRING" },
                        "description": "Columns identifying separate series.",
                    },
                },
                "required": ["history_data", "timestamp_col", "data_col"],
            }),
        ),
        _ => (
            "Ask a natural-language question about BigQuery tables and receive insights.".to_string(),
            json!({
                "type": "OBJECT",
                "properties": {
                    "user_query_with_context": string_param("The question, with any context needed to answer it."),
                    "table_references": {
                        "type": "ARRAY",
                        "items": {
                            "type": "OBJECT",
                            "properties": {
                                "project_id": { "type": "STRING" },
                                "dataset_id": { "type": "STRING" },
                                "table_id": { "type": "STRING" },
                            },
                            "required": ["project_id", "dataset_id", "table_id"],
                        },
                    },
                },
                "required": ["user_query_with_context"],
            }),
        ),
    };
    FunctionDeclaration {
        name: name.to_string(),
        description,
        parameters,
    }
}
