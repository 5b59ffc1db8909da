use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A column in a warehouse table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableField {
    pub name: String,
    /// The warehouse type name, e.g. `STRING` or `FLOAT64`.
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The column layout of a warehouse table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TableSchema {
    pub fields: Vec<TableField>,
}

/// Rows returned from a query, one JSON object per row.
pub type Rows = Vec<Value>;

/// The first page of a finished query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    pub rows: Rows,
    /// Rows the query produced in total, which may exceed `rows.len()`.
    pub total_rows: u64,
}

/// A tool invocation made while answering a question.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolCallRecord {
    pub name: String,
    pub args: Value,
    /// `true` when the tool returned an error to the model.
    pub failed: bool,
}

impl ToolCallRecord {
    /// The SQL text when this was an `execute_sql` call.
    pub fn sql(&self) -> Option<&str> {
        if self.name == "execute_sql" {
            self.args.get("query").and_then(Value::as_str)
        } else {
            None
        }
    }
}

/// The outcome of asking the agent one question.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct AgentResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

impl AgentResponse {
    /// Every SQL statement the agent executed, in order.
    pub fn executed_sql(&self) -> Vec<&str> {
        self.tool_calls.iter().filter_map(|c| c.sql()).collect()
    }
}
