//! # Default Prompt Templates
//!
//! The system instruction given to the agent. A custom template can be set
//! with `agent.instruction` in the configuration file.

use crate::config::{TableReference, WriteMode};

/// The default system instruction.
///
/// Placeholders: `{table}`, `{write_mode}`
pub const DEFAULT_AGENT_INSTRUCTION: &str = "You are a data analysis assistant with access to BigQuery tools.

Your primary focus is this data table: {table}

When answering questions:
1. First, understand the user's question and what data they need
2. Use the BigQuery tools to explore the table schema and understand the data structure
3. Generate and execute appropriate SQL queries to answer the question
4. Provide clear, concise answers based on the query results
5. If you encounter any issues, explain them clearly to the user

Write mode is {write_mode}. When it is BLOCKED, only read-only SELECT queries will run.

Always use the BigQuery tools available to you to answer questions accurately.";

/// Fills `template` (or the default) for the given table and write mode.
pub fn render_instruction(
    template: Option<&str>,
    table: &TableReference,
    write_mode: WriteMode,
) -> String {
    template
        .unwrap_or(DEFAULT_AGENT_INSTRUCTION)
        .replace("{table}", &table.to_string())
        .replace("{write_mode}", write_mode.as_str())
}
