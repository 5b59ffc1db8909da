//! Time-series forecasting through BigQuery's `AI.FORECAST` table function.

use super::sql_guard::split_statements;
use regex::Regex;
use serde::Deserialize;

pub const DEFAULT_HORIZON: u32 = 10;
pub const FORECAST_MODEL: &str = "TimesFM 2.0";

/// Arguments of the `forecast` tool.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ForecastRequest {
    /// A table id (`project.dataset.table`) or a `SELECT`/`WITH` query.
    pub history_data: String,
    pub timestamp_col: String,
    pub data_col: String,
    #[serde(default = "default_horizon")]
    pub horizon: u32,
    #[serde(default)]
    pub id_cols: Option<Vec<String>>,
}

fn default_horizon() -> u32 {
    DEFAULT_HORIZON
}

fn is_query(history_data: &str) -> bool {
    let upper = history_data.trim_start().to_ascii_uppercase();
    upper.starts_with("SELECT") || upper.starts_with("WITH")
}

/// Builds the forecasting query for `request`.
pub fn build_forecast_sql(request: &ForecastRequest) -> Result<String, String> {
    let column = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").map_err(|e| e.to_string())?;
    let table = Regex::new(r"^[A-Za-z0-9_\-:]+(\.[A-Za-z0-9_\-]+){1,2}$").map_err(|e| e.to_string())?;

    if request.horizon == 0 {
        return Err("horizon must be greater than zero".to_string());
    }
    for col in [&request.timestamp_col, &request.data_col]
        .into_iter()
        .chain(request.id_cols.iter().flatten())
    {
        if !column.is_match(col) {
            return Err(format!("'{col}' is not a valid column name"));
        }
    }

    let history = request.history_data.trim().trim_end_matches(';');
    let source = if is_query(history) {
        if split_statements(history).len() != 1 {
            return Err("history_data must be a single SELECT query".to_string());
        }
        format!("({history})")
    } else {
        let table_id = history.trim_matches('`');
        if !table.is_match(table_id) {
            return Err(format!(
                "'{history}' is neither a table id nor a SELECT query"
            ));
        }
        format!("TABLE `{table_id}`")
    };

    let id_cols = match &request.id_cols {
        Some(cols) if !cols.is_empty() => {
            let list = cols
                .iter()
                .map(|c| format!("'{c}'"))
                .collect::<Vec<_>>()
                .join(", ");
            format!("\n    id_cols => [{list}],")
        }
        _ => String::new(),
    };

    Ok(format!(
        "SELECT * FROM AI.FORECAST(\n    {source},\n    data_col => '{data}',\n    timestamp_col => '{ts}',\n    model => '{FORECAST_MODEL}',{id_cols}\n    horizon => {horizon}\n)",
        data = request.data_col,
        ts = request.timestamp_col,
        horizon = request.horizon,
    ))
}
