//! # Application Configuration
//!
//! This module defines the typed configuration document for the agent and the
//! logic for loading it from a YAML file. `${VAR}` references in the file are
//! expanded from the environment before parsing, and `NL2SQL_`-prefixed
//! variables override nested keys (e.g. `NL2SQL_BIGQUERY__WRITE_MODE`).
//!
//! The loaded `AppConfig` is never mutated afterwards; consumers hold it by
//! shared reference or behind an `Arc`.

use crate::errors::Nl2SqlError;
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// The location used when the document omits `location`.
pub const DEFAULT_LOCATION: &str = "us-central1";
/// The model used when the document omits `agent.model`.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
/// The value shipped in the config template. It is treated as "not set".
pub const PROJECT_ID_PLACEHOLDER: &str = "your-project-id";

const ENV_PREFIX: &str = "NL2SQL";

/// Whether SQL generated by the agent may mutate data.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum WriteMode {
    /// Only a single read-only statement is executed.
    #[default]
    Blocked,
    /// Any statement is passed through to the warehouse.
    Allowed,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Blocked => "BLOCKED",
            WriteMode::Allowed => "ALLOWED",
        }
    }
}

/// The root configuration structure, mapping directly to `config.yaml`.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    /// The cloud project. When absent the resolver falls back to gcloud and the environment.
    pub project_id: Option<String>,
    pub location: String,
    pub bigquery: BigQueryConfig,
    pub agent: AgentConfig,
    pub session: SessionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            location: DEFAULT_LOCATION.to_string(),
            bigquery: BigQueryConfig::default(),
            agent: AgentConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Returns the configured project id, ignoring blanks and the template placeholder.
    pub fn configured_project_id(&self) -> Option<&str> {
        self.project_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && *id != PROJECT_ID_PLACEHOLDER)
    }
}

/// Settings for the target warehouse table and the SQL tools.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BigQueryConfig {
    /// Fully-qualified target table, `project.dataset.table`.
    pub table: Option<String>,
    pub dataset: Option<String>,
    pub write_mode: WriteMode,
    /// Maximum number of rows returned to the model from a single query.
    pub max_rows: usize,
}

impl Default for BigQueryConfig {
    fn default() -> Self {
        Self {
            table: None,
            dataset: None,
            write_mode: WriteMode::default(),
            max_rows: 100,
        }
    }
}

impl BigQueryConfig {
    /// Returns the target table, failing when it has not been configured.
    pub fn require_table(&self) -> Result<TableReference, Nl2SqlError> {
        let table = self
            .table
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                Nl2SqlError::Configuration(
                    "'bigquery.table' must be set to a fully-qualified table (project.dataset.table)"
                        .to_string(),
                )
            })?;
        TableReference::parse(table)
    }
}

/// A fully-qualified BigQuery table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableReference {
    /// Parses `project.dataset.table`.
    pub fn parse(value: &str) -> Result<Self, Nl2SqlError> {
        let parts: Vec<&str> = value.trim().trim_matches('`').split('.').collect();
        match parts.as_slice() {
            [project, dataset, table]
                if !project.is_empty() && !dataset.is_empty() && !table.is_empty() =>
            {
                Ok(Self {
                    project_id: project.to_string(),
                    dataset_id: dataset.to_string(),
                    table_id: table.to_string(),
                })
            }
            _ => Err(Nl2SqlError::Configuration(format!(
                "Invalid table name '{value}'. Expected format: project.dataset.table"
            ))),
        }
    }
}

impl std::fmt::Display for TableReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.project_id, self.dataset_id, self.table_id)
    }
}

/// Settings for the agent persona and its model.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    pub model: String,
    pub description: String,
    /// Replaces the default system instruction. `{table}` is substituted.
    pub instruction: Option<String>,
    /// Overrides the model endpoint base URL (useful for proxies and tests).
    pub api_endpoint: Option<String>,
    pub max_tool_rounds: usize,
    /// Restricts the toolset to the named tools. `None` enables every tool.
    pub tools: Option<Vec<String>>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "nl2sql_agent".to_string(),
            model: DEFAULT_MODEL.to_string(),
            description: "Answers questions about BigQuery data by generating and executing SQL."
                .to_string(),
            instruction: None,
            api_endpoint: None,
            max_tool_rounds: 8,
            tools: None,
        }
    }
}

/// Identifiers for the local conversation session.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            app_name: "nl2sql_app".to_string(),
            user_id: "user_1".to_string(),
            session_id: "session_1".to_string(),
        }
    }
}

/// Replaces `${VAR}` references with values from the environment.
/// Unset variables expand to an empty string.
fn substitute_env_vars(content: &str) -> Result<String, Nl2SqlError> {
    let re = Regex::new(r"\$\{(?P<var>[A-Za-z0-9_]+)\}")?;
    let expanded = re.replace_all(content, |caps: &regex::Captures| {
        env::var(&caps["var"]).unwrap_or_default()
    });
    Ok(expanded.into_owned())
}

/// Parses a configuration document from YAML text.
///
/// Environment substitution and `NL2SQL_` overrides are applied, so two calls
/// with the same text can differ only if the environment changed in between.
pub fn parse_config(content: &str) -> Result<AppConfig, Nl2SqlError> {
    let expanded = substitute_env_vars(content)?;

    let mut builder = ConfigBuilder::builder();
    if !expanded.trim().is_empty() {
        builder = builder.add_source(File::from_str(&expanded, FileFormat::Yaml));
    }

    let settings = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()
        .map_err(|e| Nl2SqlError::Configuration(e.to_string()))?;

    let config: AppConfig = settings
        .try_deserialize()
        .map_err(|e| Nl2SqlError::Configuration(e.to_string()))?;
    debug!(?config, "Parsed configuration");
    Ok(config)
}

/// Loads the configuration document from a YAML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig, Nl2SqlError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Nl2SqlError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    info!("Loading configuration from '{}'.", path.display());
    let content = fs::read_to_string(path).map_err(|e| {
        Nl2SqlError::Configuration(format!(
            "Failed to read config file '{}': {e}",
            path.display()
        ))
    })?;
    parse_config(&content)
}
