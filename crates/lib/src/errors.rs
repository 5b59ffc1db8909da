use thiserror::Error;

/// Custom error types for the application.
#[derive(Error, Debug)]
pub enum Nl2SqlError {
    /// Fatal startup problem: unresolvable project, unreadable or invalid config.
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Authentication failed: {0}. Try running: gcloud auth application-default login")]
    Authentication(String),
    #[error("External service error: {0}")]
    ExternalService(String),
    #[error("Failed to build Reqwest client: {0}")]
    ReqwestClientBuild(reqwest::Error),
    #[error("Failed to send request to {service}: {source}")]
    Request {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to deserialize {service} response: {source}")]
    Deserialization {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("BigQuery client error: {0}")]
    BigQueryClient(#[from] gcp_bigquery_client::error::BQError),
    #[error("Tool '{tool}' failed: {message}")]
    Tool { tool: String, message: String },
    #[error("Session error: {0}")]
    Session(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl Nl2SqlError {
    pub(crate) fn tool(tool: &str, message: impl Into<String>) -> Self {
        Nl2SqlError::Tool {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}
