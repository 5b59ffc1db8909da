//! # Project Resolver
//!
//! Determines which cloud project the agent runs against before any client is
//! built. Sources are consulted in a fixed order and the first non-empty value
//! wins; later sources are never touched once an earlier one answers:
//!
//! 1. `project_id` from the configuration document
//! 2. the active project reported by `gcloud config get-value core/project`
//! 3. the `GOOGLE_CLOUD_PROJECT` environment variable
//!
//! The result is a `RuntimeIdentity` that is handed to clients explicitly.

use crate::{
    config::{AppConfig, DEFAULT_LOCATION},
    errors::Nl2SqlError,
    gcloud::{self, DEFAULT_GCLOUD_PROGRAM},
};
use async_trait::async_trait;
use std::env;
use std::fmt::Debug;
use tracing::{debug, info, warn};

/// Environment variable holding the project id for downstream Google SDKs.
pub const PROJECT_ENV_VAR: &str = "GOOGLE_CLOUD_PROJECT";
/// Environment variable holding the location for downstream Google SDKs.
pub const LOCATION_ENV_VAR: &str = "GOOGLE_CLOUD_LOCATION";
/// Selects the Vertex AI backend instead of the public Gemini API.
pub const USE_VERTEXAI_ENV_VAR: &str = "GOOGLE_GENAI_USE_VERTEXAI";

/// One place a project id may come from.
#[async_trait]
pub trait ProjectSource: Send + Sync + Debug {
    /// A short human-readable name used in error messages.
    fn name(&self) -> &str;

    /// Tells the operator how to make this source produce a value.
    fn remediation(&self) -> String;

    /// Returns the project id, or `None` when this source has nothing.
    async fn lookup(&self) -> Option<String>;
}

/// Reads `project_id` from the loaded configuration document.
#[derive(Debug, Clone, Default)]
pub struct ConfigProjectSource {
    project_id: Option<String>,
}

impl ConfigProjectSource {
    pub fn from_config(config: Option<&AppConfig>) -> Self {
        Self {
            project_id: config
                .and_then(AppConfig::configured_project_id)
                .map(String::from),
        }
    }
}

#[async_trait]
impl ProjectSource for ConfigProjectSource {
    fn name(&self) -> &str {
        "configuration file (project_id)"
    }

    fn remediation(&self) -> String {
        "set `project_id: <YOUR_PROJECT_ID>` in the configuration file".to_string()
    }

    async fn lookup(&self) -> Option<String> {
        self.project_id.clone()
    }
}

/// Asks the gcloud CLI for its active project.
///
/// Any non-empty stdout counts as a result, even when gcloud exits with a
/// failure status. A missing binary counts as "no value".
#[derive(Debug, Clone)]
pub struct GcloudProjectLookup {
    program: String,
}

impl GcloudProjectLookup {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GcloudProjectLookup {
    fn default() -> Self {
        Self::new(DEFAULT_GCLOUD_PROGRAM)
    }
}

#[async_trait]
impl ProjectSource for GcloudProjectLookup {
    fn name(&self) -> &str {
        "gcloud CLI (core/project)"
    }

    fn remediation(&self) -> String {
        "run: gcloud config set project <YOUR_PROJECT_ID>".to_string()
    }

    async fn lookup(&self) -> Option<String> {
        match gcloud::run(&self.program, &["config", "get-value", "core/project"]).await {
            Ok(output) => {
                if !output.success {
                    debug!(stderr = %output.stderr.trim(), "gcloud exited with a failure status");
                }
                output.value()
            }
            Err(e) => {
                warn!("Could not run '{}': {e}", self.program);
                None
            }
        }
    }
}

/// Reads the project id from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvProjectSource {
    var: String,
}

impl EnvProjectSource {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvProjectSource {
    fn default() -> Self {
        Self::new(PROJECT_ENV_VAR)
    }
}

#[async_trait]
impl ProjectSource for EnvProjectSource {
    fn name(&self) -> &str {
        &self.var
    }

    fn remediation(&self) -> String {
        format!("export {}=<YOUR_PROJECT_ID>", self.var)
    }

    async fn lookup(&self) -> Option<String> {
        env::var(&self.var).ok()
    }
}

/// Walks an ordered list of project sources.
#[derive(Debug)]
pub struct ProjectResolver {
    sources: Vec<Box<dyn ProjectSource>>,
}

impl ProjectResolver {
    pub fn new(sources: Vec<Box<dyn ProjectSource>>) -> Self {
        Self { sources }
    }

    /// The standard chain: configuration, then gcloud, then `GOOGLE_CLOUD_PROJECT`.
    pub fn standard(config: Option<&AppConfig>, gcloud_program: &str) -> Self {
        Self::new(vec![
            Box::new(ConfigProjectSource::from_config(config)),
            Box::new(GcloudProjectLookup::new(gcloud_program)),
            Box::new(EnvProjectSource::default()),
        ])
    }

    /// Returns the first non-empty project id.
    pub async fn resolve_project(&self) -> Result<String, Nl2SqlError> {
        for source in &self.sources {
            let value = source.lookup().await;
            match value.as_deref().map(str::trim) {
                Some(id) if !id.is_empty() => {
                    info!("Resolved project '{id}' from {}.", source.name());
                    return Ok(id.to_string());
                }
                _ => debug!("No project id from {}.", source.name()),
            }
        }
        Err(self.unresolved_error())
    }

    fn unresolved_error(&self) -> Nl2SqlError {
        let attempts = self
            .sources
            .iter()
            .enumerate()
            .map(|(i, s)| format!("  {}. {}: {}", i + 1, s.name(), s.remediation()))
            .collect::<Vec<_>>()
            .join("\n");
        Nl2SqlError::Configuration(format!(
            "Could not determine project ID. Tried the following sources in order:\n{attempts}"
        ))
    }
}

/// The resolved project and location for this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeIdentity {
    pub project_id: String,
    pub location: String,
}

impl RuntimeIdentity {
    /// Resolves the project through `resolver` and takes the location from `config`.
    pub async fn resolve(
        config: Option<&AppConfig>,
        resolver: &ProjectResolver,
    ) -> Result<Self, Nl2SqlError> {
        let project_id = resolver.resolve_project().await?;
        let location = config
            .map(|c| c.location.trim())
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_LOCATION)
            .to_string();
        Ok(Self {
            project_id,
            location,
        })
    }

    /// The variables downstream Google tooling reads.
    pub fn env_vars(&self) -> [(&'static str, String); 3] {
        [
            (PROJECT_ENV_VAR, self.project_id.clone()),
            (LOCATION_ENV_VAR, self.location.clone()),
            (USE_VERTEXAI_ENV_VAR, "TRUE".to_string()),
        ]
    }

    /// Writes `env_vars` into the process environment so child processes
    /// (gcloud, toolbox servers) see the same identity. Call once at startup.
    pub fn export_to_env(&self) {
        for (name, value) in self.env_vars() {
            env::set_var(name, value);
        }
    }
}
