//! # Natural Language to SQL
//!
//! This crate answers natural-language questions about a BigQuery table. A
//! Gemini model served by Vertex AI is given a set of BigQuery tools and
//! decides which SQL to run.
//!
//! Startup happens in three steps:
//!
//! 1. load an `AppConfig` from YAML ([`config::load_config`])
//! 2. resolve the cloud project into a [`RuntimeIdentity`] ([`ProjectResolver`])
//! 3. bootstrap an [`Nl2SqlAgent`] with that identity
//!
//! Deployed agents on Agent Engine are reached through [`engine::AgentEngineClient`].

pub mod agent;
pub mod auth;
pub mod config;
pub mod engine;
pub mod errors;
pub mod gcloud;
pub mod prompts;
pub mod providers;
pub mod resolver;
pub mod session;
pub mod tools;
pub mod types;

pub use agent::{AgentBuilder, Nl2SqlAgent};
pub use config::{load_config, parse_config, AppConfig, TableReference, WriteMode};
pub use errors::Nl2SqlError;
pub use resolver::{ProjectResolver, ProjectSource, RuntimeIdentity};
pub use types::{AgentResponse, ToolCallRecord};
