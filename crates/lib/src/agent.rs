//! # NL2SQL Agent
//!
//! The agent pairs a model with the BigQuery toolset. Answering a question is
//! a loop: the model either replies with text, which ends the turn, or asks
//! for function calls, which are run and fed back as function responses.

use crate::{
    auth::TokenSource,
    config::{AppConfig, SessionConfig},
    errors::Nl2SqlError,
    prompts::render_instruction,
    providers::{
        ai::{gemini::GeminiProvider, AiProvider, Content, GenerateRequest, Part, Role},
        db::bigquery::BigQueryProvider,
    },
    resolver::RuntimeIdentity,
    session::InMemorySessionService,
    tools::{insights::DataInsightsClient, Toolset},
    types::{AgentResponse, ToolCallRecord},
};
use serde_json::json;
use std::fmt;
use tracing::{debug, info, warn};

/// A configured agent with its own conversation session.
pub struct Nl2SqlAgent {
    name: String,
    model: String,
    description: String,
    instruction: String,
    max_tool_rounds: usize,
    provider: Box<dyn AiProvider>,
    toolset: Toolset,
    sessions: InMemorySessionService,
    session: SessionConfig,
}

impl fmt::Debug for Nl2SqlAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Nl2SqlAgent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("table", &self.toolset.target_table().to_string())
            .field("session_id", &self.session.session_id)
            .finish_non_exhaustive()
    }
}

/// A builder for creating `Nl2SqlAgent` instances.
#[derive(Default)]
pub struct AgentBuilder {
    ai_provider: Option<Box<dyn AiProvider>>,
    toolset: Option<Toolset>,
    sessions: Option<InMemorySessionService>,
    config: AppConfig,
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ai_provider(mut self, provider: Box<dyn AiProvider>) -> Self {
        self.ai_provider = Some(provider);
        self
    }

    pub fn toolset(mut self, toolset: Toolset) -> Self {
        self.toolset = Some(toolset);
        self
    }

    /// Shares an existing session store instead of creating a fresh one.
    pub fn sessions(mut self, sessions: InMemorySessionService) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Takes the persona, instruction, loop limit and session ids from `config`.
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the agent and opens its session.
    ///
    /// An existing session with the configured id is reused.
    pub async fn build(self) -> Result<Nl2SqlAgent, Nl2SqlError> {
        let provider = self
            .ai_provider
            .ok_or_else(|| Nl2SqlError::Configuration("AI provider is missing".to_string()))?;
        let toolset = self
            .toolset
            .ok_or_else(|| Nl2SqlError::Configuration("toolset is missing".to_string()))?;
        let sessions = self.sessions.unwrap_or_default();
        let AppConfig { agent, session, .. } = self.config;

        let instruction = render_instruction(
            agent.instruction.as_deref(),
            toolset.target_table(),
            toolset.write_mode(),
        );

        if sessions
            .get_session(&session.app_name, &session.user_id, &session.session_id)
            .await
            .is_none()
        {
            sessions
                .create_session(
                    &session.app_name,
                    &session.user_id,
                    Some(&session.session_id),
                )
                .await?;
        }

        Ok(Nl2SqlAgent {
            name: agent.name,
            model: agent.model,
            description: agent.description,
            instruction,
            max_tool_rounds: agent.max_tool_rounds,
            provider,
            toolset,
            sessions,
            session,
        })
    }
}

impl Nl2SqlAgent {
    /// Builds the production agent: Gemini on Vertex AI plus BigQuery.
    ///
    /// `identity` must already be resolved; it is passed to every client.
    pub async fn bootstrap(
        config: &AppConfig,
        identity: &RuntimeIdentity,
        tokens: Box<dyn TokenSource>,
    ) -> Result<Self, Nl2SqlError> {
        let table = config.bigquery.require_table()?;
        info!(
            project = %identity.project_id,
            location = %identity.location,
            model = %config.agent.model,
            %table,
            "Bootstrapping agent"
        );

        let provider = GeminiProvider::for_model(
            identity,
            &config.agent.model,
            config.agent.api_endpoint.as_deref(),
            tokens.clone(),
        )?;
        let storage = BigQueryProvider::new().await?;
        let insights = DataInsightsClient::new(identity, None, tokens)?;
        let toolset = Toolset::new(Box::new(storage), identity, table, &config.bigquery)
            .with_insights(insights)
            .with_filter(config.agent.tools.as_deref())?;

        AgentBuilder::new()
            .ai_provider(Box::new(provider))
            .toolset(toolset)
            .config(config.clone())
            .build()
            .await
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// The rendered system instruction.
    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn toolset(&self) -> &Toolset {
        &self.toolset
    }

    pub fn sessions(&self) -> &InMemorySessionService {
        &self.sessions
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }

    /// Drops the conversation so far and starts the session again under the same id.
    pub async fn reset_session(&self) -> Result<(), Nl2SqlError> {
        let SessionConfig {
            app_name,
            user_id,
            session_id,
        } = &self.session;
        self.sessions
            .delete_session(app_name, user_id, session_id)
            .await;
        self.sessions
            .create_session(app_name, user_id, Some(session_id))
            .await?;
        info!(%session_id, "Session reset");
        Ok(())
    }

    /// Answers one question within the agent's session.
    ///
    /// Tool failures are reported back to the model so it can recover. The
    /// session history is only updated when the turn completes.
    pub async fn answer(&self, question: &str) -> Result<AgentResponse, Nl2SqlError> {
        let SessionConfig {
            app_name,
            user_id,
            session_id,
        } = &self.session;
        let history = self
            .sessions
            .get_session(app_name, user_id, session_id)
            .await
            .ok_or_else(|| Nl2SqlError::Session(format!("session '{session_id}' not found")))?
            .history;

        let turn_start = history.len();
        let mut contents = history;
        contents.push(Content::user_text(question));
        let declarations = self.toolset.declarations();
        let mut tool_calls = Vec::new();

        for round in 0..=self.max_tool_rounds {
            let request =
                GenerateRequest::new(&self.instruction, contents.clone(), declarations.clone());
            let mut reply = self.provider.generate(&request).await?;
            reply.role = Role::Model;

            let calls: Vec<_> = reply.function_calls().into_iter().cloned().collect();
            contents.push(reply);

            if calls.is_empty() {
                let text = contents.last().map(Content::text).unwrap_or_default();
                self.sessions
                    .append(app_name, user_id, session_id, contents.split_off(turn_start))
                    .await?;
                debug!(rounds = round, "Agent turn complete");
                return Ok(AgentResponse { text, tool_calls });
            }
            if round == self.max_tool_rounds {
                break;
            }

            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                let (response, failed) = match self.toolset.call(&call.name, &call.args).await {
                    Ok(value) => (value, false),
                    Err(e) => {
                        warn!(tool = %call.name, "Tool call failed: {e}");
                        (json!({ "error": e.to_string() }), true)
                    }
                };
                tool_calls.push(ToolCallRecord {
                    name: call.name.clone(),
                    args: call.args.clone(),
                    failed,
                });
                responses.push(Part::function_response(call.name, response));
            }
            contents.push(Content {
                role: Role::User,
                parts: responses,
            });
        }

        Err(Nl2SqlError::ExternalService(format!(
            "the model did not produce an answer within {} tool rounds",
            self.max_tool_rounds
        )))
    }
}
