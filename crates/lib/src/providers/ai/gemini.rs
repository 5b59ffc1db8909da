use crate::{
    auth::TokenSource,
    errors::Nl2SqlError,
    providers::{
        ai::{
            types::{Content, GenerateRequest, GenerateResponse},
            AiProvider,
        },
        ensure_success,
    },
    resolver::RuntimeIdentity,
};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use std::fmt::Debug;
use tracing::debug;

const SERVICE: &str = "Vertex AI";

/// Returns the regional Vertex AI host for `location`.
pub fn vertex_base_url(location: &str) -> String {
    if location == "global" {
        "https://aiplatform.googleapis.com".to_string()
    } else {
        format!("https://{location}-aiplatform.googleapis.com")
    }
}

/// Builds the `generateContent` URL for a publisher model.
pub fn generate_content_url(base_url: &str, identity: &RuntimeIdentity, model: &str) -> String {
    format!(
        "{base}/v1/projects/{project}/locations/{location}/publishers/google/models/{model}:generateContent",
        base = base_url.trim_end_matches('/'),
        project = identity.project_id,
        location = identity.location,
    )
}

/// A provider for Gemini models served through Vertex AI.
#[derive(Clone, Debug)]
pub struct GeminiProvider {
    client: ReqwestClient,
    api_url: String,
    tokens: Box<dyn TokenSource>,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider` posting to `api_url`.
    pub fn new(api_url: String, tokens: Box<dyn TokenSource>) -> Result<Self, Nl2SqlError> {
        let client = ReqwestClient::builder()
            .build()
            .map_err(Nl2SqlError::ReqwestClientBuild)?;
        Ok(Self {
            client,
            api_url,
            tokens,
        })
    }

    /// Creates a provider for `model` in the resolved project and location.
    ///
    /// `base_url` overrides the regional Vertex AI host.
    pub fn for_model(
        identity: &RuntimeIdentity,
        model: &str,
        base_url: Option<&str>,
        tokens: Box<dyn TokenSource>,
    ) -> Result<Self, Nl2SqlError> {
        let base = base_url
            .map(String::from)
            .unwrap_or_else(|| vertex_base_url(&identity.location));
        Self::new(generate_content_url(&base, identity, model), tokens)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<Content, Nl2SqlError> {
        let token = self.tokens.access_token().await?;
        debug!(url = %self.api_url, turns = request.contents.len(), "--> Sending request to Gemini");

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|source| Nl2SqlError::Request {
                service: SERVICE,
                source,
            })?;
        let response = ensure_success(SERVICE, response).await?;

        let gemini_response: GenerateResponse =
            response
                .json()
                .await
                .map_err(|source| Nl2SqlError::Deserialization {
                    service: SERVICE,
                    source,
                })?;

        let candidate = gemini_response.candidates.into_iter().next().ok_or_else(|| {
            let feedback = gemini_response
                .prompt_feedback
                .map(|f| f.to_string())
                .unwrap_or_else(|| "no feedback".to_string());
            Nl2SqlError::ExternalService(format!("model returned no candidates ({feedback})"))
        })?;

        debug!(finish_reason = ?candidate.finish_reason, "<-- Gemini response");
        candidate.content.ok_or_else(|| {
            Nl2SqlError::ExternalService(format!(
                "model returned an empty candidate (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("unknown")
            ))
        })
    }
}
