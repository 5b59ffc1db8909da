//! OAuth access tokens for the Google REST APIs.

use crate::errors::Nl2SqlError;
use async_trait::async_trait;
use dyn_clone::DynClone;
use gcloud_sdk::{GoogleAuthTokenGenerator, TokenSourceType};
use std::fmt::{self, Debug};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// A source of bearer tokens for Google APIs.
#[async_trait]
pub trait TokenSource: Send + Sync + Debug + DynClone {
    async fn access_token(&self) -> Result<String, Nl2SqlError>;
}

dyn_clone::clone_trait_object!(TokenSource);

/// Application default credentials: `GOOGLE_APPLICATION_CREDENTIALS`, the
/// gcloud user credentials file, or the metadata server.
///
/// The generator is created on first use and refreshes tokens itself.
#[derive(Clone, Default)]
pub struct AdcTokenSource {
    credentials_file: Option<PathBuf>,
    generator: Arc<OnceCell<GoogleAuthTokenGenerator>>,
}

impl AdcTokenSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads credentials from a service account or authorized user key file.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_file: Some(path.into()),
            generator: Arc::new(OnceCell::new()),
        }
    }

    async fn generator(&self) -> Result<&GoogleAuthTokenGenerator, Nl2SqlError> {
        self.generator
            .get_or_try_init(|| async {
                let source = match &self.credentials_file {
                    Some(path) => TokenSourceType::File(path.clone()),
                    None => TokenSourceType::Default,
                };
                debug!(credentials_file = ?self.credentials_file, "Creating application default token generator");
                GoogleAuthTokenGenerator::new(source, vec![CLOUD_PLATFORM_SCOPE.to_string()])
                    .await
                    .map_err(|e| Nl2SqlError::Authentication(e.to_string()))
            })
            .await
    }
}

impl Debug for AdcTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdcTokenSource")
            .field("credentials_file", &self.credentials_file)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for AdcTokenSource {
    async fn access_token(&self) -> Result<String, Nl2SqlError> {
        let token = self
            .generator()
            .await?
            .create_token()
            .await
            .map_err(|e| Nl2SqlError::Authentication(e.to_string()))?;
        Ok(token.token.as_sensitive_str().to_string())
    }
}

/// A fixed token, e.g. one minted outside the process.
#[derive(Clone)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl Debug for StaticTokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticTokenSource(..)")
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String, Nl2SqlError> {
        Ok(self.token.clone())
    }
}
